use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Longest accepted comment, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// One message in a grid's chat log. Never edited after creation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GridComment {
    pub id: String,
    pub grid_id: String,
    pub user_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Trim a comment and reject empty or oversized messages.
///
/// # Errors
///
/// Returns `CoreError::Validation` if the trimmed message is empty or longer
/// than [`MAX_MESSAGE_CHARS`].
pub fn clean_message(message: &str) -> Result<String, CoreError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("comment must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return Err(CoreError::Validation(format!(
            "comment must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}
