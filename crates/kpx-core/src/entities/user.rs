use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::Role;
use crate::identity::Actor;

/// A user account with its agency role.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub company_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// The identity used for authorization decisions.
    #[must_use]
    pub fn to_actor(&self) -> Actor {
        Actor {
            user_id: self.id.clone(),
            role: self.role,
            company_id: self.company_id.clone(),
            is_active: self.is_active,
        }
    }
}
