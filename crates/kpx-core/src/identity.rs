use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::Role;

/// The authenticated caller of an operation.
///
/// Resolved from the `users` table by `kpx-db`. Contains only data fields;
/// every permission decision goes through [`crate::policy::authorize`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    /// Company the user belongs to. Always set for clients.
    pub company_id: Option<String>,
    pub is_active: bool,
}

impl Actor {
    /// Whether the actor belongs to `company_id`.
    #[must_use]
    pub fn belongs_to(&self, company_id: &str) -> bool {
        self.company_id.as_deref() == Some(company_id)
    }
}
