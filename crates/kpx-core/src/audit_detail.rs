//! Typed audit detail payloads.
//!
//! Each audit action can carry a structured `detail` JSON blob. These types
//! give the common shapes a schema.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Detail for `AuditAction::StatusChanged`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StatusChangedDetail {
    pub action: String,
    pub from: String,
    pub to: String,
    pub comment: Option<String>,
}

/// Detail for `AuditAction::Deleted` on a grid.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GridDeletedDetail {
    pub company_id: String,
    pub month: u32,
    pub year: i32,
}
