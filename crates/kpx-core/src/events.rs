//! Side effects emitted by grid transitions.
//!
//! The transition planner never talks to notification or reminder services.
//! It returns a list of `GridEvent`s which `kpx-db` stores in the outbox in
//! the same transaction as the status change; the outbox dispatcher delivers
//! them afterwards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{EntityType, NotificationKind};

/// One deliverable side effect.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GridEvent {
    /// Create an in-app notification for `user_id`.
    Notify {
        user_id: String,
        title: String,
        message: String,
        kind: NotificationKind,
        grid_id: String,
    },
    /// Open a reminder for `user_id` to act on the entity.
    CreateReminder {
        user_id: String,
        entity_type: EntityType,
        entity_id: String,
    },
    /// Resolve every open reminder on the entity.
    ResolveReminder {
        entity_type: EntityType,
        entity_id: String,
    },
}

impl GridEvent {
    /// Short name used in logs and the outbox `event_type` column.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Notify { .. } => "notify",
            Self::CreateReminder { .. } => "create_reminder",
            Self::ResolveReminder { .. } => "resolve_reminder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_serializes_with_type_tag() {
        let event = GridEvent::Notify {
            user_id: "usr-00000001".into(),
            title: "t".into(),
            message: "m".into(),
            kind: NotificationKind::GridSent,
            grid_id: "grd-00000001".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "notify");
        assert_eq!(json["kind"], "grid_sent");
        let recovered: GridEvent = serde_json::from_value(json).unwrap();
        assert_eq!(recovered, event);
    }

    #[test]
    fn resolve_reminder_shape() {
        let json = r#"{"type":"resolve_reminder","entity_type":"grid","entity_id":"grd-1"}"#;
        let event: GridEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type(), "resolve_reminder");
        assert_eq!(
            event,
            GridEvent::ResolveReminder {
                entity_type: EntityType::Grid,
                entity_id: "grd-1".into(),
            }
        );
    }
}
