//! Notification repository.

use kpx_core::entities::Notification;
use kpx_core::enums::{EntityType, NotificationKind};
use kpx_core::errors::CoreError;
use kpx_core::identity::Actor;
use kpx_core::ids::PREFIX_NOTIFICATION;
use kpx_core::policy::Denied;

use crate::error::DatabaseError;
use crate::helpers::{
    get_opt_string, now_utc, parse_datetime, parse_enum, parse_optional_datetime, timestamp,
};
use crate::service::KpxService;

/// Filter criteria for a user's notifications.
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub limit: Option<u32>,
}

/// Input for [`KpxService::add_notification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
}

fn row_to_notification(row: &libsql::Row) -> Result<Notification, DatabaseError> {
    let entity_type = get_opt_string(row, 5)?;
    Ok(Notification {
        id: row.get::<String>(0)?,
        user_id: row.get::<String>(1)?,
        title: row.get::<String>(2)?,
        message: row.get::<String>(3)?,
        kind: parse_enum(&row.get::<String>(4)?)?,
        entity_type: entity_type.as_deref().map(parse_enum).transpose()?,
        entity_id: get_opt_string(row, 6)?,
        read_at: parse_optional_datetime(get_opt_string(row, 7)?.as_deref())?,
        created_at: parse_datetime(&row.get::<String>(8)?)?,
    })
}

const SELECT_COLS: &str =
    "id, user_id, title, message, kind, entity_type, entity_id, read_at, created_at";

impl KpxService {
    /// Store a notification for a user.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the INSERT fails (e.g. unknown user).
    pub async fn add_notification(
        &self,
        new: &NewNotification,
    ) -> Result<Notification, DatabaseError> {
        let notification = Notification {
            id: self.db().generate_id(PREFIX_NOTIFICATION).await?,
            user_id: new.user_id.clone(),
            title: new.title.clone(),
            message: new.message.clone(),
            kind: new.kind,
            entity_type: new.entity_type,
            entity_id: new.entity_id.clone(),
            read_at: None,
            created_at: now_utc(),
        };

        let _gate = self.write_gate().await;
        self.db()
            .execute_with(
                "INSERT INTO notifications (id, user_id, title, message, kind, entity_type, entity_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                || {
                    libsql::params![
                        notification.id.as_str(),
                        notification.user_id.as_str(),
                        notification.title.as_str(),
                        notification.message.as_str(),
                        notification.kind.as_str(),
                        notification.entity_type.map(EntityType::as_str),
                        notification.entity_id.as_deref(),
                        timestamp(notification.created_at)
                    ]
                },
            )
            .await?;
        Ok(notification)
    }

    /// The actor's notifications, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Forbidden` for inactive users.
    pub async fn list_notifications(
        &self,
        actor: &Actor,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, DatabaseError> {
        if !actor.is_active {
            return Err(CoreError::from(Denied::Inactive).into());
        }
        let unread = if filter.unread_only {
            "AND read_at IS NULL"
        } else {
            ""
        };
        let limit = filter.limit.unwrap_or(crate::repos::grid::DEFAULT_LIST_LIMIT);
        let sql = format!(
            "SELECT {SELECT_COLS} FROM notifications WHERE user_id = ?1 {unread}
             ORDER BY created_at DESC, rowid DESC LIMIT {limit}"
        );
        let mut rows = self
            .db()
            .query_with(&sql, || [actor.user_id.as_str()])
            .await?;
        let mut notifications = Vec::new();
        while let Some(row) = rows.next().await? {
            notifications.push(row_to_notification(&row)?);
        }
        Ok(notifications)
    }

    /// Mark one of the actor's notifications read. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the notification does not exist or
    /// belongs to someone else.
    pub async fn mark_notification_read(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<Notification, DatabaseError> {
        let read_at = timestamp(now_utc());
        let changed = {
            let _gate = self.write_gate().await;
            self.db()
                .execute_with(
                    "UPDATE notifications SET read_at = COALESCE(read_at, ?1)
                     WHERE id = ?2 AND user_id = ?3",
                    || libsql::params![read_at.as_str(), id, actor.user_id.as_str()],
                )
                .await?
        };
        if changed == 0 {
            return Err(CoreError::not_found(EntityType::Notification.as_str(), id).into());
        }

        let sql = format!("SELECT {SELECT_COLS} FROM notifications WHERE id = ?1");
        let mut rows = self.db().query_with(&sql, || [id]).await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_notification(&row)
    }
}
