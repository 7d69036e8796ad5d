//! Reminder repository.

use kpx_core::entities::Reminder;
use kpx_core::enums::{EntityType, ReminderStatus};
use kpx_core::ids::PREFIX_REMINDER;

use crate::error::DatabaseError;
use crate::helpers::{
    get_opt_string, now_utc, parse_datetime, parse_enum, parse_optional_datetime, timestamp,
};
use crate::service::KpxService;

fn row_to_reminder(row: &libsql::Row) -> Result<Reminder, DatabaseError> {
    Ok(Reminder {
        id: row.get::<String>(0)?,
        user_id: row.get::<String>(1)?,
        entity_type: parse_enum(&row.get::<String>(2)?)?,
        entity_id: row.get::<String>(3)?,
        status: parse_enum(&row.get::<String>(4)?)?,
        created_at: parse_datetime(&row.get::<String>(5)?)?,
        resolved_at: parse_optional_datetime(get_opt_string(row, 6)?.as_deref())?,
    })
}

const SELECT_COLS: &str = "id, user_id, entity_type, entity_id, status, created_at, resolved_at";

impl KpxService {
    /// Open a reminder for a user on an entity.
    ///
    /// If the user already has an open reminder on the entity, that one is
    /// returned instead, so redelivered events do not duplicate reminders.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a query fails.
    pub async fn open_reminder(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Reminder, DatabaseError> {
        let id = self.db().generate_id(PREFIX_REMINDER).await?;
        let now = now_utc();

        let _gate = self.write_gate().await;
        let sql = format!(
            "SELECT {SELECT_COLS} FROM reminders
             WHERE user_id = ?1 AND entity_type = ?2 AND entity_id = ?3 AND status = 'open'"
        );
        let mut rows = self
            .db()
            .query_with(&sql, || [user_id, entity_type.as_str(), entity_id])
            .await?;
        if let Some(row) = rows.next().await? {
            return row_to_reminder(&row);
        }

        self.db()
            .execute_with(
                "INSERT INTO reminders (id, user_id, entity_type, entity_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'open', ?5)",
                || {
                    libsql::params![
                        id.as_str(),
                        user_id,
                        entity_type.as_str(),
                        entity_id,
                        timestamp(now)
                    ]
                },
            )
            .await?;
        Ok(Reminder {
            id,
            user_id: user_id.to_string(),
            entity_type,
            entity_id: entity_id.to_string(),
            status: ReminderStatus::Open,
            created_at: now,
            resolved_at: None,
        })
    }

    /// Resolve every open reminder on an entity. Returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the UPDATE fails.
    pub async fn resolve_reminders(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<u64, DatabaseError> {
        let resolved_at = timestamp(now_utc());
        let _gate = self.write_gate().await;
        self.db()
            .execute_with(
                "UPDATE reminders SET status = 'resolved', resolved_at = ?1
                 WHERE entity_type = ?2 AND entity_id = ?3 AND status = 'open'",
                || libsql::params![resolved_at.as_str(), entity_type.as_str(), entity_id],
            )
            .await
    }

    /// Reminders on an entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn reminders_for(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<Reminder>, DatabaseError> {
        let sql = format!(
            "SELECT {SELECT_COLS} FROM reminders WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY created_at, rowid"
        );
        let mut rows = self
            .db()
            .query_with(&sql, || [entity_type.as_str(), entity_id])
            .await?;
        let mut reminders = Vec::new();
        while let Some(row) = rows.next().await? {
            reminders.push(row_to_reminder(&row)?);
        }
        Ok(reminders)
    }
}
