//! Event outbox repository.
//!
//! Side effects of a grid mutation are written here in the mutation's own
//! transaction and delivered later by [`crate::dispatch::OutboxDispatcher`].

use chrono::{DateTime, Utc};

use kpx_core::entities::OutboxEvent;
use kpx_core::enums::OutboxStatus;
use kpx_core::events::GridEvent;
use kpx_core::ids::PREFIX_OUTBOX;

use crate::error::DatabaseError;
use crate::helpers::{
    get_opt_string, get_u32, now_utc, parse_datetime, parse_enum, parse_optional_datetime,
    timestamp,
};
use crate::service::KpxService;

fn row_to_outbox_event(row: &libsql::Row) -> Result<OutboxEvent, DatabaseError> {
    let payload = row.get::<String>(2)?;
    Ok(OutboxEvent {
        id: row.get::<String>(0)?,
        grid_id: row.get::<String>(1)?,
        event: serde_json::from_str(&payload)
            .map_err(|e| DatabaseError::Query(format!("Invalid outbox payload: {e}")))?,
        status: parse_enum(&row.get::<String>(3)?)?,
        attempts: get_u32(row, 4)?,
        last_error: get_opt_string(row, 5)?,
        created_at: parse_datetime(&row.get::<String>(6)?)?,
        delivered_at: parse_optional_datetime(get_opt_string(row, 7)?.as_deref())?,
    })
}

const SELECT_COLS: &str =
    "id, grid_id, payload, status, attempts, last_error, created_at, delivered_at";

/// Queue events on `conn` (normally an open transaction).
pub(crate) async fn insert_outbox_events(
    conn: &libsql::Connection,
    events: &[OutboxEvent],
) -> Result<(), DatabaseError> {
    for event in events {
        let payload =
            serde_json::to_string(&event.event).map_err(|e| DatabaseError::Other(e.into()))?;
        conn.execute(
            "INSERT INTO outbox_events (id, grid_id, event_type, payload, status, attempts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            libsql::params![
                event.id.as_str(),
                event.grid_id.as_str(),
                event.event.event_type(),
                payload,
                event.status.as_str(),
                timestamp(event.created_at)
            ],
        )
        .await?;
    }
    Ok(())
}

impl KpxService {
    /// Wrap planned events as pending outbox rows with fresh IDs.
    pub(crate) async fn new_outbox_events(
        &self,
        grid_id: &str,
        events: &[GridEvent],
        now: DateTime<Utc>,
    ) -> Result<Vec<OutboxEvent>, DatabaseError> {
        let mut rows = Vec::with_capacity(events.len());
        for event in events {
            rows.push(OutboxEvent {
                id: self.db().generate_id(PREFIX_OUTBOX).await?,
                grid_id: grid_id.to_string(),
                event: event.clone(),
                status: OutboxStatus::Pending,
                attempts: 0,
                last_error: None,
                created_at: now,
                delivered_at: None,
            });
        }
        Ok(rows)
    }

    /// Pending events in the order they were queued.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or a payload is malformed.
    pub async fn pending_outbox_events(&self, limit: u32) -> Result<Vec<OutboxEvent>, DatabaseError> {
        let sql = format!(
            "SELECT {SELECT_COLS} FROM outbox_events WHERE status = 'pending'
             ORDER BY rowid LIMIT ?1"
        );
        self.collect_outbox(&sql, libsql::Value::Integer(i64::from(limit)))
            .await
    }

    /// Every event queued for a grid, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or a payload is malformed.
    pub async fn outbox_events_for_grid(
        &self,
        grid_id: &str,
    ) -> Result<Vec<OutboxEvent>, DatabaseError> {
        let sql = format!("SELECT {SELECT_COLS} FROM outbox_events WHERE grid_id = ?1 ORDER BY rowid");
        self.collect_outbox(&sql, libsql::Value::Text(grid_id.to_string()))
            .await
    }

    async fn collect_outbox(
        &self,
        sql: &str,
        arg: libsql::Value,
    ) -> Result<Vec<OutboxEvent>, DatabaseError> {
        let mut rows = self.db().query_with(sql, || [arg.clone()]).await?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(row_to_outbox_event(&row)?);
        }
        Ok(events)
    }

    /// Mark a pending event delivered.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the UPDATE fails.
    pub async fn mark_outbox_delivered(&self, id: &str) -> Result<(), DatabaseError> {
        let delivered_at = timestamp(now_utc());
        let _gate = self.write_gate().await;
        self.db()
            .execute_with(
                "UPDATE outbox_events
                 SET status = 'delivered', attempts = attempts + 1, delivered_at = ?1, last_error = NULL
                 WHERE id = ?2 AND status = 'pending'",
                || libsql::params![delivered_at.as_str(), id],
            )
            .await?;
        Ok(())
    }

    /// Record a failed delivery attempt.
    ///
    /// The event stays pending until `max_attempts` is reached, then becomes
    /// `failed`. Returns the status after the update.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the UPDATE fails.
    pub async fn record_outbox_failure(
        &self,
        id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<OutboxStatus, DatabaseError> {
        {
            let _gate = self.write_gate().await;
            self.db()
                .execute_with(
                    "UPDATE outbox_events
                     SET attempts = attempts + 1,
                         last_error = ?1,
                         status = CASE WHEN attempts + 1 >= ?2 THEN 'failed' ELSE 'pending' END
                     WHERE id = ?3 AND status = 'pending'",
                    || libsql::params![error, i64::from(max_attempts), id],
                )
                .await?;
        }

        let mut rows = self
            .db()
            .query_with("SELECT status FROM outbox_events WHERE id = ?1", || [id])
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        parse_enum(&row.get::<String>(0)?)
    }
}
