//! Grid item repository.
//!
//! Items may only change while their grid is `draft` or `changes_requested`.
//! Every write re-checks the grid status in SQL, so an item edit racing a
//! `send` either lands before it or fails with a conflict.

use chrono::NaiveDate;
use serde::Deserialize;

use kpx_core::entities::{AuditEntry, Grid, GridItem};
use kpx_core::enums::{AuditAction, ContentType, EntityType, ItemStatus};
use kpx_core::errors::CoreError;
use kpx_core::identity::Actor;
use kpx_core::ids::PREFIX_GRID_ITEM;
use kpx_core::workflow::check_items_editable;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, now_utc, parse_date, parse_datetime, parse_enum, timestamp};
use crate::repos::audit::{detail_json, insert_audit};
use crate::service::{KpxService, finish};
use crate::updates::grid_item::GridItemUpdate;

/// Longest accepted topic, in characters.
pub const MAX_TOPIC_CHARS: usize = 200;

/// SQL predicate on `grids` matching `GridStatus::items_editable`.
const GRID_EDITABLE: &str = "status IN ('draft', 'changes_requested')";

/// Input for [`KpxService::add_grid_item`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewGridItem {
    pub date: NaiveDate,
    pub content_type: ContentType,
    pub topic: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to `planned`.
    #[serde(default)]
    pub status: Option<ItemStatus>,
}

fn row_to_grid_item(row: &libsql::Row) -> Result<GridItem, DatabaseError> {
    Ok(GridItem {
        id: row.get::<String>(0)?,
        grid_id: row.get::<String>(1)?,
        date: parse_date(&row.get::<String>(2)?)?,
        content_type: parse_enum(&row.get::<String>(3)?)?,
        topic: row.get::<String>(4)?,
        description: get_opt_string(row, 5)?,
        status: parse_enum(&row.get::<String>(6)?)?,
        created_at: parse_datetime(&row.get::<String>(7)?)?,
        updated_at: parse_datetime(&row.get::<String>(8)?)?,
    })
}

const SELECT_COLS: &str =
    "id, grid_id, date, content_type, topic, description, status, created_at, updated_at";

fn clean_topic(topic: &str) -> Result<String, CoreError> {
    let trimmed = topic.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("topic must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_TOPIC_CHARS {
        return Err(CoreError::Validation(format!(
            "topic must be at most {MAX_TOPIC_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn check_date_in_grid(grid: &Grid, date: NaiveDate) -> Result<(), CoreError> {
    if grid.contains_date(date) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "date {date} is outside {}",
            grid.period_label()
        )))
    }
}

fn clean_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
}

fn not_editable(grid_id: &str) -> DatabaseError {
    CoreError::Conflict(format!("grid {grid_id} is no longer editable")).into()
}

async fn insert_item(
    conn: &libsql::Connection,
    item: &GridItem,
    audit: &AuditEntry,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "INSERT INTO grid_items (id, grid_id, date, content_type, topic, description, status, created_at, updated_at)
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8
         WHERE EXISTS (SELECT 1 FROM grids WHERE id = ?2 AND {GRID_EDITABLE})"
    );
    let inserted = conn
        .execute(
            &sql,
            libsql::params![
                item.id.as_str(),
                item.grid_id.as_str(),
                item.date.to_string(),
                item.content_type.as_str(),
                item.topic.as_str(),
                item.description.as_deref(),
                item.status.as_str(),
                timestamp(item.created_at)
            ],
        )
        .await?;
    if inserted == 0 {
        return Err(not_editable(&item.grid_id));
    }
    insert_audit(conn, audit).await
}

async fn write_item(
    conn: &libsql::Connection,
    sql: &str,
    params: Vec<libsql::Value>,
    grid_id: &str,
    audit: &AuditEntry,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(sql, libsql::params_from_iter(params)).await?;
    if changed == 0 {
        return Err(not_editable(grid_id));
    }
    insert_audit(conn, audit).await
}

impl KpxService {
    /// Add a planned post to a grid.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the grid does not exist.
    /// - `CoreError::Forbidden` for clients or actors who cannot see the grid.
    /// - `CoreError::Validation` if the grid is not editable, the topic is
    ///   blank, or the date falls outside the grid's month.
    /// - `CoreError::Conflict` if the grid was sent meanwhile.
    pub async fn add_grid_item(
        &self,
        actor: &Actor,
        grid_id: &str,
        new: &NewGridItem,
    ) -> Result<GridItem, DatabaseError> {
        let grid = self.get_grid_for(actor, grid_id).await?;
        check_items_editable(&grid, actor)?;
        let topic = clean_topic(&new.topic)?;
        check_date_in_grid(&grid, new.date)?;

        let now = now_utc();
        let item = GridItem {
            id: self.db().generate_id(PREFIX_GRID_ITEM).await?,
            grid_id: grid.id.clone(),
            date: new.date,
            content_type: new.content_type,
            topic,
            description: clean_description(new.description.as_deref()),
            status: new.status.unwrap_or(ItemStatus::Planned),
            created_at: now,
            updated_at: now,
        };
        let audit = self
            .new_audit(
                Some(&actor.user_id),
                EntityType::GridItem,
                &item.id,
                AuditAction::Created,
                Some(serde_json::json!({ "grid_id": grid.id })),
                now,
            )
            .await?;

        {
            let _gate = self.write_gate().await;
            let tx = self.begin().await?;
            let outcome = insert_item(&tx, &item, &audit).await;
            finish(tx, outcome).await?;
        }

        tracing::debug!(grid_id, item_id = %item.id, "grid item added");
        Ok(item)
    }

    /// Get an item of a grid.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if no such item belongs to the grid.
    pub async fn get_grid_item(
        &self,
        grid_id: &str,
        item_id: &str,
    ) -> Result<GridItem, DatabaseError> {
        let sql = format!("SELECT {SELECT_COLS} FROM grid_items WHERE id = ?1 AND grid_id = ?2");
        let mut rows = self.db().query_with(&sql, || [item_id, grid_id]).await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| CoreError::not_found(EntityType::GridItem.as_str(), item_id))?;
        row_to_grid_item(&row)
    }

    /// Update an item with dynamic SET clauses.
    ///
    /// # Errors
    ///
    /// Same as [`Self::add_grid_item`], plus `CoreError::NotFound` for an
    /// unknown item.
    pub async fn update_grid_item(
        &self,
        actor: &Actor,
        grid_id: &str,
        item_id: &str,
        update: &GridItemUpdate,
    ) -> Result<GridItem, DatabaseError> {
        let grid = self.get_grid_for(actor, grid_id).await?;
        check_items_editable(&grid, actor)?;
        self.get_grid_item(grid_id, item_id).await?;

        let now = now_utc();
        let mut sets = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();
        let mut idx = 1;

        if let Some(date) = update.date {
            check_date_in_grid(&grid, date)?;
            params.push(libsql::Value::Text(date.to_string()));
            sets.push(format!("date = ?{idx}"));
            idx += 1;
        }
        if let Some(content_type) = update.content_type {
            params.push(libsql::Value::Text(content_type.as_str().to_string()));
            sets.push(format!("content_type = ?{idx}"));
            idx += 1;
        }
        if let Some(ref topic) = update.topic {
            params.push(libsql::Value::Text(clean_topic(topic)?));
            sets.push(format!("topic = ?{idx}"));
            idx += 1;
        }
        if let Some(ref description) = update.description {
            match clean_description(description.as_deref()) {
                Some(d) => params.push(libsql::Value::Text(d)),
                None => params.push(libsql::Value::Null),
            }
            sets.push(format!("description = ?{idx}"));
            idx += 1;
        }
        if let Some(status) = update.status {
            params.push(libsql::Value::Text(status.as_str().to_string()));
            sets.push(format!("status = ?{idx}"));
            idx += 1;
        }

        params.push(libsql::Value::Text(timestamp(now)));
        sets.push(format!("updated_at = ?{idx}"));
        idx += 1;

        params.push(libsql::Value::Text(item_id.to_string()));
        let id_idx = idx;
        params.push(libsql::Value::Text(grid_id.to_string()));
        let grid_idx = idx + 1;
        let sql = format!(
            "UPDATE grid_items SET {} WHERE id = ?{id_idx} AND grid_id = ?{grid_idx}
             AND EXISTS (SELECT 1 FROM grids WHERE id = ?{grid_idx} AND {GRID_EDITABLE})",
            sets.join(", ")
        );

        let audit = self
            .new_audit(
                Some(&actor.user_id),
                EntityType::GridItem,
                item_id,
                AuditAction::Updated,
                Some(detail_json(update)?),
                now,
            )
            .await?;

        {
            let _gate = self.write_gate().await;
            let tx = self.begin().await?;
            let outcome = write_item(&tx, &sql, params, grid_id, &audit).await;
            finish(tx, outcome).await?;
        }

        self.get_grid_item(grid_id, item_id).await
    }

    /// Remove an item from a grid.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update_grid_item`].
    pub async fn delete_grid_item(
        &self,
        actor: &Actor,
        grid_id: &str,
        item_id: &str,
    ) -> Result<(), DatabaseError> {
        let grid = self.get_grid_for(actor, grid_id).await?;
        check_items_editable(&grid, actor)?;
        self.get_grid_item(grid_id, item_id).await?;

        let audit = self
            .new_audit(
                Some(&actor.user_id),
                EntityType::GridItem,
                item_id,
                AuditAction::Deleted,
                Some(serde_json::json!({ "grid_id": grid_id })),
                now_utc(),
            )
            .await?;
        let sql = format!(
            "DELETE FROM grid_items WHERE id = ?1 AND grid_id = ?2
             AND EXISTS (SELECT 1 FROM grids WHERE id = ?2 AND {GRID_EDITABLE})"
        );
        let params = vec![
            libsql::Value::Text(item_id.to_string()),
            libsql::Value::Text(grid_id.to_string()),
        ];

        {
            let _gate = self.write_gate().await;
            let tx = self.begin().await?;
            let outcome = write_item(&tx, &sql, params, grid_id, &audit).await;
            finish(tx, outcome).await?;
        }

        tracing::debug!(grid_id, item_id, "grid item deleted");
        Ok(())
    }

    /// List a grid's items by date.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the grid does not exist.
    /// - `CoreError::Forbidden` if the actor may not see the grid.
    pub async fn list_grid_items(
        &self,
        actor: &Actor,
        grid_id: &str,
    ) -> Result<Vec<GridItem>, DatabaseError> {
        self.get_grid_for(actor, grid_id).await?;
        self.items_for_grid(grid_id).await
    }

    pub(crate) async fn items_for_grid(&self, grid_id: &str) -> Result<Vec<GridItem>, DatabaseError> {
        let sql = format!(
            "SELECT {SELECT_COLS} FROM grid_items WHERE grid_id = ?1
             ORDER BY date, created_at, rowid"
        );
        let mut rows = self.db().query_with(&sql, || [grid_id]).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(row_to_grid_item(&row)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::helpers::seeded_service;
    use crate::updates::grid_item::GridItemUpdateBuilder;
    use kpx_core::enums::GridStatus;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn march(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn new_item(day: u32, topic: &str) -> NewGridItem {
        NewGridItem {
            date: march(day),
            content_type: ContentType::Post,
            topic: topic.into(),
            description: None,
            status: None,
        }
    }

    #[test]
    fn editable_predicate_matches_status_enum() {
        for status in [
            GridStatus::Draft,
            GridStatus::Sent,
            GridStatus::Approved,
            GridStatus::ChangesRequested,
        ] {
            let quoted = format!("'{}'", status.as_str());
            assert_eq!(
                GRID_EDITABLE.contains(&quoted),
                status.items_editable(),
                "{status}"
            );
        }
    }

    #[tokio::test]
    async fn add_item_defaults_to_planned() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let item = svc
            .add_grid_item(&s.designer, &grid.id, &new_item(12, "  Launch teaser "))
            .await
            .unwrap();
        assert_eq!(item.status, ItemStatus::Planned);
        assert_eq!(item.topic, "Launch teaser");
        assert_eq!(svc.get_grid_item(&grid.id, &item.id).await.unwrap(), item);
    }

    #[tokio::test]
    async fn date_must_fall_in_grid_month() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let mut item = new_item(1, "April fools");
        item.date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let err = svc
            .add_grid_item(&s.admin, &grid.id, &item)
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn blank_topic_is_rejected() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let err = svc
            .add_grid_item(&s.admin, &grid.id, &new_item(2, "  "))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
    }

    #[rstest]
    #[case(GridStatus::Sent)]
    #[case(GridStatus::Approved)]
    #[tokio::test]
    async fn locked_grids_reject_new_items(#[case] status: GridStatus) {
        let (svc, s) = seeded_service().await;
        let grid = s.grid_in(&svc, status).await;
        let err = svc
            .add_grid_item(&s.admin, &grid.id, &new_item(5, "Too late"))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
        assert!(svc.items_for_grid(&grid.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn changes_requested_grid_is_editable() {
        let (svc, s) = seeded_service().await;
        let grid = s.grid_in(&svc, GridStatus::ChangesRequested).await;
        assert!(
            svc.add_grid_item(&s.designer, &grid.id, &new_item(5, "Reworked"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn clients_cannot_edit_items() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let err = svc
            .add_grid_item(&s.client, &grid.id, &new_item(5, "Mine"))
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let item = svc
            .add_grid_item(
                &s.designer,
                &grid.id,
                &NewGridItem {
                    description: Some("first cut".into()),
                    ..new_item(12, "Teaser")
                },
            )
            .await
            .unwrap();

        let update = GridItemUpdateBuilder::new()
            .content_type(ContentType::Reel)
            .status(ItemStatus::InProgress)
            .description(None)
            .build();
        let updated = svc
            .update_grid_item(&s.designer, &grid.id, &item.id, &update)
            .await
            .unwrap();

        assert_eq!(updated.content_type, ContentType::Reel);
        assert_eq!(updated.status, ItemStatus::InProgress);
        assert_eq!(updated.description, None);
        assert_eq!(updated.topic, "Teaser");
        assert_eq!(updated.date, item.date);
    }

    #[tokio::test]
    async fn update_unknown_item_is_not_found() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let err = svc
            .update_grid_item(
                &s.admin,
                &grid.id,
                "itm-ffffffff",
                &GridItemUpdateBuilder::new().topic("x").build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn items_freeze_once_sent() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let item = s.add_item(&svc, &grid, 12, "Teaser").await;
        svc.transition_grid(&s.admin, &grid.id, "send", None)
            .await
            .unwrap();

        let err = svc
            .update_grid_item(
                &s.admin,
                &grid.id,
                &item.id,
                &GridItemUpdateBuilder::new().topic("Changed").build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));

        let err = svc
            .delete_grid_item(&s.admin, &grid.id, &item.id)
            .await
            .unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn stale_grid_snapshot_cannot_sneak_an_item_in() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        svc.transition_grid(&s.admin, &grid.id, "send", None)
            .await
            .unwrap();

        // Build the row as if the status check had passed before the send.
        let now = now_utc();
        let item = GridItem {
            id: svc.db().generate_id(PREFIX_GRID_ITEM).await.unwrap(),
            grid_id: grid.id.clone(),
            date: march(4),
            content_type: ContentType::Story,
            topic: "Late".into(),
            description: None,
            status: ItemStatus::Planned,
            created_at: now,
            updated_at: now,
        };
        let audit = svc
            .new_audit(None, EntityType::GridItem, &item.id, AuditAction::Created, None, now)
            .await
            .unwrap();
        let err = insert_item(svc.db().conn(), &item, &audit).await.unwrap_err();
        assert!(matches!(err.as_core(), Some(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn delete_item() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let item = s.add_item(&svc, &grid, 12, "Teaser").await;
        svc.delete_grid_item(&s.designer, &grid.id, &item.id)
            .await
            .unwrap();
        assert!(svc.list_grid_items(&s.client, &grid.id).await.unwrap().is_empty());
    }
}
