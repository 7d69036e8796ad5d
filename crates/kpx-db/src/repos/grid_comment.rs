//! Grid comment repository: the append-only chat log of a grid.

use chrono::{DateTime, Utc};

use kpx_core::entities::{AuditEntry, GridComment, clean_message};
use kpx_core::enums::{AuditAction, EntityType};
use kpx_core::errors::CoreError;
use kpx_core::identity::Actor;
use kpx_core::ids::PREFIX_GRID_COMMENT;
use kpx_core::policy::{Operation, authorize};

use crate::error::DatabaseError;
use crate::helpers::{now_utc, parse_datetime, timestamp};
use crate::repos::audit::insert_audit;
use crate::service::{KpxService, finish};

const SELECT_COLS: &str = "id, grid_id, user_id, message, created_at";

fn row_to_comment(row: &libsql::Row) -> Result<GridComment, DatabaseError> {
    Ok(GridComment {
        id: row.get::<String>(0)?,
        grid_id: row.get::<String>(1)?,
        user_id: row.get::<String>(2)?,
        message: row.get::<String>(3)?,
        created_at: parse_datetime(&row.get::<String>(4)?)?,
    })
}

/// Append a comment on `conn`, provided its grid still exists.
pub(crate) async fn insert_comment(
    conn: &libsql::Connection,
    comment: &GridComment,
    audit: &AuditEntry,
) -> Result<(), DatabaseError> {
    let inserted = conn
        .execute(
            "INSERT INTO grid_comments (id, grid_id, user_id, message, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5
             WHERE EXISTS (SELECT 1 FROM grids WHERE id = ?2)",
            libsql::params![
                comment.id.as_str(),
                comment.grid_id.as_str(),
                comment.user_id.as_str(),
                comment.message.as_str(),
                timestamp(comment.created_at)
            ],
        )
        .await?;
    if inserted == 0 {
        return Err(CoreError::not_found(EntityType::Grid.as_str(), &comment.grid_id).into());
    }
    insert_audit(conn, audit).await
}

impl KpxService {
    /// Build a comment and its audit entry with fresh IDs.
    pub(crate) async fn new_comment(
        &self,
        grid_id: &str,
        user_id: &str,
        message: String,
        now: DateTime<Utc>,
    ) -> Result<(GridComment, AuditEntry), DatabaseError> {
        let comment = GridComment {
            id: self.db().generate_id(PREFIX_GRID_COMMENT).await?,
            grid_id: grid_id.to_string(),
            user_id: user_id.to_string(),
            message,
            created_at: now,
        };
        let audit = self
            .new_audit(
                Some(user_id),
                EntityType::GridComment,
                &comment.id,
                AuditAction::Commented,
                Some(serde_json::json!({ "grid_id": grid_id })),
                now,
            )
            .await?;
        Ok((comment, audit))
    }

    /// Append a comment to a grid. Allowed in every grid status.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the grid does not exist.
    /// - `CoreError::Forbidden` if the actor may not see the grid.
    /// - `CoreError::Validation` for an empty or oversized message.
    pub async fn add_grid_comment(
        &self,
        actor: &Actor,
        grid_id: &str,
        message: &str,
    ) -> Result<GridComment, DatabaseError> {
        let grid = self.get_grid(grid_id).await?;
        authorize(actor, &grid.company_id, Operation::Comment).map_err(CoreError::from)?;
        let message = clean_message(message)?;

        let (comment, audit) = self
            .new_comment(grid_id, &actor.user_id, message, now_utc())
            .await?;

        let _gate = self.write_gate().await;
        let tx = self.begin().await?;
        let outcome = insert_comment(&tx, &comment, &audit).await;
        finish(tx, outcome).await?;

        tracing::debug!(grid_id, comment_id = %comment.id, "comment added");
        Ok(comment)
    }

    /// List a grid's comments in the order they were written.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the grid does not exist.
    /// - `CoreError::Forbidden` if the actor may not see the grid.
    pub async fn list_grid_comments(
        &self,
        actor: &Actor,
        grid_id: &str,
    ) -> Result<Vec<GridComment>, DatabaseError> {
        self.get_grid_for(actor, grid_id).await?;
        self.comments_for_grid(grid_id).await
    }

    pub(crate) async fn comments_for_grid(
        &self,
        grid_id: &str,
    ) -> Result<Vec<GridComment>, DatabaseError> {
        let sql = format!(
            "SELECT {SELECT_COLS} FROM grid_comments WHERE grid_id = ?1
             ORDER BY created_at, rowid"
        );
        let mut rows = self.db().query_with(&sql, || [grid_id]).await?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next().await? {
            comments.push(row_to_comment(&row)?);
        }
        Ok(comments)
    }
}
