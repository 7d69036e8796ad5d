//! Grid repository: CRUD and status transitions.
//!
//! Transitions are planned by [`kpx_core::workflow::plan_transition`] and
//! written here in one transaction: the conditional status update, the
//! optional comment, the outbox events, and the audit entry.

use std::str::FromStr;

use kpx_core::audit_detail::{GridDeletedDetail, StatusChangedDetail};
use kpx_core::entities::{AuditEntry, Grid, GridComment, GridDetail, OutboxEvent, validate_period};
use kpx_core::enums::{AuditAction, EntityType, GridAction, GridStatus, Role};
use kpx_core::errors::CoreError;
use kpx_core::identity::Actor;
use kpx_core::ids::PREFIX_GRID;
use kpx_core::policy::{Denied, Operation, authorize};
use kpx_core::workflow::{TransitionContext, TransitionPlan, check_deletable, plan_transition};

use crate::error::DatabaseError;
use crate::helpers::{
    get_i32, get_opt_string, get_u32, now_utc, parse_datetime, parse_enum,
    parse_optional_datetime, timestamp,
};
use crate::repos::audit::{detail_json, insert_audit};
use crate::repos::grid_comment::insert_comment;
use crate::repos::outbox::insert_outbox_events;
use crate::service::{KpxService, finish};

/// Page size when a listing does not ask for one.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Filter criteria for grid listings.
#[derive(Debug, Clone, Default)]
pub struct GridFilter {
    pub company_id: Option<String>,
    pub status: Option<GridStatus>,
    pub year: Option<i32>,
    pub limit: Option<u32>,
}

fn row_to_grid(row: &libsql::Row) -> Result<Grid, DatabaseError> {
    Ok(Grid {
        id: row.get::<String>(0)?,
        company_id: row.get::<String>(1)?,
        month: get_u32(row, 2)?,
        year: get_i32(row, 3)?,
        status: parse_enum(&row.get::<String>(4)?)?,
        sent_at: parse_optional_datetime(get_opt_string(row, 5)?.as_deref())?,
        approved_at: parse_optional_datetime(get_opt_string(row, 6)?.as_deref())?,
        created_by: get_opt_string(row, 7)?,
        created_at: parse_datetime(&row.get::<String>(8)?)?,
        updated_at: parse_datetime(&row.get::<String>(9)?)?,
    })
}

const SELECT_COLS: &str = "id, company_id, month, year, status, sent_at, approved_at, created_by, created_at, updated_at";

async fn insert_grid(
    conn: &libsql::Connection,
    grid: &Grid,
    audit: &AuditEntry,
) -> Result<(), DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM grids WHERE company_id = ?1 AND month = ?2 AND year = ?3",
            libsql::params![
                grid.company_id.as_str(),
                i64::from(grid.month),
                i64::from(grid.year)
            ],
        )
        .await?;
    if rows.next().await?.is_some() {
        return Err(CoreError::Conflict(format!(
            "company {} already has a grid for {}",
            grid.company_id,
            grid.period_label()
        ))
        .into());
    }

    conn.execute(
        "INSERT INTO grids (id, company_id, month, year, status, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        libsql::params![
            grid.id.as_str(),
            grid.company_id.as_str(),
            i64::from(grid.month),
            i64::from(grid.year),
            grid.status.as_str(),
            grid.created_by.as_deref(),
            timestamp(grid.created_at)
        ],
    )
    .await?;
    insert_audit(conn, audit).await
}

/// Everything a transition writes, prepared before the transaction opens.
struct TransitionWrite<'a> {
    grid_id: &'a str,
    plan: &'a TransitionPlan,
    comment: Option<(GridComment, AuditEntry)>,
    outbox: Vec<OutboxEvent>,
    audit: AuditEntry,
}

async fn write_transition(
    conn: &libsql::Connection,
    write: &TransitionWrite<'_>,
) -> Result<(), DatabaseError> {
    let plan = write.plan;
    let changed = conn
        .execute(
            "UPDATE grids
             SET status = ?1,
                 sent_at = COALESCE(?2, sent_at),
                 approved_at = COALESCE(?3, approved_at),
                 updated_at = ?4
             WHERE id = ?5 AND status = ?6",
            libsql::params![
                plan.to.as_str(),
                plan.sent_at.map(timestamp),
                plan.approved_at.map(timestamp),
                timestamp(plan.planned_at),
                write.grid_id,
                plan.from.as_str()
            ],
        )
        .await?;
    if changed == 0 {
        return Err(CoreError::Conflict(format!(
            "grid {} is no longer {}",
            write.grid_id, plan.from
        ))
        .into());
    }

    if let Some((comment, audit)) = &write.comment {
        insert_comment(conn, comment, audit).await?;
    }
    insert_outbox_events(conn, &write.outbox).await?;
    insert_audit(conn, &write.audit).await
}

async fn remove_grid(
    conn: &libsql::Connection,
    grid_id: &str,
    audit: &AuditEntry,
) -> Result<(), DatabaseError> {
    let deleted = conn
        .execute(
            "DELETE FROM grids WHERE id = ?1 AND status = ?2",
            libsql::params![grid_id, GridStatus::Draft.as_str()],
        )
        .await?;
    if deleted == 0 {
        return Err(CoreError::Conflict(format!("grid {grid_id} is no longer a draft")).into());
    }
    insert_audit(conn, audit).await
}

impl KpxService {
    /// Create a draft grid for a company's month.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the company does not exist.
    /// - `CoreError::Forbidden` for clients and inactive users.
    /// - `CoreError::Validation` for an out-of-range month or year.
    /// - `CoreError::Conflict` if the company already has a grid for the period.
    pub async fn create_grid(
        &self,
        actor: &Actor,
        company_id: &str,
        month: u32,
        year: i32,
    ) -> Result<Grid, DatabaseError> {
        let company = self.get_company(company_id).await?;
        authorize(actor, &company.id, Operation::CreateGrid).map_err(CoreError::from)?;
        validate_period(month, year)?;

        let now = now_utc();
        let grid = Grid {
            id: self.db().generate_id(PREFIX_GRID).await?,
            company_id: company.id,
            month,
            year,
            status: GridStatus::Draft,
            sent_at: None,
            approved_at: None,
            created_by: Some(actor.user_id.clone()),
            created_at: now,
            updated_at: now,
        };
        let audit = self
            .new_audit(
                Some(&actor.user_id),
                EntityType::Grid,
                &grid.id,
                AuditAction::Created,
                Some(serde_json::json!({ "month": month, "year": year })),
                now,
            )
            .await?;

        {
            let _gate = self.write_gate().await;
            let tx = self.begin().await?;
            let outcome = insert_grid(&tx, &grid, &audit).await;
            finish(tx, outcome).await?;
        }

        tracing::info!(grid_id = %grid.id, company_id = %grid.company_id, month, year, "grid created");
        Ok(grid)
    }

    /// Get a grid by ID without any access check.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the grid does not exist.
    pub async fn get_grid(&self, id: &str) -> Result<Grid, DatabaseError> {
        let sql = format!("SELECT {SELECT_COLS} FROM grids WHERE id = ?1");
        let mut rows = self.db().query_with(&sql, || [id]).await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| CoreError::not_found(EntityType::Grid.as_str(), id))?;
        row_to_grid(&row)
    }

    /// Get a grid the actor is allowed to see.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the grid does not exist.
    /// - `CoreError::Forbidden` if the actor may not view it.
    pub async fn get_grid_for(&self, actor: &Actor, id: &str) -> Result<Grid, DatabaseError> {
        let grid = self.get_grid(id).await?;
        if let Err(denied) = authorize(actor, &grid.company_id, Operation::View) {
            tracing::warn!(grid_id = id, user_id = %actor.user_id, "grid view denied: {denied}");
            return Err(CoreError::from(denied).into());
        }
        Ok(grid)
    }

    /// A grid with its items (by date) and comments (by creation).
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_grid_for`].
    pub async fn get_grid_detail(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<GridDetail, DatabaseError> {
        let grid = self.get_grid_for(actor, id).await?;
        let items = self.items_for_grid(id).await?;
        let comments = self.comments_for_grid(id).await?;
        Ok(GridDetail {
            grid,
            items,
            comments,
        })
    }

    /// List grids visible to the actor, most recent period first.
    ///
    /// Clients only ever see their own company's grids.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Forbidden` if the actor is inactive or a client
    /// asks for another company.
    pub async fn list_grids(
        &self,
        actor: &Actor,
        filter: &GridFilter,
    ) -> Result<Vec<Grid>, DatabaseError> {
        if !actor.is_active {
            return Err(CoreError::from(Denied::Inactive).into());
        }
        let company_scope = match (actor.role, filter.company_id.as_deref()) {
            (_, Some(company_id)) => {
                authorize(actor, company_id, Operation::View).map_err(CoreError::from)?;
                Some(company_id.to_string())
            }
            (Role::Client, None) => Some(
                actor
                    .company_id
                    .clone()
                    .ok_or(CoreError::Forbidden(Denied::OtherCompany))?,
            ),
            (_, None) => None,
        };

        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(company_id) = company_scope {
            params.push(libsql::Value::Text(company_id));
            conditions.push(format!("company_id = ?{}", params.len()));
        }
        if let Some(status) = filter.status {
            params.push(libsql::Value::Text(status.as_str().to_string()));
            conditions.push(format!("status = ?{}", params.len()));
        }
        if let Some(year) = filter.year {
            params.push(libsql::Value::Integer(i64::from(year)));
            conditions.push(format!("year = ?{}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let sql = format!(
            "SELECT {SELECT_COLS} FROM grids {where_clause}
             ORDER BY year DESC, month DESC, rowid DESC LIMIT {limit}"
        );
        tracing::debug!(%sql, "listing grids");

        let mut rows = self
            .db()
            .query_with(&sql, || libsql::params_from_iter(params.clone()))
            .await?;
        let mut grids = Vec::new();
        while let Some(row) = rows.next().await? {
            grids.push(row_to_grid(&row)?);
        }
        Ok(grids)
    }

    /// Resolve the company name and notification recipients for a grid.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a lookup fails.
    pub async fn transition_context(&self, grid: &Grid) -> Result<TransitionContext, DatabaseError> {
        let company = self.get_company(&grid.company_id).await?;
        Ok(TransitionContext {
            company_name: company.name,
            client_user_ids: self.active_client_ids(&grid.company_id).await?,
            admin_user_ids: self.active_admin_ids().await?,
        })
    }

    /// Apply a named action (`send`, `approve`, `request_changes`) to a grid.
    ///
    /// Checks run in order: grid exists, actor may view it, action is known,
    /// actor's role may take it, grid status allows it. The status write is
    /// conditional on the status read here.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the grid does not exist.
    /// - `CoreError::Forbidden` on ownership or role failure.
    /// - `CoreError::InvalidAction` for an unknown action.
    /// - `CoreError::InvalidTransition` if the current status forbids the action.
    /// - `CoreError::Conflict` if another request changed the status first.
    pub async fn transition_grid(
        &self,
        actor: &Actor,
        grid_id: &str,
        action: &str,
        comment: Option<&str>,
    ) -> Result<Grid, DatabaseError> {
        let grid = self.get_grid_for(actor, grid_id).await?;
        let action = GridAction::from_str(action)?;
        let ctx = self.transition_context(&grid).await?;

        let plan = match plan_transition(&grid, actor, action, comment, &ctx, now_utc()) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(grid_id, %action, user_id = %actor.user_id, "transition rejected: {e}");
                return Err(e.into());
            }
        };
        self.apply_transition(actor, &grid, &plan).await
    }

    /// Persist a transition planned against `grid`.
    ///
    /// Writes nothing unless the stored status still equals `plan.from`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Conflict` if the grid's status changed since
    /// `grid` was read.
    pub async fn apply_transition(
        &self,
        actor: &Actor,
        grid: &Grid,
        plan: &TransitionPlan,
    ) -> Result<Grid, DatabaseError> {
        let now = plan.planned_at;
        let comment = match &plan.comment {
            Some(text) => Some(
                self.new_comment(&grid.id, &actor.user_id, text.clone(), now)
                    .await?,
            ),
            None => None,
        };
        let outbox = self.new_outbox_events(&grid.id, &plan.events, now).await?;
        let detail = detail_json(&StatusChangedDetail {
            action: plan.action.to_string(),
            from: plan.from.to_string(),
            to: plan.to.to_string(),
            comment: plan.comment.clone(),
        })?;
        let audit = self
            .new_audit(
                Some(&actor.user_id),
                EntityType::Grid,
                &grid.id,
                AuditAction::StatusChanged,
                Some(detail),
                now,
            )
            .await?;

        let write = TransitionWrite {
            grid_id: &grid.id,
            plan,
            comment,
            outbox,
            audit,
        };
        let outcome = {
            let _gate = self.write_gate().await;
            let tx = self.begin().await?;
            let outcome = write_transition(&tx, &write).await;
            finish(tx, outcome).await
        };
        if let Err(e) = outcome {
            tracing::warn!(grid_id = %grid.id, from = %plan.from, to = %plan.to, "transition not applied: {e}");
            return Err(e);
        }

        tracing::info!(
            grid_id = %grid.id,
            action = %plan.action,
            from = %plan.from,
            to = %plan.to,
            user_id = %actor.user_id,
            events = plan.events.len(),
            "grid transitioned"
        );
        self.get_grid(&grid.id).await
    }

    /// Delete a draft grid together with its items and comments.
    ///
    /// # Errors
    ///
    /// - `CoreError::NotFound` if the grid does not exist.
    /// - `CoreError::Forbidden` unless the actor is an admin.
    /// - `CoreError::InvalidTransition` unless the grid is a draft.
    /// - `CoreError::Conflict` if the grid left `draft` meanwhile.
    pub async fn delete_grid(&self, actor: &Actor, id: &str) -> Result<(), DatabaseError> {
        let grid = self.get_grid_for(actor, id).await?;
        check_deletable(&grid, actor)?;

        let now = now_utc();
        let detail = detail_json(&GridDeletedDetail {
            company_id: grid.company_id.clone(),
            month: grid.month,
            year: grid.year,
        })?;
        let audit = self
            .new_audit(
                Some(&actor.user_id),
                EntityType::Grid,
                id,
                AuditAction::Deleted,
                Some(detail),
                now,
            )
            .await?;

        {
            let _gate = self.write_gate().await;
            let tx = self.begin().await?;
            let outcome = remove_grid(&tx, id, &audit).await;
            finish(tx, outcome).await?;
        }

        tracing::info!(grid_id = id, user_id = %actor.user_id, "grid deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::AuditFilter;
    use crate::test_support::helpers::seeded_service;
    use kpx_core::events::GridEvent;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn core(err: &DatabaseError) -> &CoreError {
        err.as_core().expect("expected a domain error")
    }

    #[tokio::test]
    async fn create_grid_starts_as_draft() {
        let (svc, s) = seeded_service().await;
        let grid = svc
            .create_grid(&s.designer, &s.company_id, 3, 2026)
            .await
            .unwrap();
        assert_eq!(grid.status, GridStatus::Draft);
        assert_eq!(grid.created_by.as_deref(), Some(s.designer.user_id.as_str()));
        assert_eq!(svc.get_grid(&grid.id).await.unwrap(), grid);
    }

    #[tokio::test]
    async fn duplicate_period_conflicts() {
        let (svc, s) = seeded_service().await;
        svc.create_grid(&s.admin, &s.company_id, 3, 2026).await.unwrap();
        let err = svc
            .create_grid(&s.designer, &s.company_id, 3, 2026)
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::Conflict(_)));

        // Same month for another company is fine.
        svc.create_grid(&s.admin, &s.other_company_id, 3, 2026)
            .await
            .unwrap();
    }

    #[rstest]
    #[case(0, 2026)]
    #[case(13, 2026)]
    #[case(6, 1999)]
    #[tokio::test]
    async fn bad_period_is_rejected(#[case] month: u32, #[case] year: i32) {
        let (svc, s) = seeded_service().await;
        let err = svc
            .create_grid(&s.admin, &s.company_id, month, year)
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn clients_cannot_create_grids() {
        let (svc, s) = seeded_service().await;
        let err = svc
            .create_grid(&s.client, &s.company_id, 3, 2026)
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn unknown_company_is_not_found() {
        let (svc, s) = seeded_service().await;
        let err = svc
            .create_grid(&s.admin, "cmp-ffffffff", 3, 2026)
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn client_of_other_company_cannot_view() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let err = svc.get_grid_for(&s.outsider, &grid.id).await.unwrap_err();
        assert!(matches!(
            core(&err),
            CoreError::Forbidden(Denied::OtherCompany)
        ));
        assert!(svc.get_grid_for(&s.client, &grid.id).await.is_ok());
    }

    #[tokio::test]
    async fn list_scopes_clients_to_their_company() {
        let (svc, s) = seeded_service().await;
        svc.create_grid(&s.admin, &s.company_id, 1, 2026).await.unwrap();
        svc.create_grid(&s.admin, &s.company_id, 2, 2026).await.unwrap();
        svc.create_grid(&s.admin, &s.other_company_id, 1, 2026)
            .await
            .unwrap();

        let staff = svc.list_grids(&s.admin, &GridFilter::default()).await.unwrap();
        assert_eq!(staff.len(), 3);

        let mine = svc.list_grids(&s.client, &GridFilter::default()).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|g| g.company_id == s.company_id));
        assert_eq!(mine[0].month, 2, "newest period first");

        let err = svc
            .list_grids(
                &s.client,
                &GridFilter {
                    company_id: Some(s.other_company_id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_year() {
        let (svc, s) = seeded_service().await;
        let sent = s.grid_in(&svc, GridStatus::Sent).await;
        svc.create_grid(&s.admin, &s.company_id, 4, 2026).await.unwrap();
        svc.create_grid(&s.admin, &s.company_id, 4, 2025).await.unwrap();

        let only_sent = svc
            .list_grids(
                &s.admin,
                &GridFilter {
                    status: Some(GridStatus::Sent),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(only_sent.iter().map(|g| &g.id).collect::<Vec<_>>(), vec![&sent.id]);

        let last_year = svc
            .list_grids(
                &s.admin,
                &GridFilter {
                    year: Some(2025),
                    limit: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(last_year.len(), 1);
    }

    #[tokio::test]
    async fn send_stamps_sent_at_and_queues_events() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;

        let sent = svc
            .transition_grid(&s.admin, &grid.id, "send", None)
            .await
            .unwrap();
        assert_eq!(sent.status, GridStatus::Sent);
        assert!(sent.sent_at.is_some());
        assert!(sent.updated_at >= grid.updated_at);

        let events = svc.outbox_events_for_grid(&grid.id).await.unwrap();
        assert_eq!(events.len(), 2, "one notify and one reminder for the client");
        assert!(matches!(
            &events[0].event,
            GridEvent::Notify { user_id, .. } if *user_id == s.client.user_id
        ));
        assert!(matches!(&events[1].event, GridEvent::CreateReminder { .. }));
    }

    #[tokio::test]
    async fn unknown_action_is_invalid() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let err = svc
            .transition_grid(&s.admin, &grid.id, "publish", None)
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::InvalidAction(_)));
    }

    #[tokio::test]
    async fn ownership_is_checked_before_action_name() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let err = svc
            .transition_grid(&s.outsider, &grid.id, "publish", None)
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn rejected_transition_writes_nothing() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        let err = svc
            .transition_grid(&s.admin, &grid.id, "approve", None)
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::InvalidTransition { .. }));

        assert_eq!(svc.get_grid(&grid.id).await.unwrap(), grid);
        assert!(svc.outbox_events_for_grid(&grid.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_plan_conflicts_and_writes_nothing() {
        let (svc, s) = seeded_service().await;
        let grid = s.grid_in(&svc, GridStatus::Sent).await;

        let ctx = svc.transition_context(&grid).await.unwrap();
        let stale = plan_transition(
            &grid,
            &s.client,
            GridAction::RequestChanges,
            Some("late feedback"),
            &ctx,
            now_utc(),
        )
        .unwrap();

        svc.transition_grid(&s.client, &grid.id, "approve", None)
            .await
            .unwrap();
        let events_before = svc.outbox_events_for_grid(&grid.id).await.unwrap().len();

        let err = svc.apply_transition(&s.client, &grid, &stale).await.unwrap_err();
        assert!(matches!(core(&err), CoreError::Conflict(_)));

        let current = svc.get_grid(&grid.id).await.unwrap();
        assert_eq!(current.status, GridStatus::Approved);
        assert_eq!(
            svc.outbox_events_for_grid(&grid.id).await.unwrap().len(),
            events_before
        );
        assert!(svc.comments_for_grid(&grid.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn request_changes_appends_comment() {
        let (svc, s) = seeded_service().await;
        let grid = s.grid_in(&svc, GridStatus::Sent).await;
        let updated = svc
            .transition_grid(&s.client, &grid.id, "request_changes", Some(" New photos "))
            .await
            .unwrap();
        assert_eq!(updated.status, GridStatus::ChangesRequested);
        assert_eq!(updated.approved_at, None);

        let comments = svc.comments_for_grid(&grid.id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].message, "New photos");
        assert_eq!(comments[0].user_id, s.client.user_id);
    }

    #[tokio::test]
    async fn oversized_change_request_comment_writes_nothing() {
        let (svc, s) = seeded_service().await;
        let grid = s.grid_in(&svc, GridStatus::Sent).await;
        let events_before = svc.outbox_events_for_grid(&grid.id).await.unwrap().len();
        let long = "x".repeat(kpx_core::entities::MAX_MESSAGE_CHARS + 1);

        let err = svc
            .transition_grid(&s.client, &grid.id, "request_changes", Some(&long))
            .await
            .unwrap_err();
        assert!(matches!(core(&err), CoreError::Validation(_)));

        assert_eq!(svc.get_grid(&grid.id).await.unwrap(), grid);
        assert!(svc.comments_for_grid(&grid.id).await.unwrap().is_empty());
        assert_eq!(
            svc.outbox_events_for_grid(&grid.id).await.unwrap().len(),
            events_before
        );
    }

    #[tokio::test]
    async fn transition_is_audited() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        svc.transition_grid(&s.designer, &grid.id, "send", None)
            .await
            .unwrap();

        let entries = svc
            .query_audit(&AuditFilter {
                entity_id: Some(grid.id.clone()),
                action: Some(AuditAction::StatusChanged),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        let detail: StatusChangedDetail =
            serde_json::from_value(entries[0].detail.clone().unwrap()).unwrap();
        assert_eq!(detail.from, "draft");
        assert_eq!(detail.to, "sent");
        assert_eq!(entries[0].actor_id.as_deref(), Some(s.designer.user_id.as_str()));
    }

    #[tokio::test]
    async fn delete_draft_removes_grid_and_children() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        s.add_item(&svc, &grid, 5, "Menu launch").await;
        s.add_item(&svc, &grid, 19, "Behind the scenes").await;
        svc.add_grid_comment(&s.client, &grid.id, "Can we add a story?")
            .await
            .unwrap();

        svc.delete_grid(&s.admin, &grid.id).await.unwrap();

        let err = svc.get_grid(&grid.id).await.unwrap_err();
        assert!(matches!(core(&err), CoreError::NotFound { .. }));
        assert!(svc.items_for_grid(&grid.id).await.unwrap().is_empty());
        assert!(svc.comments_for_grid(&grid.id).await.unwrap().is_empty());
    }

    #[rstest]
    #[case(GridStatus::Sent)]
    #[case(GridStatus::Approved)]
    #[case(GridStatus::ChangesRequested)]
    #[tokio::test]
    async fn delete_non_draft_is_invalid(#[case] status: GridStatus) {
        let (svc, s) = seeded_service().await;
        let grid = s.grid_in(&svc, status).await;
        let err = svc.delete_grid(&s.admin, &grid.id).await.unwrap_err();
        assert!(matches!(core(&err), CoreError::InvalidTransition { .. }));
        assert!(svc.get_grid(&grid.id).await.is_ok());
    }

    #[tokio::test]
    async fn only_admins_delete() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        for actor in [&s.designer, &s.client] {
            let err = svc.delete_grid(actor, &grid.id).await.unwrap_err();
            assert!(matches!(core(&err), CoreError::Forbidden(_)));
        }
    }

    #[tokio::test]
    async fn detail_includes_items_and_comments() {
        let (svc, s) = seeded_service().await;
        let grid = s.draft_grid(&svc).await;
        s.add_item(&svc, &grid, 12, "Reel teaser").await;
        s.add_item(&svc, &grid, 3, "Carousel").await;
        svc.add_grid_comment(&s.client, &grid.id, "Love it").await.unwrap();

        let detail = svc.get_grid_detail(&s.client, &grid.id).await.unwrap();
        assert_eq!(detail.grid, grid);
        let topics: Vec<&str> = detail.items.iter().map(|i| i.topic.as_str()).collect();
        assert_eq!(topics, vec!["Carousel", "Reel teaser"]);
        assert_eq!(detail.comments.len(), 1);
    }
}
