//! Grid approval state machine.
//!
//! [`plan_transition`] is pure: given the current grid, the caller, the
//! requested action, and the people to notify, it either rejects the request
//! or returns the new status, timestamps, and outbox events. Persisting the
//! plan is `kpx-db`'s job.
//!
//! Checks run in a fixed order so that the error a caller sees is stable:
//! ownership and role first (403), then the current status (400).

use chrono::{DateTime, Utc};

use crate::entities::{Grid, clean_message};
use crate::enums::{EntityType, GridAction, GridStatus, NotificationKind};
use crate::errors::CoreError;
use crate::events::GridEvent;
use crate::identity::Actor;
use crate::policy::{Operation, authorize};

/// People and labels needed to word the notifications of a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionContext {
    pub company_name: String,
    /// Active client users of the grid's company.
    pub client_user_ids: Vec<String>,
    /// Active admins of the agency.
    pub admin_user_ids: Vec<String>,
}

/// The outcome of a valid transition, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub action: GridAction,
    pub from: GridStatus,
    pub to: GridStatus,
    /// When the plan was made; becomes the grid's `updated_at`.
    pub planned_at: DateTime<Utc>,
    /// Set when the action stamps `sent_at`.
    pub sent_at: Option<DateTime<Utc>>,
    /// Set when the action stamps `approved_at`.
    pub approved_at: Option<DateTime<Utc>>,
    /// Trimmed, non-empty comment to append to the grid's chat log.
    pub comment: Option<String>,
    pub events: Vec<GridEvent>,
}

/// Validate an action against the grid and caller and plan its effects.
///
/// # Errors
///
/// - `CoreError::Forbidden` if the policy denies the action.
/// - `CoreError::InvalidTransition` if the grid's status does not allow it.
/// - `CoreError::Validation` if the comment is longer than
///   [`MAX_MESSAGE_CHARS`](crate::entities::MAX_MESSAGE_CHARS).
pub fn plan_transition(
    grid: &Grid,
    actor: &Actor,
    action: GridAction,
    comment: Option<&str>,
    ctx: &TransitionContext,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, CoreError> {
    authorize(actor, &grid.company_id, Operation::Transition(action))?;

    let to = action.target_status();
    if !grid.status.can_transition_to(to) {
        return Err(CoreError::InvalidTransition {
            entity_type: EntityType::Grid.to_string(),
            id: grid.id.clone(),
            from: grid.status.to_string(),
            to: to.to_string(),
        });
    }

    let comment = match comment.map(str::trim).filter(|c| !c.is_empty()) {
        Some(text) => Some(clean_message(text)?),
        None => None,
    };
    let period = grid.period_label();

    let mut plan = TransitionPlan {
        action,
        from: grid.status,
        to,
        planned_at: now,
        sent_at: None,
        approved_at: None,
        comment: None,
        events: Vec::new(),
    };

    match action {
        GridAction::Send => {
            plan.sent_at = Some(now);
            for user_id in &ctx.client_user_ids {
                plan.events.push(GridEvent::Notify {
                    user_id: user_id.clone(),
                    title: "Content calendar ready for review".to_string(),
                    message: format!(
                        "The content calendar for {period} is ready for your approval."
                    ),
                    kind: NotificationKind::GridSent,
                    grid_id: grid.id.clone(),
                });
                plan.events.push(GridEvent::CreateReminder {
                    user_id: user_id.clone(),
                    entity_type: EntityType::Grid,
                    entity_id: grid.id.clone(),
                });
            }
        }
        GridAction::Approve => {
            plan.approved_at = Some(now);
            plan.events.push(resolve_grid_reminders(grid));
            for user_id in &ctx.admin_user_ids {
                plan.events.push(GridEvent::Notify {
                    user_id: user_id.clone(),
                    title: "Content calendar approved".to_string(),
                    message: format!(
                        "{} approved the content calendar for {period}.",
                        ctx.company_name
                    ),
                    kind: NotificationKind::GridApproved,
                    grid_id: grid.id.clone(),
                });
            }
        }
        GridAction::RequestChanges => {
            plan.events.push(resolve_grid_reminders(grid));
            let message = match &comment {
                Some(text) => format!(
                    "{} requested changes to the content calendar for {period}: {text}",
                    ctx.company_name
                ),
                None => format!(
                    "{} requested changes to the content calendar for {period}.",
                    ctx.company_name
                ),
            };
            for user_id in &ctx.admin_user_ids {
                plan.events.push(GridEvent::Notify {
                    user_id: user_id.clone(),
                    title: "Changes requested on content calendar".to_string(),
                    message: message.clone(),
                    kind: NotificationKind::GridChangesRequested,
                    grid_id: grid.id.clone(),
                });
            }
            plan.comment = comment;
        }
    }

    Ok(plan)
}

/// Check that `actor` may delete `grid`.
///
/// # Errors
///
/// - `CoreError::Forbidden` unless the actor is an admin.
/// - `CoreError::InvalidTransition` unless the grid is still a draft.
pub fn check_deletable(grid: &Grid, actor: &Actor) -> Result<(), CoreError> {
    authorize(actor, &grid.company_id, Operation::DeleteGrid)?;
    if grid.status != GridStatus::Draft {
        return Err(CoreError::InvalidTransition {
            entity_type: EntityType::Grid.to_string(),
            id: grid.id.clone(),
            from: grid.status.to_string(),
            to: "deleted".to_string(),
        });
    }
    Ok(())
}

/// Check that `actor` may add, edit, or remove items on `grid`.
///
/// # Errors
///
/// - `CoreError::Forbidden` for clients or inactive users.
/// - `CoreError::Validation` when the grid is `sent` or `approved`.
pub fn check_items_editable(grid: &Grid, actor: &Actor) -> Result<(), CoreError> {
    authorize(actor, &grid.company_id, Operation::EditItems)?;
    if !grid.status.items_editable() {
        return Err(CoreError::Validation(format!(
            "items of grid {} cannot be changed while it is {}",
            grid.id, grid.status
        )));
    }
    Ok(())
}

fn resolve_grid_reminders(grid: &Grid) -> GridEvent {
    GridEvent::ResolveReminder {
        entity_type: EntityType::Grid,
        entity_id: grid.id.clone(),
    }
}
