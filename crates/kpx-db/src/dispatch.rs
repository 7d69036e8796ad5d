//! Outbox delivery.
//!
//! [`OutboxDispatcher::deliver_pending`] drains pending outbox rows through a
//! [`NotificationSink`]. Delivery is at-least-once: an event is marked
//! delivered only after the sink accepted it, so a crash in between delivers
//! it again on the next run. The database sink tolerates that (reminders are
//! opened idempotently).
//!
//! Events of one grid are delivered strictly in order. Once an event fails,
//! the grid's later events wait for the next run, so a retried
//! `create_reminder` can never land after the `resolve_reminder` that
//! followed it.

use std::collections::HashSet;
use std::future::Future;

use kpx_core::entities::OutboxEvent;
use kpx_core::enums::{EntityType, NotificationKind, OutboxStatus};
use kpx_core::events::GridEvent;

use crate::error::DatabaseError;
use crate::repos::notification::NewNotification;
use crate::service::KpxService;

/// Receiver of notification and reminder side effects.
pub trait NotificationSink: Send + Sync {
    /// Create an in-app notification for a user.
    fn create_notification(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        kind: NotificationKind,
        grid_id: &str,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    /// Open a reminder for a user to act on an entity.
    fn create_reminder(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    /// Resolve all open reminders on an entity.
    fn resolve_reminder(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;
}

impl NotificationSink for KpxService {
    async fn create_notification(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        kind: NotificationKind,
        grid_id: &str,
    ) -> Result<(), DatabaseError> {
        self.add_notification(&NewNotification {
            user_id: user_id.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            kind,
            entity_type: Some(EntityType::Grid),
            entity_id: Some(grid_id.to_string()),
        })
        .await?;
        Ok(())
    }

    async fn create_reminder(
        &self,
        user_id: &str,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<(), DatabaseError> {
        self.open_reminder(user_id, entity_type, entity_id).await?;
        Ok(())
    }

    async fn resolve_reminder(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<(), DatabaseError> {
        self.resolve_reminders(entity_type, entity_id).await?;
        Ok(())
    }
}

/// Counts from one dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Failed this run but still pending.
    pub retried: usize,
    /// Failed and out of attempts.
    pub failed: usize,
    /// Held back behind an earlier failure on the same grid.
    pub deferred: usize,
}

impl DispatchReport {
    /// Number of events looked at.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.delivered + self.retried + self.failed + self.deferred
    }
}

/// Delivers pending outbox events in the order they were queued.
#[derive(Debug, Clone, Copy)]
pub struct OutboxDispatcher {
    max_attempts: u32,
}

impl OutboxDispatcher {
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
        }
    }

    /// Deliver up to `limit` pending events through `sink`.
    ///
    /// A sink failure is recorded on the event and does not stop the run,
    /// but the rest of that grid's events are deferred to the next run.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the outbox itself cannot be read or updated.
    pub async fn deliver_pending<S: NotificationSink>(
        &self,
        outbox: &KpxService,
        sink: &S,
        limit: u32,
    ) -> Result<DispatchReport, DatabaseError> {
        let mut report = DispatchReport::default();
        let mut blocked: HashSet<String> = HashSet::new();
        for event in outbox.pending_outbox_events(limit).await? {
            if blocked.contains(&event.grid_id) {
                tracing::debug!(event_id = %event.id, grid_id = %event.grid_id, "outbox event deferred");
                report.deferred += 1;
                continue;
            }
            match deliver(sink, &event.event).await {
                Ok(()) => {
                    outbox.mark_outbox_delivered(&event.id).await?;
                    report.delivered += 1;
                }
                Err(e) => {
                    let status = outbox
                        .record_outbox_failure(&event.id, &e.to_string(), self.max_attempts)
                        .await?;
                    log_failure(&event, status, &e);
                    match status {
                        OutboxStatus::Failed => report.failed += 1,
                        _ => {
                            report.retried += 1;
                            blocked.insert(event.grid_id.clone());
                        }
                    }
                }
            }
        }
        if report.total() > 0 {
            tracing::debug!(?report, "outbox run finished");
        }
        Ok(report)
    }
}

async fn deliver<S: NotificationSink>(sink: &S, event: &GridEvent) -> Result<(), DatabaseError> {
    match event {
        GridEvent::Notify {
            user_id,
            title,
            message,
            kind,
            grid_id,
        } => {
            sink.create_notification(user_id, title, message, *kind, grid_id)
                .await
        }
        GridEvent::CreateReminder {
            user_id,
            entity_type,
            entity_id,
        } => sink.create_reminder(user_id, *entity_type, entity_id).await,
        GridEvent::ResolveReminder {
            entity_type,
            entity_id,
        } => sink.resolve_reminder(*entity_type, entity_id).await,
    }
}

fn log_failure(event: &OutboxEvent, status: OutboxStatus, error: &DatabaseError) {
    if status == OutboxStatus::Failed {
        tracing::error!(
            event_id = %event.id,
            grid_id = %event.grid_id,
            event_type = event.event.event_type(),
            "outbox event gave up after repeated failures: {error}"
        );
    } else {
        tracing::warn!(
            event_id = %event.id,
            grid_id = %event.grid_id,
            event_type = event.event.event_type(),
            "outbox delivery failed, will retry: {error}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::NotificationFilter;
    use crate::test_support::helpers::seeded_service;
    use kpx_core::enums::{GridStatus, ReminderStatus};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A sink that rejects everything.
    struct BrokenSink;

    impl NotificationSink for BrokenSink {
        async fn create_notification(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: NotificationKind,
            _: &str,
        ) -> Result<(), DatabaseError> {
            Err(DatabaseError::Other(anyhow::anyhow!("mail relay down")))
        }

        async fn create_reminder(
            &self,
            _: &str,
            _: EntityType,
            _: &str,
        ) -> Result<(), DatabaseError> {
            Err(DatabaseError::Other(anyhow::anyhow!("reminders down")))
        }

        async fn resolve_reminder(&self, _: EntityType, _: &str) -> Result<(), DatabaseError> {
            Err(DatabaseError::Other(anyhow::anyhow!("reminders down")))
        }
    }

    /// Delegates to the database, but fails the first reminder it is asked
    /// to open.
    struct FlakyReminders<'a> {
        inner: &'a KpxService,
        failed_once: AtomicBool,
    }

    impl NotificationSink for FlakyReminders<'_> {
        async fn create_notification(
            &self,
            user_id: &str,
            title: &str,
            message: &str,
            kind: NotificationKind,
            grid_id: &str,
        ) -> Result<(), DatabaseError> {
            self.inner
                .create_notification(user_id, title, message, kind, grid_id)
                .await
        }

        async fn create_reminder(
            &self,
            user_id: &str,
            entity_type: EntityType,
            entity_id: &str,
        ) -> Result<(), DatabaseError> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(DatabaseError::Other(anyhow::anyhow!("reminders down")));
            }
            self.inner.create_reminder(user_id, entity_type, entity_id).await
        }

        async fn resolve_reminder(
            &self,
            entity_type: EntityType,
            entity_id: &str,
        ) -> Result<(), DatabaseError> {
            self.inner.resolve_reminder(entity_type, entity_id).await
        }
    }

    #[tokio::test]
    async fn send_then_dispatch_notifies_client_and_opens_reminder() {
        let (svc, s) = seeded_service().await;
        let grid = s.grid_in(&svc, GridStatus::Sent).await;

        let report = OutboxDispatcher::new(5)
            .deliver_pending(&svc, &svc, 50)
            .await
            .unwrap();
        assert_eq!(report.delivered, 2);

        let notes = svc
            .list_notifications(&s.client, &NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Content calendar ready for review");
        assert_eq!(notes[0].kind, NotificationKind::GridSent);
        assert_eq!(notes[0].entity_id.as_deref(), Some(grid.id.as_str()));

        let reminders = svc.reminders_for(EntityType::Grid, &grid.id).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].user_id, s.client.user_id);
        assert_eq!(reminders[0].status, ReminderStatus::Open);

        let again = OutboxDispatcher::new(5)
            .deliver_pending(&svc, &svc, 50)
            .await
            .unwrap();
        assert_eq!(again, DispatchReport::default());
    }

    #[tokio::test]
    async fn approve_then_dispatch_resolves_reminder_and_notifies_admins() {
        let (svc, s) = seeded_service().await;
        let dispatcher = OutboxDispatcher::new(5);
        let grid = s.grid_in(&svc, GridStatus::Sent).await;
        dispatcher.deliver_pending(&svc, &svc, 50).await.unwrap();

        svc.transition_grid(&s.client, &grid.id, "approve", None)
            .await
            .unwrap();
        dispatcher.deliver_pending(&svc, &svc, 50).await.unwrap();

        let reminders = svc.reminders_for(EntityType::Grid, &grid.id).await.unwrap();
        assert!(reminders.iter().all(|r| r.status == ReminderStatus::Resolved));

        let admin_notes = svc
            .list_notifications(&s.admin, &NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(admin_notes.len(), 1);
        assert_eq!(admin_notes[0].kind, NotificationKind::GridApproved);
        assert_eq!(
            admin_notes[0].message,
            "Acme Coffee approved the content calendar for March 2026."
        );
    }

    #[tokio::test]
    async fn broken_sink_retries_then_fails() {
        let (svc, s) = seeded_service().await;
        s.grid_in(&svc, GridStatus::Sent).await;
        let dispatcher = OutboxDispatcher::new(2);

        let first = dispatcher.deliver_pending(&svc, &BrokenSink, 50).await.unwrap();
        assert_eq!(first.retried, 2);
        assert_eq!(first.failed, 0);

        let second = dispatcher.deliver_pending(&svc, &BrokenSink, 50).await.unwrap();
        assert_eq!(second.failed, 2);

        assert!(svc.pending_outbox_events(50).await.unwrap().is_empty());
        let delivered_late = dispatcher.deliver_pending(&svc, &svc, 50).await.unwrap();
        assert_eq!(delivered_late.total(), 0);
    }

    #[tokio::test]
    async fn limit_bounds_one_run() {
        let (svc, s) = seeded_service().await;
        s.grid_in(&svc, GridStatus::Sent).await;
        let report = OutboxDispatcher::new(5)
            .deliver_pending(&svc, &svc, 1)
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(svc.pending_outbox_events(50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_reminder_holds_back_later_events_of_its_grid() {
        let (svc, s) = seeded_service().await;
        let grid = s.grid_in(&svc, GridStatus::Approved).await;
        let sink = FlakyReminders {
            inner: &svc,
            failed_once: AtomicBool::new(false),
        };
        let dispatcher = OutboxDispatcher::new(5);

        // notify client, create reminder (fails), resolve reminder, notify admin
        let first = dispatcher.deliver_pending(&svc, &sink, 50).await.unwrap();
        assert_eq!(
            first,
            DispatchReport {
                delivered: 1,
                retried: 1,
                failed: 0,
                deferred: 2,
            }
        );
        assert!(svc.reminders_for(EntityType::Grid, &grid.id).await.unwrap().is_empty());

        let second = dispatcher.deliver_pending(&svc, &sink, 50).await.unwrap();
        assert_eq!(second.delivered, 3);
        assert_eq!(second.deferred, 0);

        let reminders = svc.reminders_for(EntityType::Grid, &grid.id).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].status, ReminderStatus::Resolved);
        assert!(svc.pending_outbox_events(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_on_one_grid_does_not_hold_back_another() {
        let (svc, s) = seeded_service().await;
        let first_grid = s.grid_in(&svc, GridStatus::Sent).await;
        let second_grid = svc
            .create_grid(&s.designer, &s.company_id, 4, 2026)
            .await
            .unwrap();
        svc.transition_grid(&s.designer, &second_grid.id, "send", None)
            .await
            .unwrap();
        let sink = FlakyReminders {
            inner: &svc,
            failed_once: AtomicBool::new(false),
        };

        let report = OutboxDispatcher::new(5)
            .deliver_pending(&svc, &sink, 50)
            .await
            .unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.delivered, 3);
        assert!(svc.reminders_for(EntityType::Grid, &first_grid.id).await.unwrap().is_empty());
        assert_eq!(
            svc.reminders_for(EntityType::Grid, &second_grid.id)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
