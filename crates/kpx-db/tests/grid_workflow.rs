//! End-to-end grid approval workflow against a file-backed database.

use kpx_core::enums::{EntityType, GridStatus, NotificationKind, ReminderStatus, Role};
use kpx_core::errors::CoreError;
use kpx_core::identity::Actor;
use kpx_db::dispatch::OutboxDispatcher;
use kpx_db::error::DatabaseError;
use kpx_db::repos::{NewUser, NotificationFilter};
use kpx_db::service::KpxService;
use pretty_assertions::assert_eq;
use rstest::rstest;

struct Agency {
    svc: KpxService,
    company_id: String,
    admin: Actor,
    designer: Actor,
    client: Actor,
    _dir: tempfile::TempDir,
}

async fn user(svc: &KpxService, email: &str, role: Role, company_id: Option<&str>) -> Actor {
    svc.create_user(&NewUser {
        email: email.into(),
        full_name: None,
        role,
        company_id: company_id.map(String::from),
    })
    .await
    .unwrap()
    .to_actor()
}

async fn agency() -> Agency {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kutplix.db");
    let svc = KpxService::new_local(path.to_str().unwrap()).await.unwrap();
    let company_id = svc.create_company("Acme Coffee").await.unwrap().id;
    let admin = user(&svc, "admin@agency.test", Role::Admin, None).await;
    let designer = user(&svc, "designer@agency.test", Role::Designer, None).await;
    let client = user(&svc, "owner@acme.test", Role::Client, Some(&company_id)).await;
    Agency {
        svc,
        company_id,
        admin,
        designer,
        client,
        _dir: dir,
    }
}

fn core(err: &DatabaseError) -> &CoreError {
    err.as_core().expect("expected a domain error")
}

#[tokio::test]
async fn full_review_cycle() {
    let a = agency().await;
    let dispatcher = OutboxDispatcher::new(5);
    let grid = a
        .svc
        .create_grid(&a.designer, &a.company_id, 3, 2026)
        .await
        .unwrap();

    // Designer sends, client is notified and reminded.
    let sent = a
        .svc
        .transition_grid(&a.designer, &grid.id, "send", None)
        .await
        .unwrap();
    assert_eq!(sent.status, GridStatus::Sent);
    assert!(sent.sent_at.is_some());
    dispatcher.deliver_pending(&a.svc, &a.svc, 50).await.unwrap();

    let client_notes = a
        .svc
        .list_notifications(&a.client, &NotificationFilter::default())
        .await
        .unwrap();
    assert_eq!(client_notes.len(), 1);
    assert_eq!(
        client_notes[0].message,
        "The content calendar for March 2026 is ready for your approval."
    );

    // Client asks for changes; the comment lands in the chat log.
    let changed = a
        .svc
        .transition_grid(&a.client, &grid.id, "request_changes", Some("Brighter photos"))
        .await
        .unwrap();
    assert_eq!(changed.status, GridStatus::ChangesRequested);
    dispatcher.deliver_pending(&a.svc, &a.svc, 50).await.unwrap();

    let reminders = a.svc.reminders_for(EntityType::Grid, &grid.id).await.unwrap();
    assert!(reminders.iter().all(|r| r.status == ReminderStatus::Resolved));
    let admin_notes = a
        .svc
        .list_notifications(&a.admin, &NotificationFilter::default())
        .await
        .unwrap();
    assert_eq!(admin_notes[0].kind, NotificationKind::GridChangesRequested);
    assert_eq!(
        admin_notes[0].message,
        "Acme Coffee requested changes to the content calendar for March 2026: Brighter photos"
    );

    // Re-send and approve.
    a.svc
        .transition_grid(&a.admin, &grid.id, "send", None)
        .await
        .unwrap();
    let approved = a
        .svc
        .transition_grid(&a.client, &grid.id, "approve", None)
        .await
        .unwrap();
    assert_eq!(approved.status, GridStatus::Approved);
    assert!(approved.approved_at.is_some());
    dispatcher.deliver_pending(&a.svc, &a.svc, 50).await.unwrap();

    let reminders = a.svc.reminders_for(EntityType::Grid, &grid.id).await.unwrap();
    assert_eq!(reminders.len(), 2, "one reminder per send");
    assert!(reminders.iter().all(|r| r.status == ReminderStatus::Resolved));

    let detail = a.svc.get_grid_detail(&a.client, &grid.id).await.unwrap();
    assert_eq!(detail.comments.len(), 1);
    assert_eq!(detail.comments[0].message, "Brighter photos");

    // Approved is terminal.
    let err = a
        .svc
        .transition_grid(&a.admin, &grid.id, "send", None)
        .await
        .unwrap_err();
    assert!(matches!(core(&err), CoreError::InvalidTransition { .. }));
}

#[rstest]
#[case(GridStatus::Draft)]
#[case(GridStatus::Sent)]
#[case(GridStatus::ChangesRequested)]
#[case(GridStatus::Approved)]
#[tokio::test]
async fn client_send_always_forbidden(#[case] status: GridStatus) {
    let a = agency().await;
    let grid = a
        .svc
        .create_grid(&a.admin, &a.company_id, 5, 2026)
        .await
        .unwrap();
    if status != GridStatus::Draft {
        a.svc
            .transition_grid(&a.admin, &grid.id, "send", None)
            .await
            .unwrap();
    }
    match status {
        GridStatus::ChangesRequested => {
            a.svc
                .transition_grid(&a.client, &grid.id, "request_changes", None)
                .await
                .unwrap();
        }
        GridStatus::Approved => {
            a.svc
                .transition_grid(&a.client, &grid.id, "approve", None)
                .await
                .unwrap();
        }
        _ => {}
    }

    let err = a
        .svc
        .transition_grid(&a.client, &grid.id, "send", None)
        .await
        .unwrap_err();
    assert!(matches!(core(&err), CoreError::Forbidden(_)));
}

#[tokio::test]
async fn inactive_users_are_forbidden() {
    let a = agency().await;
    let grid = a
        .svc
        .create_grid(&a.admin, &a.company_id, 3, 2026)
        .await
        .unwrap();
    a.svc.set_user_active(&a.designer.user_id, false).await.unwrap();
    let designer = a
        .svc
        .resolve_actor(&a.designer.user_id)
        .await
        .unwrap()
        .unwrap();

    let err = a
        .svc
        .transition_grid(&designer, &grid.id, "send", None)
        .await
        .unwrap_err();
    assert!(matches!(core(&err), CoreError::Forbidden(_)));
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kutplix.db");
    let path = path.to_str().unwrap();

    let grid_id = {
        let svc = KpxService::new_local(path).await.unwrap();
        let company_id = svc.create_company("Acme").await.unwrap().id;
        let admin = user(&svc, "admin@agency.test", Role::Admin, None).await;
        let grid = svc.create_grid(&admin, &company_id, 7, 2026).await.unwrap();
        svc.transition_grid(&admin, &grid.id, "send", None)
            .await
            .unwrap();
        grid.id
    };

    let svc = KpxService::new_local(path).await.unwrap();
    let grid = svc.get_grid(&grid_id).await.unwrap();
    assert_eq!(grid.status, GridStatus::Sent);
}
