//! `/notifications` and `/notifications/{id}/read`.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use kpx_core::responses::{NotificationListResponse, NotificationResponse};
use kpx_db::repos::NotificationFilter;
use serde::Deserialize;

use crate::error::ApiError;
use crate::identity::CurrentActor;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    query: Result<Query<ListNotificationsQuery>, QueryRejection>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let Query(query) = query?;
    let filter = NotificationFilter {
        unread_only: query.unread_only,
        limit: Some(state.config.general.clamp_limit(query.limit)),
    };
    let notifications = state.svc.list_notifications(&actor, &filter).await?;
    Ok(Json(NotificationListResponse { notifications }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let notification = state.svc.mark_notification_read(&actor, &id).await?;
    Ok(Json(NotificationResponse { notification }))
}
