//! `/grids/{id}/comments`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use kpx_core::responses::{CommentListResponse, CommentResponse};
use serde::Deserialize;

use crate::error::ApiError;
use crate::identity::CurrentActor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub message: String,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(grid_id): Path<String>,
) -> Result<Json<CommentListResponse>, ApiError> {
    let comments = state.svc.list_grid_comments(&actor, &grid_id).await?;
    Ok(Json(CommentListResponse { comments }))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(grid_id): Path<String>,
    body: Result<Json<CommentBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    let Json(body) = body?;
    let comment = state
        .svc
        .add_grid_comment(&actor, &grid_id, &body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(CommentResponse { comment })))
}
