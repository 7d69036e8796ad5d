//! `/grids` and `/grids/{id}`.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use kpx_core::enums::GridStatus;
use kpx_core::responses::{GridDetailResponse, GridListResponse, GridResponse, SuccessResponse};
use kpx_db::repos::GridFilter;
use serde::Deserialize;

use crate::error::ApiError;
use crate::identity::CurrentActor;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListGridsQuery {
    pub company_id: Option<String>,
    pub status: Option<GridStatus>,
    pub year: Option<i32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGridBody {
    pub company_id: String,
    pub month: u32,
    pub year: i32,
}

/// Body of `PUT /grids/{id}`.
///
/// `action` is optional here so that a missing action is reported after the
/// caller's access to the grid has been checked.
#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub action: Option<String>,
    #[serde(default, alias = "comment")]
    pub comments: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    query: Result<Query<ListGridsQuery>, QueryRejection>,
) -> Result<Json<GridListResponse>, ApiError> {
    let Query(query) = query?;
    let filter = GridFilter {
        company_id: query.company_id,
        status: query.status,
        year: query.year,
        limit: Some(state.config.general.clamp_limit(query.limit)),
    };
    let grids = state.svc.list_grids(&actor, &filter).await?;
    Ok(Json(GridListResponse { grids }))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    body: Result<Json<CreateGridBody>, JsonRejection>,
) -> Result<(StatusCode, Json<GridResponse>), ApiError> {
    let Json(body) = body?;
    let grid = state
        .svc
        .create_grid(&actor, &body.company_id, body.month, body.year)
        .await?;
    Ok((StatusCode::CREATED, Json(GridResponse { grid })))
}

pub async fn show(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<GridDetailResponse>, ApiError> {
    let grid = state.svc.get_grid_detail(&actor, &id).await?;
    Ok(Json(GridDetailResponse { grid }))
}

pub async fn transition(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> Result<Json<GridResponse>, ApiError> {
    let Json(body) = body?;
    let grid = state
        .svc
        .transition_grid(
            &actor,
            &id,
            body.action.as_deref().unwrap_or_default(),
            body.comments.as_deref(),
        )
        .await?;
    Ok(Json(GridResponse { grid }))
}

pub async fn destroy(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.svc.delete_grid(&actor, &id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
