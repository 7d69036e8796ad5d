//! `/grids/{id}/items`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use kpx_core::responses::{GridItemListResponse, GridItemResponse, SuccessResponse};
use kpx_db::repos::NewGridItem;
use kpx_db::updates::grid_item::GridItemUpdate;

use crate::error::ApiError;
use crate::identity::CurrentActor;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(grid_id): Path<String>,
) -> Result<Json<GridItemListResponse>, ApiError> {
    let items = state.svc.list_grid_items(&actor, &grid_id).await?;
    Ok(Json(GridItemListResponse { items }))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(grid_id): Path<String>,
    body: Result<Json<NewGridItem>, JsonRejection>,
) -> Result<(StatusCode, Json<GridItemResponse>), ApiError> {
    let Json(new) = body?;
    let item = state.svc.add_grid_item(&actor, &grid_id, &new).await?;
    Ok((StatusCode::CREATED, Json(GridItemResponse { item })))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((grid_id, item_id)): Path<(String, String)>,
    body: Result<Json<GridItemUpdate>, JsonRejection>,
) -> Result<Json<GridItemResponse>, ApiError> {
    let Json(update) = body?;
    let item = state
        .svc
        .update_grid_item(&actor, &grid_id, &item_id, &update)
        .await?;
    Ok(Json(GridItemResponse { item }))
}

pub async fn destroy(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path((grid_id, item_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.svc.delete_grid_item(&actor, &grid_id, &item_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}
