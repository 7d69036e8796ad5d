//! # kpx-server
//!
//! HTTP API for the Kutplix grid approval workflow.
//!
//! Every route except `/healthz` requires an `x-user-id` header naming an
//! existing user; see [`identity`]. Errors are returned as
//! `{"error": "..."}` (see [`error::ApiError`]).

pub mod error;
pub mod handlers;
pub mod identity;
pub mod outbox;
pub mod state;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};

pub use error::ApiError;
pub use state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    use handlers::{comments, grids, health, items, notifications};

    let body_limit = state.config.server.max_body_bytes;
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/grids", get(grids::list).post(grids::create))
        .route(
            "/grids/{id}",
            get(grids::show).put(grids::transition).delete(grids::destroy),
        )
        .route("/grids/{id}/items", get(items::list).post(items::create))
        .route(
            "/grids/{id}/items/{item_id}",
            patch(items::update).delete(items::destroy),
        )
        .route(
            "/grids/{id}/comments",
            get(comments::list).post(comments::create),
        )
        .route("/notifications", get(notifications::list))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
