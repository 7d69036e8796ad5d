//! HTTP response envelopes returned as JSON by `kpx-server`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::{Grid, GridComment, GridDetail, GridItem, Notification};

/// Response from `GET /grids/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GridDetailResponse {
    pub grid: GridDetail,
}

/// Response from `PUT /grids/{id}` and `POST /grids`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GridResponse {
    pub grid: Grid,
}

/// Response from `GET /grids`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GridListResponse {
    pub grids: Vec<Grid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GridItemResponse {
    pub item: GridItem,
}

/// Response from `GET /grids/{id}/items`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GridItemListResponse {
    pub items: Vec<GridItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CommentResponse {
    pub comment: GridComment,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct CommentListResponse {
    pub comments: Vec<GridComment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct NotificationResponse {
    pub notification: Notification,
}

/// Response from deletions.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}
