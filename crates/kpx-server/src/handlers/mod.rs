//! Route handlers, one module per resource.

pub mod comments;
pub mod grids;
pub mod health;
pub mod items;
pub mod notifications;
