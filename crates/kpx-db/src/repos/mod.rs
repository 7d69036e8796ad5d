//! Repository methods on [`crate::service::KpxService`], one module per table.

pub mod audit;
pub mod company;
pub mod grid;
pub mod grid_comment;
pub mod grid_item;
pub mod notification;
pub mod outbox;
pub mod reminder;
pub mod user;

pub use audit::AuditFilter;
pub use grid::GridFilter;
pub use grid_item::NewGridItem;
pub use notification::NotificationFilter;
pub use user::NewUser;
