//! Entity structs for all Kutplix domain objects.
//!
//! Each entity maps to a table in the libSQL database (see
//! `kpx-db/migrations/001_initial.sql`). All structs derive `Serialize`,
//! `Deserialize`, and `JsonSchema` for JSON roundtrip and schema validation.

mod audit;
mod company;
mod grid;
mod grid_comment;
mod grid_item;
mod notification;
mod outbox;
mod reminder;
mod user;

pub use audit::AuditEntry;
pub use company::Company;
pub use grid::{Grid, GridDetail, validate_period};
pub use grid_comment::{GridComment, MAX_MESSAGE_CHARS, clean_message};
pub use grid_item::GridItem;
pub use notification::Notification;
pub use outbox::OutboxEvent;
pub use reminder::Reminder;
pub use user::UserProfile;
