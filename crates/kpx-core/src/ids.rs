//! ID prefix constants.
//!
//! Every row ID is `{prefix}-{16 hex chars}`, generated in SQL by
//! `KpxDb::generate_id`.

/// Random bytes behind each ID.
pub const ID_RANDOM_BYTES: usize = 8;

pub const PREFIX_COMPANY: &str = "cmp";
pub const PREFIX_USER: &str = "usr";
pub const PREFIX_GRID: &str = "grd";
pub const PREFIX_GRID_ITEM: &str = "itm";
pub const PREFIX_GRID_COMMENT: &str = "cmt";
pub const PREFIX_NOTIFICATION: &str = "ntf";
pub const PREFIX_REMINDER: &str = "rem";
pub const PREFIX_OUTBOX: &str = "evt";
pub const PREFIX_AUDIT: &str = "aud";

/// All prefixes, for exhaustive tests.
pub const ALL_PREFIXES: &[&str] = &[
    PREFIX_COMPANY,
    PREFIX_USER,
    PREFIX_GRID,
    PREFIX_GRID_ITEM,
    PREFIX_GRID_COMMENT,
    PREFIX_NOTIFICATION,
    PREFIX_REMINDER,
    PREFIX_OUTBOX,
    PREFIX_AUDIT,
];

/// Check that `id` has the shape `{prefix}-{16 hex}`.
#[must_use]
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|hex| {
            hex.len() == ID_RANDOM_BYTES * 2 && hex.chars().all(|c| c.is_ascii_hexdigit())
        })
}
