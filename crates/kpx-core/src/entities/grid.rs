use chrono::{DateTime, Datelike, Month, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::{GridComment, GridItem};
use crate::enums::GridStatus;
use crate::errors::CoreError;

/// Earliest and latest calendar years accepted for a grid.
const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

/// A monthly content calendar for one client company.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Grid {
    pub id: String,
    pub company_id: String,
    pub month: u32,
    pub year: i32,
    pub status: GridStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Grid {
    /// Human label for the calendar period, e.g. `"March 2026"`.
    #[must_use]
    pub fn period_label(&self) -> String {
        let name = u8::try_from(self.month)
            .ok()
            .and_then(|m| Month::try_from(m).ok())
            .map_or("Unknown", |m| m.name());
        format!("{name} {}", self.year)
    }

    /// Whether `date` falls inside this grid's month.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

/// A grid with its items and comments, as returned by `GET /grids/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GridDetail {
    #[serde(flatten)]
    pub grid: Grid,
    pub items: Vec<GridItem>,
    pub comments: Vec<GridComment>,
}

/// Check a (month, year) pair before creating a grid.
///
/// # Errors
///
/// Returns `CoreError::Validation` if the month is outside `1..=12` or the
/// year is outside the supported range.
pub fn validate_period(month: u32, year: i32) -> Result<(), CoreError> {
    if !(1..=12).contains(&month) {
        return Err(CoreError::Validation(format!(
            "month must be between 1 and 12, got {month}"
        )));
    }
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(CoreError::Validation(format!(
            "year must be between {MIN_YEAR} and {MAX_YEAR}, got {year}"
        )));
    }
    Ok(())
}
