#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! AIRAC cycle calculation.
//!
//! Aeronautical data is published in fixed 28-day cycles. Every cycle
//! starts a whole number of cycles after the root date 2015-06-25, and is
//! identified by the last two digits of its year followed by its 1-based
//! position within that year (e.g. `1801` for the first cycle of 2018).

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike as _, TimeDelta};

pub use chrono::NaiveDate;

/// Length of one AIRAC cycle in days.
pub const CYCLE_DAYS: i64 = 28;

/// Errors raised when constructing an [`Airac`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiracError {
    /// The given date is unusable (malformed or before the root date).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// The first AIRAC cycle this calculator knows about.
#[must_use]
pub fn root_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 6, 25).unwrap_or(NaiveDate::MIN)
}

/// An AIRAC cycle, identified by its start date and numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Airac {
    date: NaiveDate,
    id: u32,
}

impl Airac {
    /// Returns the cycle containing `any_date`.
    ///
    /// # Errors
    ///
    /// Returns [`AiracError::InvalidArgument`] if `any_date` precedes the
    /// root date.
    pub fn new(any_date: NaiveDate) -> Result<Self, AiracError> {
        let root = root_date();
        if any_date < root {
            return Err(AiracError::InvalidArgument(format!(
                "{any_date} is before the AIRAC root date {root}"
            )));
        }

        let elapsed = (any_date - root).num_days();
        let date = root + TimeDelta::days(elapsed / CYCLE_DAYS * CYCLE_DAYS);

        Ok(Self {
            date,
            id: id_for(date),
        })
    }

    /// Returns the cycle in effect today (UTC).
    ///
    /// # Errors
    ///
    /// Never fails in practice since today is after the root date, but the
    /// signature mirrors [`Airac::new`].
    pub fn today() -> Result<Self, AiracError> {
        Self::new(chrono::Utc::now().date_naive())
    }

    /// Start date of the cycle.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Numeric id of the cycle (`YYNN`).
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Start date of the following cycle.
    #[must_use]
    pub fn next_date(&self) -> NaiveDate {
        self.date + TimeDelta::days(CYCLE_DAYS)
    }

    /// Numeric id of the following cycle.
    #[must_use]
    pub fn next_id(&self) -> u32 {
        id_for(self.next_date())
    }

    /// The following cycle.
    #[must_use]
    pub fn next(&self) -> Self {
        let date = self.next_date();
        Self {
            date,
            id: id_for(date),
        }
    }
}

/// Computes the `YYNN` id of the cycle starting on `date`.
fn id_for(date: NaiveDate) -> u32 {
    let year = u32::try_from(date.year().rem_euclid(100)).unwrap_or_default();
    year * 100 + date.ordinal0() / 28 + 1
}

impl fmt::Display for Airac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))
    }
}

impl FromStr for Airac {
    type Err = AiracError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| AiracError::InvalidArgument(format!("'{s}' is not a date: {e}")))?;
        Self::new(date)
    }
}
