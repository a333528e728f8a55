//! Errors surfaced by aggregation runs and tracking updates.

use chrono::NaiveDate;
use thiserror::Error;

use crate::config::ConfigError;
use crate::goal::GoalError;
use crate::habit::HabitError;
use crate::store::StoreError;

/// Reading or committing a date failed, or the raw data was inconsistent.
///
/// Retryable: nothing was written for the date.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("failed to read {what} for {date}")]
    Read {
        date: NaiveDate,
        what: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("failed to commit derived rows for {date}")]
    Commit {
        date: NaiveDate,
        #[source]
        source: StoreError,
    },

    #[error("inconsistent raw data for {date}: {message}")]
    Inconsistent { date: NaiveDate, message: String },
}

/// Why a single-date run failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("goal update failed")]
    Goal(#[from] GoalError),
}

impl RunError {
    /// True if retrying the same date later may succeed without intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Aggregation(_))
    }
}

/// Why a manual goal or habit update failed.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Goal(#[from] GoalError),

    #[error(transparent)]
    Habit(#[from] HabitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Joins an error with its chain of sources.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
