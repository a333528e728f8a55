//! Streak tracking for habits.
//!
//! A streak counts consecutive satisfied days. An unsatisfied day and a day
//! with no record at all both break it, because habits are expected to be
//! recorded daily. Completion rate is computed separately and only counts
//! days that have a record.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::day::DateRange;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StreakError {
    /// Observations must arrive in strictly increasing date order.
    #[error("observation for {date} does not follow {last}")]
    OutOfOrder { date: NaiveDate, last: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakPhase {
    #[default]
    NoStreak,
    ActiveStreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    /// Running maximum over every streak observed so far.
    pub best_streak: u32,
    pub phase: StreakPhase,
}

/// Replays per-day satisfied flags into a [`StreakState`].
#[derive(Debug, Clone, Default)]
pub struct StreakTracker {
    state: StreakState,
    last_date: Option<NaiveDate>,
}

impl StreakTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> StreakState {
        self.state
    }

    #[must_use]
    pub const fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    /// Applies one day. Skipped dates since the previous observation break the streak.
    pub fn observe(&mut self, date: NaiveDate, satisfied: bool) -> Result<StreakState, StreakError> {
        if let Some(last) = self.last_date {
            if date <= last {
                return Err(StreakError::OutOfOrder { date, last });
            }
            if last.succ_opt() != Some(date) {
                self.reset();
            }
        }
        self.last_date = Some(date);

        if satisfied {
            self.state.current_streak = self.state.current_streak.saturating_add(1);
            self.state.best_streak = self.state.best_streak.max(self.state.current_streak);
            self.state.phase = StreakPhase::ActiveStreak;
        } else {
            self.reset();
        }
        Ok(self.state)
    }

    /// Treats every unrecorded day up to and including `through` as missing.
    pub fn advance_to(&mut self, through: NaiveDate) -> StreakState {
        if self.last_date.is_some_and(|last| last < through) {
            self.reset();
            self.last_date = Some(through);
        }
        self.state
    }

    const fn reset(&mut self) {
        self.state.current_streak = 0;
        self.state.phase = StreakPhase::NoStreak;
    }

    /// Rebuilds state from unordered history.
    ///
    /// Duplicate dates keep the last value seen. Dates after `through` are
    /// ignored, and missing days between the last record and `through` break
    /// the current streak.
    pub fn from_history<I>(history: I, through: NaiveDate) -> StreakState
    where
        I: IntoIterator<Item = (NaiveDate, bool)>,
    {
        let by_date: BTreeMap<NaiveDate, bool> = history
            .into_iter()
            .filter(|(date, _)| *date <= through)
            .collect();

        let mut tracker = Self::new();
        for (date, satisfied) in by_date {
            // Keys are unique and ascending
            let _ = tracker.observe(date, satisfied);
        }
        tracker.advance_to(through)
    }
}

/// Completion statistics over a date window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionStats {
    pub completed_days: u32,
    /// Days in the window that have a record; missing days are not counted.
    pub tracked_days: u32,
    /// `None` when no day in the window has a record.
    pub rate: Option<f64>,
}

/// Computes `completed_days / tracked_days` over `window`.
pub fn completion_stats<I>(history: I, window: DateRange) -> CompletionStats
where
    I: IntoIterator<Item = (NaiveDate, bool)>,
{
    let by_date: BTreeMap<NaiveDate, bool> = history
        .into_iter()
        .filter(|(date, _)| window.contains(*date))
        .collect();

    let tracked_days = u32::try_from(by_date.len()).unwrap_or(u32::MAX);
    let completed_days =
        u32::try_from(by_date.values().filter(|done| **done).count()).unwrap_or(u32::MAX);
    let rate = (tracked_days > 0).then(|| f64::from(completed_days) / f64::from(tracked_days));

    CompletionStats {
        completed_days,
        tracked_days,
        rate,
    }
}
