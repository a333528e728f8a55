//! Storage seams the core reads from and writes derived rows through.
//!
//! Implementations must be safe to share across threads: the orchestrator
//! runs independent dates in parallel and relies on its own keyed locks for
//! per-date and per-goal exclusion.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::{AppDailySummary, DailyUnlockSummary};
use crate::day::DateRange;
use crate::event::{RawEvent, UsageEvent};
use crate::goal::{Goal, GoalContribution};
use crate::habit::{Habit, HabitRecord};
use crate::types::{GoalId, HabitId};
use crate::wellness::WellnessScore;

/// A failure inside a store implementation.
#[derive(Debug, Error)]
#[error("{operation} failed")]
pub struct StoreError {
    pub operation: &'static str,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl StoreError {
    pub fn new(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Append-only raw events.
pub trait EventStore: Send + Sync {
    /// App open/close events with `start <= timestamp < end`, ascending.
    fn read_app_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, StoreError>;

    /// Unlock timestamps with `start <= timestamp < end`, ascending.
    fn read_unlock_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError>;

    /// Appends events, ignoring exact duplicates. Returns the number inserted.
    fn append(&self, events: &[RawEvent]) -> Result<usize, StoreError>;
}

/// Outcome recorded for each aggregation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Aggregated,
    NoActivity,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aggregated => "aggregated",
            Self::NoActivity => "no_activity",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aggregated" => Ok(Self::Aggregated),
            "no_activity" => Ok(Self::NoActivity),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid run status: {s}")),
        }
    }
}

/// Ledger row for one aggregation attempt of a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRun {
    pub date: NaiveDate,
    pub status: RunStatus,
    pub attempted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Every derived row for one date, committed as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDay {
    pub date: NaiveDate,
    /// Replaces all app summaries of the date; packages not listed are removed.
    pub app_summaries: Vec<AppDailySummary>,
    pub unlock_summary: DailyUnlockSummary,
    /// `None` removes any stored score for the date.
    pub wellness_score: Option<WellnessScore>,
    /// Rule-derived habit records for the date.
    pub habit_records: Vec<HabitRecord>,
    /// Goals with their updated progress.
    pub goals: Vec<Goal>,
    pub goal_contributions: Vec<GoalContribution>,
    pub run: AggregationRun,
}

/// Derived rows: per-app summaries, unlock counts, wellness scores.
pub trait DerivedStore: Send + Sync {
    /// Writes every row of `day` in one transaction, or nothing.
    ///
    /// A stored wellness score whose content equals the new one keeps its
    /// `calculated_at`, so unchanged re-runs leave rows byte-identical.
    fn commit_day(&self, day: &DerivedDay) -> Result<(), StoreError>;

    fn upsert_app_summaries(&self, summaries: &[AppDailySummary]) -> Result<(), StoreError>;

    fn upsert_unlock_summary(&self, summary: &DailyUnlockSummary) -> Result<(), StoreError>;

    fn upsert_wellness_score(&self, score: &WellnessScore) -> Result<(), StoreError>;

    /// Records an attempt without touching derived rows.
    fn record_run(&self, run: &AggregationRun) -> Result<(), StoreError>;

    fn last_run(&self, date: NaiveDate) -> Result<Option<AggregationRun>, StoreError>;

    fn app_summaries(&self, date: NaiveDate) -> Result<Vec<AppDailySummary>, StoreError>;

    fn unlock_summary(&self, date: NaiveDate) -> Result<Option<DailyUnlockSummary>, StoreError>;

    fn wellness_score(&self, date: NaiveDate) -> Result<Option<WellnessScore>, StoreError>;

    /// Scores within the range, ascending by date.
    fn wellness_scores(&self, range: DateRange) -> Result<Vec<WellnessScore>, StoreError>;

    fn goal_contribution(&self, goal_id: &GoalId, date: NaiveDate) -> Result<Option<f64>, StoreError>;
}

/// CRUD access to goals.
pub trait GoalStore: Send + Sync {
    fn create_goal(&self, goal: &Goal) -> Result<(), StoreError>;

    fn goal(&self, id: &GoalId) -> Result<Option<Goal>, StoreError>;

    fn list_goals(&self) -> Result<Vec<Goal>, StoreError>;

    /// Active goals, ordered by id.
    fn active_goals(&self) -> Result<Vec<Goal>, StoreError>;

    /// Overwrites an existing goal.
    fn save_goal(&self, goal: &Goal) -> Result<(), StoreError>;
}

/// CRUD access to habits and their records.
pub trait HabitStore: Send + Sync {
    fn create_habit(&self, habit: &Habit) -> Result<(), StoreError>;

    fn habit(&self, id: &HabitId) -> Result<Option<Habit>, StoreError>;

    fn list_habits(&self) -> Result<Vec<Habit>, StoreError>;

    /// Active habits, ordered by id.
    fn active_habits(&self) -> Result<Vec<Habit>, StoreError>;

    /// Records for a habit within the range, ascending by date.
    fn habit_records(&self, id: &HabitId, range: DateRange) -> Result<Vec<HabitRecord>, StoreError>;

    /// Every record for a habit up to and including `through`.
    fn habit_history(&self, id: &HabitId, through: NaiveDate) -> Result<Vec<HabitRecord>, StoreError>;

    /// Inserts or replaces a single record.
    fn put_habit_record(&self, record: &HabitRecord) -> Result<(), StoreError>;
}
