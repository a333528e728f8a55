//! Core domain logic for digital wellbeing tracking.
//!
//! This crate contains the fundamental types and logic for:
//! - Aggregation: folding raw app and unlock events into per-day summaries
//! - Scoring: the composite 0–100 wellness score and its level
//! - Goals and habits: progress, completion and streaks
//! - Orchestration: idempotent, atomic per-date runs over the store traits

pub mod aggregate;
pub mod config;
pub mod day;
mod error;
pub mod event;
pub mod goal;
pub mod habit;
mod lock;
#[cfg(test)]
mod memory;
pub mod orchestrator;
pub mod store;
pub mod streak;
pub mod trend;
pub mod types;
pub mod wellness;

pub use aggregate::{AppDailySummary, DailyUnlockSummary, DayAggregate, Session, aggregate_day};
pub use config::{ConfigError, ConfigProvider, ScoringConfig};
pub use day::{DateRange, DayWindow};
pub use error::{AggregationError, RunError, UpdateError, error_chain};
pub use event::{AppEventKind, RawEvent, UnknownEventKind, UsageEvent};
pub use goal::{Goal, GoalError, GoalKind};
pub use habit::{Habit, HabitError, HabitRecord, HabitRule};
pub use orchestrator::{AggregationOrchestrator, Clock, DayOutcome, DayReport, RangeReport, Stores, SystemClock};
pub use store::{AggregationRun, DerivedStore, EventStore, GoalStore, HabitStore, RunStatus, StoreError};
pub use streak::{CompletionStats, StreakState, StreakTracker};
pub use trend::{ScoreTrend, TrendDirection, score_trend};
pub use types::{GoalId, HabitId, PackageName, ValidationError};
pub use wellness::{WellnessLevel, WellnessScore, score_day};
