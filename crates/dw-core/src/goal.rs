//! Goals and their cumulative progress.
//!
//! Progress only moves forward: deltas are non-negative and the value is
//! clamped at an upper bound for kinds that define one. Completion fires
//! once, on the first crossing of the target.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::DayAggregate;
use crate::config::ScoringConfig;
use crate::types::GoalId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GoalError {
    #[error("goal not found: {id}")]
    NotFound { id: GoalId },

    #[error("goal is inactive: {id}")]
    Inactive { id: GoalId },

    #[error("invalid progress delta for goal {id}: {delta}")]
    InvalidDelta { id: GoalId, delta: f64 },

    #[error("goal target must be a positive number, got {value}")]
    InvalidTarget { value: f64 },
}

/// What a goal measures and how aggregation feeds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalKind {
    /// Accumulates the minutes of the daily limit left unused.
    ScreenTimeUnderLimit,
    /// Accumulates minutes spent in focus sessions.
    FocusMinutes,
    /// Accumulates the number of focus sessions.
    FocusSessions,
    /// Accumulates one per day with at most `max_unlocks` unlocks.
    UnlocksUnder { max_unlocks: u32 },
    /// Only moved by explicit deltas.
    Manual,
}

impl GoalKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ScreenTimeUnderLimit => "screen_time_under_limit",
            Self::FocusMinutes => "focus_minutes",
            Self::FocusSessions => "focus_sessions",
            Self::UnlocksUnder { .. } => "unlocks_under",
            Self::Manual => "manual",
        }
    }

    /// Multiple of the target at which progress stops accumulating.
    #[must_use]
    pub const fn upper_bound_factor(&self) -> Option<f64> {
        match self {
            Self::ScreenTimeUnderLimit => Some(1.0),
            _ => None,
        }
    }

    /// How much one day contributes, or `None` if aggregation never touches this kind.
    #[must_use]
    pub fn day_contribution(&self, aggregate: &DayAggregate, config: &ScoringConfig) -> Option<f64> {
        let minutes = |ms: i64| ms as f64 / 60_000.0;
        match self {
            Self::ScreenTimeUnderLimit => {
                let unused = (config.time_limit.limit_ms() - aggregate.total_screen_time_ms()).max(0);
                Some(minutes(unused))
            }
            Self::FocusMinutes => {
                let min_ms = config.focus.min_session_ms();
                let focus_ms: i64 = aggregate
                    .sessions
                    .iter()
                    .map(crate::aggregate::Session::duration_ms)
                    .filter(|ms| *ms >= min_ms)
                    .sum();
                Some(minutes(focus_ms))
            }
            Self::FocusSessions => {
                let min_ms = config.focus.min_session_ms();
                let count = aggregate
                    .sessions
                    .iter()
                    .filter(|s| s.duration_ms() >= min_ms)
                    .count();
                Some(f64::from(u32::try_from(count).unwrap_or(u32::MAX)))
            }
            Self::UnlocksUnder { max_unlocks } => {
                let met = aggregate.unlock_summary.unlock_count <= *max_unlocks;
                Some(if met { 1.0 } else { 0.0 })
            }
            Self::Manual => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub name: String,
    pub kind: GoalKind,
    pub target_value: f64,
    pub current_value: f64,
    pub is_active: bool,
    /// Set on the first crossing of the target.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    /// Creates an active goal with no progress.
    pub fn new(
        id: GoalId,
        name: impl Into<String>,
        kind: GoalKind,
        target_value: f64,
    ) -> Result<Self, GoalError> {
        if !target_value.is_finite() || target_value <= 0.0 {
            return Err(GoalError::InvalidTarget {
                value: target_value,
            });
        }
        Ok(Self {
            id,
            name: name.into(),
            kind,
            target_value,
            current_value: 0.0,
            is_active: true,
            completed_at: None,
        })
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.current_value >= self.target_value
    }

    /// The cap on `current_value`, if the kind defines one.
    #[must_use]
    pub fn upper_bound(&self) -> Option<f64> {
        self.kind
            .upper_bound_factor()
            .map(|factor| self.target_value * factor)
    }

    /// Fraction of the target reached, capped at 1.0.
    #[must_use]
    pub fn progress_ratio(&self) -> f64 {
        (self.current_value / self.target_value).clamp(0.0, 1.0)
    }

    fn ensure_active(&self) -> Result<(), GoalError> {
        if self.is_active {
            Ok(())
        } else {
            Err(GoalError::Inactive {
                id: self.id.clone(),
            })
        }
    }
}

/// Result of applying progress to a goal.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub goal: Goal,
    /// The amount actually added after clamping.
    pub applied: f64,
    /// True only on the update that first crossed the target.
    pub newly_completed: bool,
}

/// Adds `delta` to an active goal.
pub fn apply_delta(goal: &Goal, delta: f64, at: DateTime<Utc>) -> Result<ProgressUpdate, GoalError> {
    goal.ensure_active()?;
    if !delta.is_finite() || delta < 0.0 {
        return Err(GoalError::InvalidDelta {
            id: goal.id.clone(),
            delta,
        });
    }

    let mut updated = goal.clone();
    let mut next = goal.current_value + delta;
    if let Some(bound) = goal.upper_bound() {
        next = next.min(bound);
    }
    updated.current_value = next.max(goal.current_value);

    let newly_completed = goal.completed_at.is_none() && updated.is_completed();
    if newly_completed {
        updated.completed_at = Some(at);
        tracing::info!(goal = %goal.id, target = goal.target_value, "goal completed");
    }

    Ok(ProgressUpdate {
        applied: updated.current_value - goal.current_value,
        goal: updated,
        newly_completed,
    })
}

/// The amount one date has contributed to a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalContribution {
    pub goal_id: GoalId,
    pub date: NaiveDate,
    pub value: f64,
}

/// Applies a date's contribution so that re-running the date never double counts.
///
/// Only the increase over the previously recorded contribution is added, and
/// the recorded contribution never shrinks.
pub fn apply_contribution(
    goal: &Goal,
    previous: Option<f64>,
    value: f64,
    date: NaiveDate,
    at: DateTime<Utc>,
) -> Result<(ProgressUpdate, GoalContribution), GoalError> {
    if !value.is_finite() || value < 0.0 {
        return Err(GoalError::InvalidDelta {
            id: goal.id.clone(),
            delta: value,
        });
    }
    let previous = previous.unwrap_or(0.0);
    let update = apply_delta(goal, (value - previous).max(0.0), at)?;
    let contribution = GoalContribution {
        goal_id: goal.id.clone(),
        date,
        value: value.max(previous),
    };
    Ok((update, contribution))
}

/// Clears progress and completion. The only way `current_value` decreases.
#[must_use]
pub fn reset(goal: &Goal) -> Goal {
    Goal {
        current_value: 0.0,
        completed_at: None,
        ..goal.clone()
    }
}
