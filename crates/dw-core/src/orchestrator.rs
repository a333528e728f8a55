//! Aggregation runs over dates.
//!
//! # Run Stages
//!
//! For one date, under that date's lock:
//! 1. Snapshot and validate the scoring configuration
//! 2. Read the day's app events and unlocks
//! 3. Aggregate, then score (days without activity are not scored)
//! 4. Derive rule-based habit records and recompute streaks
//! 5. Apply goal contributions under the goals' locks
//! 6. Commit every derived row in one call
//!
//! A failure at any stage writes nothing but a `failed` ledger row.
//!
//! A range run commits its dates in parallel, then computes every date's
//! streaks in one pass over the committed history.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rayon::prelude::*;
use serde::Serialize;

use crate::aggregate::{DayAggregate, aggregate_day};
use crate::config::{ConfigProvider, ScoringConfig};
use crate::day::{DateRange, DayWindow};
use crate::error::{AggregationError, RunError, UpdateError, error_chain};
use crate::goal::{self, Goal, GoalContribution, GoalError, ProgressUpdate};
use crate::habit::{Habit, HabitError, HabitRecord, ensure_day_open};
use crate::lock::KeyedLock;
use crate::store::{
    AggregationRun, DerivedDay, DerivedStore, EventStore, GoalStore, HabitStore, RunStatus, StoreError,
};
use crate::streak::{CompletionStats, StreakState, StreakTracker, completion_stats};
use crate::types::{GoalId, HabitId};
use crate::wellness::{InsufficientData, WellnessScore, score_day};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The collaborators a run reads from and writes to.
#[derive(Clone, Copy)]
pub struct Stores<'a> {
    pub events: &'a dyn EventStore,
    pub derived: &'a dyn DerivedStore,
    pub goals: &'a dyn GoalStore,
    pub habits: &'a dyn HabitStore,
    pub config: &'a dyn ConfigProvider,
}

/// How a date ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DayOutcome {
    Scored { score: WellnessScore },
    NoActivity,
}

/// Streak of one habit after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HabitStreak {
    pub habit_id: HabitId,
    pub state: StreakState,
}

/// Summary of a successful single-date run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    pub outcome: DayOutcome,
    pub apps: usize,
    pub total_screen_time_ms: i64,
    pub unlock_count: u32,
    pub streaks: Vec<HabitStreak>,
    /// Goals whose target was crossed by this run.
    pub completed_goals: Vec<GoalId>,
}

/// Results of a multi-date run, ordered by date.
#[derive(Debug, Default)]
pub struct RangeReport {
    pub reports: Vec<DayReport>,
    pub failures: Vec<(NaiveDate, RunError)>,
}

impl RangeReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Coordinates aggregation, scoring, habits and goals.
///
/// The orchestrator is the only writer of derived rows. Runs for the same
/// date, and progress updates for the same goal, are serialized.
pub struct AggregationOrchestrator<'a, Tz: TimeZone> {
    stores: Stores<'a>,
    tz: Tz,
    clock: Box<dyn Clock + 'a>,
    date_locks: KeyedLock<NaiveDate>,
    goal_locks: KeyedLock<GoalId>,
}

impl<'a, Tz> AggregationOrchestrator<'a, Tz>
where
    Tz: TimeZone + Send + Sync,
{
    pub fn new(stores: Stores<'a>, tz: Tz) -> Self {
        Self {
            stores,
            tz,
            clock: Box::new(SystemClock),
            date_locks: KeyedLock::new(),
            goal_locks: KeyedLock::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Yesterday in the local calendar; the default scheduled run.
    pub fn default_date(&self) -> NaiveDate {
        crate::day::yesterday(&self.tz, self.clock.now())
    }

    /// Today in the local calendar.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.tz).date_naive()
    }

    /// Runs every stage for `date` and commits the result atomically.
    pub fn run_date(&self, date: NaiveDate) -> Result<DayReport, RunError> {
        self.run_one(date, Streaks::FromHistory)
    }

    fn run_one(&self, date: NaiveDate, streaks: Streaks) -> Result<DayReport, RunError> {
        let _guard = self.date_locks.lock(date);
        let attempted_at = self.clock.now();

        match self.run_locked(date, attempted_at, streaks) {
            Ok(report) => Ok(report),
            Err(err) => {
                tracing::warn!(%date, error = %error_chain(&err), retryable = err.is_retryable(), "aggregation failed");
                let run = AggregationRun {
                    date,
                    status: RunStatus::Failed,
                    attempted_at,
                    error: Some(error_chain(&err)),
                };
                if let Err(ledger_err) = self.stores.derived.record_run(&run) {
                    tracing::warn!(%date, error = %error_chain(&ledger_err), "failed to record failed run");
                }
                Err(err)
            }
        }
    }

    /// Runs every date in `range`, independent dates in parallel.
    ///
    /// Streaks are filled in after every date has committed, so they do not
    /// depend on the order in which the dates finished.
    pub fn run_range(&self, range: DateRange) -> RangeReport {
        let dates: Vec<NaiveDate> = range.days().collect();
        tracing::info!(start = %range.start, end = %range.end, days = dates.len(), "aggregating range");

        let results: Vec<(NaiveDate, Result<DayReport, RunError>)> = dates
            .into_par_iter()
            .map(|date| (date, self.run_one(date, Streaks::Deferred)))
            .collect();

        let mut report = RangeReport::default();
        for (date, result) in results {
            match result {
                Ok(day) => report.reports.push(day),
                Err(err) => report.failures.push((date, err)),
            }
        }

        if !report.reports.is_empty() {
            match self.habit_histories(range.end) {
                Ok(histories) => {
                    for day in &mut report.reports {
                        day.streaks = streaks_on(&histories, day.date);
                    }
                }
                Err(err) => {
                    tracing::warn!(end = %range.end, error = %error_chain(&err), "failed to read streak history");
                }
            }
        }
        report
    }

    /// Committed marks through `through` for every active habit.
    fn habit_histories(&self, through: NaiveDate) -> Result<Vec<HabitMarks>, AggregationError> {
        let habits = self
            .stores
            .habits
            .active_habits()
            .map_err(|source| read_error(through, "active habits", source))?;
        habits
            .into_iter()
            .map(|habit| -> Result<_, AggregationError> {
                let marks: Vec<(NaiveDate, bool)> = self
                    .stores
                    .habits
                    .habit_history(&habit.id, through)
                    .map_err(|source| read_error(through, "habit history", source))?
                    .into_iter()
                    .map(|r| (r.date, r.completed))
                    .collect();
                Ok((habit.id, marks))
            })
            .collect()
    }

    fn run_locked(
        &self,
        date: NaiveDate,
        attempted_at: DateTime<Utc>,
        streaks: Streaks,
    ) -> Result<DayReport, RunError> {
        let config = self.stores.config.scoring_config()?;
        let aggregate = self.aggregate(date)?;

        let score = match score_day(&aggregate, &config, &self.tz, attempted_at) {
            Ok(score) => Some(score),
            Err(InsufficientData { .. }) => None,
        };

        let (habit_records, streaks) = self.derive_habits(&aggregate, &config, streaks)?;

        let active_goals = self
            .stores
            .goals
            .active_goals()
            .map_err(|source| read_error(date, "active goals", source))?;
        let touched: Vec<&Goal> = if aggregate.has_activity() {
            active_goals
                .iter()
                .filter(|g| g.kind.day_contribution(&aggregate, &config).is_some())
                .collect()
        } else {
            Vec::new()
        };

        // Held through the commit so progress read here is what gets written
        let _goal_guard = self.goal_locks.lock_all(touched.iter().map(|g| g.id.clone()));
        let (goals, goal_contributions, completed_goals) =
            self.apply_goal_contributions(&touched, &aggregate, &config, attempted_at)?;

        let status = if score.is_some() {
            RunStatus::Aggregated
        } else {
            RunStatus::NoActivity
        };
        let day = DerivedDay {
            date,
            app_summaries: aggregate.app_summaries.clone(),
            unlock_summary: aggregate.unlock_summary,
            wellness_score: score.clone(),
            habit_records,
            goals,
            goal_contributions,
            run: AggregationRun {
                date,
                status,
                attempted_at,
                error: None,
            },
        };
        self.stores
            .derived
            .commit_day(&day)
            .map_err(|source| AggregationError::Commit { date, source })?;

        tracing::info!(%date, %status, apps = day.app_summaries.len(), "committed day");

        Ok(DayReport {
            date,
            outcome: score.map_or(DayOutcome::NoActivity, |score| DayOutcome::Scored { score }),
            apps: aggregate.app_summaries.len(),
            total_screen_time_ms: aggregate.total_screen_time_ms(),
            unlock_count: aggregate.unlock_summary.unlock_count,
            streaks,
            completed_goals,
        })
    }

    fn aggregate(&self, date: NaiveDate) -> Result<DayAggregate, AggregationError> {
        let window = DayWindow::for_date(&self.tz, date);
        let app_events = self
            .stores
            .events
            .read_app_events(window.start, window.end)
            .map_err(|source| read_error(date, "app events", source))?;
        let unlocks = self
            .stores
            .events
            .read_unlock_events(window.start, window.end)
            .map_err(|source| read_error(date, "unlock events", source))?;

        let outside = app_events
            .iter()
            .map(|e| e.timestamp)
            .chain(unlocks.iter().copied())
            .find(|ts| !window.contains(*ts));
        if let Some(ts) = outside {
            return Err(AggregationError::Inconsistent {
                date,
                message: format!(
                    "store returned event at {ts} outside [{}, {})",
                    window.start, window.end
                ),
            });
        }

        Ok(aggregate_day(window, &app_events, &unlocks))
    }

    fn derive_habits(
        &self,
        aggregate: &DayAggregate,
        config: &ScoringConfig,
        mode: Streaks,
    ) -> Result<(Vec<HabitRecord>, Vec<HabitStreak>), AggregationError> {
        let date = aggregate.date();
        let habits = self
            .stores
            .habits
            .active_habits()
            .map_err(|source| read_error(date, "active habits", source))?;

        let mut records = Vec::new();
        let mut streaks = Vec::with_capacity(habits.len());
        for habit in habits {
            let derived = habit
                .rule
                .filter(|_| aggregate.has_activity())
                .map(|rule| HabitRecord {
                    habit_id: habit.id.clone(),
                    date,
                    completed: rule.is_satisfied(aggregate, config, &self.tz),
                });
            if mode == Streaks::Deferred {
                records.extend(derived);
                continue;
            }

            let history = self
                .stores
                .habits
                .habit_history(&habit.id, date)
                .map_err(|source| read_error(date, "habit history", source))?;
            // The derived record replaces any stored one for the same date
            let marks = history
                .iter()
                .filter(|r| derived.is_none() || r.date != date)
                .chain(derived.iter())
                .map(|r| (r.date, r.completed));
            let state = StreakTracker::from_history(marks, date);

            streaks.push(HabitStreak {
                habit_id: habit.id.clone(),
                state,
            });
            records.extend(derived);
        }
        Ok((records, streaks))
    }

    fn apply_goal_contributions(
        &self,
        touched: &[&Goal],
        aggregate: &DayAggregate,
        config: &ScoringConfig,
        at: DateTime<Utc>,
    ) -> Result<(Vec<Goal>, Vec<GoalContribution>, Vec<GoalId>), RunError> {
        let date = aggregate.date();
        let mut goals = Vec::with_capacity(touched.len());
        let mut contributions = Vec::with_capacity(touched.len());
        let mut completed = Vec::new();

        for listed in touched {
            // Re-read under the lock; a concurrent run may have moved it
            let goal = self
                .stores
                .goals
                .goal(&listed.id)
                .map_err(|source| read_error(date, "goal", source))?
                .ok_or_else(|| GoalError::NotFound {
                    id: listed.id.clone(),
                })?;
            if !goal.is_active {
                continue;
            }
            let Some(value) = goal.kind.day_contribution(aggregate, config) else {
                continue;
            };
            let previous = self
                .stores
                .derived
                .goal_contribution(&goal.id, date)
                .map_err(|source| read_error(date, "goal contribution", source))?;

            let (update, contribution) = goal::apply_contribution(&goal, previous, value, date, at)?;
            tracing::debug!(goal = %goal.id, %date, applied = update.applied, "goal progress");
            if update.newly_completed {
                completed.push(goal.id.clone());
            }
            goals.push(update.goal);
            contributions.push(contribution);
        }
        Ok((goals, contributions, completed))
    }

    /// Adds a manual delta to a goal.
    pub fn apply_goal_delta(&self, id: &GoalId, delta: f64) -> Result<ProgressUpdate, UpdateError> {
        let _guard = self.goal_locks.lock(id.clone());
        let goal = self.load_goal(id)?;
        let update = goal::apply_delta(&goal, delta, self.clock.now())?;
        self.stores.goals.save_goal(&update.goal)?;
        Ok(update)
    }

    /// Clears a goal's progress and completion.
    pub fn reset_goal(&self, id: &GoalId) -> Result<Goal, UpdateError> {
        let _guard = self.goal_locks.lock(id.clone());
        let goal = self.load_goal(id)?;
        let cleared = goal::reset(&goal);
        self.stores.goals.save_goal(&cleared)?;
        tracing::info!(goal = %id, "goal reset");
        Ok(cleared)
    }

    fn load_goal(&self, id: &GoalId) -> Result<Goal, UpdateError> {
        self.stores
            .goals
            .goal(id)?
            .ok_or_else(|| GoalError::NotFound { id: id.clone() }.into())
    }

    /// Records manual completion of a habit for a day that has not yet elapsed.
    pub fn set_habit_record(
        &self,
        id: &HabitId,
        date: NaiveDate,
        completed: bool,
    ) -> Result<HabitRecord, UpdateError> {
        let _guard = self.date_locks.lock(date);
        let habit = self.load_habit(id)?;
        if !habit.is_active {
            return Err(HabitError::Inactive { id: id.clone() }.into());
        }
        ensure_day_open(id, date, self.today())?;

        let record = HabitRecord {
            habit_id: habit.id,
            date,
            completed,
        };
        self.stores.habits.put_habit_record(&record)?;
        Ok(record)
    }

    /// Streak through `through` and completion over `window` for one habit.
    ///
    /// Today is still open: without a record yet it does not break the
    /// streak, which then runs through yesterday.
    pub fn habit_progress(
        &self,
        id: &HabitId,
        through: NaiveDate,
        window: DateRange,
    ) -> Result<(StreakState, CompletionStats), UpdateError> {
        let habit = self.load_habit(id)?;
        let history = self.stores.habits.habit_history(&habit.id, through.max(window.end))?;
        let marks = || history.iter().map(|r| (r.date, r.completed));
        let streak_through = if through >= self.today() && !history.iter().any(|r| r.date == through) {
            through.pred_opt().unwrap_or(through)
        } else {
            through
        };
        Ok((
            StreakTracker::from_history(marks(), streak_through),
            completion_stats(marks(), window),
        ))
    }

    fn load_habit(&self, id: &HabitId) -> Result<Habit, UpdateError> {
        self.stores
            .habits
            .habit(id)?
            .ok_or_else(|| HabitError::NotFound { id: id.clone() }.into())
    }
}

/// A habit's committed `(date, completed)` marks.
type HabitMarks = (HabitId, Vec<(NaiveDate, bool)>);

/// When a single-date run computes its streaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Streaks {
    /// From stored history overlaid with the date's derived records.
    FromHistory,
    /// Left empty; the caller fills them in once every date has committed.
    Deferred,
}

fn streaks_on(histories: &[HabitMarks], date: NaiveDate) -> Vec<HabitStreak> {
    histories
        .iter()
        .map(|(habit_id, marks)| HabitStreak {
            habit_id: habit_id.clone(),
            state: StreakTracker::from_history(marks.iter().copied(), date),
        })
        .collect()
}

const fn read_error(date: NaiveDate, what: &'static str, source: StoreError) -> AggregationError {
    AggregationError::Read { date, what, source }
}
