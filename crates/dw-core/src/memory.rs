//! In-memory store for orchestrator tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use crate::aggregate::{AppDailySummary, DailyUnlockSummary};
use crate::day::DateRange;
use crate::event::{RawEvent, UsageEvent};
use crate::goal::Goal;
use crate::habit::{Habit, HabitRecord};
use crate::store::{AggregationRun, DerivedDay, DerivedStore, EventStore, GoalStore, HabitStore, StoreError};
use crate::types::{GoalId, HabitId, PackageName};
use crate::wellness::WellnessScore;

#[derive(Default)]
struct Inner {
    events: Vec<RawEvent>,
    apps: BTreeMap<(NaiveDate, PackageName), AppDailySummary>,
    unlocks: BTreeMap<NaiveDate, DailyUnlockSummary>,
    scores: BTreeMap<NaiveDate, WellnessScore>,
    runs: BTreeMap<NaiveDate, AggregationRun>,
    goals: BTreeMap<GoalId, Goal>,
    contributions: BTreeMap<(GoalId, NaiveDate), f64>,
    habits: BTreeMap<HabitId, Habit>,
    records: BTreeMap<(HabitId, NaiveDate), HabitRecord>,
    fail_all_reads: bool,
    fail_read_dates: HashSet<NaiveDate>,
    fail_commits: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.with(|i| i.fail_all_reads = fail);
    }

    pub fn fail_reads_for(&self, date: NaiveDate) {
        self.with(|i| i.fail_read_dates.insert(date));
    }

    pub fn fail_commits(&self, fail: bool) {
        self.with(|i| i.fail_commits = fail);
    }

    pub fn remove_package_events(&self, package: &PackageName) {
        self.with(|i| {
            i.events.retain(|e| match e {
                RawEvent::App { package_name, .. } => package_name != package,
                RawEvent::Unlock { .. } => true,
            });
        });
    }

    fn check_read(inner: &Inner, start: DateTime<Utc>) -> Result<(), StoreError> {
        if inner.fail_all_reads || inner.fail_read_dates.contains(&start.date_naive()) {
            return Err(StoreError::new("read", "simulated read failure"));
        }
        Ok(())
    }
}

impl EventStore for MemoryStore {
    fn read_app_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UsageEvent>, StoreError> {
        self.with(|i| {
            Self::check_read(i, start)?;
            let mut events: Vec<UsageEvent> = i
                .events
                .iter()
                .filter_map(|e| match e {
                    RawEvent::App {
                        package_name,
                        kind,
                        timestamp,
                    } if *timestamp >= start && *timestamp < end => {
                        Some(UsageEvent::new(package_name.clone(), *kind, *timestamp))
                    }
                    _ => None,
                })
                .collect();
            events.sort_by_key(|e| e.timestamp);
            Ok(events)
        })
    }

    fn read_unlock_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>, StoreError> {
        self.with(|i| {
            Self::check_read(i, start)?;
            let mut unlocks: Vec<DateTime<Utc>> = i
                .events
                .iter()
                .filter_map(|e| match e {
                    RawEvent::Unlock { timestamp } if *timestamp >= start && *timestamp < end => Some(*timestamp),
                    _ => None,
                })
                .collect();
            unlocks.sort();
            Ok(unlocks)
        })
    }

    fn append(&self, events: &[RawEvent]) -> Result<usize, StoreError> {
        Ok(self.with(|i| {
            let mut inserted = 0;
            for event in events {
                if !i.events.contains(event) {
                    i.events.push(event.clone());
                    inserted += 1;
                }
            }
            inserted
        }))
    }
}

impl DerivedStore for MemoryStore {
    fn commit_day(&self, day: &DerivedDay) -> Result<(), StoreError> {
        self.with(|i| {
            if i.fail_commits {
                return Err(StoreError::new("commit_day", "simulated commit failure"));
            }
            i.apps.retain(|(date, _), _| *date != day.date);
            for summary in &day.app_summaries {
                i.apps
                    .insert((summary.date, summary.package_name.clone()), summary.clone());
            }
            i.unlocks.insert(day.date, day.unlock_summary);
            match &day.wellness_score {
                Some(score) => {
                    let keep = i.scores.get(&day.date).is_some_and(|old| old.same_content(score));
                    if !keep {
                        i.scores.insert(day.date, score.clone());
                    }
                }
                None => {
                    i.scores.remove(&day.date);
                }
            }
            for record in &day.habit_records {
                i.records
                    .insert((record.habit_id.clone(), record.date), record.clone());
            }
            for goal in &day.goals {
                i.goals.insert(goal.id.clone(), goal.clone());
            }
            for c in &day.goal_contributions {
                i.contributions.insert((c.goal_id.clone(), c.date), c.value);
            }
            i.runs.insert(day.date, day.run.clone());
            Ok(())
        })
    }

    fn upsert_app_summaries(&self, summaries: &[AppDailySummary]) -> Result<(), StoreError> {
        self.with(|i| {
            for s in summaries {
                i.apps.insert((s.date, s.package_name.clone()), s.clone());
            }
        });
        Ok(())
    }

    fn upsert_unlock_summary(&self, summary: &DailyUnlockSummary) -> Result<(), StoreError> {
        self.with(|i| i.unlocks.insert(summary.date, *summary));
        Ok(())
    }

    fn upsert_wellness_score(&self, score: &WellnessScore) -> Result<(), StoreError> {
        self.with(|i| i.scores.insert(score.date, score.clone()));
        Ok(())
    }

    fn record_run(&self, run: &AggregationRun) -> Result<(), StoreError> {
        self.with(|i| i.runs.insert(run.date, run.clone()));
        Ok(())
    }

    fn last_run(&self, date: NaiveDate) -> Result<Option<AggregationRun>, StoreError> {
        Ok(self.with(|i| i.runs.get(&date).cloned()))
    }

    fn app_summaries(&self, date: NaiveDate) -> Result<Vec<AppDailySummary>, StoreError> {
        Ok(self.with(|i| {
            i.apps
                .iter()
                .filter(|((d, _), _)| *d == date)
                .map(|(_, s)| s.clone())
                .collect()
        }))
    }

    fn unlock_summary(&self, date: NaiveDate) -> Result<Option<DailyUnlockSummary>, StoreError> {
        Ok(self.with(|i| i.unlocks.get(&date).copied()))
    }

    fn wellness_score(&self, date: NaiveDate) -> Result<Option<WellnessScore>, StoreError> {
        Ok(self.with(|i| i.scores.get(&date).cloned()))
    }

    fn wellness_scores(&self, range: DateRange) -> Result<Vec<WellnessScore>, StoreError> {
        Ok(self.with(|i| i.scores.range(range.start..=range.end).map(|(_, s)| s.clone()).collect()))
    }

    fn goal_contribution(&self, goal_id: &GoalId, date: NaiveDate) -> Result<Option<f64>, StoreError> {
        Ok(self.with(|i| i.contributions.get(&(goal_id.clone(), date)).copied()))
    }
}

impl GoalStore for MemoryStore {
    fn create_goal(&self, goal: &Goal) -> Result<(), StoreError> {
        self.save_goal(goal)
    }

    fn goal(&self, id: &GoalId) -> Result<Option<Goal>, StoreError> {
        Ok(self.with(|i| i.goals.get(id).cloned()))
    }

    fn list_goals(&self) -> Result<Vec<Goal>, StoreError> {
        Ok(self.with(|i| i.goals.values().cloned().collect()))
    }

    fn active_goals(&self) -> Result<Vec<Goal>, StoreError> {
        Ok(self.with(|i| i.goals.values().filter(|g| g.is_active).cloned().collect()))
    }

    fn save_goal(&self, goal: &Goal) -> Result<(), StoreError> {
        self.with(|i| i.goals.insert(goal.id.clone(), goal.clone()));
        Ok(())
    }
}

impl HabitStore for MemoryStore {
    fn create_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        self.with(|i| i.habits.insert(habit.id.clone(), habit.clone()));
        Ok(())
    }

    fn habit(&self, id: &HabitId) -> Result<Option<Habit>, StoreError> {
        Ok(self.with(|i| i.habits.get(id).cloned()))
    }

    fn list_habits(&self) -> Result<Vec<Habit>, StoreError> {
        Ok(self.with(|i| i.habits.values().cloned().collect()))
    }

    fn active_habits(&self) -> Result<Vec<Habit>, StoreError> {
        Ok(self.with(|i| i.habits.values().filter(|h| h.is_active).cloned().collect()))
    }

    fn habit_records(&self, id: &HabitId, range: DateRange) -> Result<Vec<HabitRecord>, StoreError> {
        Ok(self.with(|i| {
            i.records
                .values()
                .filter(|r| &r.habit_id == id && range.contains(r.date))
                .cloned()
                .collect()
        }))
    }

    fn habit_history(&self, id: &HabitId, through: NaiveDate) -> Result<Vec<HabitRecord>, StoreError> {
        Ok(self.with(|i| {
            i.records
                .values()
                .filter(|r| &r.habit_id == id && r.date <= through)
                .cloned()
                .collect()
        }))
    }

    fn put_habit_record(&self, record: &HabitRecord) -> Result<(), StoreError> {
        self.with(|i| i.records.insert((record.habit_id.clone(), record.date), record.clone()));
        Ok(())
    }
}
