//! Habits and their daily completion records.

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::DayAggregate;
use crate::config::ScoringConfig;
use crate::types::HabitId;
use crate::wellness::pre_sleep_interval;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HabitError {
    #[error("habit not found: {id}")]
    NotFound { id: HabitId },

    #[error("habit is inactive: {id}")]
    Inactive { id: HabitId },

    /// Manual records can only change while the day is still in progress.
    #[error("record for habit {id} on {date} can no longer be changed")]
    DayClosed { id: HabitId, date: NaiveDate },
}

/// A usage condition that completes a habit automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum HabitRule {
    ScreenTimeUnder { minutes: u32 },
    FocusSessionsAtLeast { count: u32 },
    NoUsageBeforeBed,
}

impl HabitRule {
    /// Whether the aggregated day satisfies the rule.
    pub fn is_satisfied<Tz: TimeZone>(
        &self,
        aggregate: &DayAggregate,
        config: &ScoringConfig,
        tz: &Tz,
    ) -> bool {
        match self {
            Self::ScreenTimeUnder { minutes } => {
                aggregate.total_screen_time_ms() < i64::from(*minutes) * 60_000
            }
            Self::FocusSessionsAtLeast { count } => {
                let min_ms = config.focus.min_session_ms();
                let focus = aggregate
                    .sessions
                    .iter()
                    .filter(|s| s.duration_ms() >= min_ms)
                    .count();
                focus >= usize::try_from(*count).unwrap_or(usize::MAX)
            }
            Self::NoUsageBeforeBed => {
                let window = pre_sleep_interval(aggregate, &config.sleep, tz);
                aggregate
                    .usage_intervals()
                    .iter()
                    .all(|i| i.overlap_ms(&window) == 0)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    /// When set, aggregation records completion for this habit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<HabitRule>,
    pub is_active: bool,
}

impl Habit {
    pub fn new(id: HabitId, name: impl Into<String>, rule: Option<HabitRule>) -> Self {
        Self {
            id,
            name: name.into(),
            rule,
            is_active: true,
        }
    }
}

/// Whether a habit was completed on a date. One per `(habit_id, date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitRecord {
    pub habit_id: HabitId,
    pub date: NaiveDate,
    pub completed: bool,
}

/// Checks that a manual record for `date` may still change on `today`.
pub fn ensure_day_open(id: &HabitId, date: NaiveDate, today: NaiveDate) -> Result<(), HabitError> {
    if date < today {
        return Err(HabitError::DayClosed {
            id: id.clone(),
            date,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_day;
    use crate::day::DayWindow;
    use crate::event::{AppEventKind, UsageEvent};
    use crate::types::PackageName;
    use chrono::{DateTime, Duration, NaiveTime, Utc};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn aggregate_with(start: DateTime<Utc>, minutes: i64) -> DayAggregate {
        let pkg = PackageName::new("com.example.video").unwrap();
        let events = vec![
            UsageEvent::new(pkg.clone(), AppEventKind::Open, start),
            UsageEvent::new(pkg, AppEventKind::Close, start + Duration::minutes(minutes)),
        ];
        aggregate_day(DayWindow::for_date(&Utc, date()), &events, &[])
    }

    #[test]
    fn screen_time_rule() {
        let agg = aggregate_with(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(), 45);
        let config = ScoringConfig::default();
        assert!(HabitRule::ScreenTimeUnder { minutes: 60 }.is_satisfied(&agg, &config, &Utc));
        assert!(!HabitRule::ScreenTimeUnder { minutes: 45 }.is_satisfied(&agg, &config, &Utc));
    }

    #[test]
    fn focus_rule_counts_long_sessions() {
        let agg = aggregate_with(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(), 45);
        let config = ScoringConfig::default();
        assert!(HabitRule::FocusSessionsAtLeast { count: 1 }.is_satisfied(&agg, &config, &Utc));
        assert!(!HabitRule::FocusSessionsAtLeast { count: 2 }.is_satisfied(&agg, &config, &Utc));
    }

    #[test]
    fn bedtime_rule_checks_window() {
        let config = ScoringConfig::default();
        let early = aggregate_with(Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap(), 30);
        assert!(HabitRule::NoUsageBeforeBed.is_satisfied(&early, &config, &Utc));
        let late = aggregate_with(Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap(), 30);
        assert!(!HabitRule::NoUsageBeforeBed.is_satisfied(&late, &config, &Utc));
    }

    #[test]
    fn bedtime_rule_handles_bedtime_after_midnight() {
        let mut config = ScoringConfig::default();
        config.sleep.bedtime = NaiveTime::from_hms_opt(0, 30, 0).unwrap();
        let late = aggregate_with(Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap(), 20);
        assert!(!HabitRule::NoUsageBeforeBed.is_satisfied(&late, &config, &Utc));
        let evening = aggregate_with(Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap(), 30);
        assert!(HabitRule::NoUsageBeforeBed.is_satisfied(&evening, &config, &Utc));
    }

    #[test]
    fn elapsed_days_are_closed() {
        let id = HabitId::new("h").unwrap();
        let today = date();
        assert!(ensure_day_open(&id, today, today).is_ok());
        assert!(ensure_day_open(&id, today.succ_opt().unwrap(), today).is_ok());
        assert_eq!(
            ensure_day_open(&id, today.pred_opt().unwrap(), today),
            Err(HabitError::DayClosed {
                id: id.clone(),
                date: today.pred_opt().unwrap()
            })
        );
    }

    #[test]
    fn rule_serializes_with_tag() {
        let rule = HabitRule::ScreenTimeUnder { minutes: 90 };
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(json, r#"{"rule":"screen_time_under","minutes":90}"#);
    }
}
