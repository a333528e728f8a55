//! Composite wellness score.
//!
//! | Sub-score      | Points | Input                                        |
//! |----------------|--------|----------------------------------------------|
//! | time limit     | 0–40   | total screen time vs. the daily limit        |
//! | focus sessions | 0–20   | sessions at least `min_session_minutes` long |
//! | breaks         | 0–20   | gaps between usage of at least `min_break`   |
//! | sleep hygiene  | 0–20   | usage inside the pre-bedtime window          |
//!
//! The total is the plain sum, so it always lies in `[0, 100]`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::{DayAggregate, Interval, Session};
use crate::config::{BreakThresholds, DailyTimeLimit, FocusThresholds, ScoringConfig, SleepWindow};
use crate::day::local_to_utc;

pub const TIME_LIMIT_MAX: u32 = 40;
pub const FOCUS_SESSION_MAX: u32 = 20;
pub const BREAKS_MAX: u32 = 20;
pub const SLEEP_HYGIENE_MAX: u32 = 20;

/// Named band of the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellnessLevel {
    Sprout,
    Explorer,
    Balanced,
    Master,
}

impl WellnessLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sprout => "sprout",
            Self::Explorer => "explorer",
            Self::Balanced => "balanced",
            Self::Master => "master",
        }
    }
}

impl fmt::Display for WellnessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WellnessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sprout" => Ok(Self::Sprout),
            "explorer" => Ok(Self::Explorer),
            "balanced" => Ok(Self::Balanced),
            "master" => Ok(Self::Master),
            _ => Err(format!("invalid wellness level: {s}")),
        }
    }
}

/// The score for one date. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellnessScore {
    pub date: NaiveDate,
    pub total_score: u32,
    pub time_limit_score: u32,
    pub focus_session_score: u32,
    pub breaks_score: u32,
    pub sleep_hygiene_score: u32,
    pub level: WellnessLevel,
    pub calculated_at: DateTime<Utc>,
}

impl WellnessScore {
    /// True if both scores agree on everything except `calculated_at`.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.date == other.date
            && self.total_score == other.total_score
            && self.time_limit_score == other.time_limit_score
            && self.focus_session_score == other.focus_session_score
            && self.breaks_score == other.breaks_score
            && self.sleep_hygiene_score == other.sleep_hygiene_score
            && self.level == other.level
    }
}

/// No app activity was recorded for the date, so no score is produced.
///
/// This is the normal empty-day state, not a failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no activity recorded for {date}")]
pub struct InsufficientData {
    pub date: NaiveDate,
}

/// Scores one aggregated day.
///
/// `tz` anchors the configured bedtime on the local calendar. The result is
/// a pure function of the arguments.
pub fn score_day<Tz: TimeZone>(
    aggregate: &DayAggregate,
    config: &ScoringConfig,
    tz: &Tz,
    calculated_at: DateTime<Utc>,
) -> Result<WellnessScore, InsufficientData> {
    if !aggregate.has_activity() {
        return Err(InsufficientData {
            date: aggregate.date(),
        });
    }

    let usage = aggregate.usage_intervals();
    let time_limit_score = time_limit_score(aggregate.total_screen_time_ms(), &config.time_limit);
    let focus_session_score = focus_session_score(&aggregate.sessions, &config.focus);
    let breaks_score = breaks_score(&usage, &config.breaks);
    let sleep_interval = pre_sleep_interval(aggregate, &config.sleep, tz);
    let sleep_hygiene_score = sleep_hygiene_score(&usage, sleep_interval, &config.sleep);

    let total_score = time_limit_score + focus_session_score + breaks_score + sleep_hygiene_score;
    let level = config.levels.level_for(total_score);

    tracing::debug!(
        date = %aggregate.date(),
        total_score,
        time_limit_score,
        focus_session_score,
        breaks_score,
        sleep_hygiene_score,
        %level,
        "scored day"
    );

    Ok(WellnessScore {
        date: aggregate.date(),
        total_score,
        time_limit_score,
        focus_session_score,
        breaks_score,
        sleep_hygiene_score,
        level,
        calculated_at,
    })
}

/// `max × numerator / denominator`, rounded half up and clamped to `[0, max]`.
fn scaled_points(max: u32, numerator: i64, denominator: i64) -> u32 {
    if denominator <= 0 {
        return 0;
    }
    let numerator = numerator.clamp(0, denominator);
    let max_wide = i128::from(max);
    let points = (max_wide * i128::from(numerator) * 2 + i128::from(denominator))
        / (2 * i128::from(denominator));
    u32::try_from(points).unwrap_or(max).min(max)
}

/// Full marks at or under the limit, linear decay to zero at `limit × zero_multiple`.
pub fn time_limit_score(total_ms: i64, limit: &DailyTimeLimit) -> u32 {
    let limit_ms = limit.limit_ms();
    if total_ms <= limit_ms {
        return TIME_LIMIT_MAX;
    }
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        reason = "millisecond totals are far below f64 precision limits"
    )]
    let zero_ms = (limit_ms as f64 * limit.zero_multiple).round() as i64;
    if total_ms >= zero_ms {
        return 0;
    }
    scaled_points(TIME_LIMIT_MAX, zero_ms - total_ms, zero_ms - limit_ms)
}

/// Proportional to qualifying sessions, full marks at `session_cap`.
pub fn focus_session_score(sessions: &[Session], thresholds: &FocusThresholds) -> u32 {
    let min_ms = thresholds.min_session_ms();
    let qualifying = sessions.iter().filter(|s| s.duration_ms() >= min_ms).count();
    let cap = thresholds.session_cap;
    let counted = u32::try_from(qualifying).unwrap_or(cap).min(cap);
    scaled_points(FOCUS_SESSION_MAX, i64::from(counted), i64::from(cap))
}

/// Counts gaps between merged usage intervals of at least `min_break`.
pub fn count_breaks(usage: &[Interval], thresholds: &BreakThresholds) -> usize {
    let min_ms = thresholds.min_break_ms();
    usage
        .windows(2)
        .filter(|pair| (pair[1].start - pair[0].end).num_milliseconds() >= min_ms)
        .count()
}

/// Proportional to breaks, full marks at `break_cap`.
pub fn breaks_score(usage: &[Interval], thresholds: &BreakThresholds) -> u32 {
    let cap = thresholds.break_cap;
    let counted = u32::try_from(count_breaks(usage, thresholds))
        .unwrap_or(cap)
        .min(cap);
    scaled_points(BREAKS_MAX, i64::from(counted), i64::from(cap))
}

/// The window before the bedtime that ends the date's evening, clipped to the day.
pub fn pre_sleep_interval<Tz: TimeZone>(
    aggregate: &DayAggregate,
    sleep: &SleepWindow,
    tz: &Tz,
) -> Interval {
    let date = aggregate.date();
    let night = if sleep.bedtime_after_midnight() {
        date.succ_opt().unwrap_or(date)
    } else {
        date
    };
    let bedtime = local_to_utc(tz, night.and_time(sleep.bedtime));
    let start = bedtime - Duration::milliseconds(sleep.window_ms());
    let window = aggregate.window;
    Interval {
        start: window.clamp(start),
        end: window.clamp(bedtime),
    }
}

/// Full marks with no usage in the window, linear decay to zero at `zero_after`.
pub fn sleep_hygiene_score(usage: &[Interval], window: Interval, sleep: &SleepWindow) -> u32 {
    let used_ms: i64 = usage.iter().map(|i| i.overlap_ms(&window)).sum();
    if used_ms == 0 {
        return SLEEP_HYGIENE_MAX;
    }
    let zero_ms = sleep.zero_after_ms();
    scaled_points(SLEEP_HYGIENE_MAX, zero_ms - used_ms, zero_ms)
}
