//! Week-over-week style score trends.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::day::DateRange;
use crate::wellness::WellnessScore;

/// Average differences smaller than this are reported as stable.
pub const STABLE_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

impl TrendDirection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreTrend {
    pub current: DateRange,
    pub previous: DateRange,
    pub current_average: Option<f64>,
    pub previous_average: Option<f64>,
    pub direction: TrendDirection,
}

fn average(scores: &[WellnessScore], range: DateRange) -> Option<f64> {
    let totals: Vec<u32> = scores
        .iter()
        .filter(|s| range.contains(s.date))
        .map(|s| s.total_score)
        .collect();
    if totals.is_empty() {
        return None;
    }
    let sum: u32 = totals.iter().sum();
    let count = u32::try_from(totals.len()).unwrap_or(u32::MAX);
    Some(f64::from(sum) / f64::from(count))
}

/// Compares the `window_days` ending at `as_of` with the `window_days` before them.
///
/// Days without a score are left out of the averages rather than counted as zero.
pub fn score_trend(scores: &[WellnessScore], as_of: NaiveDate, window_days: u32) -> ScoreTrend {
    let current = DateRange::ending_at(as_of, window_days);
    let previous_end = current
        .start
        .checked_sub_days(Days::new(1))
        .unwrap_or(current.start);
    let previous = DateRange::ending_at(previous_end, window_days);

    let current_average = average(scores, current);
    let previous_average = average(scores, previous);
    let direction = match (current_average, previous_average) {
        (Some(now), Some(before)) if (now - before).abs() < STABLE_THRESHOLD => TrendDirection::Stable,
        (Some(now), Some(before)) if now > before => TrendDirection::Improving,
        (Some(_), Some(_)) => TrendDirection::Declining,
        _ => TrendDirection::InsufficientData,
    };

    ScoreTrend {
        current,
        previous,
        current_average,
        previous_average,
        direction,
    }
}
