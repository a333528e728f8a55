//! Report command: recent daily scores and their trend.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use dw_core::{DateRange, DerivedStore, ScoreTrend, WellnessScore, score_trend};

/// Computed report data.
#[derive(Debug, Serialize)]
pub struct ReportData {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub scores: Vec<WellnessScore>,
    pub average: Option<f64>,
    pub trend: ScoreTrend,
}

/// Loads the `days` ending at `as_of` plus the preceding window for the trend.
pub fn generate_report_data(store: &dyn DerivedStore, as_of: NaiveDate, days: u32) -> Result<ReportData> {
    let days = days.max(1);
    let window = DateRange::ending_at(as_of, days);
    let history = DateRange::ending_at(as_of, days.saturating_mul(2));
    let all = store
        .wellness_scores(history)
        .context("failed to read wellness scores")?;

    let trend = score_trend(&all, as_of, days);
    let scores: Vec<WellnessScore> = all.into_iter().filter(|s| window.contains(s.date)).collect();

    Ok(ReportData {
        start: window.start,
        end: window.end,
        average: trend.current_average,
        scores,
        trend,
    })
}

pub fn format_report(data: &ReportData) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let _ = writeln!(out, "Wellness report {} to {}", data.start, data.end);
    let range = DateRange::new(data.start, data.end);
    for date in range.days() {
        match data.scores.iter().find(|s| s.date == date) {
            Some(score) => {
                let _ = writeln!(out, "{date}  {:>3}  {}", score.total_score, score.level);
            }
            None => {
                let _ = writeln!(out, "{date}    -");
            }
        }
    }
    match data.average {
        Some(avg) => {
            let _ = writeln!(out, "Average: {avg:.1} over {} scored day(s)", data.scores.len());
        }
        None => {
            let _ = writeln!(out, "Average: no scored days");
        }
    }
    let trend = &data.trend;
    match (trend.current_average, trend.previous_average) {
        (Some(now), Some(before)) => {
            let _ = writeln!(out, "Trend: {} ({now:.1} vs {before:.1})", trend.direction);
        }
        _ => {
            let _ = writeln!(out, "Trend: {}", trend.direction);
        }
    }
    out
}

pub fn run<W: Write>(
    writer: &mut W,
    store: &dyn DerivedStore,
    as_of: NaiveDate,
    days: u32,
    json: bool,
) -> Result<()> {
    let data = generate_report_data(store, as_of, days)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&data)?)?;
    } else {
        write!(writer, "{}", format_report(&data))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use dw_core::{TrendDirection, WellnessLevel};
    use dw_db::Database;
    use insta::assert_snapshot;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, n).unwrap()
    }

    fn seed(db: &Database, n: u32, total: u32, level: WellnessLevel) {
        db.upsert_wellness_score(&WellnessScore {
            date: day(n),
            total_score: total,
            time_limit_score: 40,
            focus_session_score: 0,
            breaks_score: 0,
            sleep_hygiene_score: 0,
            level,
            calculated_at: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
        })
        .unwrap();
    }

    #[test]
    fn test_report_with_trend() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 1, 50, WellnessLevel::Explorer);
        seed(&db, 2, 54, WellnessLevel::Explorer);
        seed(&db, 4, 70, WellnessLevel::Balanced);
        seed(&db, 6, 84, WellnessLevel::Master);

        let data = generate_report_data(&db, day(6), 3).unwrap();
        assert_eq!(data.trend.direction, TrendDirection::Improving);
        assert_snapshot!(format_report(&data), @r"
        Wellness report 2024-01-04 to 2024-01-06
        2024-01-04   70  balanced
        2024-01-05    -
        2024-01-06   84  master
        Average: 77.0 over 2 scored day(s)
        Trend: improving (77.0 vs 52.0)
        ");
    }

    #[test]
    fn test_report_empty_period() {
        let db = Database::open_in_memory().unwrap();
        let data = generate_report_data(&db, day(6), 2).unwrap();
        assert_snapshot!(format_report(&data), @r"
        Wellness report 2024-01-05 to 2024-01-06
        2024-01-05    -
        2024-01-06    -
        Average: no scored days
        Trend: insufficient_data
        ");
    }

    #[test]
    fn test_report_json() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, 6, 84, WellnessLevel::Master);
        let mut output = Vec::new();
        run(&mut output, &db, day(6), 1, true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value["scores"][0]["total_score"], 84);
        assert_eq!(value["trend"]["direction"], "insufficient_data");
    }
}
