//! Score command: shows the stored wellness score of one date.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use dw_core::wellness::{BREAKS_MAX, FOCUS_SESSION_MAX, SLEEP_HYGIENE_MAX, TIME_LIMIT_MAX};
use dw_core::{DerivedStore, RunStatus};

pub fn run<W: Write>(writer: &mut W, store: &dyn DerivedStore, date: NaiveDate, json: bool) -> Result<()> {
    let score = store
        .wellness_score(date)
        .with_context(|| format!("failed to read score for {date}"))?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&score)?)?;
        return Ok(());
    }

    let Some(score) = score else {
        let run = store
            .last_run(date)
            .with_context(|| format!("failed to read run ledger for {date}"))?;
        match run {
            Some(run) if run.status == RunStatus::NoActivity => {
                writeln!(writer, "No activity recorded on {date}.")?;
            }
            Some(run) if run.status == RunStatus::Failed => {
                let error = run.error.as_deref().unwrap_or("unknown error");
                writeln!(writer, "Aggregation of {date} failed: {error}")?;
            }
            _ => {
                writeln!(writer, "{date} has not been aggregated. Run `dw aggregate --date {date}`.")?;
            }
        }
        return Ok(());
    };

    writeln!(writer, "Wellness score for {date}: {} ({})", score.total_score, score.level)?;
    writeln!(writer, "  time limit      {:>2}/{TIME_LIMIT_MAX}", score.time_limit_score)?;
    writeln!(writer, "  focus sessions  {:>2}/{FOCUS_SESSION_MAX}", score.focus_session_score)?;
    writeln!(writer, "  breaks          {:>2}/{BREAKS_MAX}", score.breaks_score)?;
    writeln!(writer, "  sleep hygiene   {:>2}/{SLEEP_HYGIENE_MAX}", score.sleep_hygiene_score)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use dw_core::{AggregationRun, WellnessLevel, WellnessScore};
    use dw_db::Database;
    use insta::assert_snapshot;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn render(db: &Database, json: bool) -> String {
        let mut output = Vec::new();
        run(&mut output, db, day(), json).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn score_breakdown() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_wellness_score(&WellnessScore {
            date: day(),
            total_score: 70,
            time_limit_score: 40,
            focus_session_score: 10,
            breaks_score: 0,
            sleep_hygiene_score: 20,
            level: WellnessLevel::Balanced,
            calculated_at: Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap(),
        })
        .unwrap();

        assert_snapshot!(render(&db, false), @r"
        Wellness score for 2024-01-01: 70 (balanced)
          time limit      40/40
          focus sessions  10/20
          breaks           0/20
          sleep hygiene   20/20
        ");
        assert!(render(&db, true).contains(r#""level": "balanced""#));
    }

    #[test]
    fn missing_score_explains_why() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(
            render(&db, false),
            "2024-01-01 has not been aggregated. Run `dw aggregate --date 2024-01-01`.\n"
        );
        assert_eq!(render(&db, true), "null\n");

        db.record_run(&AggregationRun {
            date: day(),
            status: RunStatus::NoActivity,
            attempted_at: Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap(),
            error: None,
        })
        .unwrap();
        assert_eq!(render(&db, false), "No activity recorded on 2024-01-01.\n");
    }
}
