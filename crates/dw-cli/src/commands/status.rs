//! Status command for showing stored data and the aggregation ledger.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use dw_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let status = db.status()?;

    writeln!(writer, "Digital wellbeing status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    match (status.first_event_at, status.last_event_at) {
        (Some(first), Some(last)) => {
            writeln!(writer, "Events: {} ({first} to {last})", status.event_count)?;
        }
        _ => {
            writeln!(writer, "No events recorded.")?;
            return Ok(());
        }
    }
    writeln!(writer, "Scored days: {}", status.scored_days)?;

    if let Some(run) = &status.last_run {
        writeln!(
            writer,
            "Last run: {} {} at {}",
            run.date, run.status, run.attempted_at
        )?;
    }
    if !status.failed_dates.is_empty() {
        let dates: Vec<String> = status.failed_dates.iter().map(ToString::to_string).collect();
        writeln!(writer, "Failed dates (retry with `dw aggregate`): {}", dates.join(", "))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, TimeZone, Utc};
    use dw_core::{AggregationRun, DerivedStore, EventStore, RawEvent, RunStatus};

    use insta::assert_snapshot;

    #[test]
    fn status_command_outputs_ledger() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("dw.db");
        let db = Database::open(&db_path).unwrap();

        db.append(&[
            RawEvent::Unlock {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
            },
            RawEvent::Unlock {
                timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap(),
            },
        ])
        .unwrap();
        db.record_run(&AggregationRun {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            status: RunStatus::Failed,
            attempted_at: Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap(),
            error: Some("failed to read app events for 2024-01-01".to_string()),
        })
        .unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &db_path).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&db_path.display().to_string(), "[TEMP]/dw.db");
        assert_snapshot!(output, @r"
        Digital wellbeing status
        Database: [TEMP]/dw.db
        Events: 2 (2024-01-01 08:00:00 UTC to 2024-01-02 09:30:00 UTC)
        Scored days: 0
        Last run: 2024-01-01 failed at 2024-01-02 06:00:00 UTC
        Failed dates (retry with `dw aggregate`): 2024-01-01
        ");
    }

    #[test]
    fn status_on_empty_database() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        run(&mut output, &db, Path::new("/data/dw.db")).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Digital wellbeing status\nDatabase: /data/dw.db\nNo events recorded.\n"
        );
    }
}
