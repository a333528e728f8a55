//! Aggregate command: runs the daily pipeline for one date or a backfill range.

use std::io::Write;

use anyhow::Result;
use chrono::{NaiveDate, TimeZone};

use dw_core::orchestrator::HabitStreak;
use dw_core::{AggregationOrchestrator, DateRange, DayOutcome, DayReport, RangeReport, RunError, error_chain};

use super::util::format_duration;
use crate::cli::AggregateArgs;

/// Dates covered by the arguments; defaults to the orchestrator's scheduled date.
pub fn resolve_range<Tz: TimeZone + Send + Sync>(
    args: &AggregateArgs,
    orchestrator: &AggregationOrchestrator<'_, Tz>,
) -> DateRange {
    match (args.from, args.to) {
        (Some(from), Some(to)) => DateRange::new(from, to),
        _ => DateRange::single(args.date.unwrap_or_else(|| orchestrator.default_date())),
    }
}

pub fn run<W: Write, Tz: TimeZone + Send + Sync>(
    writer: &mut W,
    orchestrator: &AggregationOrchestrator<'_, Tz>,
    args: &AggregateArgs,
) -> Result<()> {
    let range = resolve_range(args, orchestrator);
    let report = orchestrator.run_range(range);
    write_report(writer, &report)?;

    if !report.is_success() {
        anyhow::bail!(
            "{} of {} dates failed to aggregate",
            report.failures.len(),
            range.len()
        );
    }
    Ok(())
}

enum Line<'a> {
    Done(&'a DayReport),
    Failed(NaiveDate, &'a RunError),
}

impl Line<'_> {
    const fn date(&self) -> NaiveDate {
        match self {
            Self::Done(report) => report.date,
            Self::Failed(date, _) => *date,
        }
    }
}

fn write_report<W: Write>(writer: &mut W, report: &RangeReport) -> Result<()> {
    let mut lines: Vec<Line<'_>> = report
        .reports
        .iter()
        .map(Line::Done)
        .chain(report.failures.iter().map(|(date, err)| Line::Failed(*date, err)))
        .collect();
    lines.sort_by_key(Line::date);

    let mut scored = 0;
    let mut idle = 0;
    for line in &lines {
        match line {
            Line::Done(day) => {
                match &day.outcome {
                    DayOutcome::Scored { score } => {
                        scored += 1;
                        writeln!(
                            writer,
                            "{}  scored {} ({})  screen {}  apps {}  unlocks {}",
                            day.date,
                            score.total_score,
                            score.level,
                            format_duration(day.total_screen_time_ms),
                            day.apps,
                            day.unlock_count,
                        )?;
                    }
                    DayOutcome::NoActivity => {
                        idle += 1;
                        writeln!(writer, "{}  no activity  unlocks {}", day.date, day.unlock_count)?;
                    }
                }
                for HabitStreak { habit_id, state } in &day.streaks {
                    writeln!(
                        writer,
                        "    habit {habit_id}: streak {} (best {})",
                        state.current_streak, state.best_streak
                    )?;
                }
                for goal in &day.completed_goals {
                    writeln!(writer, "    goal completed: {goal}")?;
                }
            }
            Line::Failed(date, err) => {
                let hint = if err.is_retryable() { " (retryable)" } else { "" };
                writeln!(writer, "{date}  failed: {}{hint}", error_chain(*err))?;
            }
        }
    }
    writeln!(
        writer,
        "Aggregated {} date(s): {scored} scored, {idle} without activity, {} failed",
        lines.len(),
        report.failures.len()
    )?;
    Ok(())
}
