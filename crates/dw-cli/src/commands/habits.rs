//! Habit commands: create, list, record and show streaks.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};

use dw_core::{AggregationOrchestrator, DateRange, Habit, HabitId, HabitRule, HabitStore};

use crate::cli::HabitRuleArg;

/// Maps command-line arguments onto a habit rule.
pub fn habit_rule(rule: Option<HabitRuleArg>, minutes: Option<u32>, count: Option<u32>) -> Result<Option<HabitRule>> {
    let Some(rule) = rule else {
        return Ok(None);
    };
    Ok(Some(match rule {
        HabitRuleArg::ScreenTimeUnder => HabitRule::ScreenTimeUnder {
            minutes: minutes.context("--minutes is required for screen-time-under")?,
        },
        HabitRuleArg::FocusSessions => HabitRule::FocusSessionsAtLeast {
            count: count.context("--count is required for focus-sessions")?,
        },
        HabitRuleArg::NoUsageBeforeBed => HabitRule::NoUsageBeforeBed,
    }))
}

fn describe_rule(rule: Option<HabitRule>) -> String {
    match rule {
        None => "manual".to_string(),
        Some(HabitRule::ScreenTimeUnder { minutes }) => format!("screen time under {minutes}m"),
        Some(HabitRule::FocusSessionsAtLeast { count }) => format!("at least {count} focus sessions"),
        Some(HabitRule::NoUsageBeforeBed) => "no usage before bed".to_string(),
    }
}

pub fn add<W: Write>(
    writer: &mut W,
    store: &dyn HabitStore,
    id: &str,
    name: &str,
    rule: Option<HabitRule>,
) -> Result<Habit> {
    let habit = Habit::new(HabitId::new(id)?, name, rule);
    store
        .create_habit(&habit)
        .with_context(|| format!("failed to create habit {id}"))?;
    writeln!(writer, "Created habit {} ({})", habit.id, describe_rule(habit.rule))?;
    Ok(habit)
}

pub fn list<W: Write>(writer: &mut W, store: &dyn HabitStore) -> Result<()> {
    let habits = store.list_habits().context("failed to list habits")?;
    if habits.is_empty() {
        writeln!(writer, "No habits.")?;
        return Ok(());
    }
    for habit in &habits {
        let inactive = if habit.is_active { "" } else { "  [inactive]" };
        writeln!(
            writer,
            "{}  {}  ({}){inactive}",
            habit.id,
            habit.name,
            describe_rule(habit.rule)
        )?;
    }
    Ok(())
}

pub fn check<W: Write, Tz: TimeZone + Send + Sync>(
    writer: &mut W,
    orchestrator: &AggregationOrchestrator<'_, Tz>,
    id: &str,
    date: Option<NaiveDate>,
    completed: bool,
) -> Result<()> {
    let date = date.unwrap_or_else(|| orchestrator.today());
    let record = orchestrator.set_habit_record(&HabitId::new(id)?, date, completed)?;
    let verb = if record.completed { "completed" } else { "missed" };
    writeln!(writer, "Marked {} {verb} on {}", record.habit_id, record.date)?;
    Ok(())
}

pub fn streak<W: Write, Tz: TimeZone + Send + Sync>(
    writer: &mut W,
    orchestrator: &AggregationOrchestrator<'_, Tz>,
    id: &str,
    days: u32,
) -> Result<()> {
    let today = orchestrator.today();
    let window = DateRange::ending_at(today, days);
    let (state, stats) = orchestrator.habit_progress(&HabitId::new(id)?, today, window)?;

    writeln!(
        writer,
        "{id}: current streak {} day(s), best {} day(s)",
        state.current_streak, state.best_streak
    )?;
    match stats.rate {
        Some(rate) => writeln!(
            writer,
            "Completed {} of {} recorded day(s) since {} ({:.0}%)",
            stats.completed_days,
            stats.tracked_days,
            window.start,
            rate * 100.0
        )?,
        None => writeln!(writer, "No records since {}", window.start)?,
    }
    Ok(())
}
