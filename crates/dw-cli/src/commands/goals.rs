//! Goal commands: create, list, add manual progress and reset.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::TimeZone;

use dw_core::{AggregationOrchestrator, Goal, GoalId, GoalKind, GoalStore};

use super::util::progress_bar;
use crate::cli::GoalKindArg;

/// Maps command-line arguments onto a goal kind.
pub fn goal_kind(kind: GoalKindArg, max_unlocks: Option<u32>) -> Result<GoalKind> {
    Ok(match kind {
        GoalKindArg::ScreenTimeUnderLimit => GoalKind::ScreenTimeUnderLimit,
        GoalKindArg::FocusMinutes => GoalKind::FocusMinutes,
        GoalKindArg::FocusSessions => GoalKind::FocusSessions,
        GoalKindArg::UnlocksUnder => GoalKind::UnlocksUnder {
            max_unlocks: max_unlocks.context("--max-unlocks is required for unlocks-under goals")?,
        },
        GoalKindArg::Manual => GoalKind::Manual,
    })
}

pub fn add<W: Write>(
    writer: &mut W,
    store: &dyn GoalStore,
    id: &str,
    name: &str,
    kind: GoalKind,
    target: f64,
) -> Result<Goal> {
    let goal = Goal::new(GoalId::new(id)?, name, kind, target)?;
    store
        .create_goal(&goal)
        .with_context(|| format!("failed to create goal {id}"))?;
    writeln!(writer, "Created goal {} ({}, target {})", goal.id, goal.kind.as_str(), goal.target_value)?;
    Ok(goal)
}

fn format_goal(goal: &Goal) -> String {
    let mut line = format!(
        "{}  {} {:>3.0}%  {}/{}  {}",
        goal.id,
        progress_bar(goal.progress_ratio()),
        goal.progress_ratio() * 100.0,
        goal.current_value,
        goal.target_value,
        goal.name,
    );
    if let Some(at) = goal.completed_at {
        line.push_str(&format!("  [completed {}]", at.date_naive()));
    }
    if !goal.is_active {
        line.push_str("  [inactive]");
    }
    line
}

pub fn list<W: Write>(writer: &mut W, store: &dyn GoalStore, json: bool) -> Result<()> {
    let goals = store.list_goals().context("failed to list goals")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&goals)?)?;
        return Ok(());
    }
    if goals.is_empty() {
        writeln!(writer, "No goals.")?;
        return Ok(());
    }
    for goal in &goals {
        writeln!(writer, "{}", format_goal(goal))?;
    }
    Ok(())
}

pub fn progress<W: Write, Tz: TimeZone + Send + Sync>(
    writer: &mut W,
    orchestrator: &AggregationOrchestrator<'_, Tz>,
    id: &str,
    delta: f64,
) -> Result<()> {
    let update = orchestrator.apply_goal_delta(&GoalId::new(id)?, delta)?;
    writeln!(writer, "{}", format_goal(&update.goal))?;
    if update.newly_completed {
        writeln!(writer, "Goal {} completed!", update.goal.id)?;
    }
    Ok(())
}

pub fn reset<W: Write, Tz: TimeZone + Send + Sync>(
    writer: &mut W,
    orchestrator: &AggregationOrchestrator<'_, Tz>,
    id: &str,
) -> Result<()> {
    let goal = orchestrator.reset_goal(&GoalId::new(id)?)?;
    writeln!(writer, "Reset goal {}", goal.id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use dw_core::ScoringConfig;
    use dw_core::orchestrator::{FixedClock, Stores};
    use dw_db::Database;
    use insta::assert_snapshot;

    fn render<F: FnOnce(&mut Vec<u8>) -> Result<()>>(f: F) -> String {
        let mut output = Vec::new();
        f(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn unlocks_goal_needs_a_limit() {
        assert!(goal_kind(GoalKindArg::UnlocksUnder, None).is_err());
        assert_eq!(
            goal_kind(GoalKindArg::UnlocksUnder, Some(40)).unwrap(),
            GoalKind::UnlocksUnder { max_unlocks: 40 }
        );
    }

    #[test]
    fn add_rejects_bad_targets() {
        let db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        assert!(add(&mut output, &db, "read", "Read", GoalKind::Manual, 0.0).is_err());
        assert!(add(&mut output, &db, " read", "Read", GoalKind::Manual, 5.0).is_err());
    }

    #[test]
    fn manual_progress_flow() {
        let db = Database::open_in_memory().unwrap();
        let config = ScoringConfig::default();
        let now = Utc::now();
        let orchestrator = AggregationOrchestrator::new(
            Stores {
                events: &db,
                derived: &db,
                goals: &db,
                habits: &db,
                config: &config,
            },
            Utc,
        )
        .with_clock(FixedClock(now));

        render(|w| add(w, &db, "read", "Read books", GoalKind::Manual, 100.0).map(|_| ()));
        render(|w| add(w, &db, "focus", "Deep work", GoalKind::FocusMinutes, 600.0).map(|_| ()));
        let progressed = render(|w| progress(w, &orchestrator, "read", 90.0));
        assert_snapshot!(progressed, @"read  █████████░  90%  90/100  Read books");

        let completed = render(|w| progress(w, &orchestrator, "read", 20.0));
        assert!(completed.contains("Goal read completed!"));

        let listing = render(|w| list(w, &db, false));
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "focus  ░░░░░░░░░░   0%  0/600  Deep work");
        assert!(lines[1].starts_with("read  ██████████ 100%  110/100  Read books  [completed "));

        render(|w| reset(w, &orchestrator, "read"));
        let listing = render(|w| list(w, &db, false));
        assert!(listing.contains("read  ░░░░░░░░░░   0%  0/100  Read books\n"));
    }
}
