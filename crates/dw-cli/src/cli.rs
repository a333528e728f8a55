//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Digital wellbeing tracker.
///
/// Aggregates raw app usage and unlock events into daily summaries, wellness
/// scores, goal progress and habit streaks.
#[derive(Debug, Parser)]
#[command(name = "dw", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import raw events as JSON lines from stdin.
    Import,

    /// Aggregate and score one date or a range of dates.
    Aggregate(AggregateArgs),

    /// Show the wellness score of a date.
    Score {
        /// Date to show (default: yesterday).
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show recent scores and their trend.
    Report {
        /// Number of days in the report window.
        #[arg(long, default_value_t = 7)]
        days: u32,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage goals.
    #[command(subcommand)]
    Goals(GoalsAction),

    /// Manage habits.
    #[command(subcommand)]
    Habits(HabitsAction),

    /// Show stored data and recent aggregation runs.
    Status,
}

#[derive(Debug, Args)]
pub struct AggregateArgs {
    /// Single date to aggregate (default: yesterday).
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub date: Option<NaiveDate>,

    /// First date of a backfill range.
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,

    /// Last date of a backfill range (inclusive).
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,
}

/// Goal kinds accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GoalKindArg {
    /// Minutes left under the daily limit.
    ScreenTimeUnderLimit,
    /// Minutes spent in focus sessions.
    FocusMinutes,
    /// Number of focus sessions.
    FocusSessions,
    /// Days with at most `--max-unlocks` unlocks.
    UnlocksUnder,
    /// Only changed with `goals progress`.
    Manual,
}

#[derive(Debug, Subcommand)]
pub enum GoalsAction {
    /// Create a goal.
    Add {
        /// Unique goal id.
        id: String,

        /// Display name.
        #[arg(long)]
        name: String,

        #[arg(long, value_enum)]
        kind: GoalKindArg,

        /// Target value.
        #[arg(long)]
        target: f64,

        /// Unlock limit for `unlocks-under` goals.
        #[arg(long, required_if_eq("kind", "unlocks-under"))]
        max_unlocks: Option<u32>,
    },

    /// List goals.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add manual progress to a goal.
    Progress {
        id: String,

        /// Amount to add.
        delta: f64,
    },

    /// Clear a goal's progress.
    Reset { id: String },
}

/// Habit rules accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HabitRuleArg {
    /// Total screen time under `--minutes`.
    ScreenTimeUnder,
    /// At least `--count` focus sessions.
    FocusSessions,
    /// No usage in the window before bedtime.
    NoUsageBeforeBed,
}

#[derive(Debug, Subcommand)]
pub enum HabitsAction {
    /// Create a habit.
    Add {
        /// Unique habit id.
        id: String,

        /// Display name.
        #[arg(long)]
        name: String,

        /// Rule that completes the habit automatically during aggregation.
        #[arg(long, value_enum)]
        rule: Option<HabitRuleArg>,

        /// Minutes for `screen-time-under`.
        #[arg(long, required_if_eq("rule", "screen-time-under"))]
        minutes: Option<u32>,

        /// Session count for `focus-sessions`.
        #[arg(long, required_if_eq("rule", "focus-sessions"))]
        count: Option<u32>,
    },

    /// List habits.
    List,

    /// Record a habit for today or a later date.
    Check {
        id: String,

        /// Date to record (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Record the day as missed instead of completed.
        #[arg(long)]
        missed: bool,
    },

    /// Show the current streak and completion rate.
    Streak {
        id: String,

        /// Number of days for the completion rate.
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}
