//! Digital wellbeing CLI library.
//!
//! This crate provides the CLI interface for the digital wellbeing tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{AggregateArgs, Cli, Commands, GoalKindArg, GoalsAction, HabitRuleArg, HabitsAction};
pub use config::Config;
