use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dw_cli::commands::{aggregate, goals, habits, import, report, score, status};
use dw_cli::{Cli, Commands, Config, GoalsAction, HabitsAction};
use dw_core::orchestrator::Stores;
use dw_core::AggregationOrchestrator;
use dw_db::Database;

/// Load and validate config, then open the database, ensuring its directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    config
        .scoring
        .validate()
        .context("invalid scoring configuration")?;

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((db, config))
}

fn build_orchestrator<'a>(db: &'a Database, config: &'a Config) -> AggregationOrchestrator<'a, Local> {
    let stores = Stores {
        events: db,
        derived: db,
        goals: db,
        habits: db,
        config: &config.scoring,
    };
    AggregationOrchestrator::new(stores, Local)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (db, config) = open_database(cli.config.as_deref())?;
    let orchestrator = build_orchestrator(&db, &config);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Import => {
            let inserted = import::run(io::stdin().lock(), &db)?;
            writeln!(out, "Imported {inserted} new event(s)")?;
        }
        Commands::Aggregate(args) => aggregate::run(&mut out, &orchestrator, args)?,
        Commands::Score { date, json } => {
            let date = date.unwrap_or_else(|| orchestrator.default_date());
            score::run(&mut out, &db, date, *json)?;
        }
        Commands::Report { days, json } => {
            report::run(&mut out, &db, orchestrator.default_date(), *days, *json)?;
        }
        Commands::Goals(action) => match action {
            GoalsAction::Add {
                id,
                name,
                kind,
                target,
                max_unlocks,
            } => {
                let kind = goals::goal_kind(*kind, *max_unlocks)?;
                goals::add(&mut out, &db, id, name, kind, *target)?;
            }
            GoalsAction::List { json } => goals::list(&mut out, &db, *json)?,
            GoalsAction::Progress { id, delta } => goals::progress(&mut out, &orchestrator, id, *delta)?,
            GoalsAction::Reset { id } => goals::reset(&mut out, &orchestrator, id)?,
        },
        Commands::Habits(action) => match action {
            HabitsAction::Add {
                id,
                name,
                rule,
                minutes,
                count,
            } => {
                let rule = habits::habit_rule(*rule, *minutes, *count)?;
                habits::add(&mut out, &db, id, name, rule)?;
            }
            HabitsAction::List => habits::list(&mut out, &db)?,
            HabitsAction::Check { id, date, missed } => {
                habits::check(&mut out, &orchestrator, id, *date, !*missed)?;
            }
            HabitsAction::Streak { id, days } => habits::streak(&mut out, &orchestrator, id, *days)?,
        },
        Commands::Status => status::run(&mut out, &db, &config.database_path)?,
    }

    Ok(())
}
