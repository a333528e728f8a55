//! Storage layer for digital wellbeing tracking.
//!
//! Implements the `dw-core` store traits over a single `rusqlite` connection.
//!
//! # Thread Safety
//!
//! A `rusqlite::Connection` is `Send` but not `Sync`, so [`Database`] keeps it
//! behind a `Mutex`. Parallel aggregation runs share one `Database` and take
//! turns on the connection; each derived-row commit is a single transaction.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 with millisecond precision and a
//! `Z` suffix (e.g., `2024-01-15T10:30:00.000Z`), so lexicographic ordering
//! matches chronological ordering. Dates are stored as `YYYY-MM-DD`.
//!
//! ## Raw Events
//!
//! `usage_events` is append-only. Event ids are v5 UUIDs of the event content,
//! so re-importing the same export inserts nothing.
//!
//! ## Derived Rows
//!
//! Everything else except `goals`, `habits` and manual habit records is
//! derived by aggregation and replaced per date inside one transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use dw_core::aggregate::{AppDailySummary, DailyUnlockSummary};
use dw_core::day::DateRange;
use dw_core::event::{AppEventKind, RawEvent, UsageEvent};
use dw_core::goal::{Goal, GoalKind};
use dw_core::habit::{Habit, HabitRecord, HabitRule};
use dw_core::store::{
    AggregationRun, DerivedDay, DerivedStore, EventStore, GoalStore, HabitStore, RunStatus, StoreError,
};
use dw_core::types::{GoalId, HabitId, PackageName};
use dw_core::wellness::WellnessScore;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use uuid::Uuid;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored date or timestamp could not be parsed.
    #[error("invalid {column} value: {value}")]
    TimestampParse {
        column: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored value is not valid for its column.
    #[error("invalid {column} value {value:?}: {message}")]
    InvalidValue {
        column: &'static str,
        value: String,
        message: String,
    },
    /// A JSON column could not be encoded or decoded.
    #[error("invalid JSON column: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

/// Overview of what the database holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbStatus {
    pub event_count: u64,
    pub first_event_at: Option<DateTime<Utc>>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub scored_days: u64,
    pub last_run: Option<AggregationRun>,
    /// Dates whose most recent run failed, ascending.
    pub failed_dates: Vec<NaiveDate>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction drops the transaction, which rolls it back
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "
            -- Raw signals: type is 'open', 'close' or 'unlock'
            CREATE TABLE IF NOT EXISTS usage_events (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                type TEXT NOT NULL,
                package_name TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_usage_events_timestamp ON usage_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_usage_events_type ON usage_events(type);

            CREATE TABLE IF NOT EXISTS app_daily_summaries (
                date TEXT NOT NULL,
                package_name TEXT NOT NULL,
                total_duration_ms INTEGER NOT NULL,
                open_count INTEGER NOT NULL,
                last_opened_at TEXT,
                PRIMARY KEY (date, package_name)
            );

            CREATE TABLE IF NOT EXISTS daily_unlock_summaries (
                date TEXT PRIMARY KEY,
                unlock_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wellness_scores (
                date TEXT PRIMARY KEY,
                total_score INTEGER NOT NULL,
                time_limit_score INTEGER NOT NULL,
                focus_session_score INTEGER NOT NULL,
                breaks_score INTEGER NOT NULL,
                sleep_hygiene_score INTEGER NOT NULL,
                level TEXT NOT NULL,
                calculated_at TEXT NOT NULL
            );

            -- kind: JSON-encoded GoalKind
            CREATE TABLE IF NOT EXISTS goals (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                target_value REAL NOT NULL,
                current_value REAL NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS goal_contributions (
                goal_id TEXT NOT NULL,
                date TEXT NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (goal_id, date),
                FOREIGN KEY (goal_id) REFERENCES goals(id) ON DELETE CASCADE
            );

            -- rule: JSON-encoded HabitRule, NULL for manual habits
            CREATE TABLE IF NOT EXISTS habits (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                rule TEXT,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS habit_records (
                habit_id TEXT NOT NULL,
                date TEXT NOT NULL,
                completed INTEGER NOT NULL,
                PRIMARY KEY (habit_id, date),
                FOREIGN KEY (habit_id) REFERENCES habits(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS aggregation_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                status TEXT NOT NULL,
                attempted_at TEXT NOT NULL,
                error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_aggregation_runs_date ON aggregation_runs(date);
            ",
        )?;
        Ok(())
    }

    /// Inserts a batch of raw events, ignoring duplicates by content.
    pub fn insert_events(&self, events: &[RawEvent]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO usage_events (id, timestamp, type, package_name)
                VALUES (?, ?, ?, ?)
                ",
            )?;
            for event in events {
                let timestamp = format_timestamp(event.timestamp());
                let (kind, package) = match event {
                    RawEvent::App {
                        package_name, kind, ..
                    } => (kind.as_str(), Some(package_name.as_str())),
                    RawEvent::Unlock { .. } => ("unlock", None),
                };
                let id = deterministic_event_id(kind, package.unwrap_or(""), &timestamp);
                inserted += stmt.execute(params![id, timestamp, kind, package])?;
            }
        }
        tx.commit()?;
        tracing::debug!(received = events.len(), inserted, "inserted usage events");
        Ok(inserted)
    }

    /// Lists app events within a time range, ordered by timestamp then insertion.
    ///
    /// The range is inclusive of `start` and exclusive of `end`.
    pub fn app_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT type, package_name, timestamp
            FROM usage_events
            WHERE type IN ('open', 'close') AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC, rowid ASC
            ",
        )?;
        let rows = stmt.query_map([format_timestamp(start), format_timestamp(end)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (kind, package, timestamp) = row?;
            let kind: AppEventKind = kind.parse().map_err(|err: dw_core::UnknownEventKind| {
                DbError::InvalidValue {
                    column: "usage_events.type",
                    value: kind.clone(),
                    message: err.to_string(),
                }
            })?;
            let package = package.unwrap_or_default();
            events.push(UsageEvent::new(
                parse_package(&package)?,
                kind,
                parse_timestamp(&timestamp, "usage_events.timestamp")?,
            ));
        }
        Ok(events)
    }

    /// Lists unlock timestamps within a time range, ascending.
    pub fn unlocks_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT timestamp
            FROM usage_events
            WHERE type = 'unlock' AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC
            ",
        )?;
        let rows = stmt.query_map([format_timestamp(start), format_timestamp(end)], |row| {
            row.get::<_, String>(0)
        })?;
        let mut unlocks = Vec::new();
        for row in rows {
            unlocks.push(parse_timestamp(&row?, "usage_events.timestamp")?);
        }
        Ok(unlocks)
    }

    /// Summarizes stored events and aggregation runs.
    pub fn status(&self) -> Result<DbStatus, DbError> {
        let conn = self.conn();
        let (event_count, first, last): (i64, Option<String>, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM usage_events",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let scored_days: i64 =
            conn.query_row("SELECT COUNT(*) FROM wellness_scores", [], |row| row.get(0))?;

        let last_run = conn
            .query_row(
                "
                SELECT date, status, attempted_at, error
                FROM aggregation_runs
                ORDER BY id DESC
                LIMIT 1
                ",
                [],
                run_row,
            )
            .optional()?
            .map(parse_run)
            .transpose()?;

        let mut stmt = conn.prepare(
            "
            SELECT r.date
            FROM aggregation_runs r
            WHERE r.status = 'failed'
              AND r.id = (SELECT MAX(id) FROM aggregation_runs WHERE date = r.date)
            ORDER BY r.date ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut failed_dates = Vec::new();
        for row in rows {
            failed_dates.push(parse_date(&row?, "aggregation_runs.date")?);
        }

        Ok(DbStatus {
            event_count: u64::try_from(event_count).unwrap_or(0),
            first_event_at: first
                .map(|ts| parse_timestamp(&ts, "usage_events.timestamp"))
                .transpose()?,
            last_event_at: last
                .map(|ts| parse_timestamp(&ts, "usage_events.timestamp"))
                .transpose()?,
            scored_days: u64::try_from(scored_days).unwrap_or(0),
            last_run,
            failed_dates,
        })
    }

    /// Writes every derived row of a date in one transaction.
    pub fn commit_derived_day(&self, day: &DerivedDay) -> Result<(), DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let date = format_date(day.date);

        tx.execute("DELETE FROM app_daily_summaries WHERE date = ?", [&date])?;
        write_app_summaries(&tx, &day.app_summaries)?;
        write_unlock_summary(&tx, &day.unlock_summary)?;

        match &day.wellness_score {
            Some(score) => {
                let unchanged = read_wellness_score(&tx, day.date)?
                    .is_some_and(|stored| stored.same_content(score));
                if !unchanged {
                    write_wellness_score(&tx, score)?;
                }
            }
            None => {
                tx.execute("DELETE FROM wellness_scores WHERE date = ?", [&date])?;
            }
        }

        for record in &day.habit_records {
            write_habit_record(&tx, record)?;
        }
        for goal in &day.goals {
            write_goal_progress(&tx, goal)?;
        }
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO goal_contributions (goal_id, date, value) VALUES (?, ?, ?)",
            )?;
            for contribution in &day.goal_contributions {
                stmt.execute(params![
                    contribution.goal_id.as_str(),
                    format_date(contribution.date),
                    contribution.value,
                ])?;
            }
        }
        write_run(&tx, &day.run)?;

        tx.commit()?;
        Ok(())
    }

    pub fn insert_run(&self, run: &AggregationRun) -> Result<(), DbError> {
        write_run(&self.conn(), run)
    }

    pub fn latest_run(&self, date: NaiveDate) -> Result<Option<AggregationRun>, DbError> {
        self.conn()
            .query_row(
                "
                SELECT date, status, attempted_at, error
                FROM aggregation_runs
                WHERE date = ?
                ORDER BY id DESC
                LIMIT 1
                ",
                [format_date(date)],
                run_row,
            )
            .optional()?
            .map(parse_run)
            .transpose()
    }

    pub fn list_app_summaries(&self, date: NaiveDate) -> Result<Vec<AppDailySummary>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT date, package_name, total_duration_ms, open_count, last_opened_at
            FROM app_daily_summaries
            WHERE date = ?
            ORDER BY package_name ASC
            ",
        )?;
        let rows = stmt.query_map([format_date(date)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            let (date, package, total_duration_ms, open_count, last_opened_at) = row?;
            summaries.push(AppDailySummary {
                date: parse_date(&date, "app_daily_summaries.date")?,
                package_name: parse_package(&package)?,
                total_duration_ms,
                open_count,
                last_opened_at: last_opened_at
                    .map(|ts| parse_timestamp(&ts, "app_daily_summaries.last_opened_at"))
                    .transpose()?,
            });
        }
        Ok(summaries)
    }

    pub fn get_unlock_summary(&self, date: NaiveDate) -> Result<Option<DailyUnlockSummary>, DbError> {
        let count = self
            .conn()
            .query_row(
                "SELECT unlock_count FROM daily_unlock_summaries WHERE date = ?",
                [format_date(date)],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(count.map(|unlock_count| DailyUnlockSummary { date, unlock_count }))
    }

    pub fn get_wellness_score(&self, date: NaiveDate) -> Result<Option<WellnessScore>, DbError> {
        read_wellness_score(&self.conn(), date)
    }

    /// Scores within the range, ascending by date.
    pub fn list_wellness_scores(&self, range: DateRange) -> Result<Vec<WellnessScore>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT date, total_score, time_limit_score, focus_session_score,
                   breaks_score, sleep_hygiene_score, level, calculated_at
            FROM wellness_scores
            WHERE date >= ? AND date <= ?
            ORDER BY date ASC
            ",
        )?;
        let rows = stmt.query_map([format_date(range.start), format_date(range.end)], score_row)?;
        let mut scores = Vec::new();
        for row in rows {
            scores.push(parse_score(row?)?);
        }
        Ok(scores)
    }

    pub fn get_goal_contribution(&self, goal_id: &GoalId, date: NaiveDate) -> Result<Option<f64>, DbError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT value FROM goal_contributions WHERE goal_id = ? AND date = ?",
                params![goal_id.as_str(), format_date(date)],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Inserts a new goal. Fails if the id already exists.
    pub fn insert_goal(&self, goal: &Goal) -> Result<(), DbError> {
        self.conn().execute(
            "
            INSERT INTO goals (id, name, kind, target_value, current_value, is_active, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                goal.id.as_str(),
                goal.name,
                serde_json::to_string(&goal.kind)?,
                goal.target_value,
                goal.current_value,
                goal.is_active,
                goal.completed_at.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    pub fn get_goal(&self, id: &GoalId) -> Result<Option<Goal>, DbError> {
        self.query_goals("WHERE id = ?", [id.as_str()])
            .map(|goals| goals.into_iter().next())
    }

    /// Lists goals ordered by ID.
    pub fn fetch_goals(&self, active_only: bool) -> Result<Vec<Goal>, DbError> {
        if active_only {
            self.query_goals("WHERE is_active = 1", [])
        } else {
            self.query_goals("", [])
        }
    }

    fn query_goals<P: rusqlite::Params>(&self, filter: &str, params: P) -> Result<Vec<Goal>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "
            SELECT id, name, kind, target_value, current_value, is_active, completed_at
            FROM goals
            {filter}
            ORDER BY id ASC
            "
        ))?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;
        let mut goals = Vec::new();
        for row in rows {
            let (id, name, kind, target_value, current_value, is_active, completed_at) = row?;
            let kind: GoalKind = serde_json::from_str(&kind)?;
            goals.push(Goal {
                id: parse_goal_id(&id)?,
                name,
                kind,
                target_value,
                current_value,
                is_active,
                completed_at: completed_at
                    .map(|ts| parse_timestamp(&ts, "goals.completed_at"))
                    .transpose()?,
            });
        }
        Ok(goals)
    }

    /// Overwrites a goal's name, progress and state.
    pub fn update_goal(&self, goal: &Goal) -> Result<(), DbError> {
        write_goal_progress(&self.conn(), goal)
    }

    /// Inserts a new habit. Fails if the id already exists.
    pub fn insert_habit(&self, habit: &Habit) -> Result<(), DbError> {
        let rule = habit.rule.map(|rule| serde_json::to_string(&rule)).transpose()?;
        self.conn().execute(
            "INSERT INTO habits (id, name, rule, is_active) VALUES (?, ?, ?, ?)",
            params![habit.id.as_str(), habit.name, rule, habit.is_active],
        )?;
        Ok(())
    }

    pub fn get_habit(&self, id: &HabitId) -> Result<Option<Habit>, DbError> {
        self.query_habits("WHERE id = ?", [id.as_str()])
            .map(|habits| habits.into_iter().next())
    }

    /// Lists habits ordered by ID.
    pub fn fetch_habits(&self, active_only: bool) -> Result<Vec<Habit>, DbError> {
        if active_only {
            self.query_habits("WHERE is_active = 1", [])
        } else {
            self.query_habits("", [])
        }
    }

    fn query_habits<P: rusqlite::Params>(&self, filter: &str, params: P) -> Result<Vec<Habit>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, rule, is_active FROM habits {filter} ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;
        let mut habits = Vec::new();
        for row in rows {
            let (id, name, rule, is_active) = row?;
            let rule: Option<HabitRule> = rule.map(|r| serde_json::from_str(&r)).transpose()?;
            habits.push(Habit {
                id: parse_habit_id(&id)?,
                name,
                rule,
                is_active,
            });
        }
        Ok(habits)
    }

    /// Records for a habit between two dates (inclusive), ascending.
    pub fn list_habit_records(
        &self,
        id: &HabitId,
        from: Option<NaiveDate>,
        through: NaiveDate,
    ) -> Result<Vec<HabitRecord>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "
            SELECT habit_id, date, completed
            FROM habit_records
            WHERE habit_id = ? AND date >= ? AND date <= ?
            ORDER BY date ASC
            ",
        )?;
        let from = from.map_or_else(String::new, format_date);
        let rows = stmt.query_map(params![id.as_str(), from, format_date(through)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (habit_id, date, completed) = row?;
            records.push(HabitRecord {
                habit_id: parse_habit_id(&habit_id)?,
                date: parse_date(&date, "habit_records.date")?,
                completed,
            });
        }
        Ok(records)
    }

    pub fn upsert_habit_record(&self, record: &HabitRecord) -> Result<(), DbError> {
        write_habit_record(&self.conn(), record)
    }
}

fn write_app_summaries(conn: &Connection, summaries: &[AppDailySummary]) -> Result<(), DbError> {
    let mut stmt = conn.prepare(
        "
        INSERT OR REPLACE INTO app_daily_summaries
        (date, package_name, total_duration_ms, open_count, last_opened_at)
        VALUES (?, ?, ?, ?, ?)
        ",
    )?;
    for summary in summaries {
        stmt.execute(params![
            format_date(summary.date),
            summary.package_name.as_str(),
            summary.total_duration_ms,
            summary.open_count,
            summary.last_opened_at.map(format_timestamp),
        ])?;
    }
    Ok(())
}

fn write_unlock_summary(conn: &Connection, summary: &DailyUnlockSummary) -> Result<(), DbError> {
    conn.execute(
        "INSERT OR REPLACE INTO daily_unlock_summaries (date, unlock_count) VALUES (?, ?)",
        params![format_date(summary.date), summary.unlock_count],
    )?;
    Ok(())
}

fn write_wellness_score(conn: &Connection, score: &WellnessScore) -> Result<(), DbError> {
    conn.execute(
        "
        INSERT OR REPLACE INTO wellness_scores
        (date, total_score, time_limit_score, focus_session_score,
         breaks_score, sleep_hygiene_score, level, calculated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            format_date(score.date),
            score.total_score,
            score.time_limit_score,
            score.focus_session_score,
            score.breaks_score,
            score.sleep_hygiene_score,
            score.level.as_str(),
            format_timestamp(score.calculated_at),
        ],
    )?;
    Ok(())
}

type ScoreRow = (String, u32, u32, u32, u32, u32, String, String);

fn score_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parse_score(row: ScoreRow) -> Result<WellnessScore, DbError> {
    let (date, total, time_limit, focus, breaks, sleep, level, calculated_at) = row;
    Ok(WellnessScore {
        date: parse_date(&date, "wellness_scores.date")?,
        total_score: total,
        time_limit_score: time_limit,
        focus_session_score: focus,
        breaks_score: breaks,
        sleep_hygiene_score: sleep,
        level: level.parse().map_err(|message| DbError::InvalidValue {
            column: "wellness_scores.level",
            value: level.clone(),
            message,
        })?,
        calculated_at: parse_timestamp(&calculated_at, "wellness_scores.calculated_at")?,
    })
}

fn read_wellness_score(conn: &Connection, date: NaiveDate) -> Result<Option<WellnessScore>, DbError> {
    conn.query_row(
        "
        SELECT date, total_score, time_limit_score, focus_session_score,
               breaks_score, sleep_hygiene_score, level, calculated_at
        FROM wellness_scores
        WHERE date = ?
        ",
        [format_date(date)],
        score_row,
    )
    .optional()?
    .map(parse_score)
    .transpose()
}

fn write_goal_progress(conn: &Connection, goal: &Goal) -> Result<(), DbError> {
    conn.execute(
        "
        UPDATE goals
        SET name = ?, kind = ?, target_value = ?, current_value = ?, is_active = ?, completed_at = ?
        WHERE id = ?
        ",
        params![
            goal.name,
            serde_json::to_string(&goal.kind)?,
            goal.target_value,
            goal.current_value,
            goal.is_active,
            goal.completed_at.map(format_timestamp),
            goal.id.as_str(),
        ],
    )?;
    Ok(())
}

fn write_habit_record(conn: &Connection, record: &HabitRecord) -> Result<(), DbError> {
    conn.execute(
        "INSERT OR REPLACE INTO habit_records (habit_id, date, completed) VALUES (?, ?, ?)",
        params![record.habit_id.as_str(), format_date(record.date), record.completed],
    )?;
    Ok(())
}

fn write_run(conn: &Connection, run: &AggregationRun) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO aggregation_runs (date, status, attempted_at, error) VALUES (?, ?, ?, ?)",
        params![
            format_date(run.date),
            run.status.as_str(),
            format_timestamp(run.attempted_at),
            run.error,
        ],
    )?;
    Ok(())
}

type RunRow = (String, String, String, Option<String>);

fn run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn parse_run(row: RunRow) -> Result<AggregationRun, DbError> {
    let (date, status, attempted_at, error) = row;
    Ok(AggregationRun {
        date: parse_date(&date, "aggregation_runs.date")?,
        status: status.parse::<RunStatus>().map_err(|message| DbError::InvalidValue {
            column: "aggregation_runs.status",
            value: status.clone(),
            message,
        })?,
        attempted_at: parse_timestamp(&attempted_at, "aggregation_runs.attempted_at")?,
        error,
    })
}

fn deterministic_event_id(kind: &str, package: &str, timestamp: &str) -> String {
    let content = format!("usage|{kind}|{package}|{timestamp}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
}

fn parse_timestamp(timestamp: &str, column: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            column,
            value: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_date(date: &str, column: &'static str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|source| DbError::TimestampParse {
        column,
        value: date.to_string(),
        source,
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_package(name: &str) -> Result<PackageName, DbError> {
    PackageName::new(name).map_err(|err| DbError::InvalidValue {
        column: "package_name",
        value: name.to_string(),
        message: err.to_string(),
    })
}

fn parse_goal_id(id: &str) -> Result<GoalId, DbError> {
    GoalId::new(id).map_err(|err| DbError::InvalidValue {
        column: "goals.id",
        value: id.to_string(),
        message: err.to_string(),
    })
}

fn parse_habit_id(id: &str) -> Result<HabitId, DbError> {
    HabitId::new(id).map_err(|err| DbError::InvalidValue {
        column: "habits.id",
        value: id.to_string(),
        message: err.to_string(),
    })
}

fn store_error(operation: &'static str) -> impl FnOnce(DbError) -> StoreError {
    move |err| StoreError::new(operation, err)
}

impl EventStore for Database {
    fn read_app_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, StoreError> {
        self.app_events_in_range(start, end)
            .map_err(store_error("read_app_events"))
    }

    fn read_unlock_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StoreError> {
        self.unlocks_in_range(start, end)
            .map_err(store_error("read_unlock_events"))
    }

    fn append(&self, events: &[RawEvent]) -> Result<usize, StoreError> {
        self.insert_events(events).map_err(store_error("append"))
    }
}

impl DerivedStore for Database {
    fn commit_day(&self, day: &DerivedDay) -> Result<(), StoreError> {
        self.commit_derived_day(day).map_err(store_error("commit_day"))
    }

    fn upsert_app_summaries(&self, summaries: &[AppDailySummary]) -> Result<(), StoreError> {
        write_app_summaries(&self.conn(), summaries).map_err(store_error("upsert_app_summaries"))
    }

    fn upsert_unlock_summary(&self, summary: &DailyUnlockSummary) -> Result<(), StoreError> {
        write_unlock_summary(&self.conn(), summary).map_err(store_error("upsert_unlock_summary"))
    }

    fn upsert_wellness_score(&self, score: &WellnessScore) -> Result<(), StoreError> {
        write_wellness_score(&self.conn(), score).map_err(store_error("upsert_wellness_score"))
    }

    fn record_run(&self, run: &AggregationRun) -> Result<(), StoreError> {
        self.insert_run(run).map_err(store_error("record_run"))
    }

    fn last_run(&self, date: NaiveDate) -> Result<Option<AggregationRun>, StoreError> {
        self.latest_run(date).map_err(store_error("last_run"))
    }

    fn app_summaries(&self, date: NaiveDate) -> Result<Vec<AppDailySummary>, StoreError> {
        self.list_app_summaries(date).map_err(store_error("app_summaries"))
    }

    fn unlock_summary(&self, date: NaiveDate) -> Result<Option<DailyUnlockSummary>, StoreError> {
        self.get_unlock_summary(date).map_err(store_error("unlock_summary"))
    }

    fn wellness_score(&self, date: NaiveDate) -> Result<Option<WellnessScore>, StoreError> {
        self.get_wellness_score(date).map_err(store_error("wellness_score"))
    }

    fn wellness_scores(&self, range: DateRange) -> Result<Vec<WellnessScore>, StoreError> {
        self.list_wellness_scores(range).map_err(store_error("wellness_scores"))
    }

    fn goal_contribution(&self, goal_id: &GoalId, date: NaiveDate) -> Result<Option<f64>, StoreError> {
        self.get_goal_contribution(goal_id, date)
            .map_err(store_error("goal_contribution"))
    }
}

impl GoalStore for Database {
    fn create_goal(&self, goal: &Goal) -> Result<(), StoreError> {
        self.insert_goal(goal).map_err(store_error("create_goal"))
    }

    fn goal(&self, id: &GoalId) -> Result<Option<Goal>, StoreError> {
        self.get_goal(id).map_err(store_error("goal"))
    }

    fn list_goals(&self) -> Result<Vec<Goal>, StoreError> {
        self.fetch_goals(false).map_err(store_error("list_goals"))
    }

    fn active_goals(&self) -> Result<Vec<Goal>, StoreError> {
        self.fetch_goals(true).map_err(store_error("active_goals"))
    }

    fn save_goal(&self, goal: &Goal) -> Result<(), StoreError> {
        self.update_goal(goal).map_err(store_error("save_goal"))
    }
}

impl HabitStore for Database {
    fn create_habit(&self, habit: &Habit) -> Result<(), StoreError> {
        self.insert_habit(habit).map_err(store_error("create_habit"))
    }

    fn habit(&self, id: &HabitId) -> Result<Option<Habit>, StoreError> {
        self.get_habit(id).map_err(store_error("habit"))
    }

    fn list_habits(&self) -> Result<Vec<Habit>, StoreError> {
        self.fetch_habits(false).map_err(store_error("list_habits"))
    }

    fn active_habits(&self) -> Result<Vec<Habit>, StoreError> {
        self.fetch_habits(true).map_err(store_error("active_habits"))
    }

    fn habit_records(&self, id: &HabitId, range: DateRange) -> Result<Vec<HabitRecord>, StoreError> {
        self.list_habit_records(id, Some(range.start), range.end)
            .map_err(store_error("habit_records"))
    }

    fn habit_history(&self, id: &HabitId, through: NaiveDate) -> Result<Vec<HabitRecord>, StoreError> {
        self.list_habit_records(id, None, through)
            .map_err(store_error("habit_history"))
    }

    fn put_habit_record(&self, record: &HabitRecord) -> Result<(), StoreError> {
        self.upsert_habit_record(record)
            .map_err(store_error("put_habit_record"))
    }
}
