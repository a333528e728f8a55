//! Import command for loading raw usage events into the local `SQLite` store.
//!
//! Input is one JSON object per line:
//!
//! ```text
//! {"type":"app","package_name":"com.example.mail","kind":"open","timestamp":"2024-01-01T08:00:00Z"}
//! {"type":"unlock","timestamp":"2024-01-01T08:00:00Z"}
//! ```

use std::io::BufRead;

use anyhow::{Context, Result};

use dw_core::{EventStore, RawEvent};

pub fn run<R: BufRead>(reader: R, store: &dyn EventStore) -> Result<usize> {
    let events = parse_events(reader)?;
    let inserted = store.append(&events).context("failed to store events")?;
    tracing::info!(read = events.len(), inserted, "imported events");
    Ok(inserted)
}

fn parse_events<R: BufRead>(reader: R) -> Result<Vec<RawEvent>> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event: RawEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid event on line {}", idx + 1))?;
        events.push(event);
    }
    Ok(events)
}
