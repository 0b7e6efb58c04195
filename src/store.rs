//! Append-only event log backends.
//!
//! Every backend keeps insertion order and never rewrites an appended event.
//! `clear` exists for administrative resets only.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::error::{AnalyticsError, Result};
use crate::models::{AnalyticsEvent, EventType};

pub trait EventStore: Send + Sync {
    fn append(&self, event: &AnalyticsEvent) -> Result<()>;

    /// Events for one form, in insertion order.
    fn events_for_form(&self, form_id: &str) -> Result<Vec<AnalyticsEvent>>;

    fn all_form_ids(&self) -> Result<BTreeSet<String>>;

    /// The whole log, in insertion order.
    fn all_events(&self) -> Result<Vec<AnalyticsEvent>>;

    fn clear(&self) -> Result<()>;
}

/// Log file with one JSON event per line.
/// Never edits existing lines, only appends.
pub struct JsonlEventStore {
    log_path: PathBuf,
}

impl JsonlEventStore {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    fn read_events(&self) -> Result<Vec<AnalyticsEvent>> {
        let file = match std::fs::File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let reader = std::io::BufReader::new(file);
        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                // bad UTF-8 is confined to one line; anything else repeats forever
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    warn!(line = idx + 1, error = %e, "unreadable event log line skipped");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AnalyticsEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(line = idx + 1, error = %e, "corrupt event log line skipped"),
            }
        }
        Ok(events)
    }
}

impl EventStore for JsonlEventStore {
    fn append(&self, event: &AnalyticsEvent) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        // single write so a line is never interleaved
        file.write_all(line.as_bytes())?;
        debug!(event_id = %event.id, path = %self.log_path.display(), "event appended");
        Ok(())
    }

    fn events_for_form(&self, form_id: &str) -> Result<Vec<AnalyticsEvent>> {
        Ok(self
            .read_events()?
            .into_iter()
            .filter(|e| e.form_id == form_id)
            .collect())
    }

    fn all_form_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .read_events()?
            .into_iter()
            .map(|e| e.form_id)
            .collect())
    }

    fn all_events(&self) -> Result<Vec<AnalyticsEvent>> {
        self.read_events()
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.log_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// SQLite-backed log. `seq` gives insertion order.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS analytics_events (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT NOT NULL,
                form_id    TEXT NOT NULL,
                step_id    TEXT,
                event_type TEXT NOT NULL,
                timestamp  TEXT NOT NULL,
                session_id TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_analytics_events_form
                ON analytics_events (form_id, seq);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AnalyticsError::Lock("sqlite connection".into()))
    }

    fn query_events(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<AnalyticsEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, DateTime<Utc>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, form_id, step_id, event_type, timestamp, session_id) = row?;
            let Some(event_type) = EventType::from_str(&event_type) else {
                warn!(event_id = %id, event_type = %event_type, "unknown event type skipped");
                continue;
            };
            events.push(AnalyticsEvent {
                id,
                form_id,
                step_id,
                event_type,
                timestamp,
                session_id,
            });
        }
        Ok(events)
    }
}

impl EventStore for SqliteEventStore {
    fn append(&self, event: &AnalyticsEvent) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO analytics_events (id, form_id, step_id, event_type, timestamp, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id,
                event.form_id,
                event.step_id,
                event.event_type.as_str(),
                event.timestamp,
                event.session_id,
            ],
        )?;
        Ok(())
    }

    fn events_for_form(&self, form_id: &str) -> Result<Vec<AnalyticsEvent>> {
        self.query_events(
            "SELECT id, form_id, step_id, event_type, timestamp, session_id
             FROM analytics_events WHERE form_id = ?1 ORDER BY seq",
            params![form_id],
        )
    }

    fn all_form_ids(&self) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT form_id FROM analytics_events")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    fn all_events(&self) -> Result<Vec<AnalyticsEvent>> {
        self.query_events(
            "SELECT id, form_id, step_id, event_type, timestamp, session_id
             FROM analytics_events ORDER BY seq",
            [],
        )
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM analytics_events", [])?;
        Ok(())
    }
}

/// Non-durable log, for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<AnalyticsEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AnalyticsEvent>>> {
        self.events
            .lock()
            .map_err(|_| AnalyticsError::Lock("memory event store".into()))
    }
}

impl EventStore for MemoryEventStore {
    fn append(&self, event: &AnalyticsEvent) -> Result<()> {
        self.lock()?.push(event.clone());
        Ok(())
    }

    fn events_for_form(&self, form_id: &str) -> Result<Vec<AnalyticsEvent>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|e| e.form_id == form_id)
            .cloned()
            .collect())
    }

    fn all_form_ids(&self) -> Result<BTreeSet<String>> {
        Ok(self.lock()?.iter().map(|e| e.form_id.clone()).collect())
    }

    fn all_events(&self) -> Result<Vec<AnalyticsEvent>> {
        Ok(self.lock()?.clone())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}
