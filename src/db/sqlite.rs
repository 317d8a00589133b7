//! SQLite database implementation

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Mutex;

use crate::engine::reconcile::CyclePlan;
use crate::models::{
    EventType, PortEvent, PortKey, PortNote, PortRuntime, PortState, Protocol, RiskLevel,
    ServiceType,
};

use super::{queries, schema};

/// What one committed cycle changed, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub created: usize,
    pub updated: usize,
    pub events: usize,
}

/// SQLite database wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create database at the specified path
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            // Create parent directory if needed
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        };

        // WAL for concurrent readers; foreign keys drive the event cascade.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        conn.execute_batch(schema::CREATE_TABLES)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![schema::SCHEMA_VERSION],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Apply one reconciliation cycle's plan as a single transaction.
    ///
    /// Either every runtime mutation and event lands, or none do. A
    /// uniqueness conflict on creation aborts the whole cycle; the next
    /// scheduled cycle retries from last-committed state.
    pub fn apply_cycle(&self, plan: &CyclePlan) -> Result<CycleStats> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut stats = CycleStats::default();

        for draft in &plan.creates {
            tx.execute(
                queries::INSERT_RUNTIME,
                params![
                    draft.host_id,
                    draft.protocol.to_string(),
                    draft.port,
                    draft.first_seen_at.to_rfc3339(),
                    draft.first_seen_at.to_rfc3339(),
                    Option::<String>::None,
                    PortState::Active.to_string(),
                    draft.current_pid,
                    draft.process_name,
                    draft.cmdline,
                    1i64,
                    0i64,
                ],
            )?;
            let runtime_id = tx.last_insert_rowid();
            tx.execute(
                queries::INSERT_EVENT,
                params![
                    runtime_id,
                    EventType::Appeared.to_string(),
                    draft.first_seen_at.to_rfc3339(),
                    draft.current_pid,
                    draft.process_name,
                ],
            )?;
            stats.created += 1;
            stats.events += 1;
        }

        for change in &plan.changes {
            let r = &change.runtime;
            tx.execute(
                queries::UPDATE_RUNTIME,
                params![
                    r.id,
                    r.last_seen_at.to_rfc3339(),
                    r.last_disappeared_at.map(|t| t.to_rfc3339()),
                    r.current_state.to_string(),
                    r.current_pid,
                    r.process_name,
                    r.cmdline,
                    r.total_seen_count,
                    r.total_uptime_seconds,
                ],
            )?;
            stats.updated += 1;

            if let Some(event) = &change.event {
                tx.execute(
                    queries::INSERT_EVENT,
                    params![
                        r.id,
                        event.event_type.to_string(),
                        event.timestamp.to_rfc3339(),
                        event.pid,
                        event.process_name,
                    ],
                )?;
                stats.events += 1;
            }
        }

        tx.commit()?;
        Ok(stats)
    }

    /// Load all runtimes owned by one host
    pub fn runtimes_for_host(&self, host_id: &str) -> Result<Vec<PortRuntime>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(queries::SELECT_RUNTIMES_FOR_HOST)?;
        let rows = stmt.query_map(params![host_id], Self::row_to_runtime)?;

        let mut runtimes = Vec::new();
        for row in rows {
            runtimes.push(row?);
        }
        Ok(runtimes)
    }

    /// Load every runtime across all hosts
    pub fn all_runtimes(&self) -> Result<Vec<PortRuntime>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(queries::SELECT_ALL_RUNTIMES)?;
        let rows = stmt.query_map([], Self::row_to_runtime)?;

        let mut runtimes = Vec::new();
        for row in rows {
            runtimes.push(row?);
        }
        Ok(runtimes)
    }

    /// Look up the runtime for one composite key
    pub fn runtime_by_key(&self, key: &PortKey) -> Result<Option<PortRuntime>> {
        let conn = self.conn.lock().unwrap();
        let runtime = conn
            .query_row(
                queries::SELECT_RUNTIME_BY_KEY,
                params![key.host_id, key.protocol.to_string(), key.port],
                Self::row_to_runtime,
            )
            .optional()?;
        Ok(runtime)
    }

    /// Event history for one runtime, newest first
    pub fn events_for(&self, runtime_id: i64) -> Result<Vec<PortEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(queries::SELECT_EVENTS_FOR_RUNTIME)?;
        let rows = stmt.query_map(params![runtime_id], Self::row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Most recent event for one runtime
    pub fn latest_event(&self, runtime_id: i64) -> Result<Option<PortEvent>> {
        let conn = self.conn.lock().unwrap();
        let event = conn
            .query_row(
                queries::SELECT_LATEST_EVENT,
                params![runtime_id],
                Self::row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    /// Load every note across all hosts
    pub fn all_notes(&self) -> Result<Vec<PortNote>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(queries::SELECT_ALL_NOTES)?;
        let rows = stmt.query_map([], Self::row_to_note)?;

        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }

    /// Look up the note for one composite key
    pub fn note_by_key(&self, key: &PortKey) -> Result<Option<PortNote>> {
        let conn = self.conn.lock().unwrap();
        let note = conn
            .query_row(
                queries::SELECT_NOTE_BY_KEY,
                params![key.host_id, key.protocol.to_string(), key.port],
                Self::row_to_note,
            )
            .optional()?;
        Ok(note)
    }

    /// Create or partially update the note for one key.
    ///
    /// Only `Some` fields of the update are applied; on creation the
    /// remaining fields take their defaults (risk_level=expected,
    /// service_type=unknown).
    pub fn upsert_note(
        &self,
        key: &PortKey,
        update: &crate::models::NoteUpdate,
    ) -> Result<PortNote> {
        let conn = self.conn.lock().unwrap();
        let existing = conn
            .query_row(
                queries::SELECT_NOTE_BY_KEY,
                params![key.host_id, key.protocol.to_string(), key.port],
                Self::row_to_note,
            )
            .optional()?;

        let mut note = existing.unwrap_or(PortNote {
            id: 0,
            host_id: key.host_id.clone(),
            protocol: key.protocol,
            port: key.port,
            title: None,
            description: None,
            owner: None,
            service_type: ServiceType::default(),
            risk_level: RiskLevel::default(),
            is_pinned: false,
            tags: None,
        });

        if let Some(title) = &update.title {
            note.title = Some(title.clone());
        }
        if let Some(description) = &update.description {
            note.description = Some(description.clone());
        }
        if let Some(owner) = &update.owner {
            note.owner = Some(owner.clone());
        }
        if let Some(service_type) = update.service_type {
            note.service_type = service_type;
        }
        if let Some(risk_level) = update.risk_level {
            note.risk_level = risk_level;
        }
        if let Some(is_pinned) = update.is_pinned {
            note.is_pinned = is_pinned;
        }
        if let Some(tags) = &update.tags {
            note.tags = Some(tags.clone());
        }

        if note.id == 0 {
            conn.execute(
                queries::INSERT_NOTE,
                params![
                    note.host_id,
                    note.protocol.to_string(),
                    note.port,
                    note.title,
                    note.description,
                    note.owner,
                    note.service_type.to_string(),
                    note.risk_level.to_string(),
                    note.is_pinned,
                    note.tags,
                ],
            )?;
            note.id = conn.last_insert_rowid();
        } else {
            conn.execute(
                queries::UPDATE_NOTE,
                params![
                    note.id,
                    note.title,
                    note.description,
                    note.owner,
                    note.service_type.to_string(),
                    note.risk_level.to_string(),
                    note.is_pinned,
                    note.tags,
                ],
            )?;
        }

        Ok(note)
    }

    /// Hard-delete one key: runtime (cascading its events) and note together.
    /// Returns whether any row was removed.
    pub fn delete_port(&self, key: &PortKey) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let runtime_rows = tx.execute(
            queries::DELETE_RUNTIME_BY_KEY,
            params![key.host_id, key.protocol.to_string(), key.port],
        )?;
        let note_rows = tx.execute(
            queries::DELETE_NOTE_BY_KEY,
            params![key.host_id, key.protocol.to_string(), key.port],
        )?;
        tx.commit()?;
        Ok(runtime_rows + note_rows > 0)
    }

    /// Get runtime count
    pub fn runtime_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM port_runtime", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get event count
    pub fn event_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM port_event", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get note count
    pub fn note_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM port_note", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_runtime(row: &Row) -> rusqlite::Result<PortRuntime> {
        let protocol: String = row.get(2)?;
        let first_seen: String = row.get(4)?;
        let last_seen: String = row.get(5)?;
        let disappeared: Option<String> = row.get(6)?;
        let state: String = row.get(7)?;

        Ok(PortRuntime {
            id: row.get(0)?,
            host_id: row.get(1)?,
            protocol: Protocol::from(protocol.as_str()),
            port: row.get(3)?,
            first_seen_at: parse_ts(&first_seen),
            last_seen_at: parse_ts(&last_seen),
            last_disappeared_at: disappeared.map(|s| parse_ts(&s)),
            current_state: PortState::from(state.as_str()),
            current_pid: row.get(8)?,
            process_name: row.get(9)?,
            cmdline: row.get(10)?,
            total_seen_count: row.get(11)?,
            total_uptime_seconds: row.get(12)?,
        })
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<PortEvent> {
        let event_type: String = row.get(2)?;
        let timestamp: String = row.get(3)?;

        Ok(PortEvent {
            id: row.get(0)?,
            port_runtime_id: row.get(1)?,
            event_type: EventType::from(event_type.as_str()),
            timestamp: parse_ts(&timestamp),
            pid: row.get(4)?,
            process_name: row.get(5)?,
        })
    }

    fn row_to_note(row: &Row) -> rusqlite::Result<PortNote> {
        let protocol: String = row.get(2)?;
        let service_type: String = row.get(7)?;
        let risk_level: String = row.get(8)?;

        Ok(PortNote {
            id: row.get(0)?,
            host_id: row.get(1)?,
            protocol: Protocol::from(protocol.as_str()),
            port: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            owner: row.get(6)?,
            service_type: ServiceType::from(service_type.as_str()),
            risk_level: RiskLevel::from(risk_level.as_str()),
            is_pinned: row.get(9)?,
            tags: row.get(10)?,
        })
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
