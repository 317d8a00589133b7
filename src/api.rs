//! Read-mostly service surface over the store.
//!
//! This is the seam a future HTTP layer would sit on; the CLI subcommands
//! call it directly. Runtimes and notes are joined here at read time by
//! their composite key, never in the schema.

use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::db::Database;
use crate::engine::derive_status;
use crate::models::{MergedPortItem, NoteUpdate, PortEvent, PortKey, PortNote, PortState};
use crate::utils::format_uptime;

pub struct PortService {
    db: Arc<Database>,
    trigger_tx: mpsc::Sender<()>,
}

impl PortService {
    pub fn new(db: Arc<Database>, trigger_tx: mpsc::Sender<()>) -> Self {
        Self { db, trigger_tx }
    }

    /// Merged view: one row per key present in either table, with derived
    /// status, latest event and uptime. Note-only rows represent ports
    /// annotated before (or after) they were ever observed.
    pub fn list_ports(&self) -> Result<Vec<MergedPortItem>> {
        let runtimes = self.db.all_runtimes()?;
        let notes = self.db.all_notes()?;

        let mut merged: HashMap<PortKey, (Option<_>, Option<PortNote>)> = HashMap::new();
        for runtime in runtimes {
            merged.insert(runtime.key(), (Some(runtime), None));
        }
        for note in notes {
            let key = note.key();
            merged.entry(key).or_insert((None, None)).1 = Some(note);
        }

        let now = Utc::now();
        let mut items = Vec::with_capacity(merged.len());
        for (key, (runtime, note)) in merged {
            let derived_status = derive_status(runtime.as_ref(), note.as_ref());

            let (latest_event_type, latest_event_timestamp) = match &runtime {
                Some(r) => match self.db.latest_event(r.id)? {
                    Some(event) => (Some(event.event_type), Some(event.timestamp)),
                    None => (None, None),
                },
                None => (None, None),
            };

            let uptime_human = match &runtime {
                Some(r) if r.current_state == PortState::Active => {
                    format_uptime((now - r.first_seen_at).num_seconds().max(0) as u64)
                }
                _ => String::new(),
            };

            items.push(MergedPortItem {
                host_id: key.host_id,
                protocol: key.protocol,
                port: key.port,
                runtime_id: runtime.as_ref().map(|r| r.id),
                first_seen_at: runtime.as_ref().map(|r| r.first_seen_at),
                last_seen_at: runtime.as_ref().map(|r| r.last_seen_at),
                last_disappeared_at: runtime.as_ref().and_then(|r| r.last_disappeared_at),
                current_state: runtime.as_ref().map(|r| r.current_state),
                current_pid: runtime.as_ref().and_then(|r| r.current_pid),
                process_name: runtime.as_ref().and_then(|r| r.process_name.clone()),
                cmdline: runtime.as_ref().and_then(|r| r.cmdline.clone()),
                uptime_human,
                note_id: note.as_ref().map(|n| n.id),
                title: note.as_ref().and_then(|n| n.title.clone()),
                description: note.as_ref().and_then(|n| n.description.clone()),
                owner: note.as_ref().and_then(|n| n.owner.clone()),
                service_type: note.as_ref().map(|n| n.service_type),
                risk_level: note.as_ref().map(|n| n.risk_level),
                is_pinned: note.as_ref().map(|n| n.is_pinned).unwrap_or(false),
                tags: note.as_ref().and_then(|n| n.tags.clone()),
                derived_status,
                latest_event_type,
                latest_event_timestamp,
            });
        }

        items.sort_by(|a, b| {
            (&a.host_id, a.port, a.protocol.to_string())
                .cmp(&(&b.host_id, b.port, b.protocol.to_string()))
        });
        Ok(items)
    }

    /// Event history for one key, newest first. Empty when the key has
    /// never been observed.
    pub fn history(&self, key: &PortKey) -> Result<Vec<PortEvent>> {
        match self.db.runtime_by_key(key)? {
            Some(runtime) => self.db.events_for(runtime.id),
            None => Ok(Vec::new()),
        }
    }

    pub fn upsert_note(&self, key: &PortKey, update: &NoteUpdate) -> Result<PortNote> {
        self.db.upsert_note(key, update)
    }

    /// Hard delete: runtime, its events and the note. If the port is still
    /// listening it comes back as a fresh runtime on the next cycle.
    pub fn delete_port(&self, key: &PortKey) -> Result<bool> {
        self.db.delete_port(key)
    }

    /// Queue one out-of-band cycle and return immediately. A full queue
    /// means a trigger is already pending, which is as good as done.
    pub fn trigger_scan(&self) {
        if let Err(mpsc::error::TrySendError::Closed(())) = self.trigger_tx.try_send(()) {
            tracing::warn!("scan trigger dropped: scheduler is not running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::reconcile::reconcile;
    use crate::models::{DerivedStatus, EventType, Protocol, RiskLevel};
    use crate::observer::ScanEntry;

    fn service() -> (PortService, Arc<Database>, mpsc::Receiver<()>) {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let (tx, rx) = mpsc::channel(4);
        (PortService::new(db.clone(), tx), db, rx)
    }

    fn entry(port: u16, name: &str) -> ScanEntry {
        ScanEntry {
            protocol: Protocol::Tcp,
            port,
            pid: Some(11),
            process_name: Some(name.to_string()),
            cmdline: None,
        }
    }

    fn observe(db: &Database, host: &str, snapshot: &[ScanEntry]) {
        let known = db.runtimes_for_host(host).unwrap();
        let plan = reconcile(host, Utc::now(), snapshot, known);
        db.apply_cycle(&plan).unwrap();
    }

    #[test]
    fn merged_view_joins_runtime_and_note() {
        let (service, db, _rx) = service();
        observe(&db, "testhost", &[entry(443, "nginx")]);
        service
            .upsert_note(
                &PortKey::new("testhost", Protocol::Tcp, 443),
                &NoteUpdate {
                    title: Some("edge".to_string()),
                    risk_level: Some(RiskLevel::Trusted),
                    ..Default::default()
                },
            )
            .unwrap();

        let items = service.list_ports().unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.process_name.as_deref(), Some("nginx"));
        assert_eq!(item.title.as_deref(), Some("edge"));
        assert_eq!(item.derived_status, DerivedStatus::Healthy);
        assert_eq!(item.latest_event_type, Some(EventType::Appeared));
        assert!(!item.uptime_human.is_empty());
    }

    #[test]
    fn merged_view_includes_note_only_rows() {
        let (service, _db, _rx) = service();
        service
            .upsert_note(
                &PortKey::new("testhost", Protocol::Udp, 51820),
                &NoteUpdate {
                    title: Some("wireguard, not deployed yet".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let items = service.list_ports().unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert!(item.runtime_id.is_none());
        assert_eq!(item.derived_status, DerivedStatus::Unknown);
        assert!(item.uptime_human.is_empty());
    }

    #[test]
    fn runtime_without_note_is_suspicious_in_view() {
        let (service, db, _rx) = service();
        observe(&db, "testhost", &[entry(31337, "mystery")]);
        let items = service.list_ports().unwrap();
        assert_eq!(items[0].derived_status, DerivedStatus::Suspicious);
    }

    #[test]
    fn disappeared_expected_shows_ghost_without_uptime() {
        let (service, db, _rx) = service();
        observe(&db, "testhost", &[entry(8000, "devserver")]);
        service
            .upsert_note(
                &PortKey::new("testhost", Protocol::Tcp, 8000),
                &NoteUpdate {
                    risk_level: Some(RiskLevel::Expected),
                    ..Default::default()
                },
            )
            .unwrap();
        observe(&db, "testhost", &[]);

        let items = service.list_ports().unwrap();
        let item = &items[0];
        assert_eq!(item.derived_status, DerivedStatus::Ghost);
        assert!(item.uptime_human.is_empty());
        assert_eq!(item.latest_event_type, Some(EventType::Disappeared));
    }

    #[test]
    fn history_is_newest_first_and_empty_for_unknown_key() {
        let (service, db, _rx) = service();
        observe(&db, "testhost", &[entry(6379, "redis")]);
        observe(&db, "testhost", &[]);
        observe(&db, "testhost", &[entry(6379, "redis")]);

        let key = PortKey::new("testhost", Protocol::Tcp, 6379);
        let events = service.history(&key).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, EventType::Appeared);
        assert_eq!(events[1].event_type, EventType::Disappeared);
        assert!(events[0].id > events[1].id);

        let none = service
            .history(&PortKey::new("testhost", Protocol::Tcp, 1))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn trigger_scan_queues_one_message() {
        let (service, _db, mut rx) = service();
        service.trigger_scan();
        assert!(rx.try_recv().is_ok());
        // Saturating the queue is not an error.
        for _ in 0..10 {
            service.trigger_scan();
        }
    }
}
