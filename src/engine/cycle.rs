//! One reconciliation cycle: snapshot, diff, atomic commit.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::db::{CycleStats, Database};
use crate::observer::{self, ScanEntry};

use super::reconcile::reconcile;

/// Why a cycle failed. Every variant rolls back cleanly; the scheduler
/// retries on its next tick from last-committed state.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to load known runtimes: {0}")]
    Load(anyhow::Error),
    #[error("failed to commit cycle: {0}")]
    Commit(anyhow::Error),
}

/// Per-host mutual exclusion for cycles. Two concurrent cycles on the
/// same host could both see a key as new and violate the uniqueness
/// constraint; cross-host cycles touch disjoint rows and run freely.
#[derive(Default)]
pub struct HostLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl HostLocks {
    pub fn lock_for(&self, host_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(host_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Drives reconciliation cycles for one configured host.
pub struct Engine {
    db: Arc<Database>,
    host_id: String,
    snapshot_timeout: Duration,
    locks: HostLocks,
}

impl Engine {
    pub fn new(db: Arc<Database>, host_id: String, snapshot_timeout: Duration) -> Self {
        Self {
            db,
            host_id,
            snapshot_timeout,
            locks: HostLocks::default(),
        }
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Take a snapshot and reconcile it. Snapshot acquisition degrades to
    /// empty on failure (logged inside the observer), it never fails the
    /// cycle; only storage errors do.
    pub async fn run_cycle(&self) -> Result<CycleStats, CycleError> {
        let snapshot = observer::snapshot(self.snapshot_timeout).await;
        self.apply_snapshot(&snapshot).await
    }

    /// Reconcile an already-taken snapshot against the store.
    pub async fn apply_snapshot(&self, snapshot: &[ScanEntry]) -> Result<CycleStats, CycleError> {
        let lock = self.locks.lock_for(&self.host_id);
        // Held for the whole cycle, released on every exit path.
        let _guard = lock.lock().await;

        if snapshot.is_empty() {
            // Indistinguishable from all ports genuinely closed; the log
            // line is the only marker. Reconciliation proceeds normally.
            tracing::warn!(
                "empty snapshot for host {}: every active runtime will be marked disappeared",
                self.host_id
            );
        }

        let now = Utc::now();
        let known = self
            .db
            .runtimes_for_host(&self.host_id)
            .map_err(CycleError::Load)?;
        let plan = reconcile(&self.host_id, now, snapshot, known);

        let stats = self.db.apply_cycle(&plan).map_err(CycleError::Commit)?;
        tracing::info!(
            "cycle for host {}: {} new, {} updated, {} events",
            self.host_id,
            stats.created,
            stats.updated,
            stats.events
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PortKey, PortState, Protocol};

    fn entry(port: u16, name: &str) -> ScanEntry {
        ScanEntry {
            protocol: Protocol::Tcp,
            port,
            pid: Some(7),
            process_name: Some(name.to_string()),
            cmdline: None,
        }
    }

    #[tokio::test]
    async fn cycle_commits_snapshot() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let engine = Engine::new(db.clone(), "testhost".to_string(), Duration::from_secs(1));

        let stats = engine
            .apply_snapshot(&[entry(8080, "node"), entry(22, "sshd")])
            .await
            .unwrap();
        assert_eq!(stats.created, 2);

        let stats = engine.apply_snapshot(&[entry(22, "sshd")]).await.unwrap();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.updated, 2);

        let gone = db
            .runtime_by_key(&PortKey::new("testhost", Protocol::Tcp, 8080))
            .unwrap()
            .unwrap();
        assert_eq!(gone.current_state, PortState::Disappeared);
    }

    #[tokio::test]
    async fn concurrent_cycles_serialize_per_host() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let engine = Arc::new(Engine::new(
            db.clone(),
            "testhost".to_string(),
            Duration::from_secs(1),
        ));

        // Both tasks reconcile the same fresh key; serialization means one
        // creates it and the other refreshes it, never a duplicate row.
        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.apply_snapshot(&[entry(9090, "svc")]).await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.apply_snapshot(&[entry(9090, "svc")]).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(db.runtime_count().unwrap(), 1);
        assert_eq!(db.event_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_snapshot_is_processed_not_rejected() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let engine = Engine::new(db.clone(), "testhost".to_string(), Duration::from_secs(1));

        engine.apply_snapshot(&[entry(443, "nginx")]).await.unwrap();
        let stats = engine.apply_snapshot(&[]).await.unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.events, 1);
    }
}
