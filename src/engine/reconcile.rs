//! Snapshot-vs-known-state diff: the reconciliation core.
//!
//! `reconcile` is a pure function from (snapshot, known runtimes) to a
//! [`CyclePlan`] of runtime mutations and audit events. It performs no I/O;
//! the plan is committed atomically by [`crate::db::Database::apply_cycle`].

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{EventType, PortRuntime, PortState, Protocol};
use crate::observer::ScanEntry;

/// Audit event to be inserted, before it has a row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
}

/// Runtime to be created. Implies state=active, total_seen_count=1 and
/// exactly one APPEARED event snapshotting the occupant below.
#[derive(Debug, Clone)]
pub struct RuntimeDraft {
    pub host_id: String,
    pub protocol: Protocol,
    pub port: u16,
    pub first_seen_at: DateTime<Utc>,
    pub current_pid: Option<u32>,
    pub process_name: Option<String>,
    pub cmdline: Option<String>,
}

/// Full updated row for an existing runtime, plus at most one event.
#[derive(Debug, Clone)]
pub struct RuntimeChange {
    pub runtime: PortRuntime,
    pub event: Option<EventDraft>,
}

/// Everything one cycle wants to persist, committed as a single transaction.
#[derive(Debug, Clone, Default)]
pub struct CyclePlan {
    pub creates: Vec<RuntimeDraft>,
    pub changes: Vec<RuntimeChange>,
}

impl CyclePlan {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.changes.is_empty()
    }

    /// Number of events this plan will insert.
    pub fn event_count(&self) -> usize {
        self.creates.len() + self.changes.iter().filter(|c| c.event.is_some()).count()
    }
}

fn non_empty(s: &Option<String>) -> Option<&String> {
    s.as_ref().filter(|v| !v.is_empty())
}

/// Overwrite occupant fields with observed values, but never replace a
/// known value with an empty or missing one.
fn refresh_occupant(runtime: &mut PortRuntime, entry: &ScanEntry) {
    if entry.pid.is_some() {
        runtime.current_pid = entry.pid;
    }
    if let Some(name) = non_empty(&entry.process_name) {
        runtime.process_name = Some(name.clone());
    }
    if let Some(cmdline) = non_empty(&entry.cmdline) {
        runtime.cmdline = Some(cmdline.clone());
    }
}

/// Diff one host's snapshot against its known runtimes.
///
/// Keys present in the snapshot become active (created on first sight,
/// re-activated after a disappearance, refreshed otherwise); active keys
/// absent from the snapshot disappear. Runtimes belonging to other hosts
/// must not be passed in; the caller scopes the query.
pub fn reconcile(
    host_id: &str,
    now: DateTime<Utc>,
    snapshot: &[ScanEntry],
    known: Vec<PortRuntime>,
) -> CyclePlan {
    // Last entry wins on duplicate (protocol, port) keys.
    let mut scan_map: HashMap<(Protocol, u16), &ScanEntry> = HashMap::new();
    for entry in snapshot {
        scan_map.insert((entry.protocol, entry.port), entry);
    }

    let mut known_map: HashMap<(Protocol, u16), PortRuntime> = HashMap::new();
    for runtime in known {
        known_map.insert((runtime.protocol, runtime.port), runtime);
    }

    let mut plan = CyclePlan::default();

    for (key, entry) in &scan_map {
        match known_map.remove(key) {
            None => {
                plan.creates.push(RuntimeDraft {
                    host_id: host_id.to_string(),
                    protocol: entry.protocol,
                    port: entry.port,
                    first_seen_at: now,
                    current_pid: entry.pid,
                    process_name: entry.process_name.clone(),
                    cmdline: entry.cmdline.clone(),
                });
            }
            Some(mut runtime) => {
                let event = match runtime.current_state {
                    PortState::Disappeared => {
                        runtime.current_state = PortState::Active;
                        runtime.last_seen_at = now;
                        runtime.total_seen_count += 1;
                        Some(EventDraft {
                            event_type: EventType::Appeared,
                            timestamp: now,
                            pid: entry.pid,
                            process_name: entry.process_name.clone(),
                        })
                    }
                    PortState::Active => {
                        // Hijack / service-swap detection: compare names only,
                        // pid churn from restarts is expected.
                        let changed = match (
                            non_empty(&runtime.process_name),
                            non_empty(&entry.process_name),
                        ) {
                            (Some(old), Some(new)) => old != new,
                            _ => false,
                        };
                        runtime.last_seen_at = now;
                        if changed {
                            tracing::warn!(
                                "process changed on port {}/{}: {} -> {}",
                                runtime.protocol,
                                runtime.port,
                                runtime.process_name.as_deref().unwrap_or(""),
                                entry.process_name.as_deref().unwrap_or("")
                            );
                            Some(EventDraft {
                                event_type: EventType::ProcessChange,
                                timestamp: now,
                                pid: entry.pid,
                                process_name: entry.process_name.clone(),
                            })
                        } else {
                            None
                        }
                    }
                };

                refresh_occupant(&mut runtime, entry);
                plan.changes.push(RuntimeChange { runtime, event });
            }
        }
    }

    // Whatever is left in known_map was not observed this cycle. Only
    // active runtimes transition; already-disappeared ones stay silent.
    for (_, mut runtime) in known_map {
        if runtime.current_state == PortState::Active {
            runtime.current_state = PortState::Disappeared;
            runtime.last_disappeared_at = Some(now);
            let event = EventDraft {
                event_type: EventType::Disappeared,
                timestamp: now,
                pid: runtime.current_pid,
                process_name: runtime.process_name.clone(),
            };
            plan.changes.push(RuntimeChange {
                runtime,
                event: Some(event),
            });
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(protocol: Protocol, port: u16, name: &str) -> ScanEntry {
        ScanEntry {
            protocol,
            port,
            pid: Some(100),
            process_name: if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            },
            cmdline: None,
        }
    }

    fn runtime(protocol: Protocol, port: u16, state: PortState, name: &str) -> PortRuntime {
        PortRuntime {
            id: 1,
            host_id: "testhost".to_string(),
            protocol,
            port,
            first_seen_at: Utc::now(),
            last_seen_at: Utc::now(),
            last_disappeared_at: None,
            current_state: state,
            current_pid: Some(42),
            process_name: if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            },
            cmdline: Some("/usr/sbin/oldd --flag".to_string()),
            total_seen_count: 3,
            total_uptime_seconds: 0,
        }
    }

    #[test]
    fn new_key_creates_runtime_with_appeared() {
        let now = Utc::now();
        let snap = vec![entry(Protocol::Tcp, 8080, "nginx")];
        let plan = reconcile("testhost", now, &snap, Vec::new());

        assert_eq!(plan.creates.len(), 1);
        assert!(plan.changes.is_empty());
        assert_eq!(plan.event_count(), 1);
        let draft = &plan.creates[0];
        assert_eq!(draft.port, 8080);
        assert_eq!(draft.first_seen_at, now);
        assert_eq!(draft.process_name.as_deref(), Some("nginx"));
    }

    #[test]
    fn reappearance_increments_seen_count() {
        let now = Utc::now();
        let snap = vec![entry(Protocol::Tcp, 22, "sshd")];
        let known = vec![runtime(Protocol::Tcp, 22, PortState::Disappeared, "sshd")];
        let plan = reconcile("testhost", now, &snap, known);

        assert!(plan.creates.is_empty());
        assert_eq!(plan.changes.len(), 1);
        let change = &plan.changes[0];
        assert_eq!(change.runtime.current_state, PortState::Active);
        assert_eq!(change.runtime.total_seen_count, 4);
        assert_eq!(change.runtime.last_seen_at, now);
        let event = change.event.as_ref().unwrap();
        assert_eq!(event.event_type, EventType::Appeared);
    }

    #[test]
    fn steady_state_refresh_emits_no_event() {
        let now = Utc::now();
        let snap = vec![entry(Protocol::Tcp, 22, "sshd")];
        let known = vec![runtime(Protocol::Tcp, 22, PortState::Active, "sshd")];
        let plan = reconcile("testhost", now, &snap, known);

        assert_eq!(plan.changes.len(), 1);
        let change = &plan.changes[0];
        assert!(change.event.is_none());
        assert_eq!(change.runtime.last_seen_at, now);
        // Refresh must not bump the appearance counter.
        assert_eq!(change.runtime.total_seen_count, 3);
    }

    #[test]
    fn process_name_change_emits_process_change() {
        let now = Utc::now();
        let snap = vec![entry(Protocol::Tcp, 80, "badguy")];
        let known = vec![runtime(Protocol::Tcp, 80, PortState::Active, "nginx")];
        let plan = reconcile("testhost", now, &snap, known);

        let change = &plan.changes[0];
        let event = change.event.as_ref().unwrap();
        assert_eq!(event.event_type, EventType::ProcessChange);
        assert_eq!(event.process_name.as_deref(), Some("badguy"));
        assert_eq!(change.runtime.process_name.as_deref(), Some("badguy"));
        assert_eq!(change.runtime.total_seen_count, 3);
    }

    #[test]
    fn empty_observed_name_never_triggers_change() {
        let now = Utc::now();
        let snap = vec![entry(Protocol::Tcp, 80, "")];
        let known = vec![runtime(Protocol::Tcp, 80, PortState::Active, "nginx")];
        let plan = reconcile("testhost", now, &snap, known);

        let change = &plan.changes[0];
        assert!(change.event.is_none());
        // Known occupant survives an unresolved observation.
        assert_eq!(change.runtime.process_name.as_deref(), Some("nginx"));
        assert_eq!(change.runtime.cmdline.as_deref(), Some("/usr/sbin/oldd --flag"));
    }

    #[test]
    fn empty_known_name_is_filled_without_change_event() {
        let now = Utc::now();
        let snap = vec![entry(Protocol::Tcp, 80, "nginx")];
        let known = vec![runtime(Protocol::Tcp, 80, PortState::Active, "")];
        let plan = reconcile("testhost", now, &snap, known);

        let change = &plan.changes[0];
        assert!(change.event.is_none());
        assert_eq!(change.runtime.process_name.as_deref(), Some("nginx"));
    }

    #[test]
    fn absent_active_key_disappears_once() {
        let now = Utc::now();
        let known = vec![runtime(Protocol::Tcp, 443, PortState::Active, "nginx")];
        let plan = reconcile("testhost", now, &[], known);

        assert_eq!(plan.changes.len(), 1);
        let change = &plan.changes[0];
        assert_eq!(change.runtime.current_state, PortState::Disappeared);
        assert_eq!(change.runtime.last_disappeared_at, Some(now));
        let event = change.event.as_ref().unwrap();
        assert_eq!(event.event_type, EventType::Disappeared);
        assert_eq!(event.process_name.as_deref(), Some("nginx"));

        // Second cycle with the key still absent: no further mutation.
        let again = reconcile(
            "testhost",
            Utc::now(),
            &[],
            vec![change.runtime.clone()],
        );
        assert!(again.is_empty());
    }

    #[test]
    fn empty_snapshot_drives_every_active_runtime_down() {
        let now = Utc::now();
        let known = vec![
            runtime(Protocol::Tcp, 22, PortState::Active, "sshd"),
            runtime(Protocol::Udp, 53, PortState::Active, "dnsmasq"),
            runtime(Protocol::Tcp, 8080, PortState::Disappeared, "old"),
        ];
        let plan = reconcile("testhost", now, &[], known);

        assert_eq!(plan.changes.len(), 2);
        assert!(plan
            .changes
            .iter()
            .all(|c| c.runtime.current_state == PortState::Disappeared));
        assert_eq!(plan.event_count(), 2);
    }

    #[test]
    fn duplicate_scan_keys_last_wins() {
        let now = Utc::now();
        let snap = vec![
            entry(Protocol::Tcp, 3000, "first"),
            entry(Protocol::Tcp, 3000, "second"),
        ];
        let plan = reconcile("testhost", now, &snap, Vec::new());

        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].process_name.as_deref(), Some("second"));
    }

    #[test]
    fn same_port_different_protocol_are_distinct_keys() {
        let now = Utc::now();
        let snap = vec![
            entry(Protocol::Tcp, 53, "systemd-resolved"),
            entry(Protocol::Udp, 53, "systemd-resolved"),
        ];
        let plan = reconcile("testhost", now, &snap, Vec::new());
        assert_eq!(plan.creates.len(), 2);
    }

    #[test]
    fn pid_restart_alone_is_not_a_change() {
        let now = Utc::now();
        let mut e = entry(Protocol::Tcp, 22, "sshd");
        e.pid = Some(9999);
        let known = vec![runtime(Protocol::Tcp, 22, PortState::Active, "sshd")];
        let plan = reconcile("testhost", now, &[e], known);

        let change = &plan.changes[0];
        assert!(change.event.is_none());
        assert_eq!(change.runtime.current_pid, Some(9999));
    }
}
