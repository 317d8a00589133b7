//! Point-in-time snapshot of listening (protocol, port) -> occupant tuples.
//!
//! Fail-open by contract: if `ss` is missing, errors out or times out, the
//! snapshot is empty and the caller logs it. An empty snapshot is treated by
//! the engine as "nothing is listening" and will mark every active runtime
//! disappeared; the log line is the only way to tell the two apart.

pub mod proc;
pub mod ss;

use std::collections::HashMap;
use std::time::Duration;

use tokio::process::Command;

use crate::models::Protocol;

/// One observed listener. `process_name`/`cmdline` stay `None` when
/// occupant resolution fails; the port itself is still reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub protocol: Protocol,
    pub port: u16,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
    pub cmdline: Option<String>,
}

/// Take one snapshot of listening ports on the local host.
pub async fn snapshot(timeout: Duration) -> Vec<ScanEntry> {
    let output = match tokio::time::timeout(
        timeout,
        Command::new("ss").arg("-lntupH").output(),
    )
    .await
    {
        Err(_) => {
            tracing::warn!("ss timed out after {:?}, degrading to empty snapshot", timeout);
            return Vec::new();
        }
        Ok(Err(e)) => {
            tracing::warn!("failed to execute ss (is iproute2 installed?): {}", e);
            return Vec::new();
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        tracing::warn!("ss exited with {}, degrading to empty snapshot", output.status);
        return Vec::new();
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let mut entries = ss::parse_ss_output(&text);

    for entry in &mut entries {
        if let Some(pid) = entry.pid {
            // /proc usually beats the name ss parsed out of the users field.
            if let Some(name) = proc::process_name(pid) {
                entry.process_name = Some(name);
            }
            if let Some(cmdline) = proc::cmdline(pid) {
                entry.cmdline = Some(cmdline);
            }
        }
    }

    dedupe(entries)
}

/// At most one occupant per (protocol, port); last observed wins.
pub fn dedupe(entries: Vec<ScanEntry>) -> Vec<ScanEntry> {
    let mut map: HashMap<(Protocol, u16), ScanEntry> = HashMap::new();
    for entry in entries {
        map.insert((entry.protocol, entry.port), entry);
    }
    map.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_last_entry_per_key() {
        let entries = vec![
            ScanEntry {
                protocol: Protocol::Tcp,
                port: 3000,
                pid: Some(1),
                process_name: Some("first".to_string()),
                cmdline: None,
            },
            ScanEntry {
                protocol: Protocol::Tcp,
                port: 3000,
                pid: Some(2),
                process_name: Some("second".to_string()),
                cmdline: None,
            },
            ScanEntry {
                protocol: Protocol::Udp,
                port: 3000,
                pid: Some(3),
                process_name: Some("udp".to_string()),
                cmdline: None,
            },
        ];
        let deduped = dedupe(entries);
        assert_eq!(deduped.len(), 2);
        let tcp = deduped
            .iter()
            .find(|e| e.protocol == Protocol::Tcp)
            .unwrap();
        assert_eq!(tcp.process_name.as_deref(), Some("second"));
    }
}
