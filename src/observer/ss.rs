//! Parser for `ss -lntupH` output.

use regex::Regex;

use super::ScanEntry;
use crate::models::Protocol;

/// Parse one snapshot worth of `ss` output.
///
/// Keeps TCP sockets only in LISTEN state and all UDP sockets. Malformed
/// lines are skipped, never fatal.
pub fn parse_ss_output(output: &str) -> Vec<ScanEntry> {
    // users:(("sshd",pid=860,fd=3))
    let pid_re = Regex::new(r"pid=(\d+)").expect("static regex");
    let name_re = Regex::new(r#""([^"]+)""#).expect("static regex");

    let mut entries = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }

        let protocol_raw = parts[0];
        let state = parts[1];

        let protocol = if protocol_raw.contains("tcp") {
            if state != "LISTEN" {
                continue;
            }
            Protocol::Tcp
        } else if protocol_raw.contains("udp") {
            Protocol::Udp
        } else {
            continue;
        };

        let Some(port) = extract_port(parts[4]) else {
            continue;
        };

        let mut pid = None;
        let mut process_name = None;
        if line.contains("users:") {
            pid = pid_re
                .captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok());
            process_name = name_re
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
        }

        entries.push(ScanEntry {
            protocol,
            port,
            pid,
            process_name,
            cmdline: None,
        });
    }

    entries
}

/// Extract the port from a local-address column.
///
/// Handles `0.0.0.0:22`, `[::]:80`, `[fe80::1%lo]:546` and `*:68`.
pub fn extract_port(local_addr: &str) -> Option<u16> {
    let raw = if let Some((_, rest)) = local_addr.rsplit_once("]:") {
        rest
    } else {
        local_addr.rsplit(':').next()?
    };
    raw.parse::<u16>().ok()
}
