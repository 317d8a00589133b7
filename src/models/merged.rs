use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::port::{DerivedStatus, EventType, PortState, Protocol, RiskLevel, ServiceType};

/// One row of the merged port view: runtime facts joined with the note
/// for the same key, plus read-time derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct MergedPortItem {
    pub host_id: String,
    pub protocol: Protocol,
    pub port: u16,

    pub runtime_id: Option<i64>,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_disappeared_at: Option<DateTime<Utc>>,
    pub current_state: Option<PortState>,
    pub current_pid: Option<u32>,
    pub process_name: Option<String>,
    pub cmdline: Option<String>,
    pub uptime_human: String,

    pub note_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub service_type: Option<ServiceType>,
    pub risk_level: Option<RiskLevel>,
    pub is_pinned: bool,
    pub tags: Option<String>,

    pub derived_status: DerivedStatus,
    pub latest_event_type: Option<EventType>,
    pub latest_event_timestamp: Option<DateTime<Utc>>,
}

/// Partial note update: only `Some` fields are applied, the rest are
/// left untouched on an existing note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub service_type: Option<ServiceType>,
    pub risk_level: Option<RiskLevel>,
    pub is_pinned: Option<bool>,
    pub tags: Option<String>,
}
