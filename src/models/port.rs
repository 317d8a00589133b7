use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport protocol of a listening socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

impl From<&str> for Protocol {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "udp" => Self::Udp,
            _ => Self::Tcp,
        }
    }
}

/// Lifecycle state of a tracked port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Active,
    Disappeared,
}

impl Default for PortState {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Disappeared => write!(f, "disappeared"),
        }
    }
}

impl From<&str> for PortState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "disappeared" => Self::Disappeared,
            _ => Self::Active,
        }
    }
}

/// Audit event kind
///
/// `Alive` is reserved; no code path currently emits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Appeared,
    Alive,
    ProcessChange,
    Disappeared,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Appeared => write!(f, "appeared"),
            Self::Alive => write!(f, "alive"),
            Self::ProcessChange => write!(f, "process_change"),
            Self::Disappeared => write!(f, "disappeared"),
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "alive" => Self::Alive,
            "process_change" => Self::ProcessChange,
            "disappeared" => Self::Disappeared,
            _ => Self::Appeared,
        }
    }
}

/// Operator-assigned trust classification on a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Trusted,
    Expected,
    Suspicious,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Expected
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trusted => write!(f, "trusted"),
            Self::Expected => write!(f, "expected"),
            Self::Suspicious => write!(f, "suspicious"),
        }
    }
}

impl From<&str> for RiskLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trusted" => Self::Trusted,
            "suspicious" => Self::Suspicious,
            _ => Self::Expected,
        }
    }
}

/// Rough service category on a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Web,
    Db,
    Tunnel,
    Test,
    Unknown,
    Other,
}

impl Default for ServiceType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Web => write!(f, "web"),
            Self::Db => write!(f, "db"),
            Self::Tunnel => write!(f, "tunnel"),
            Self::Test => write!(f, "test"),
            Self::Unknown => write!(f, "unknown"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl From<&str> for ServiceType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "web" => Self::Web,
            "db" => Self::Db,
            "tunnel" => Self::Tunnel,
            "test" => Self::Test,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

/// Read-time classification of one (runtime, note) pair
///
/// `Flapping` is reserved; nothing produces it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedStatus {
    Healthy,
    Flapping,
    Suspicious,
    Ghost,
    Unknown,
}

impl fmt::Display for DerivedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Flapping => write!(f, "flapping"),
            Self::Suspicious => write!(f, "suspicious"),
            Self::Ghost => write!(f, "ghost"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Composite key identifying one tracked port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortKey {
    pub host_id: String,
    pub protocol: Protocol,
    pub port: u16,
}

impl PortKey {
    pub fn new(host_id: &str, protocol: Protocol, port: u16) -> Self {
        Self {
            host_id: host_id.to_string(),
            protocol,
            port,
        }
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host_id, self.protocol, self.port)
    }
}

/// Machine-observed occupancy record for one (host, protocol, port)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortRuntime {
    pub id: i64,
    pub host_id: String,
    pub protocol: Protocol,
    pub port: u16,

    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_disappeared_at: Option<DateTime<Utc>>,

    pub current_state: PortState,

    pub current_pid: Option<u32>,
    pub process_name: Option<String>,
    pub cmdline: Option<String>,

    pub total_seen_count: i64,
    /// Reserved; persisted but never computed.
    pub total_uptime_seconds: i64,
}

impl PortRuntime {
    pub fn key(&self) -> PortKey {
        PortKey::new(&self.host_id, self.protocol, self.port)
    }
}

/// Immutable audit record owned by one runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortEvent {
    pub id: i64,
    pub port_runtime_id: i64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub pid: Option<u32>,
    pub process_name: Option<String>,
}

/// Human-authored annotation, keyed like a runtime but with no FK to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortNote {
    pub id: i64,
    pub host_id: String,
    pub protocol: Protocol,
    pub port: u16,

    pub title: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub service_type: ServiceType,
    pub risk_level: RiskLevel,
    pub is_pinned: bool,
    pub tags: Option<String>,
}

impl PortNote {
    pub fn key(&self) -> PortKey {
        PortKey::new(&self.host_id, self.protocol, self.port)
    }
}
