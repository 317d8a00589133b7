//! Read-time status derivation.

use crate::models::{DerivedStatus, PortNote, PortRuntime, PortState, RiskLevel};

/// Classify one (runtime, note) pair for display.
///
/// Total over every combination of present/absent runtime and note and
/// every risk level. `Flapping` is reserved and never returned here.
pub fn derive_status(runtime: Option<&PortRuntime>, note: Option<&PortNote>) -> DerivedStatus {
    match (runtime.map(|r| r.current_state), note.map(|n| n.risk_level)) {
        (Some(PortState::Active), Some(RiskLevel::Trusted)) => DerivedStatus::Healthy,
        (Some(PortState::Active), Some(RiskLevel::Suspicious)) => DerivedStatus::Suspicious,
        (Some(PortState::Active), Some(RiskLevel::Expected)) => DerivedStatus::Healthy,
        (Some(PortState::Active), None) => DerivedStatus::Suspicious,
        (Some(PortState::Disappeared), Some(RiskLevel::Expected)) => DerivedStatus::Ghost,
        (Some(PortState::Disappeared), _) => DerivedStatus::Unknown,
        (None, _) => DerivedStatus::Unknown,
    }
}
