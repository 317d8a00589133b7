pub mod merged;
pub mod port;

pub use merged::{MergedPortItem, NoteUpdate};
pub use port::{
    DerivedStatus, EventType, PortEvent, PortKey, PortNote, PortRuntime, PortState, Protocol,
    RiskLevel, ServiceType,
};
