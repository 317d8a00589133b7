pub mod cycle;
pub mod reconcile;
pub mod status;

pub use cycle::{CycleError, Engine, HostLocks};
pub use reconcile::{reconcile, CyclePlan};
pub use status::derive_status;
