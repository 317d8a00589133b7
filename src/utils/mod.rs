pub mod duration;
pub mod host;

pub use duration::format_uptime;
pub use host::resolve_host_id;
