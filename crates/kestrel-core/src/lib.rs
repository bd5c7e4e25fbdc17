mod endpoint;
mod error;
mod queue;
mod stats;

pub use endpoint::Endpoint;
pub use error::{CoreError, Result};
pub use queue::{validate_payload, validate_queue_name, MAX_KEY_LENGTH, MAX_QUEUE_NAME_LENGTH};
pub use stats::{QueueStats, StatValue, StatsSnapshot};

/// Default Kestrel memcache-protocol port
pub const DEFAULT_PORT: u16 = 22133;

/// Default server used when no endpoints are configured
pub const DEFAULT_SERVER: &str = "127.0.0.1:22133";
