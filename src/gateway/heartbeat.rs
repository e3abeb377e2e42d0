use std::time::Duration;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(45);
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Liveness settings for realtime connections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatConfig {
    /// Interval advertised to clients in HELLO; also how often the server
    /// checks for a missed heartbeat.
    pub interval: Duration,
    /// A connection with no heartbeat for this long is dropped.
    pub timeout: Duration,
    /// Time allowed between HELLO and JOIN.
    pub join_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}
