//! Heartbeat protocol configuration.

use std::time::Duration;

/// Well-known UDP port shared by every instance on the segment.
pub const RECV_PORT: u16 = 12345;

/// Heartbeat payload size in bytes. The content is insignificant; only
/// arrival signals presence.
pub const BUF_SIZE: usize = 5;

/// Configuration for the heartbeat protocol.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Multicast group address (IPv4 or IPv6 literal).
    pub group_addr: String,
    /// UDP port for the group.
    pub port: u16,
    /// Interval between heartbeat announcements.
    pub announce_interval: Duration,
    /// Minimum gap between expiry sweeps.
    pub check_interval: Duration,
    /// Peers silent for at least this long are evicted on the next sweep.
    pub offline_timeout: Duration,
}

impl HeartbeatConfig {
    /// Create a configuration for the given group address with default
    /// timings and port.
    pub fn new(group_addr: impl Into<String>) -> Self {
        Self {
            group_addr: group_addr.into(),
            ..Self::default()
        }
    }

    /// Set the group port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            group_addr: "239.255.0.1".to_string(),
            port: RECV_PORT,
            announce_interval: Duration::from_secs(1),
            check_interval: Duration::from_millis(1000),
            offline_timeout: Duration::from_millis(1000),
        }
    }
}
