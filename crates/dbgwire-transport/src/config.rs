//! Transport configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::framing::MAX_PAYLOAD_LEN;

/// Port a remote backend host listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 1340;

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Address the listener binds to.
    pub bind_addr: IpAddr,

    /// Listener port, or the default port for connectors.
    pub port: u16,

    /// How long a connector waits for each resolved address.
    pub connect_timeout: Duration,

    /// Deadline for each blocking read once a transfer has started. `None`
    /// waits forever on a stalled peer.
    pub read_timeout: Option<Duration>,

    /// Deadline for each blocking write.
    pub write_timeout: Option<Duration>,

    /// Disable Nagle's algorithm; ticks send small buffers.
    pub nodelay: bool,

    /// Largest buffer accepted from a peer.
    pub max_payload: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(10)),
            write_timeout: Some(Duration::from_secs(10)),
            nodelay: true,
            max_payload: MAX_PAYLOAD_LEN,
        }
    }
}

impl TransportConfig {
    /// Creates a configuration for the given port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Loopback listener on an ephemeral port.
    pub fn loopback() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Default::default()
        }
    }

    /// Builder: set bind address.
    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Builder: set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder: set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set read deadline. A zero duration disables it.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Builder: set write deadline. A zero duration disables it.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Builder: set TCP no-delay.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Builder: set the largest accepted buffer, capped at the header limit.
    pub fn with_max_payload(mut self, max: u32) -> Self {
        self.max_payload = max.min(MAX_PAYLOAD_LEN);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.port, 1340);
        assert!(config.bind_addr.is_unspecified());
        assert_eq!(config.read_timeout, Some(Duration::from_secs(10)));
        assert!(config.nodelay);
        assert_eq!(config.max_payload, MAX_PAYLOAD_LEN);
    }

    #[test]
    fn custom_config() {
        let config = TransportConfig::new(4000)
            .with_connect_timeout(Duration::from_millis(250))
            .with_read_timeout(None)
            .with_nodelay(false)
            .with_max_payload(u32::MAX);

        assert_eq!(config.port, 4000);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.read_timeout, None);
        assert!(!config.nodelay);
        assert_eq!(config.max_payload, MAX_PAYLOAD_LEN);
    }

    #[test]
    fn zero_timeouts_disable_deadlines() {
        let config = TransportConfig::default()
            .with_read_timeout(Some(Duration::ZERO))
            .with_write_timeout(Some(Duration::ZERO));
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.write_timeout, None);
    }

    #[test]
    fn loopback_uses_ephemeral_port() {
        let config = TransportConfig::loopback();
        assert!(config.bind_addr.is_loopback());
        assert_eq!(config.port, 0);
    }
}
