//! Session configuration.
//!
//! Settings are read from a TOML file with three optional sections:
//!
//! ```toml
//! [transport]
//! port = 1340
//! read_timeout_ms = 10000
//!
//! [session]
//! run_on_start = true
//!
//! [logging]
//! level = "info"
//! format = "compact"
//!
//! [logging.crates]
//! transport = "trace"
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use dbgwire_core::{TracingConfig, TracingOutputFormat, init_tracing, parse_level};
use dbgwire_transport::{DEFAULT_PORT, TransportConfig};
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Top-level session configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub transport: TransportSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

/// Socket settings for remote sessions and backend hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Address a backend host listens on.
    pub bind_addr: IpAddr,

    pub port: u16,

    pub connect_timeout_ms: u64,

    /// Read deadline once a transfer has started. 0 disables it.
    pub read_timeout_ms: u64,

    /// Write deadline. 0 disables it.
    pub write_timeout_ms: u64,

    pub nodelay: bool,

    /// Largest buffer accepted from a peer, in bytes.
    pub max_payload: Option<u32>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            write_timeout_ms: 10_000,
            nodelay: true,
            max_payload: None,
        }
    }
}

/// Pipeline behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Send a run action right after a local target is loaded.
    pub run_on_start: bool,

    /// How long [`RemoteBackendHost::from_config`] waits for a front end.
    /// 0 does not wait.
    ///
    /// [`RemoteBackendHost::from_config`]: crate::RemoteBackendHost::from_config
    pub wait_for_connection_ms: u64,
}

impl SessionSettings {
    pub fn wait_for_connection(&self) -> Option<Duration> {
        (self.wait_for_connection_ms > 0).then(|| Duration::from_millis(self.wait_for_connection_ms))
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,

    /// `pretty`, `compact` or `json`.
    pub format: String,

    /// Level per crate, keyed `core`, `protocol`, `transport` or `session`.
    pub crates: BTreeMap<String, String>,

    /// Filter directive that replaces all levels, e.g. `dbgwire_session=trace`.
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            crates: BTreeMap::new(),
            filter: None,
        }
    }
}

impl SessionConfig {
    /// Loads configuration from a specific path.
    pub fn load_from(path: impl AsRef<Path>) -> SessionResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> SessionResult<()> {
        if self.transport.connect_timeout_ms == 0 {
            return Err(SessionError::config("transport.connect_timeout_ms must be positive"));
        }
        if self.transport.max_payload.is_some_and(|max| max < 4) {
            return Err(SessionError::config(
                "transport.max_payload must leave room for the length prefix",
            ));
        }
        Ok(())
    }

    /// Converts the `[transport]` section.
    pub fn transport_config(&self) -> TransportConfig {
        let t = &self.transport;
        let mut config = TransportConfig::new(t.port)
            .with_bind_addr(t.bind_addr)
            .with_connect_timeout(Duration::from_millis(t.connect_timeout_ms))
            .with_read_timeout(Some(Duration::from_millis(t.read_timeout_ms)))
            .with_write_timeout(Some(Duration::from_millis(t.write_timeout_ms)))
            .with_nodelay(t.nodelay);
        if let Some(max) = t.max_payload {
            config = config.with_max_payload(max);
        }
        config
    }

    /// Converts the `[logging]` section.
    pub fn tracing_config(&self) -> SessionResult<TracingConfig> {
        let format: TracingOutputFormat = self.logging.format.parse()?;
        let mut config = TracingConfig::default()
            .with_level(parse_level(&self.logging.level)?)
            .with_format(format);
        for (name, level) in &self.logging.crates {
            config = config.with_crate_level(name, parse_level(level)?)?;
        }
        if let Some(filter) = &self.logging.filter {
            config = config.with_env_filter(filter.clone());
        }
        Ok(config)
    }

    /// Installs the global log subscriber from `[logging]`. Call once.
    pub fn init_logging(&self) -> SessionResult<()> {
        init_tracing(&self.tracing_config()?)?;
        Ok(())
    }
}
