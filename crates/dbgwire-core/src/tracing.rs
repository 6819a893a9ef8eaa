//! Log setup shared by front ends and backend hosts.
//!
//! Each workspace crate logs under its own target, so verbosity is chosen per
//! crate: a transport problem can be traced without drowning in per-tick
//! session logs.
//!
//! ```ignore
//! use dbgwire_core::tracing::{init_tracing, TracingConfig};
//! use tracing::Level;
//!
//! let config = TracingConfig::default().with_crate_level("transport", Level::TRACE)?;
//! init_tracing(&config)?;
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Crates whose verbosity can be set on their own.
pub const CRATES: [&str; 4] = [
    "dbgwire_core",
    "dbgwire_protocol",
    "dbgwire_transport",
    "dbgwire_session",
];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("unknown crate {0:?}, expected one of core, protocol, transport, session")]
    UnknownCrate(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line, for hosts run under a supervisor.
    Json,
}

impl FromStr for TracingOutputFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(TracingError::UnknownFormat(s.to_string())),
        }
    }
}

/// Parses a level name such as `"debug"` or `"WARN"`.
pub fn parse_level(s: &str) -> Result<Level, TracingError> {
    Level::from_str(s).map_err(|_| TracingError::UnknownLevel(s.to_string()))
}

/// Resolves `"transport"` or `"dbgwire_transport"` to the crate target.
fn crate_target(name: &str) -> Option<&'static str> {
    let name = name.trim();
    CRATES
        .iter()
        .copied()
        .find(|target| *target == name || target.strip_prefix("dbgwire_") == Some(name))
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for every crate without its own entry.
    pub default_level: Level,
    /// Per-crate overrides, keyed by full crate target.
    pub crate_levels: BTreeMap<&'static str, Level>,
    pub output_format: TracingOutputFormat,
    /// Adds file and line to each record.
    pub include_location: bool,
    pub include_timestamp: bool,
    /// Logs span open and close, e.g. around each tick.
    pub include_span_events: bool,
    /// Raw directive used verbatim, ignoring levels and `RUST_LOG`.
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            crate_levels: BTreeMap::new(),
            output_format: TracingOutputFormat::Pretty,
            include_location: false,
            include_timestamp: true,
            include_span_events: false,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Overrides the level of one crate, named with or without the
    /// `dbgwire_` prefix.
    pub fn with_crate_level(mut self, name: &str, level: Level) -> Result<Self, TracingError> {
        let target =
            crate_target(name).ok_or_else(|| TracingError::UnknownCrate(name.to_string()))?;
        self.crate_levels.insert(target, level);
        Ok(self)
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// One `target=level` directive per workspace crate.
    pub fn directives(&self) -> String {
        CRATES
            .iter()
            .map(|target| {
                let level = self.crate_levels.get(target).unwrap_or(&self.default_level);
                format!("{target}={level}")
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn build_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.directives())?),
        }
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingError> {
    let filter = config.build_filter()?;
    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events);
    let layer = match (config.output_format, config.include_timestamp) {
        (TracingOutputFormat::Json, _) => layer.json().boxed(),
        (TracingOutputFormat::Compact, true) => layer.compact().boxed(),
        (TracingOutputFormat::Compact, false) => layer.compact().without_time().boxed(),
        (TracingOutputFormat::Pretty, true) => layer.pretty().boxed(),
        (TracingOutputFormat::Pretty, false) => layer.pretty().without_time().boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).try_init()?;
    Ok(())
}
