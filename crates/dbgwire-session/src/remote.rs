//! Hosting a backend behind a socket for remote sessions.

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use dbgwire_core::{Action, DebugState, EventType};
use dbgwire_protocol::{Reader, Writer, dump};
use dbgwire_transport::{Connection, Incoming, TransportConfig};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionResult;
use crate::plugin::BackendPlugin;

const WAIT_STEP: Duration = Duration::from_millis(100);

/// Runs a backend for one remote front end at a time.
///
/// Each [`update`](Self::update) accepts a waiting front end, reads at most
/// one command from it, runs the backend once and sends back whatever the
/// backend wrote. The backend keeps running while nobody is connected.
pub struct RemoteBackendHost {
    connection: Connection,
    backend: Box<dyn BackendPlugin>,
    writer: Writer,
    debug_state: DebugState,
    reported: Option<DebugState>,
}

impl RemoteBackendHost {
    /// Starts listening with `backend` ready to serve.
    pub fn listen(backend: Box<dyn BackendPlugin>, config: TransportConfig) -> SessionResult<Self> {
        let connection = Connection::listen(config)?;
        info!(backend = backend.name(), "hosting backend");
        Ok(Self {
            connection,
            backend,
            writer: Writer::new(),
            debug_state: DebugState::NoTarget,
            reported: None,
        })
    }

    /// Listens on the configured address, then waits up to
    /// `session.wait_for_connection_ms` for a front end.
    pub fn from_config(
        backend: Box<dyn BackendPlugin>,
        config: &SessionConfig,
    ) -> SessionResult<Self> {
        let mut host = Self::listen(backend, config.transport_config())?;
        if let Some(timeout) = config.session.wait_for_connection() {
            if !host.wait_for_connection(timeout) {
                info!(?timeout, "no front end yet, serving anyway");
            }
        }
        Ok(host)
    }

    pub fn local_addr(&self) -> SessionResult<SocketAddr> {
        Ok(self.connection.local_addr()?)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn debug_state(&self) -> DebugState {
        self.debug_state
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Updates in 100 ms steps until a front end connects or `timeout`
    /// runs out. Returns whether one is connected.
    pub fn wait_for_connection(&mut self, timeout: Duration) -> bool {
        let mut remaining = timeout;
        while !remaining.is_zero() {
            thread::sleep(WAIT_STEP);
            if self.update() {
                return true;
            }
            remaining = remaining.saturating_sub(WAIT_STEP);
        }
        self.is_connected()
    }

    /// Runs one step. Returns whether a front end is connected afterwards.
    pub fn update(&mut self) -> bool {
        self.connection.poll_accept();

        let mut action = Action::None;
        let mut input = None;
        match self.connection.recv() {
            Ok(Some(Incoming::Action(code))) => match Action::from_code(code) {
                Some(a) => action = a,
                None => warn!(code, "unknown action code"),
            },
            Ok(Some(Incoming::Buffer(buf))) => input = Some(buf),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "lost front end"),
        }

        let mut reader = match input.as_deref().map(Reader::new) {
            Some(Ok(reader)) => reader,
            Some(Err(e)) => {
                warn!(error = %e, "undecodable request buffer");
                Reader::empty()
            }
            None => Reader::empty(),
        };

        self.writer.reset();
        self.debug_state = self.backend.update(action, &mut reader, &mut self.writer);
        self.report_state();
        if let Err(e) = self.writer.finalize() {
            warn!(backend = self.backend.name(), error = %e, "discarding backend output");
            self.writer.reset();
        }

        if !self.writer.is_empty() && self.connection.is_connected() {
            dump::trace_buffer("host reply", self.writer.as_bytes());
            match self.connection.send_buffer(self.writer.as_bytes()) {
                Ok(()) => debug!(len = self.writer.len(), "sent backend output"),
                Err(e) => {
                    warn!(error = %e, "failed to send backend output");
                    // A new front end must hear the state again.
                    self.reported = None;
                }
            }
        }
        self.connection.is_connected()
    }

    /// Appends a `SetStatus` event when the state differs from the one last
    /// sent, so front ends can follow the backend without asking.
    fn report_state(&mut self) {
        if !self.connection.is_connected() {
            self.reported = None;
            return;
        }
        if self.reported == Some(self.debug_state) || self.writer.depth() != 0 {
            return;
        }
        let written = self
            .writer
            .begin_event(EventType::SetStatus)
            .and_then(|()| self.writer.write_u32("state", self.debug_state.code()))
            .and_then(|()| self.writer.end_event());
        match written {
            Ok(()) => self.reported = Some(self.debug_state),
            Err(e) => warn!(error = %e, "failed to report backend state"),
        }
    }
}

impl std::fmt::Debug for RemoteBackendHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackendHost")
            .field("backend", &self.backend.name())
            .field("connection", &self.connection)
            .field("debug_state", &self.debug_state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    impl BackendPlugin for Idle {
        fn name(&self) -> &str {
            "idle"
        }

        fn update(&mut self, action: Action, _: &mut Reader<'_>, _: &mut Writer) -> DebugState {
            match action {
                Action::Run => DebugState::Running,
                _ => DebugState::NoTarget,
            }
        }
    }

    #[test]
    fn backend_runs_without_a_front_end() {
        let mut host =
            RemoteBackendHost::listen(Box::new(Idle), TransportConfig::loopback()).unwrap();
        assert!(!host.update());
        assert!(!host.update());
        assert_eq!(host.backend_name(), "idle");
        assert_eq!(host.debug_state(), DebugState::NoTarget);
        assert_ne!(host.local_addr().unwrap().port(), 0);
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn from_config_waits_for_a_front_end() {
        let port = free_port();
        let config = SessionConfig::from_toml_str(&format!(
            "[transport]\nbind_addr = \"127.0.0.1\"\nport = {port}\n\n\
             [session]\nwait_for_connection_ms = 5000\n"
        ))
        .unwrap();

        let front_end = thread::spawn(move || {
            for _ in 0..200 {
                let attempt = Connection::connect("127.0.0.1", port, TransportConfig::default());
                if let Ok(conn) = attempt {
                    return conn;
                }
                thread::sleep(Duration::from_millis(10));
            }
            panic!("host never listened on {port}");
        });

        let host = RemoteBackendHost::from_config(Box::new(Idle), &config).unwrap();
        assert!(host.is_connected());
        assert_eq!(host.local_addr().unwrap().port(), port);
        assert!(front_end.join().unwrap().is_connected());
    }

    #[test]
    fn from_config_without_wait_returns_at_once() {
        let config =
            SessionConfig::from_toml_str("[transport]\nbind_addr = \"127.0.0.1\"\nport = 0\n")
                .unwrap();
        let host = RemoteBackendHost::from_config(Box::new(Idle), &config).unwrap();
        assert!(!host.is_connected());
    }

    #[test]
    fn wait_gives_up_after_timeout() {
        let mut host =
            RemoteBackendHost::listen(Box::new(Idle), TransportConfig::loopback()).unwrap();
        assert!(!host.wait_for_connection(Duration::from_millis(200)));
        assert!(!host.wait_for_connection(Duration::ZERO));
    }
}
