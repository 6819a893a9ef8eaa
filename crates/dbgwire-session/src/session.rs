//! The tick pipeline connecting a backend to its views.
//!
//! Every tick moves data one step around a loop:
//!
//! ```text
//!   views ──(requests)──▶ backend ──(replies)──▶ views
//! ```
//!
//! In local mode the backend runs in-process and sees the requests the views
//! wrote on the previous tick. In remote mode the backend lives behind a
//! socket: requests are sent after the view pass and replies are picked up
//! on a later tick. A null session has no backend at all; its views run over
//! an empty buffer.

use std::fmt;

use dbgwire_core::{Action, DebugState, EventType};
use dbgwire_protocol::{Cursor, LENGTH_PREFIX, Reader, Writer, dump};
use dbgwire_transport::{Connection, Incoming, TransportConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SessionSettings;
use crate::error::{SessionError, SessionResult};
use crate::plugin::{BackendPlugin, ViewContext, ViewHandle, ViewPlugin};
use crate::registry::PluginRegistry;
use crate::state::{LoadState, SaveState};

const EMPTY_BUFFER: [u8; LENGTH_PREFIX] = (LENGTH_PREFIX as u32).to_be_bytes();

/// Where the backend runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Local,
    Remote,
    Null,
}

impl SessionMode {
    fn name(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct ViewSlot {
    handle: ViewHandle,
    plugin: Box<dyn ViewPlugin>,
    remove: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedPlugin {
    name: String,
    #[serde(default)]
    state: Value,
}

impl SavedPlugin {
    /// Plugin state is a list of values; null stands for an empty one.
    fn check(&self) -> SessionResult<()> {
        if self.state.is_null() || self.state.is_array() {
            return Ok(());
        }
        Err(SessionError::state(format!(
            "state of {:?} must be a list, found {}",
            self.name, self.state
        )))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SavedSession {
    backend: Option<SavedPlugin>,
    views: Vec<SavedPlugin>,
}

/// Owns a backend (or the link to one), the views and both pipeline buffers.
pub struct Session {
    mode: SessionMode,
    backend: Option<Box<dyn BackendPlugin>>,
    connection: Option<Connection>,
    views: Vec<ViewSlot>,
    /// Merged view output; the backend's input on the next tick.
    view_writer: Writer,
    /// Backend output of the current tick (local mode).
    backend_writer: Writer,
    /// Buffer received this tick (remote mode).
    received: Vec<u8>,
    debug_state: DebugState,
    ticks: u64,
    next_handle: u64,
}

impl Session {
    fn with_mode(mode: SessionMode) -> Self {
        Self {
            mode,
            backend: None,
            connection: None,
            views: Vec::new(),
            view_writer: Writer::new(),
            backend_writer: Writer::new(),
            received: EMPTY_BUFFER.to_vec(),
            debug_state: DebugState::NoTarget,
            ticks: 0,
            next_handle: 1,
        }
    }

    /// A session with no backend.
    pub fn null() -> Self {
        info!("created null session");
        Self::with_mode(SessionMode::Null)
    }

    /// A session driving an in-process backend.
    pub fn local(backend: Box<dyn BackendPlugin>) -> Self {
        info!(backend = backend.name(), "created local session");
        let mut session = Self::with_mode(SessionMode::Local);
        session.backend = Some(backend);
        session
    }

    /// Creates a local session and loads `executable` into the backend.
    ///
    /// The backend sees a `SetExecutable { filename }` event on the first
    /// tick; with `run_on_start` a second tick delivers [`Action::Run`].
    pub fn start_local(
        backend: Box<dyn BackendPlugin>,
        executable: &str,
        settings: &SessionSettings,
    ) -> SessionResult<Self> {
        let mut session = Self::local(backend);

        session.view_writer.begin_event(EventType::SetExecutable)?;
        session.view_writer.write_string("filename", executable)?;
        session.view_writer.end_event()?;
        session.view_writer.finalize()?;
        info!(executable, "loading executable");
        session.tick_local(Action::None);

        if settings.run_on_start {
            session.tick_local(Action::Run);
        }
        Ok(session)
    }

    /// A session talking to a backend host over `connection`.
    ///
    /// A listening connection is polled for its host at the start of every
    /// tick.
    pub fn remote(connection: Connection) -> Self {
        info!(peer = ?connection.peer_addr(), "created remote session");
        let mut session = Self::with_mode(SessionMode::Remote);
        session.connection = Some(connection);
        session
    }

    /// Connects to a backend host and creates a remote session.
    pub fn connect_remote(host: &str, port: u16, config: TransportConfig) -> SessionResult<Self> {
        let connection = Connection::connect(host, port, config)?;
        Ok(Self::remote(connection))
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Last state reported by the backend.
    pub fn debug_state(&self) -> DebugState {
        self.debug_state
    }

    /// Number of ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|backend| backend.name())
    }

    /// True while a remote session has a live link to its host.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_connected)
    }

    /// The merged view output of the last tick.
    pub fn view_output(&self) -> &[u8] {
        self.view_writer.as_bytes()
    }

    /// The backend data the views saw on the last tick.
    pub fn backend_output(&self) -> &[u8] {
        match self.mode {
            SessionMode::Local => self.backend_writer.as_bytes(),
            SessionMode::Remote => &self.received,
            SessionMode::Null => &EMPTY_BUFFER,
        }
    }

    /// Adds a view. It runs after every view already present.
    pub fn add_view(&mut self, plugin: Box<dyn ViewPlugin>) -> ViewHandle {
        let handle = ViewHandle(self.next_handle);
        self.next_handle += 1;
        debug!(%handle, view = plugin.name(), "added view");
        self.views.push(ViewSlot {
            handle,
            plugin,
            remove: false,
        });
        handle
    }

    /// Removes a view. Returns false if the handle is unknown.
    pub fn remove_view(&mut self, handle: ViewHandle) -> bool {
        let before = self.views.len();
        self.views.retain(|slot| slot.handle != handle);
        let removed = self.views.len() != before;
        if removed {
            debug!(%handle, "removed view");
        }
        removed
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// View names in run order.
    pub fn view_names(&self) -> impl Iterator<Item = &str> {
        self.views.iter().map(|slot| slot.plugin.name())
    }

    /// Runs one tick with no action.
    pub fn update(&mut self) {
        match self.mode {
            SessionMode::Local => self.tick_local(Action::None),
            SessionMode::Remote => self.tick_remote(),
            SessionMode::Null => self.tick_null(),
        }
    }

    /// Delivers an action to the backend.
    ///
    /// Local sessions run a tick carrying the action. Remote sessions send
    /// the action straight away; the host's reaction arrives on a later
    /// tick.
    pub fn action(&mut self, action: Action) {
        match self.mode {
            SessionMode::Local => self.tick_local(action),
            SessionMode::Remote => {
                let Some(connection) = self.connection.as_mut() else {
                    return;
                };
                match connection.send_action(action.code()) {
                    Ok(()) => debug!(%action, "sent action"),
                    Err(e) => warn!(%action, error = %e, "failed to send action"),
                }
            }
            SessionMode::Null => debug!(%action, "no backend, action ignored"),
        }
    }

    fn tick_local(&mut self, action: Action) {
        self.ticks += 1;
        let Some(backend) = self.backend.as_mut() else {
            return;
        };

        let mut requests = reader_or_empty("view output", self.view_writer.as_bytes());
        self.backend_writer.reset();
        let state = backend.update(action, &mut requests, &mut self.backend_writer);
        if state != self.debug_state {
            info!(from = %self.debug_state.label(), to = %state.label(), "backend state changed");
            self.debug_state = state;
        }
        if let Err(e) = self.backend_writer.finalize() {
            warn!(backend = backend.name(), error = %e, "discarding backend output");
            self.backend_writer.reset();
        }
        dump::trace_buffer("backend", self.backend_writer.as_bytes());

        run_views(
            &mut self.views,
            self.backend_writer.as_bytes(),
            &mut self.view_writer,
            self.ticks,
            self.debug_state,
        );
        debug!(
            tick = self.ticks,
            %action,
            backend_len = self.backend_writer.len(),
            view_len = self.view_writer.len(),
            "local tick"
        );
        self.sweep_views();
    }

    fn tick_remote(&mut self) {
        self.ticks += 1;
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        // No-op for a connector; a listening session picks up its host here.
        connection.poll_accept();

        self.received.clear();
        self.received.extend_from_slice(&EMPTY_BUFFER);
        match connection.recv() {
            Ok(Some(Incoming::Buffer(buf))) => self.received = buf,
            Ok(Some(Incoming::Action(code))) => debug!(code, "ignoring action from backend host"),
            Ok(None) => {}
            Err(e) if e.is_disconnect() => warn!(error = %e, "lost backend host"),
            Err(e) => warn!(error = %e, "receive failed"),
        }

        if let Some(state) = reported_state(&self.received) {
            if state != self.debug_state {
                info!(from = %self.debug_state.label(), to = %state.label(), "backend state changed");
            }
            self.debug_state = state;
        }
        dump::trace_buffer("received", &self.received);

        run_views(
            &mut self.views,
            &self.received,
            &mut self.view_writer,
            self.ticks,
            self.debug_state,
        );

        if !self.view_writer.is_empty() && connection.is_connected() {
            if let Err(e) = connection.send_buffer(self.view_writer.as_bytes()) {
                warn!(error = %e, "failed to send view output");
            }
        }
        debug!(
            tick = self.ticks,
            received_len = self.received.len(),
            view_len = self.view_writer.len(),
            connected = connection.is_connected(),
            "remote tick"
        );
        self.sweep_views();
    }

    fn tick_null(&mut self) {
        self.ticks += 1;
        run_views(
            &mut self.views,
            &EMPTY_BUFFER,
            &mut self.view_writer,
            self.ticks,
            self.debug_state,
        );
        self.sweep_views();
    }

    fn sweep_views(&mut self) {
        self.views.retain(|slot| {
            if slot.remove {
                debug!(handle = %slot.handle, view = slot.plugin.name(), "view closed");
            }
            !slot.remove
        });
    }

    /// Saves the backend and every view, by name, in run order.
    pub fn save_state(&self) -> SessionResult<Value> {
        let backend = self.backend.as_deref().map(|backend| {
            let mut state = SaveState::new();
            backend.save_state(&mut state);
            SavedPlugin {
                name: backend.name().to_string(),
                state: state.into_value(),
            }
        });
        let views = self
            .views
            .iter()
            .map(|slot| {
                let mut state = SaveState::new();
                slot.plugin.save_state(&mut state);
                SavedPlugin {
                    name: slot.plugin.name().to_string(),
                    state: state.into_value(),
                }
            })
            .collect();

        Ok(serde_json::to_value(SavedSession { backend, views })?)
    }

    /// Restores state written by [`save_state`](Self::save_state).
    ///
    /// Current views are replaced by views created from `registry`. A local
    /// backend with the saved name loads its state in place; with a
    /// different name a new one is created. Nothing changes if any name is
    /// unknown.
    pub fn load_state(
        &mut self,
        saved: &Value,
        registry: &PluginRegistry,
    ) -> SessionResult<Vec<ViewHandle>> {
        let saved = SavedSession::deserialize(saved)?;
        for entry in saved.backend.iter().chain(&saved.views) {
            entry.check()?;
        }

        let mut views = Vec::with_capacity(saved.views.len());
        for entry in &saved.views {
            let mut plugin = registry.create_view(&entry.name)?;
            plugin.load_state(&mut LoadState::new(&entry.state));
            views.push(plugin);
        }

        let mut replacement = None;
        if let Some(entry) = &saved.backend {
            match self.mode {
                SessionMode::Local if self.backend_name() == Some(entry.name.as_str()) => {}
                SessionMode::Local => replacement = Some(registry.create_backend(&entry.name)?),
                SessionMode::Remote | SessionMode::Null => {
                    debug!(backend = %entry.name, mode = %self.mode, "ignoring saved backend");
                }
            }
        }
        if let Some(backend) = replacement {
            info!(backend = backend.name(), "replacing backend");
            self.backend = Some(backend);
        }
        if let (Some(entry), Some(backend)) = (&saved.backend, self.backend.as_mut()) {
            if backend.name() == entry.name {
                backend.load_state(&mut LoadState::new(&entry.state));
            }
        }

        self.views.clear();
        let handles = views.into_iter().map(|plugin| self.add_view(plugin)).collect();
        info!(views = self.views.len(), "restored session state");
        Ok(handles)
    }

    /// Drops the link to the backend host, if any.
    pub fn disconnect(&mut self) -> SessionResult<()> {
        match self.connection.as_mut() {
            Some(connection) => {
                connection.disconnect();
                Ok(())
            }
            None => Err(SessionError::WrongMode { expected: "remote" }),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("backend", &self.backend_name())
            .field("views", &self.view_names().collect::<Vec<_>>())
            .field("connected", &self.is_connected())
            .field("debug_state", &self.debug_state)
            .field("ticks", &self.ticks)
            .finish()
    }
}

fn reader_or_empty<'a>(label: &'static str, buf: &'a [u8]) -> Reader<'a> {
    Reader::new(buf).unwrap_or_else(|e| {
        warn!(label, error = %e, "undecodable buffer, using empty input");
        Reader::empty()
    })
}

/// Runs every view over `input`, concatenating their output in `writer`.
///
/// A view that leaves a scope open loses its output for the tick.
fn run_views(
    views: &mut [ViewSlot],
    input: &[u8],
    writer: &mut Writer,
    tick: u64,
    debug_state: DebugState,
) {
    writer.reset();
    let mut reader = reader_or_empty("backend output", input);

    for slot in views.iter_mut() {
        reader.rewind();
        let mark = writer.mark();
        let mut ctx = ViewContext::new(slot.handle, tick, debug_state);
        slot.plugin.update(&mut ctx, &mut reader, writer);

        if writer.depth() != 0 {
            warn!(
                handle = %slot.handle,
                view = slot.plugin.name(),
                open = writer.depth(),
                "view left a scope open, discarding its output"
            );
            writer.rollback(mark);
        }
        if ctx.close_requested() {
            slot.remove = true;
        }
    }

    if let Err(e) = writer.finalize() {
        warn!(error = %e, "discarding view output");
        writer.reset();
    }
}

/// Last backend state announced by a `SetStatus` event in `buf`.
fn reported_state(buf: &[u8]) -> Option<DebugState> {
    let mut reader = Reader::new(buf).ok()?;
    let mut state = None;
    while let Ok(Some(id)) = reader.get_event() {
        if id != EventType::SetStatus.id() {
            continue;
        }
        match reader.find_u32("state", Cursor::EVENT) {
            Ok(found) => match DebugState::from_code(found.value) {
                Some(s) => state = Some(s),
                None => warn!(code = found.value, "unknown backend state"),
            },
            Err(e) => debug!(error = %e, "set_status without a usable state"),
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every request id; `Run` starts the target.
    struct Echo {
        seen: Vec<u16>,
    }

    impl BackendPlugin for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn update(
            &mut self,
            action: Action,
            reader: &mut Reader<'_>,
            _writer: &mut Writer,
        ) -> DebugState {
            while let Ok(Some(id)) = reader.get_event() {
                self.seen.push(id);
            }
            if action == Action::Run {
                DebugState::Running
            } else {
                DebugState::StopBreakpoint
            }
        }

        fn save_state(&self, state: &mut SaveState) {
            state.write_int(self.seen.len() as i64);
        }
    }

    struct Leaky;

    impl ViewPlugin for Leaky {
        fn name(&self) -> &str {
            "leaky"
        }

        fn update(&mut self, _: &mut ViewContext, _: &mut Reader<'_>, writer: &mut Writer) {
            let _ = writer.begin_event(EventType::GetMemory);
            let _ = writer.write_u64("address", 0x1000);
        }
    }

    struct Ask(EventType);

    impl ViewPlugin for Ask {
        fn name(&self) -> &str {
            "ask"
        }

        fn update(&mut self, _: &mut ViewContext, _: &mut Reader<'_>, writer: &mut Writer) {
            let _ = writer.begin_event(self.0);
            let _ = writer.end_event();
        }
    }

    fn event_ids(buf: &[u8]) -> Vec<u16> {
        let mut reader = Reader::new(buf).unwrap();
        let mut ids = Vec::new();
        while let Some(id) = reader.get_event().unwrap() {
            ids.push(id);
        }
        ids
    }

    #[test]
    fn start_local_delivers_executable_then_runs() {
        let settings = SessionSettings {
            run_on_start: true,
            ..Default::default()
        };
        let session =
            Session::start_local(Box::new(Echo { seen: Vec::new() }), "/bin/true", &settings)
                .unwrap();
        assert_eq!(session.ticks(), 2);
        assert_eq!(session.debug_state(), DebugState::Running);

        let saved = session.save_state().unwrap();
        assert_eq!(saved["backend"]["state"][0], 1);
    }

    #[test]
    fn start_local_rejects_nul_in_path() {
        let err = Session::start_local(
            Box::new(Echo { seen: Vec::new() }),
            "bad\0path",
            &SessionSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Write(_)));
    }

    #[test]
    fn unclosed_view_output_is_isolated() {
        let mut session = Session::local(Box::new(Echo { seen: Vec::new() }));
        session.add_view(Box::new(Ask(EventType::GetLocals)));
        session.add_view(Box::new(Leaky));
        session.add_view(Box::new(Ask(EventType::GetCallstack)));

        session.update();
        assert_eq!(
            event_ids(session.view_output()),
            [EventType::GetLocals.id(), EventType::GetCallstack.id()]
        );
    }

    #[test]
    fn null_session_ignores_actions() {
        let mut session = Session::null();
        session.add_view(Box::new(Ask(EventType::GetStatus)));
        session.action(Action::Run);
        assert_eq!(session.ticks(), 0);

        session.update();
        assert_eq!(session.ticks(), 1);
        assert_eq!(session.backend_output(), EMPTY_BUFFER);
        assert_eq!(event_ids(session.view_output()), [EventType::GetStatus.id()]);
        assert!(session.disconnect().is_err());
    }

    #[test]
    fn remove_view_by_handle() {
        let mut session = Session::null();
        let first = session.add_view(Box::new(Ask(EventType::GetTty)));
        let second = session.add_view(Box::new(Ask(EventType::GetWatch)));
        assert_ne!(first, second);

        assert!(session.remove_view(first));
        assert!(!session.remove_view(first));
        assert_eq!(session.view_count(), 1);
    }

    #[test]
    fn reported_state_takes_the_last_status() {
        let mut writer = Writer::new();
        for code in [1u32, 3] {
            writer.begin_event(EventType::SetStatus).unwrap();
            writer.write_u32("state", code).unwrap();
            writer.end_event().unwrap();
        }
        writer.begin_event(EventType::SetStatus).unwrap();
        writer.write_string("state", "bogus").unwrap();
        writer.end_event().unwrap();
        writer.finalize().unwrap();

        assert_eq!(
            reported_state(writer.as_bytes()),
            Some(DebugState::StopException)
        );
        assert_eq!(reported_state(&EMPTY_BUFFER), None);
    }

    #[test]
    fn load_state_with_unknown_view_changes_nothing() {
        let mut session = Session::null();
        session.add_view(Box::new(Ask(EventType::GetTty)));
        let saved = serde_json::json!({"views": [{"name": "missing"}]});

        let err = session.load_state(&saved, &PluginRegistry::new()).unwrap_err();
        assert!(matches!(err, SessionError::UnknownPlugin { .. }));
        assert_eq!(session.view_count(), 1);
    }

    #[test]
    fn load_state_rejects_state_that_is_not_a_list() {
        let mut registry = PluginRegistry::new();
        registry.register_view("ask", || Box::new(Ask(EventType::GetTty)));
        let mut session = Session::null();
        session.add_view(Box::new(Ask(EventType::GetWatch)));

        let saved = serde_json::json!({"views": [{"name": "ask", "state": {"address": 1}}]});
        let err = session.load_state(&saved, &registry).unwrap_err();
        assert!(matches!(err, SessionError::State { .. }));
        assert!(err.to_string().contains("\"ask\""));
        assert_eq!(session.view_count(), 1);

        let saved = serde_json::json!({"views": [{"name": "ask"}, {"name": "ask", "state": []}]});
        assert_eq!(session.load_state(&saved, &registry).unwrap().len(), 2);
    }

    #[test]
    fn listening_session_accepts_its_host() {
        let listener = Connection::listen(TransportConfig::loopback()).unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut session = Session::remote(listener);
        session.add_view(Box::new(Ask(EventType::GetStatus)));
        assert!(!session.is_connected());

        let mut host = Connection::connect("127.0.0.1", port, TransportConfig::default()).unwrap();
        for _ in 0..500 {
            session.update();
            if session.is_connected() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert!(session.is_connected());

        let mut request = None;
        for _ in 0..500 {
            if let Some(Incoming::Buffer(buf)) = host.recv().unwrap() {
                request = Some(buf);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(event_ids(&request.unwrap()), [EventType::GetStatus.id()]);
    }
}
