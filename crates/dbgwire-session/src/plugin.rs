//! Backend and view plugin traits.
//!
//! A backend drives the debug target: each tick it reads the requests the
//! views wrote on the previous tick and writes replies. A view reads the
//! backend's replies and writes new requests. Neither keeps the buffers it
//! is handed; they are only lent for the duration of `update`.
//!
//! # Example Implementation
//!
//! ```ignore
//! struct Registers { rows: Vec<(String, u64)> }
//!
//! impl ViewPlugin for Registers {
//!     fn name(&self) -> &str { "registers" }
//!
//!     fn update(&mut self, _ctx: &mut ViewContext, reader: &mut Reader<'_>, writer: &mut Writer) {
//!         while let Ok(Some(id)) = reader.get_event() {
//!             if id == EventType::SetRegisters.id() {
//!                 // decode the "registers" array into self.rows
//!             }
//!         }
//!         let _ = writer.begin_event(EventType::GetRegisters);
//!         let _ = writer.end_event();
//!     }
//! }
//! ```

use std::fmt;

use dbgwire_core::{Action, DebugState};
use dbgwire_protocol::{Reader, Writer};

use crate::state::{LoadState, SaveState};

/// The plugin that talks to the debug target.
pub trait BackendPlugin {
    /// Registry name of this backend.
    fn name(&self) -> &str;

    /// Handles one tick.
    ///
    /// `reader` holds the merged view requests, `writer` collects the
    /// replies. Returns the target's state after handling `action`.
    fn update(&mut self, action: Action, reader: &mut Reader<'_>, writer: &mut Writer)
    -> DebugState;

    fn save_state(&self, _state: &mut SaveState) {}

    fn load_state(&mut self, _state: &mut LoadState<'_>) {}
}

/// A plugin that presents backend data and issues requests.
pub trait ViewPlugin {
    /// Registry name of this view.
    fn name(&self) -> &str;

    /// Handles one tick. The reader is rewound to the first backend event.
    ///
    /// A view that returns with a scope still open has its output for this
    /// tick discarded; other views are unaffected.
    fn update(&mut self, ctx: &mut ViewContext, reader: &mut Reader<'_>, writer: &mut Writer);

    fn save_state(&self, _state: &mut SaveState) {}

    fn load_state(&mut self, _state: &mut LoadState<'_>) {}
}

/// Identifies a view within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewHandle(pub(crate) u64);

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Per-update context handed to a view.
#[derive(Debug)]
pub struct ViewContext {
    handle: ViewHandle,
    tick: u64,
    debug_state: DebugState,
    close_requested: bool,
}

impl ViewContext {
    pub(crate) fn new(handle: ViewHandle, tick: u64, debug_state: DebugState) -> Self {
        Self {
            handle,
            tick,
            debug_state,
            close_requested: false,
        }
    }

    pub fn handle(&self) -> ViewHandle {
        self.handle
    }

    /// Number of the current tick, starting at 1.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Backend state for this tick: what a local backend just returned, or
    /// the last status a remote host reported.
    pub fn debug_state(&self) -> DebugState {
        self.debug_state
    }

    /// Asks the session to remove this view once the current tick is done.
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub(crate) fn close_requested(&self) -> bool {
        self.close_requested
    }
}
