//! Plugin pipeline for the dbgwire debugger.
//!
//! A [`Session`] owns one backend (in-process, or behind a socket on a
//! [`RemoteBackendHost`]) and an ordered list of views. Each tick the
//! backend answers the requests the views wrote last time, and the views
//! read the answers and write new requests.
//!
//! # Example
//!
//! ```rust
//! use dbgwire_core::{Action, DebugState, EventType};
//! use dbgwire_protocol::{Reader, Writer};
//! use dbgwire_session::{BackendPlugin, Session, ViewContext, ViewPlugin};
//!
//! struct Target;
//!
//! impl BackendPlugin for Target {
//!     fn name(&self) -> &str { "target" }
//!
//!     fn update(&mut self, action: Action, _: &mut Reader<'_>, w: &mut Writer) -> DebugState {
//!         let _ = w.begin_event(EventType::SetStatus);
//!         let _ = w.write_u32("state", DebugState::Running.code());
//!         let _ = w.end_event();
//!         if action == Action::Run { DebugState::Running } else { DebugState::NoTarget }
//!     }
//! }
//!
//! struct Status;
//!
//! impl ViewPlugin for Status {
//!     fn name(&self) -> &str { "status" }
//!
//!     fn update(&mut self, ctx: &mut ViewContext, _: &mut Reader<'_>, _: &mut Writer) {
//!         println!("{}", ctx.debug_state().label());
//!     }
//! }
//!
//! let mut session = Session::local(Box::new(Target));
//! session.add_view(Box::new(Status));
//! session.action(Action::Run);
//! assert_eq!(session.debug_state(), DebugState::Running);
//! ```

mod config;
mod error;
mod plugin;
mod registry;
mod remote;
mod session;
mod state;

pub use config::{LoggingSettings, SessionConfig, SessionSettings, TransportSettings};
pub use error::{SessionError, SessionResult};
pub use plugin::{BackendPlugin, ViewContext, ViewHandle, ViewPlugin};
pub use registry::PluginRegistry;
pub use remote::RemoteBackendHost;
pub use session::{Session, SessionMode};
pub use state::{LoadState, LoadStatus, Loaded, SaveState};
