//! Core types: event ids, actions, debug states, tracing setup

pub mod action;
pub mod event;
pub mod tracing;

pub use action::{Action, CUSTOM_ACTION_BASE, DebugState};
pub use event::{CUSTOM_EVENT_BASE, EventType, describe_event};
pub use tracing::{
    CRATES, TracingConfig, TracingError, TracingOutputFormat, init_tracing, parse_level,
};
