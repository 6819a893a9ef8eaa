//! Event identifiers shared by backends and views.
//!
//! Every event on the wire starts with a 16-bit id. The ids below are the
//! built-in vocabulary; plugins are free to define their own ids from
//! [`CUSTOM_EVENT_BASE`] upwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// First id available for plugin-defined events.
pub const CUSTOM_EVENT_BASE: u16 = 0x1000;

/// Built-in event types.
///
/// Get events are requests (usually written by views), Set events are the
/// matching replies (usually written by the backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
pub enum EventType {
    GetLocals = 1,
    SetLocals,
    GetCallstack,
    SetCallstack,
    GetWatch,
    SetWatch,
    GetRegisters,
    SetRegisters,
    GetMemory,
    SetMemory,
    GetTty,
    SetTty,
    GetExceptionLocation,
    SetExceptionLocation,
    GetDisassembly,
    SetDisassembly,
    GetStatus,
    SetStatus,
    SetThreads,
    GetThreads,
    SelectThread,
    SelectFrame,
    GetSourceFiles,
    SetSourceFiles,
    SetSourceCodeFile,
    SetBreakpoint,
    ReplyBreakpoint,
    DeleteBreakpoint,
    SetExecutable,
    Action,
    AttachToProcess,
    AttachToRemoteSession,
    ExecuteConsole,
    GetConsole,
    MenuEvent,
    ToggleBreakpointCurrentLine,
    UpdateMemory,
    UpdateRegister,
    UpdatePc,
}

impl EventType {
    /// All built-in event types in wire order.
    pub const ALL: [EventType; 39] = [
        Self::GetLocals,
        Self::SetLocals,
        Self::GetCallstack,
        Self::SetCallstack,
        Self::GetWatch,
        Self::SetWatch,
        Self::GetRegisters,
        Self::SetRegisters,
        Self::GetMemory,
        Self::SetMemory,
        Self::GetTty,
        Self::SetTty,
        Self::GetExceptionLocation,
        Self::SetExceptionLocation,
        Self::GetDisassembly,
        Self::SetDisassembly,
        Self::GetStatus,
        Self::SetStatus,
        Self::SetThreads,
        Self::GetThreads,
        Self::SelectThread,
        Self::SelectFrame,
        Self::GetSourceFiles,
        Self::SetSourceFiles,
        Self::SetSourceCodeFile,
        Self::SetBreakpoint,
        Self::ReplyBreakpoint,
        Self::DeleteBreakpoint,
        Self::SetExecutable,
        Self::Action,
        Self::AttachToProcess,
        Self::AttachToRemoteSession,
        Self::ExecuteConsole,
        Self::GetConsole,
        Self::MenuEvent,
        Self::ToggleBreakpointCurrentLine,
        Self::UpdateMemory,
        Self::UpdateRegister,
        Self::UpdatePc,
    ];

    /// Returns the wire id of this event type.
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Looks up a built-in event type by wire id.
    ///
    /// Returns `None` for id 0, custom ids and unassigned ids.
    pub fn from_id(id: u16) -> Option<Self> {
        let index = usize::from(id).checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    /// Returns true if `id` lies in the plugin-defined range.
    pub const fn is_custom(id: u16) -> bool {
        id >= CUSTOM_EVENT_BASE
    }

    /// Returns the display name of this event type.
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetLocals => "get_locals",
            Self::SetLocals => "set_locals",
            Self::GetCallstack => "get_callstack",
            Self::SetCallstack => "set_callstack",
            Self::GetWatch => "get_watch",
            Self::SetWatch => "set_watch",
            Self::GetRegisters => "get_registers",
            Self::SetRegisters => "set_registers",
            Self::GetMemory => "get_memory",
            Self::SetMemory => "set_memory",
            Self::GetTty => "get_tty",
            Self::SetTty => "set_tty",
            Self::GetExceptionLocation => "get_exception_location",
            Self::SetExceptionLocation => "set_exception_location",
            Self::GetDisassembly => "get_disassembly",
            Self::SetDisassembly => "set_disassembly",
            Self::GetStatus => "get_status",
            Self::SetStatus => "set_status",
            Self::SetThreads => "set_threads",
            Self::GetThreads => "get_threads",
            Self::SelectThread => "select_thread",
            Self::SelectFrame => "select_frame",
            Self::GetSourceFiles => "get_source_files",
            Self::SetSourceFiles => "set_source_files",
            Self::SetSourceCodeFile => "set_source_code_file",
            Self::SetBreakpoint => "set_breakpoint",
            Self::ReplyBreakpoint => "reply_breakpoint",
            Self::DeleteBreakpoint => "delete_breakpoint",
            Self::SetExecutable => "set_executable",
            Self::Action => "action",
            Self::AttachToProcess => "attach_to_process",
            Self::AttachToRemoteSession => "attach_to_remote_session",
            Self::ExecuteConsole => "execute_console",
            Self::GetConsole => "get_console",
            Self::MenuEvent => "menu_event",
            Self::ToggleBreakpointCurrentLine => "toggle_breakpoint_current_line",
            Self::UpdateMemory => "update_memory",
            Self::UpdateRegister => "update_register",
            Self::UpdatePc => "update_pc",
        }
    }
}

impl From<EventType> for u16 {
    fn from(event: EventType) -> Self {
        event.id()
    }
}

impl TryFrom<u16> for EventType {
    type Error = u16;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(id)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Formats a raw event id, using the built-in name when there is one.
pub fn describe_event(id: u16) -> String {
    match EventType::from_id(id) {
        Some(event) => event.name().to_string(),
        None if EventType::is_custom(id) => format!("custom+{}", id - CUSTOM_EVENT_BASE),
        None => format!("unknown({id})"),
    }
}
