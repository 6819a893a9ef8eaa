//! Debugger actions and backend states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// First code available for plugin-defined actions.
pub const CUSTOM_ACTION_BASE: u16 = 0x1000;

/// An action requested by the user and delivered to the backend.
///
/// Actions travel alongside the tick in local mode and as a bare 4-byte
/// command over the transport in remote mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    None,
    Stop,
    Break,
    Run,
    Step,
    StepOut,
    StepOver,
    /// Plugin-defined action; holds the full wire code (>= 0x1000).
    Custom(u16),
}

impl Action {
    /// Returns the wire code of this action.
    pub const fn code(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Stop => 1,
            Self::Break => 2,
            Self::Run => 3,
            Self::Step => 4,
            Self::StepOut => 5,
            Self::StepOver => 6,
            Self::Custom(code) => code,
        }
    }

    /// Decodes a wire code.
    ///
    /// Codes between the built-in range and the custom base have no meaning
    /// and yield `None`.
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Self::None,
            1 => Self::Stop,
            2 => Self::Break,
            3 => Self::Run,
            4 => Self::Step,
            5 => Self::StepOut,
            6 => Self::StepOver,
            c if c >= CUSTOM_ACTION_BASE => Self::Custom(c),
            _ => return None,
        })
    }
}

impl From<Action> for u16 {
    fn from(action: Action) -> Self {
        action.code()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Stop => f.write_str("stop"),
            Self::Break => f.write_str("break"),
            Self::Run => f.write_str("run"),
            Self::Step => f.write_str("step"),
            Self::StepOut => f.write_str("step_out"),
            Self::StepOver => f.write_str("step_over"),
            Self::Custom(code) => write!(f, "custom({code:#06x})"),
        }
    }
}

/// The state a backend reports after each update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum DebugState {
    #[default]
    NoTarget = 0,
    Running = 1,
    StopBreakpoint = 2,
    StopException = 3,
    Trace = 4,
}

impl DebugState {
    /// Returns the wire value, as carried by the `state` field of a
    /// set-status event.
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::NoTarget,
            1 => Self::Running,
            2 => Self::StopBreakpoint,
            3 => Self::StopException,
            4 => Self::Trace,
            _ => return None,
        })
    }

    /// Human readable label for status bars.
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoTarget => "No target",
            Self::Running => "Running",
            Self::StopBreakpoint => "Stop (breakpoint)",
            Self::StopException => "Stop (exception)",
            Self::Trace => "Trace (stepping)",
        }
    }

    /// Label for a raw wire value; unknown values read "Unknown".
    pub fn label_for_code(code: u32) -> &'static str {
        Self::from_code(code).map_or("Unknown", Self::label)
    }

    /// Returns true if the target is stopped and can be inspected.
    pub const fn is_stopped(self) -> bool {
        matches!(
            self,
            Self::StopBreakpoint | Self::StopException | Self::Trace
        )
    }
}

impl fmt::Display for DebugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
