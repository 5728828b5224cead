//! Printer State Types
//!
//! Defines the reportable state enum, the per-layer enums that feed it,
//! transition sources, and the notifications published on every detected
//! transition.

use serde::{Deserialize, Serialize};

/// The single externally visible state of the printer.
///
/// Derived from three layers (base, activity, override); exactly one value
/// is reportable at any instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrinterState {
    /// Accepting instructions
    Ready,

    /// Processing an instruction, not accepting more
    Busy,

    /// A print job is running
    Printing,

    /// A print job is paused
    Paused,

    /// A print job ran to completion and has not been acknowledged yet
    Finished,

    /// The printer needs user interaction (e.g. filament change)
    Attention,

    /// An error condition is being reported
    Error,
}

/// Which actor caused a state transition.
///
/// Attached to a transition for downstream audit and reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionSource {
    /// A human at the printer or in a client
    User,

    /// The Marlin firmware itself
    Firmware,

    /// The printer hardware
    Hardware,

    /// The connect service (file-based print jobs)
    Connect,

    /// The serial communication layer
    Serial,

    /// The web UI reporter
    Ui,
}

/// Base layer: the default operational state. Only these two values occupy it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseState {
    Ready,
    Busy,
}

/// Activity layer: the print-job lifecycle. Unset means "not printing".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityState {
    Printing,
    Paused,
    Finished,
}

/// Override layer: an exceptional condition. When set it outranks everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverrideState {
    Attention,
    Error,
}

impl From<BaseState> for PrinterState {
    fn from(base: BaseState) -> Self {
        match base {
            BaseState::Ready => PrinterState::Ready,
            BaseState::Busy => PrinterState::Busy,
        }
    }
}

impl From<ActivityState> for PrinterState {
    fn from(activity: ActivityState) -> Self {
        match activity {
            ActivityState::Printing => PrinterState::Printing,
            ActivityState::Paused => PrinterState::Paused,
            ActivityState::Finished => PrinterState::Finished,
        }
    }
}

impl From<OverrideState> for PrinterState {
    fn from(exceptional: OverrideState) -> Self {
        match exceptional {
            OverrideState::Attention => PrinterState::Attention,
            OverrideState::Error => PrinterState::Error,
        }
    }
}

/// Identifier of an in-flight command, carried by an expectation and echoed
/// in the notifications for the transition that command caused.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CommandId(pub u32);

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Notifications published around every detected transition.
///
/// All three variants go out on one broadcast channel, so subscribers always
/// observe `PreChange` -> `Changed` -> `PostChange` in order, with no
/// interleaving from another transition's cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StateNotification {
    /// A transition was detected; the full payload follows in `Changed`.
    PreChange { command_id: Option<CommandId> },

    /// The reportable state changed, with attribution.
    Changed {
        from: PrinterState,
        to: PrinterState,
        command_id: Option<CommandId>,
        source: Option<TransitionSource>,
    },

    /// The transition's notifications are complete.
    PostChange,
}
