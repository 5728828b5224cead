//! Printer state tracking with transition attribution.
//!
//! Marlin-style firmware has no unified state concept: "printing", "paused",
//! "busy" and "error" are independent, overlapping conditions observed in its
//! output stream. This crate reduces them to one reportable state and, for
//! every detected transition, works out which actor caused it and which
//! in-flight command it belongs to.
//!
//! # Architecture
//!
//! - Three state layers (base, activity, override) reduce to a single
//!   [`PrinterState`]; override wins over activity, activity over base.
//! - Before a command that should change the state, a caller records an
//!   [`ExpectedChange`]. When a mutating operation then observes the matching
//!   transition, the change is attributed to the expectation's source and
//!   command id.
//! - Every transition is published as a `PreChange` / `Changed` /
//!   `PostChange` triple on one broadcast channel, in that order, with no
//!   interleaving between cycles.
//!
//! The line router matching firmware output and invoking the operations
//! lives in the `serial_router` crate; this crate only defines the
//! operations it may call.

mod attribution;
mod expectation;
mod layers;
mod manager;
mod state;

pub use attribution::{Attribution, resolve_source};
pub use expectation::{ExpectationConflict, ExpectedChange};
pub use manager::{StateManager, StateManagerConfig};
pub use state::{
    ActivityState, BaseState, CommandId, OverrideState, PrinterState, StateNotification,
    TransitionSource,
};
