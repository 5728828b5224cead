//! Serial line routing for printer firmware output.
//!
//! Tries to find an appropriate handler for every line received from the
//! printer. Patterns are attempted in priority order; the first match wins
//! and all handlers registered for that pattern fire with the captured
//! groups.
//!
//! # Architecture
//!
//! - [`SerialRouter`] does the matching and inline dispatch.
//! - [`DecoupledRouter`] moves handler execution to a worker thread so the
//!   serial reader never blocks on handler work.
//! - [`patterns`] is the fixed Marlin pattern table.
//! - [`register_state_handlers`] wires the table to a
//!   [`printer_state::StateManager`], parsing captured groups (progress
//!   percentage, SD status) at this boundary.
//!
//! The `marlin-replay` binary feeds recorded firmware output through the
//! whole stack and prints every resulting transition.

mod bindings;
mod decoupled;
pub mod patterns;
mod router;

pub use bindings::{CONFIRMATION_PRIORITY, register_state_handlers};
pub use decoupled::DecoupledRouter;
pub use router::{HandlerId, LineMatch, RouterError, SerialRouter};
