//! Expected-transition descriptors and the single-slot ledger holding them.
//!
//! With observational state detection there is no direct way to correlate an
//! action with its reaction. The workaround: before an action that should
//! change the state, record which transition is anticipated and by whom. If
//! that transition is then observed, the action is credited with it.

use std::collections::HashMap;

use crate::state::{CommandId, PrinterState, TransitionSource};

/// A claim, recorded before a state-mutating operation runs, about which
/// transition should result and which actor would be responsible.
#[derive(Clone, Debug, Default)]
pub struct ExpectedChange {
    command_id: Option<CommandId>,
    to_states: HashMap<PrinterState, TransitionSource>,
    from_states: HashMap<PrinterState, TransitionSource>,
    default_source: Option<TransitionSource>,
}

impl ExpectedChange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a transition into `state`, attributed to `source`.
    pub fn to_state(mut self, state: PrinterState, source: TransitionSource) -> Self {
        self.to_states.insert(state, source);
        self
    }

    /// Expect a transition out of `state`, attributed to `source`.
    pub fn from_state(mut self, state: PrinterState, source: TransitionSource) -> Self {
        self.from_states.insert(state, source);
        self
    }

    /// Tag the expectation with the command that should cause it.
    pub fn command(mut self, id: CommandId) -> Self {
        self.command_id = Some(id);
        self
    }

    /// Source to fall back on when neither state map resolves.
    pub fn default_source(mut self, source: TransitionSource) -> Self {
        self.default_source = Some(source);
        self
    }

    pub fn command_id(&self) -> Option<CommandId> {
        self.command_id
    }

    pub(crate) fn expects_to(&self, state: PrinterState) -> bool {
        self.to_states.contains_key(&state)
    }

    pub(crate) fn expects_from(&self, state: PrinterState) -> bool {
        self.from_states.contains_key(&state)
    }

    pub(crate) fn to_source(&self, state: PrinterState) -> Option<TransitionSource> {
        self.to_states.get(&state).copied()
    }

    pub(crate) fn from_source(&self, state: PrinterState) -> Option<TransitionSource> {
        self.from_states.get(&state).copied()
    }

    pub(crate) fn fallback_source(&self) -> Option<TransitionSource> {
        self.default_source
    }
}

/// A push was attempted while a descriptor is already pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("an expected state change is already pending")]
pub struct ExpectationConflict;

/// Holds at most one outstanding [`ExpectedChange`].
///
/// Lives inside the state manager's mutex; it has no locking of its own.
#[derive(Debug, Default)]
pub(crate) struct ExpectationLedger {
    pending: Option<ExpectedChange>,
}

impl ExpectationLedger {
    /// Record a descriptor. Fails if one is already pending; the pending one
    /// stays authoritative and the new one is dropped by the caller.
    pub fn push(&mut self, change: ExpectedChange) -> Result<(), ExpectationConflict> {
        if self.pending.is_some() {
            return Err(ExpectationConflict);
        }
        self.pending = Some(change);
        Ok(())
    }

    /// Remove any pending descriptor unconditionally.
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn get(&self) -> Option<&ExpectedChange> {
        self.pending.as_ref()
    }
}
