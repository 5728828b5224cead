//! Layered state model.
//!
//! Three independent layers reduce to one reportable value. The reduction
//! order is fixed: override if set, else activity if set, else base.

use crate::state::{ActivityState, BaseState, OverrideState, PrinterState};

/// The three layers the reportable state is derived from.
///
/// Mutating code touches exactly one layer at a time; unrelated layers are
/// never written as a side effect.
#[derive(Debug)]
pub(crate) struct StateLayers {
    pub base: BaseState,
    pub activity: Option<ActivityState>,
    pub override_state: Option<OverrideState>,
}

impl Default for StateLayers {
    fn default() -> Self {
        Self {
            base: BaseState::Ready,
            activity: None,
            override_state: None,
        }
    }
}

impl StateLayers {
    /// Reduce the layers to the one reportable value.
    pub fn reportable(&self) -> PrinterState {
        if let Some(exceptional) = self.override_state {
            exceptional.into()
        } else if let Some(activity) = self.activity {
            activity.into()
        } else {
            self.base.into()
        }
    }
}
