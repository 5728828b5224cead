//! Source-attribution policy.
//!
//! Pure decision logic: given the pending expectation (if any) and an
//! observed transition, decide which actor gets credited and whether the
//! pending command id is carried along. No state of its own.

use tracing::debug;

use crate::expectation::ExpectedChange;
use crate::state::{CommandId, PrinterState, TransitionSource};

/// The outcome of attributing one observed transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attribution {
    /// Whether the transition matched the pending expectation at all.
    pub expected: bool,
    pub source: Option<TransitionSource>,
    pub command_id: Option<CommandId>,
}

/// Attribute the transition `last -> current` against `change`.
///
/// A transition is expected when `current` is an anticipated target state,
/// `last` is an anticipated origin state, or the descriptor carries a default
/// source. Only expected transitions carry a source and command id; an
/// unexpected one yields an empty attribution, which callers may log but
/// which is not an error.
pub fn resolve_source(
    change: Option<&ExpectedChange>,
    last: PrinterState,
    current: PrinterState,
) -> Attribution {
    let Some(change) = change else {
        return Attribution::default();
    };

    let expected =
        change.expects_to(current) || change.expects_from(last) || change.fallback_source().is_some();
    if !expected {
        return Attribution::default();
    }

    let source_from = change.from_source(last);
    let source_to = change.to_source(current);

    // When both resolve and disagree, the origin wins: leaving a state like
    // ATTENTION says more about who acted than the generic target does.
    let source = source_from
        .or(source_to)
        .or_else(|| change.fallback_source());

    debug!(
        "Attributed {:?} -> {:?} to {:?} (from: {:?}, to: {:?}, default: {:?})",
        last,
        current,
        source,
        source_from,
        source_to,
        change.fallback_source()
    );

    Attribution {
        expected: true,
        source,
        command_id: change.command_id(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_descriptor_is_unexpected() {
        let attribution = resolve_source(None, PrinterState::Ready, PrinterState::Busy);
        assert_eq!(attribution, Attribution::default());
        assert!(!attribution.expected);
    }

    #[test]
    fn test_unrelated_descriptor_is_unexpected() {
        let change = ExpectedChange::new().to_state(PrinterState::Finished, TransitionSource::User);
        let attribution = resolve_source(Some(&change), PrinterState::Ready, PrinterState::Busy);
        assert!(!attribution.expected);
        assert_eq!(attribution.source, None);
        assert_eq!(attribution.command_id, None);
    }

    #[test]
    fn test_to_state_resolves_source_and_command() {
        let change = ExpectedChange::new()
            .to_state(PrinterState::Busy, TransitionSource::Firmware)
            .command(CommandId(3));
        let attribution = resolve_source(Some(&change), PrinterState::Ready, PrinterState::Busy);
        assert!(attribution.expected);
        assert_eq!(attribution.source, Some(TransitionSource::Firmware));
        assert_eq!(attribution.command_id, Some(CommandId(3)));
    }

    #[test]
    fn test_from_state_resolves_source() {
        let change =
            ExpectedChange::new().from_state(PrinterState::Attention, TransitionSource::User);
        let attribution =
            resolve_source(Some(&change), PrinterState::Attention, PrinterState::Ready);
        assert!(attribution.expected);
        assert_eq!(attribution.source, Some(TransitionSource::User));
    }

    #[test]
    fn test_conflicting_sources_prefer_from() {
        let change = ExpectedChange::new()
            .to_state(PrinterState::Ready, TransitionSource::Firmware)
            .from_state(PrinterState::Busy, TransitionSource::Hardware);
        let attribution = resolve_source(Some(&change), PrinterState::Busy, PrinterState::Ready);
        assert_eq!(attribution.source, Some(TransitionSource::Hardware));
    }

    #[test]
    fn test_agreeing_sources_pass_through() {
        let change = ExpectedChange::new()
            .to_state(PrinterState::Ready, TransitionSource::Serial)
            .from_state(PrinterState::Error, TransitionSource::Serial);
        let attribution = resolve_source(Some(&change), PrinterState::Error, PrinterState::Ready);
        assert_eq!(attribution.source, Some(TransitionSource::Serial));
    }

    #[test]
    fn test_default_source_fallback() {
        let change = ExpectedChange::new().default_source(TransitionSource::Connect);
        let attribution =
            resolve_source(Some(&change), PrinterState::Printing, PrinterState::Paused);
        assert!(attribution.expected);
        assert_eq!(attribution.source, Some(TransitionSource::Connect));
    }

    #[test]
    fn test_from_keys_do_not_match_target_states() {
        // The descriptor anticipates leaving BUSY; arriving in BUSY is a
        // different transition and stays unexpected.
        let change =
            ExpectedChange::new().from_state(PrinterState::Busy, TransitionSource::Hardware);
        let attribution = resolve_source(Some(&change), PrinterState::Ready, PrinterState::Busy);
        assert!(!attribution.expected);
        assert_eq!(attribution.source, None);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let change = ExpectedChange::new()
            .to_state(PrinterState::Ready, TransitionSource::Firmware)
            .from_state(PrinterState::Busy, TransitionSource::Hardware)
            .command(CommandId(11));

        let first = resolve_source(Some(&change), PrinterState::Busy, PrinterState::Ready);
        for _ in 0..10 {
            let again = resolve_source(Some(&change), PrinterState::Busy, PrinterState::Ready);
            assert_eq!(again, first);
        }
    }
}
