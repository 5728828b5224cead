//! Wiring between the Marlin pattern table and the state manager.
//!
//! The state manager only defines the operations; which firmware line maps
//! to which operation is decided here. Captured groups are parsed and
//! validated at this boundary, so the state manager never sees malformed
//! input.

use std::sync::Arc;

use printer_state::StateManager;
use tracing::warn;

use crate::patterns;
use crate::router::SerialRouter;

/// Priority of the `ok` confirmation pattern. Confirmations gate the
/// instruction queue, so they must win against every other pattern.
pub const CONFIRMATION_PRIORITY: i64 = i64::MAX;

/// Register a handler for every firmware condition the state manager tracks.
pub fn register_state_handlers(router: &SerialRouter, manager: Arc<StateManager>) {
    let m = Arc::clone(&manager);
    router.add_handler(
        &patterns::CONFIRMATION,
        move |_| m.acknowledged(),
        CONFIRMATION_PRIORITY,
    );

    let m = Arc::clone(&manager);
    router.add_handler(&patterns::BUSY, move |_| m.busy(), 0);

    let m = Arc::clone(&manager);
    router.add_handler(&patterns::ATTENTION, move |_| m.attention_required(), 0);

    let m = Arc::clone(&manager);
    router.add_handler(&patterns::PAUSED, move |_| m.paused(), 0);

    let m = Arc::clone(&manager);
    router.add_handler(&patterns::RESUMED, move |_| m.resumed(), 0);

    let m = Arc::clone(&manager);
    router.add_handler(&patterns::CANCEL, move |_| m.not_printing(), 0);

    let m = Arc::clone(&manager);
    router.add_handler(&patterns::START_PRINT, move |_| m.printing(), 0);

    let m = Arc::clone(&manager);
    router.add_handler(&patterns::PRINT_DONE, move |_| m.finished(), 0);

    let m = Arc::clone(&manager);
    router.add_handler(&patterns::ERROR, move |_| m.error_raised(), 0);

    let m = Arc::clone(&manager);
    router.add_handler(
        &patterns::PRINT_INFO,
        move |line_match| match line_match.group(1).and_then(|g| g.parse::<u8>().ok()) {
            Some(percent) if percent <= 100 => m.set_progress(percent),
            // The firmware reports -1 before it knows; anything else
            // unparseable stops here
            _ => warn!(
                "Discarding progress report {:?}: percentage out of range",
                line_match.line()
            ),
        },
        0,
    );

    let m = Arc::clone(&manager);
    router.add_handler(
        &patterns::SD_STATUS,
        move |line_match| {
            // Group 1 is the "Not SD printing" alternative
            m.sd_print_report(line_match.group(1).is_none());
        },
        0,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use printer_state::PrinterState;

    fn wired() -> (SerialRouter, Arc<StateManager>) {
        let manager = Arc::new(StateManager::new());
        let router = SerialRouter::new();
        register_state_handlers(&router, Arc::clone(&manager));
        (router, manager)
    }

    #[test]
    fn test_busy_line_sets_busy() {
        let (router, manager) = wired();
        assert!(router.feed("echo:busy: processing"));
        assert_eq!(manager.state(), PrinterState::Busy);

        assert!(router.feed("ok"));
        assert_eq!(manager.state(), PrinterState::Ready);
    }

    #[test]
    fn test_attention_line_wins_over_busy_line() {
        let (router, manager) = wired();
        assert!(router.feed("echo:busy: paused for user"));
        assert_eq!(manager.state(), PrinterState::Attention);
    }

    #[test]
    fn test_print_start_and_done() {
        let (router, manager) = wired();
        router.feed("echo:enqueing \"M24\"");
        assert_eq!(manager.state(), PrinterState::Printing);

        router.feed("Done printing file");
        assert_eq!(manager.state(), PrinterState::Finished);

        router.feed("ok");
        assert_eq!(manager.state(), PrinterState::Ready);
    }

    #[test]
    fn test_pause_resume_cancel() {
        let (router, manager) = wired();
        router.feed("echo:enqueing \"M24\"");
        router.feed("// action:paused");
        assert_eq!(manager.state(), PrinterState::Paused);

        router.feed("// action:resumed");
        assert_eq!(manager.state(), PrinterState::Printing);

        router.feed("// action:cancel");
        assert_eq!(manager.state(), PrinterState::Ready);
    }

    #[test]
    fn test_error_line_overrides() {
        let (router, manager) = wired();
        router.feed("Error:Printer halted. kill() called!");
        assert_eq!(manager.state(), PrinterState::Error);
    }

    #[test]
    fn test_progress_capture_reaches_manager() {
        let (router, manager) = wired();
        router.feed("NORMAL MODE: Percent done: 42; print time remaining in mins: 118");
        assert_eq!(manager.progress(), Some(42));
    }

    #[test]
    fn test_out_of_range_progress_is_dropped() {
        let (router, manager) = wired();
        router.feed("NORMAL MODE: Percent done: -1; print time remaining in mins: -1");
        assert_eq!(manager.progress(), None);

        router.feed("NORMAL MODE: Percent done: 250; print time remaining in mins: 1");
        assert_eq!(manager.progress(), None);

        router.feed("NORMAL MODE: Percent done: 99999999999999999999; print time remaining in mins: 1");
        assert_eq!(manager.progress(), None);
    }

    #[test]
    fn test_sd_status_drives_print_detection() {
        let (router, manager) = wired();
        router.feed("SD printing byte 2134/12345");
        assert_eq!(manager.state(), PrinterState::Printing);

        router.feed("Not SD printing");
        assert_eq!(manager.state(), PrinterState::Ready);
    }
}
