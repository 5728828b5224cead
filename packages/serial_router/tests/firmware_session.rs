//! Replays a captured firmware session through the router and checks the
//! transition stream that comes out of the state manager.

use std::sync::Arc;

use printer_state::{PrinterState, StateManager, StateNotification, TransitionSource};
use serial_router::{SerialRouter, register_state_handlers};

/// A session as the serial layer would hand it over: terminator stripped,
/// one line per entry.
const SESSION: &[&str] = &[
    "echo:busy: processing",
    "ok",
    "echo:enqueing \"M24\"",
    "NORMAL MODE: Percent done: 12; print time remaining in mins: 118",
    "T:215.0 /215.0 B:60.1 /60.0",
    "// action:paused",
    // Telemetry keeps polling M27 while paused; the pause must hold
    "Not SD printing",
    "// action:resumed",
    "NORMAL MODE: Percent done: 100; print time remaining in mins: 0",
    "Done printing file",
    "ok",
];

#[test]
fn full_session_produces_the_expected_transition_stream() {
    let manager = Arc::new(StateManager::new());
    let router = SerialRouter::new();
    register_state_handlers(&router, Arc::clone(&manager));
    let mut rx = manager.subscribe();

    for line in SESSION {
        router.feed(line);
    }

    let mut changes = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        if let StateNotification::Changed {
            from, to, source, ..
        } = notification
        {
            changes.push((from, to, source));
        }
    }

    assert_eq!(
        changes,
        vec![
            (
                PrinterState::Ready,
                PrinterState::Busy,
                Some(TransitionSource::Firmware)
            ),
            (
                PrinterState::Busy,
                PrinterState::Ready,
                Some(TransitionSource::Hardware)
            ),
            (
                PrinterState::Ready,
                PrinterState::Printing,
                Some(TransitionSource::User)
            ),
            (
                PrinterState::Printing,
                PrinterState::Paused,
                Some(TransitionSource::User)
            ),
            // "Not SD printing" while paused caused no transition
            (
                PrinterState::Paused,
                PrinterState::Printing,
                Some(TransitionSource::User)
            ),
            (
                PrinterState::Printing,
                PrinterState::Finished,
                Some(TransitionSource::Firmware)
            ),
            (
                PrinterState::Finished,
                PrinterState::Ready,
                Some(TransitionSource::Firmware)
            ),
        ]
    );

    assert_eq!(manager.state(), PrinterState::Ready);
    assert_eq!(manager.progress(), Some(100));
}

#[test]
fn unmatched_telemetry_leaves_the_state_alone() {
    let manager = Arc::new(StateManager::new());
    let router = SerialRouter::new();
    register_state_handlers(&router, Arc::clone(&manager));
    let mut rx = manager.subscribe();

    assert!(!router.feed("T:215.0 /215.0 B:60.1 /60.0"));
    assert!(!router.feed("echo:SD card ok"));

    assert_eq!(manager.state(), PrinterState::Ready);
    assert!(rx.try_recv().is_err());
}
