//! Printer state manager.
//!
//! Owns the three state layers, the reported-state history and the
//! expectation ledger behind one mutex, and exposes one mutating operation
//! per observable firmware condition. Every operation runs inside the same
//! bracket: lock, ensure an expectation is present (the operation's default
//! unless a caller pushed one), apply the layer mutation, detect and notify,
//! clear the ledger, unlock.
//!
//! Construct one instance at startup and hand an `Arc` of it to every
//! collaborator; there is no global registry.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::attribution;
use crate::expectation::{ExpectationLedger, ExpectedChange};
use crate::layers::StateLayers;
use crate::state::{
    ActivityState, BaseState, OverrideState, PrinterState, StateNotification, TransitionSource,
};

/// Tunables for the state manager.
pub struct StateManagerConfig {
    /// Capacity of the notification broadcast channel.
    pub notify_capacity: usize,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            notify_capacity: 256,
        }
    }
}

/// Everything the manager's mutex protects.
struct StateInner {
    layers: StateLayers,
    last_state: PrinterState,
    current_state: PrinterState,
    ledger: ExpectationLedger,
    /// Last reported print progress percentage, if any
    progress: Option<u8>,
    /// Whether a file-based print job is currently running
    file_print_active: bool,
}

/// Derives one reportable printer state from the firmware's overlapping
/// status output and attributes every transition to an actor.
pub struct StateManager {
    inner: Mutex<StateInner>,
    notify_tx: broadcast::Sender<StateNotification>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self::with_config(StateManagerConfig::default())
    }

    pub fn with_config(config: StateManagerConfig) -> Self {
        let layers = StateLayers::default();
        let initial = layers.reportable();
        let (notify_tx, _) = broadcast::channel(config.notify_capacity);
        Self {
            inner: Mutex::new(StateInner {
                layers,
                last_state: initial,
                current_state: initial,
                ledger: ExpectationLedger::default(),
                progress: None,
                file_print_active: false,
            }),
            notify_tx,
        }
    }

    /// Subscribe to transition notifications.
    ///
    /// Subscribers run on their own tasks; they must not call back into the
    /// manager from a context that could already hold its lock.
    pub fn subscribe(&self) -> broadcast::Receiver<StateNotification> {
        self.notify_tx.subscribe()
    }

    // --- Query surface ---

    /// The current reportable state.
    pub fn state(&self) -> PrinterState {
        self.locked().current_state
    }

    /// Whether the activity layer says a print is running (paused and
    /// finished jobs do not count).
    pub fn is_printing(&self) -> bool {
        self.locked().layers.activity == Some(ActivityState::Printing)
    }

    /// Whether an exceptional condition currently overrides the state.
    pub fn has_override(&self) -> bool {
        self.locked().layers.override_state.is_some()
    }

    /// Last reported print progress percentage, if any.
    pub fn progress(&self) -> Option<u8> {
        self.locked().progress
    }

    // --- Expectation inlet ---

    /// Record which transition an about-to-be-issued command should cause.
    ///
    /// Must happen before the resulting operation is observed; that ordering
    /// is the caller's responsibility. While a descriptor is pending, further
    /// pushes (including operation defaults) are ignored.
    pub fn expect_change(&self, change: ExpectedChange) {
        let mut inner = self.locked();
        if inner.ledger.push(change).is_err() {
            warn!("Expected change pushed while another is pending; keeping the pending one");
        }
    }

    // --- Firmware condition operations ---

    /// Firmware announced the start of a print.
    pub fn printing(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Printing, TransitionSource::User),
            |inner| {
                if inner.layers.activity.is_none() {
                    inner.layers.activity = Some(ActivityState::Printing);
                }
            },
        );
    }

    /// The print lifecycle ended without completing (cancel, telemetry says
    /// nothing is printing).
    pub fn not_printing(&self) {
        self.influence(
            ExpectedChange::new()
                .from_state(PrinterState::Printing, TransitionSource::Firmware)
                .from_state(PrinterState::Paused, TransitionSource::Firmware)
                .from_state(PrinterState::Finished, TransitionSource::Firmware),
            |inner| {
                if inner.layers.activity.is_some() {
                    inner.layers.activity = None;
                }
            },
        );
    }

    /// Firmware reported the print ran to completion.
    pub fn finished(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Finished, TransitionSource::Firmware),
            |inner| {
                if inner.layers.activity == Some(ActivityState::Printing) {
                    inner.layers.activity = Some(ActivityState::Finished);
                }
            },
        );
    }

    /// Firmware is busy processing and not accepting instructions.
    pub fn busy(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Busy, TransitionSource::Firmware),
            |inner| {
                if inner.layers.base == BaseState::Ready {
                    inner.layers.base = BaseState::Busy;
                }
            },
        );
    }

    /// The running print was paused.
    ///
    /// Pauses requested by the user and by gcode are indistinguishable here.
    pub fn paused(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Paused, TransitionSource::User),
            |inner| {
                if inner.layers.activity == Some(ActivityState::Printing) {
                    inner.layers.activity = Some(ActivityState::Paused);
                }
            },
        );
    }

    /// A paused print was resumed.
    pub fn resumed(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Printing, TransitionSource::User),
            |inner| {
                if inner.layers.activity == Some(ActivityState::Paused) {
                    inner.layers.activity = Some(ActivityState::Printing);
                }
            },
        );
    }

    /// Firmware confirmed with "ok": busy lifts, a finished job is put away
    /// and any override condition is considered resolved.
    pub fn acknowledged(&self) {
        self.influence(
            ExpectedChange::new()
                .to_state(PrinterState::Ready, TransitionSource::Firmware)
                .from_state(PrinterState::Attention, TransitionSource::User)
                .from_state(PrinterState::Error, TransitionSource::User)
                .from_state(PrinterState::Busy, TransitionSource::Hardware),
            |inner| {
                if inner.layers.base == BaseState::Busy {
                    inner.layers.base = BaseState::Ready;
                }
                if inner.layers.activity == Some(ActivityState::Finished) {
                    inner.layers.activity = None;
                }
                if let Some(resolved) = inner.layers.override_state.take() {
                    debug!("No longer reporting {:?}", resolved);
                }
            },
        );
    }

    /// Firmware asked for user interaction.
    pub fn attention_required(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Attention, TransitionSource::User),
            |inner| {
                inner.layers.override_state = Some(OverrideState::Attention);
            },
        );
    }

    /// Firmware reported an error condition.
    pub fn error_raised(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Error, TransitionSource::Ui),
            |inner| {
                inner.layers.override_state = Some(OverrideState::Error);
            },
        );
    }

    /// The serial layer lost the printer.
    pub fn serial_error_raised(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Error, TransitionSource::Serial),
            |inner| {
                inner.layers.override_state = Some(OverrideState::Error);
            },
        );
    }

    /// The serial layer recovered the printer.
    pub fn serial_error_resolved(&self) {
        self.influence(
            ExpectedChange::new().to_state(PrinterState::Ready, TransitionSource::Serial),
            |inner| {
                if inner.layers.override_state == Some(OverrideState::Error) {
                    inner.layers.override_state = None;
                }
            },
        );
    }

    // --- Telemetry side channel ---

    /// Store the latest progress report. Consulted by the file-job logic;
    /// does not run a detect-and-notify cycle on its own.
    pub fn set_progress(&self, percent: u8) {
        self.locked().progress = Some(percent);
    }

    /// Periodic SD-print status arrived.
    ///
    /// Paused holds here: once out of the printing state we could not get
    /// back into paused from this report alone, so a "not printing" status
    /// is ignored until resume. Known approximation, not to be generalized
    /// to other signals.
    pub fn sd_print_report(&self, sd_active: bool) {
        let (printing, is_paused) = {
            let inner = self.locked();
            (
                sd_active || inner.file_print_active,
                inner.layers.activity == Some(ActivityState::Paused),
            )
        };
        if !printing && !is_paused {
            self.not_printing();
        } else {
            self.printing();
        }
    }

    // --- File-based print jobs ---

    /// A file-based print job started outside the firmware's own job
    /// tracking.
    pub fn file_print_started(&self) {
        let needs_start = {
            let mut inner = self.locked();
            inner.file_print_active = true;
            inner.layers.activity != Some(ActivityState::Printing)
        };
        if needs_start {
            self.expect_change(
                ExpectedChange::new().to_state(PrinterState::Printing, TransitionSource::Connect),
            );
            self.printing();
        }
    }

    /// A file-based print job stopped; only a job that reached 100% counts
    /// as finished.
    pub fn file_print_stopped(&self) {
        let completed = {
            let mut inner = self.locked();
            inner.file_print_active = false;
            inner.progress == Some(100)
        };
        if completed {
            self.expect_change(
                ExpectedChange::new().to_state(PrinterState::Finished, TransitionSource::Firmware),
            );
            self.finished();
        }
    }

    // --- Internals ---

    fn locked(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The bracket shared by every mutating operation.
    ///
    /// A caller-pushed expectation takes precedence over `default` for this
    /// one bracket; either way the ledger is empty again when the bracket
    /// ends, so no descriptor can leak into the next operation.
    fn influence<F>(&self, default: ExpectedChange, op: F)
    where
        F: FnOnce(&mut StateInner),
    {
        let mut inner = self.locked();
        if inner.ledger.push(default).is_err() {
            debug!("Default expected change overridden by a pending one");
        }
        op(&mut inner);
        self.detect_and_notify(&mut inner);
        inner.ledger.clear();
    }

    /// Recompute the reportable state; on a change, shift the history, run
    /// attribution and publish the notification triple.
    ///
    /// Publishing happens while the lock is held. `broadcast::Sender::send`
    /// only enqueues, and all three notifications go through one channel, so
    /// a cycle's triple is observed contiguously and in order.
    fn detect_and_notify(&self, inner: &mut StateInner) {
        let reported = inner.layers.reportable();
        if reported == inner.current_state {
            return;
        }

        inner.last_state = inner.current_state;
        inner.current_state = reported;
        debug!(
            "Reportable state changed: {:?} -> {:?}",
            inner.last_state, inner.current_state
        );

        let attribution = attribution::resolve_source(
            inner.ledger.get(),
            inner.last_state,
            inner.current_state,
        );
        if !attribution.expected {
            debug!(
                "Unexpected transition {:?} -> {:?}, nothing to attribute it to",
                inner.last_state, inner.current_state
            );
        }

        let _ = self.notify_tx.send(StateNotification::PreChange {
            command_id: attribution.command_id,
        });
        let _ = self.notify_tx.send(StateNotification::Changed {
            from: inner.last_state,
            to: inner.current_state,
            command_id: attribution.command_id,
            source: attribution.source,
        });
        let _ = self.notify_tx.send(StateNotification::PostChange);
    }
}
