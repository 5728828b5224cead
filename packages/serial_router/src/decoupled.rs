//! Decoupled dispatch.
//!
//! Matching still happens on the thread that feeds lines in, but handlers
//! registered through [`DecoupledRouter::add_decoupled_handler`] run on a
//! single worker thread, in feed order. The serial reader never waits on
//! slow handler work.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use regex::Regex;
use tracing::{error, warn};

use crate::router::{Handler, HandlerId, LineMatch, SerialRouter};

enum Job {
    Dispatch {
        handler: Handler,
        line_match: LineMatch,
    },
    Shutdown,
}

/// Wraps a [`SerialRouter`] so registered handlers run on a worker thread.
pub struct DecoupledRouter {
    router: Arc<SerialRouter>,
    job_tx: Sender<Job>,
    worker: Option<JoinHandle<()>>,
}

impl DecoupledRouter {
    pub fn new(router: Arc<SerialRouter>) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let worker = std::thread::spawn(move || {
            while let Ok(job) = job_rx.recv() {
                match job {
                    Job::Dispatch {
                        handler,
                        line_match,
                    } => {
                        if catch_unwind(AssertUnwindSafe(|| handler(&line_match))).is_err() {
                            error!(
                                "Decoupled handler panicked on printer output {:?}; caught to stay alive",
                                line_match.line()
                            );
                        }
                    }
                    Job::Shutdown => break,
                }
            }
        });
        Self {
            router,
            job_tx,
            worker: Some(worker),
        }
    }

    /// The wrapped router, for registrations that should stay inline.
    pub fn router(&self) -> &SerialRouter {
        &self.router
    }

    /// Register a handler that runs on the worker thread. Dispatches keep
    /// their feed order.
    pub fn add_decoupled_handler<F>(&self, pattern: &Regex, handler: F, priority: i64) -> HandlerId
    where
        F: Fn(&LineMatch) + Send + Sync + 'static,
    {
        let job_tx = self.job_tx.clone();
        let handler: Handler = Arc::new(handler);
        self.router.add_handler(
            pattern,
            move |line_match| {
                let job = Job::Dispatch {
                    handler: Arc::clone(&handler),
                    line_match: line_match.clone(),
                };
                if job_tx.send(job).is_err() {
                    warn!(
                        "Dispatch worker is gone; dropping printer output {:?}",
                        line_match.line()
                    );
                }
            },
            priority,
        )
    }

    /// Route one line; see [`SerialRouter::feed`].
    pub fn feed(&self, line: &str) -> bool {
        self.router.feed(line)
    }

    /// Ask the worker to stop once the queued dispatches are done.
    pub fn stop(&self) {
        let _ = self.job_tx.send(Job::Shutdown);
    }

    /// Stop and wait for the worker to drain its queue.
    pub fn join(mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Dispatch worker panicked");
            }
        }
    }
}

impl Drop for DecoupledRouter {
    fn drop(&mut self) {
        let _ = self.job_tx.send(Job::Shutdown);
    }
}
