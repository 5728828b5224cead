//! Priority-ordered regex dispatch.
//!
//! Finds the appropriate handler for every line the printer sends. Patterns
//! are tried in descending priority (ties go to the newest registration);
//! the first matching pattern wins and all of its handlers fire. A handler
//! failure must never take down the thread reading the serial port, so
//! handler panics are caught and logged.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regex::{Captures, Regex};
use tracing::{debug, error};

/// One matched line of printer output with its captured groups, handed to
/// handlers as owned data so a dispatch can cross threads.
#[derive(Clone, Debug)]
pub struct LineMatch {
    line: String,
    groups: Vec<Option<String>>,
}

impl LineMatch {
    fn new(line: &str, captures: &Captures<'_>) -> Self {
        Self {
            line: line.to_string(),
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// The full line as received.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Captured group by index; 0 is the whole match.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|group| group.as_deref())
    }
}

/// Identifies one registered handler for later removal.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct HandlerId(pub u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no handlers registered for pattern {0:?}")]
    UnknownPattern(String),
    #[error("{1} is not registered for pattern {0:?}")]
    UnknownHandler(String, HandlerId),
}

pub(crate) type Handler = Arc<dyn Fn(&LineMatch) + Send + Sync>;

/// A pattern bound to its handlers, with the priority used to order the
/// matching attempts.
struct Pairing {
    pattern: Regex,
    priority: i64,
    seq: u64,
    handlers: Vec<(HandlerId, Handler)>,
}

struct RouterInner {
    /// Sorted by priority descending, then registration order newest first
    pairings: Vec<Pairing>,
    next_seq: u64,
    next_handler: u64,
}

/// Routes each line of printer output to the handlers of the first matching
/// pattern.
pub struct SerialRouter {
    inner: Mutex<RouterInner>,
}

impl Default for SerialRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialRouter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RouterInner {
                pairings: Vec::new(),
                next_seq: 0,
                next_handler: 0,
            }),
        }
    }

    /// Register `handler` for `pattern`.
    ///
    /// Patterns should be unique or byte-identical to an existing one: after
    /// the first match the search stops and only that pattern's handlers run.
    /// Registering against an existing pattern appends the handler and raises
    /// the pattern's priority if the new one is higher.
    pub fn add_handler<F>(&self, pattern: &Regex, handler: F, priority: i64) -> HandlerId
    where
        F: Fn(&LineMatch) + Send + Sync + 'static,
    {
        let mut inner = self.locked();
        let id = HandlerId(inner.next_handler);
        inner.next_handler += 1;
        let handler: Handler = Arc::new(handler);

        let existing = inner
            .pairings
            .iter()
            .position(|pairing| pairing.pattern.as_str() == pattern.as_str());
        match existing {
            Some(index) => {
                let pairing = &mut inner.pairings[index];
                if priority > pairing.priority {
                    debug!(
                        "Raising priority of {:?} from {} to {}",
                        pattern.as_str(),
                        pairing.priority,
                        priority
                    );
                    pairing.priority = priority;
                }
                pairing.handlers.push((id, handler));
            }
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.pairings.push(Pairing {
                    pattern: pattern.clone(),
                    priority,
                    seq,
                    handlers: vec![(id, handler)],
                });
            }
        }
        inner
            .pairings
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(b.seq.cmp(&a.seq)));
        id
    }

    /// Remove one handler; drops the pattern entirely once no handlers
    /// remain for it.
    pub fn remove_handler(&self, pattern: &Regex, id: HandlerId) -> Result<(), RouterError> {
        let mut inner = self.locked();
        let index = inner
            .pairings
            .iter()
            .position(|pairing| pairing.pattern.as_str() == pattern.as_str())
            .ok_or_else(|| RouterError::UnknownPattern(pattern.as_str().to_string()))?;

        let pairing = &mut inner.pairings[index];
        let at = pairing
            .handlers
            .iter()
            .position(|(handler_id, _)| *handler_id == id)
            .ok_or_else(|| RouterError::UnknownHandler(pattern.as_str().to_string(), id))?;
        pairing.handlers.remove(at);
        if pairing.handlers.is_empty() {
            inner.pairings.remove(index);
        }
        Ok(())
    }

    /// Route one line. Returns whether any pattern matched.
    ///
    /// Handlers run outside the router's lock, so they may register or
    /// remove handlers themselves.
    pub fn feed(&self, line: &str) -> bool {
        let hit = {
            let inner = self.locked();
            inner.pairings.iter().find_map(|pairing| {
                pairing.pattern.captures(line).map(|captures| {
                    (
                        LineMatch::new(line, &captures),
                        pairing
                            .handlers
                            .iter()
                            .map(|(_, handler)| Arc::clone(handler))
                            .collect::<Vec<_>>(),
                        pairing.pattern.as_str().to_string(),
                    )
                })
            })
        };

        match hit {
            Some((line_match, handlers, pattern)) => {
                debug!("Line {:?} matched {:?}", line, pattern);
                for handler in handlers {
                    if catch_unwind(AssertUnwindSafe(|| handler(&line_match))).is_err() {
                        error!(
                            "Handler panicked on printer output {:?}; caught to stay alive",
                            line
                        );
                    }
                }
                true
            }
            None => {
                debug!("Match not found for {:?}", line);
                false
            }
        }
    }

    fn locked(&self) -> MutexGuard<'_, RouterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
