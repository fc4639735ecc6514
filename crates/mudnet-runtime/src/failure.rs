//! Callback failure routing.
//!
//! A panic escaping a submitted action, a timer callback or an event handler
//! is caught at the call site, turned into a [`CallbackFailure`] and passed
//! to the loop's handler. The handler's [`Disposition`] decides whether the
//! loop keeps going or `run`/`update` return `LoopError::Escalated`.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Where a failure came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOrigin {
    /// An action passed to `Loop::execute`.
    Action,
    /// A timer callback; carries the timer index.
    Timer(u32),
    /// A handler linked to the named event.
    Event(String),
}

#[derive(Debug, Clone)]
pub struct CallbackFailure {
    pub origin: FailureOrigin,
    pub message: String,
}

impl CallbackFailure {
    pub(crate) fn from_panic(origin: FailureOrigin, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { origin, message }
    }
}

impl fmt::Display for CallbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            FailureOrigin::Action => write!(f, "action panicked: {}", self.message),
            FailureOrigin::Timer(idx) => write!(f, "timer #{} panicked: {}", idx, self.message),
            FailureOrigin::Event(name) => {
                write!(f, "handler for `{}` panicked: {}", name, self.message)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Escalate,
}

pub type FailureHandler = Arc<dyn Fn(&CallbackFailure) -> Disposition + Send + Sync>;

/// Bounded ring of the most recent failures, readable from any thread.
#[derive(Debug, Clone)]
pub struct RecentFailures {
    ring: Arc<Mutex<VecDeque<CallbackFailure>>>,
    limit: usize,
}

impl RecentFailures {
    pub fn new(limit: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(VecDeque::with_capacity(limit))),
            limit: limit.max(1),
        }
    }

    fn push(&self, failure: CallbackFailure) {
        let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        if ring.len() == self.limit {
            ring.pop_front();
        }
        ring.push_back(failure);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<CallbackFailure> {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Built-in failure policies.
#[derive(Debug, Clone)]
pub enum ErrorPolicy {
    /// Log at error level and keep running.
    LogAndContinue,
    /// Log, then escalate out of `run`/`update`.
    Fatal,
    /// Log, remember the last N failures, keep running.
    Collect(RecentFailures),
}

impl ErrorPolicy {
    pub fn into_handler(self) -> FailureHandler {
        match self {
            ErrorPolicy::LogAndContinue => Arc::new(|failure: &CallbackFailure| {
                log::error!("{}", failure);
                Disposition::Continue
            }),
            ErrorPolicy::Fatal => Arc::new(|failure: &CallbackFailure| {
                log::error!("{} (fatal)", failure);
                Disposition::Escalate
            }),
            ErrorPolicy::Collect(recent) => Arc::new(move |failure: &CallbackFailure| {
                log::error!("{}", failure);
                recent.push(failure.clone());
                Disposition::Continue
            }),
        }
    }
}
