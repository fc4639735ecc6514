//! Loop timers
//!
//! A [`Timer`] is constructed detached, then bound to a loop by
//! [`Timer::start`]. While running it sits in exactly one loop's
//! [`TimerSet`] under `(expiry, index)`. A repeating timer re-arms to
//! `previous expiry + interval`, so late firing never accumulates drift;
//! a one-shot timer is stopped before its callback runs, which lets the
//! callback start it again.
//!
//! `start` and `stop` must run on the owning loop's thread.

mod index;
pub mod set;

pub use set::{TimerKey, TimerSet, TimerSetStats};

use index::TimerIndex;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::error::TimerError;
use crate::event_loop::{Loop, LoopShared};
use crate::events::Payload;

pub type TimerCallback = Box<dyn FnMut(&Timer) + Send + 'static>;

/// Cloneable handle; clones refer to the same timer.
#[derive(Clone)]
pub struct Timer {
    pub(crate) inner: Arc<TimerInner>,
}

pub(crate) struct TimerInner {
    index: TimerIndex,
    pub(crate) state: Mutex<TimerState>,
    callback: Mutex<Option<TimerCallback>>,
    payload: Mutex<Option<Payload>>,
}

pub(crate) struct TimerState {
    pub(crate) interval: Duration,
    pub(crate) repeat: bool,
    pub(crate) running: Option<Running>,
}

pub(crate) struct Running {
    pub(crate) owner: Weak<LoopShared>,
    pub(crate) key: TimerKey,
}

#[inline]
pub(crate) fn interval_micros(interval: Duration) -> u64 {
    (interval.as_micros() as u64).max(1)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Timer {
    pub fn new(interval: Duration, repeat: bool) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                index: TimerIndex::acquire(),
                state: Mutex::new(TimerState {
                    interval,
                    repeat,
                    running: None,
                }),
                callback: Mutex::new(None),
                payload: Mutex::new(None),
            }),
        }
    }

    pub fn with_callback<F>(interval: Duration, repeat: bool, callback: F) -> Self
    where
        F: FnMut(&Timer) + Send + 'static,
    {
        let timer = Self::new(interval, repeat);
        timer.set_callback(callback);
        timer
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&Timer) + Send + 'static,
    {
        *lock(&self.inner.callback) = Some(Box::new(callback));
    }

    /// Bind to `lp` and arm at `now + interval`.
    ///
    /// A no-op when already running on `lp`.
    pub fn start(&self, lp: &Loop) -> Result<(), TimerError> {
        let mut state = lock(&self.inner.state);
        if state.interval.is_zero() {
            return Err(TimerError::ZeroInterval);
        }
        if !lp.is_owner() {
            return Err(TimerError::WrongThread);
        }
        if let Some(running) = &state.running {
            if std::ptr::eq(running.owner.as_ptr(), Arc::as_ptr(&lp.shared)) {
                return Ok(());
            }
            if running.owner.strong_count() > 0 {
                return Err(TimerError::BoundElsewhere);
            }
            // Previous loop is gone; treat as stopped.
        }

        let key = TimerKey::new(
            lp.now_micros().saturating_add(interval_micros(state.interval)),
            self.index(),
        );
        lock(&lp.shared.timers).insert(key, self.clone());
        state.running = Some(Running {
            owner: Arc::downgrade(&lp.shared),
            key,
        });
        Ok(())
    }

    /// Disarm. Idempotent.
    pub fn stop(&self) -> Result<(), TimerError> {
        let mut state = lock(&self.inner.state);
        let Some(running) = &state.running else {
            return Ok(());
        };
        if let Some(shared) = running.owner.upgrade() {
            if !shared.is_owner() {
                return Err(TimerError::WrongThread);
            }
            lock(&shared.timers).remove(&running.key);
        }
        state.running = None;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.state).running.is_some()
    }

    /// Stable index used to order timers with equal expiry.
    pub fn index(&self) -> u32 {
        self.inner.index.get()
    }

    pub fn interval(&self) -> Duration {
        lock(&self.inner.state).interval
    }

    /// Takes effect at the next start or repeat re-arm.
    pub fn set_interval(&self, interval: Duration) {
        lock(&self.inner.state).interval = interval;
    }

    pub fn repeat(&self) -> bool {
        lock(&self.inner.state).repeat
    }

    pub fn set_repeat(&self, repeat: bool) {
        lock(&self.inner.state).repeat = repeat;
    }

    /// Absolute expiry on the loop clock while running.
    pub fn expiry(&self) -> Option<Duration> {
        lock(&self.inner.state)
            .running
            .as_ref()
            .map(|r| Duration::from_micros(r.key.expiry_us))
    }

    pub fn payload(&self) -> Option<Payload> {
        lock(&self.inner.payload).clone()
    }

    pub fn set_payload(&self, payload: Option<Payload>) {
        *lock(&self.inner.payload) = payload;
    }

    /// Run the callback. It is taken out of its slot for the duration of
    /// the call, so the callback may freely use this timer.
    pub(crate) fn take_callback(&self) -> Option<TimerCallback> {
        lock(&self.inner.callback).take()
    }

    pub(crate) fn restore_callback(&self, callback: TimerCallback) {
        let mut slot = lock(&self.inner.callback);
        // A callback installed during the call wins.
        if slot.is_none() {
            *slot = Some(callback);
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("Timer")
            .field("index", &self.index())
            .field("interval", &state.interval)
            .field("repeat", &state.repeat)
            .field("running", &state.running.is_some())
            .finish()
    }
}
