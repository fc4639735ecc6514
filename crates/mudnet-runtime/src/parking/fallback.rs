//! Fallback loop parking using std::sync::Condvar
//!
//! Used on platforms without futex support.

use super::LoopParking;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct FallbackParking {
    /// true = wake pending
    pending: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicBool,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for FallbackParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if !*pending {
            self.parked.store(true, Ordering::SeqCst);
            pending = match timeout {
                Some(t) => {
                    self.condvar
                        .wait_timeout(pending, t)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
                None => self.condvar.wait(pending).unwrap_or_else(|e| e.into_inner()),
            };
            self.parked.store(false, Ordering::SeqCst);
        }
        std::mem::replace(&mut *pending, false)
    }

    fn unpark(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = true;
        self.condvar.notify_one();
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
