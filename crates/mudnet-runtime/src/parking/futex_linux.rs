//! Linux futex-based loop parking
//!
//! Futex word:
//! - 0 = no wake pending
//! - 1 = wake pending
//!
//! `park` consumes a pending wake without sleeping, otherwise FUTEX_WAITs
//! on 0. `unpark` stores 1 first, then FUTEX_WAKEs only if the loop thread
//! is parked. Both sides use SeqCst so at least one of them observes the
//! other.

use super::LoopParking;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

pub struct FutexParking {
    futex: AtomicU32,
    parked: AtomicBool,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        self.parked.store(true, Ordering::SeqCst);

        if self.futex.swap(0, Ordering::SeqCst) != 0 {
            self.parked.store(false, Ordering::SeqCst);
            return true;
        }

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Returns immediately with EAGAIN if the word is no longer 0.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }

        self.parked.store(false, Ordering::SeqCst);
        self.futex.swap(0, Ordering::SeqCst) != 0
    }

    fn unpark(&self) {
        if self.futex.swap(1, Ordering::SeqCst) != 0 {
            return; // already pending, someone else woke it
        }
        if !self.parked.load(Ordering::SeqCst) {
            return;
        }
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
