//! Loop parking
//!
//! The loop thread is the only waiter. Wake sources (cross-thread
//! `execute`, `release`, timer changes from other threads) call `unpark`.
//! A wake that arrives while the loop is busy is remembered, so the next
//! `park` returns immediately: a wake is never lost.

use std::time::Duration;

pub trait LoopParking: Send + Sync {
    /// Block the loop thread until `unpark` or `timeout`.
    ///
    /// Returns `true` when a wake was consumed, `false` on timeout or a
    /// spurious return. Callers re-check their queues either way.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Record a wake and wake the loop thread if it is parked.
    fn unpark(&self);

    /// Whether the loop thread is currently parked (hint, may be stale).
    fn is_parked(&self) -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Platform-appropriate parking for one loop.
pub fn new_parking() -> Box<dyn LoopParking> {
    Box::new(PlatformParking::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_park_timeout() {
        let parking = new_parking();
        let start = Instant::now();
        let woken = parking.park(Some(Duration::from_millis(50)));
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_unpark_before_park_is_kept() {
        let parking = new_parking();
        parking.unpark();
        let start = Instant::now();
        assert!(parking.park(Some(Duration::from_secs(5))));
        assert!(start.elapsed() < Duration::from_secs(1));
        // Consumed: next park times out.
        assert!(!parking.park(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_unpark_wakes_parked_thread() {
        let parking = Arc::new(PlatformParking::new());
        let parking2 = Arc::clone(&parking);

        let handle = thread::spawn(move || parking2.park(Some(Duration::from_secs(10))));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !parking.is_parked() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        parking.unpark();
        assert!(handle.join().unwrap());
    }
}
