//! `BlockingPool`: fixed worker threads for calls that may block.
//!
//! Spawns N OS threads at creation. Jobs go through a bounded lock-free
//! MPMC queue; a submit unparks one worker round-robin, and idle workers
//! also re-check the queue on a short park timeout so a lost unpark only
//! costs latency.
//!
//! Used for name resolution during connect; the event loop thread must
//! never block on DNS.

use crate::error::{PoolError, Result};

use crossbeam_queue::ArrayQueue;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

const IDLE_PARK: Duration = Duration::from_millis(10);

/// Shared state between submitters and workers.
struct PoolInner {
    queue: ArrayQueue<Job>,
    /// Workers currently running a job.
    active: AtomicUsize,
    shutdown: AtomicBool,
}

pub struct BlockingPool {
    inner: Arc<PoolInner>,
    workers: Vec<thread::Thread>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    next: AtomicUsize,
}

impl BlockingPool {
    /// Create a pool with `n` workers (clamped to 1..=32).
    ///
    /// `queue_depth`: max pending jobs before `spawn` fails.
    pub fn new(n: usize, queue_depth: usize) -> Result<Self> {
        let n = n.clamp(1, 32);
        let inner = Arc::new(PoolInner {
            queue: ArrayQueue::new(queue_depth.max(1)),
            active: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(n);
        let mut workers = Vec::with_capacity(n);
        for worker_id in 0..n {
            let inner = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("mud-blocking-{}", worker_id))
                .spawn(move || worker_loop(inner))
                .map_err(PoolError::Spawn)?;
            workers.push(handle.thread().clone());
            handles.push(handle);
        }

        Ok(Self {
            inner,
            workers,
            handles: Mutex::new(handles),
            next: AtomicUsize::new(0),
        })
    }

    /// Default sizing: min(8, nproc/2), at least 2.
    pub fn auto_sized(queue_depth: usize) -> Result<Self> {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new((cpus / 2).clamp(2, 8), queue_depth)
    }

    /// Process-wide pool, created on first use.
    pub fn global() -> Result<&'static BlockingPool> {
        static GLOBAL: OnceLock<BlockingPool> = OnceLock::new();
        if let Some(pool) = GLOBAL.get() {
            return Ok(pool);
        }
        let pool = Self::auto_sized(1024)?;
        // A racing initializer wins; ours is dropped and its workers exit.
        Ok(GLOBAL.get_or_init(move || pool))
    }

    /// Queue `job` for execution on a worker thread.
    pub fn spawn<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        self.inner
            .queue
            .push(Box::new(job))
            .map_err(|_| PoolError::QueueFull(self.inner.queue.capacity()))?;
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[idx].unpark();
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    pub fn total_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs. Workers finish the queue and exit.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        for w in &self.workers {
            w.unpark();
        }
    }

    /// Shut down and wait for every worker to exit.
    pub fn join(&self) {
        self.shutdown();
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        for h in handles {
            let _ = h.join();
        }
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        // Don't join: drop may run on a thread the workers are waiting on.
        self.shutdown();
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        match inner.queue.pop() {
            Some(job) => {
                inner.active.fetch_add(1, Ordering::Relaxed);
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    log::error!("blocking job panicked");
                }
                inner.active.fetch_sub(1, Ordering::Relaxed);
            }
            None => {
                if inner.shutdown.load(Ordering::Acquire) {
                    break;
                }
                thread::park_timeout(IDLE_PARK);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_runs_jobs() {
        let pool = BlockingPool::new(2, 16).unwrap();
        let (tx, rx) = mpsc::channel();
        for i in 0..8 {
            let tx = tx.clone();
            pool.spawn(move || tx.send(i).unwrap()).unwrap();
        }
        let mut got: Vec<i32> = (0..8).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        got.sort();
        assert_eq!(got, (0..8).collect::<Vec<_>>());
        pool.join();
    }

    #[test]
    fn test_queue_full() {
        let pool = BlockingPool::new(1, 1).unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();
        pool.spawn(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
        })
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.spawn(|| {}).unwrap();
        assert!(matches!(pool.spawn(|| {}), Err(PoolError::QueueFull(1))));
        gate_tx.send(()).unwrap();
        pool.join();
    }

    #[test]
    fn test_spawn_after_shutdown() {
        let pool = BlockingPool::new(1, 4).unwrap();
        pool.shutdown();
        assert!(matches!(pool.spawn(|| {}), Err(PoolError::ShutDown)));
        pool.join();
    }

    #[test]
    fn test_panicking_job_keeps_worker() {
        let pool = BlockingPool::new(1, 4).unwrap();
        pool.spawn(|| panic!("boom")).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.spawn(move || tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
        pool.join();
    }
}
