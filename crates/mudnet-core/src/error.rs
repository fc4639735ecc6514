//! Error types for mudnet-core

use thiserror::Error;

/// Failures of the blocking worker pool. Buffer and object pools never fail.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was shut down before the job was queued.
    #[error("blocking pool is shut down")]
    ShutDown,
    /// The job queue is at capacity.
    #[error("blocking pool queue full (depth {0})")]
    QueueFull(usize),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;
