//! Error types for mudnet-runtime

use thiserror::Error;

use crate::failure::CallbackFailure;

/// Errors returned by `Loop::run` and `Loop::update`.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The loop was driven from a thread other than the one that created it.
    #[error("loop `{name}` can only be driven from its owner thread")]
    NotOwner { name: String },
    /// The installed failure handler asked to escalate.
    #[error("escalated callback failure: {0}")]
    Escalated(CallbackFailure),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Usage errors from `Timer::start` / `Timer::stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("timer interval must be greater than zero")]
    ZeroInterval,
    /// Called off the owning loop's thread.
    #[error("timer used off its loop's owner thread")]
    WrongThread,
    #[error("timer is already running on another loop")]
    BoundElsewhere,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}
