//! Error types for mudnet-net

use std::io;
use std::time::Duration;

use thiserror::Error;

use mudnet_core::PoolError;
use mudnet_runtime::ConfigError;

/// Errors surfaced through listener/session callbacks and connect results.
#[derive(Debug, Error)]
pub enum NetError {
    /// Socket-level failure.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// Name resolution failed.
    #[error("failed to resolve `{host}`: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    /// Name resolution returned no addresses.
    #[error("no address found for `{0}`")]
    NoAddress(String),
    /// Connect did not finish before the caller's deadline.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    /// The incremental consumer rejected the byte stream.
    #[error("malformed request: {0}")]
    Request(#[from] RequestError),
    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
    /// The connect result was dropped without being delivered.
    #[error("connect abandoned before completion")]
    Abandoned,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Decode failures reported by `Request::consume`.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("message exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("{0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, NetError>;
