//! # mudnet-core
//!
//! Leaf building blocks shared by the runtime and network crates:
//!
//! - [`BufferPool`]: per-size free lists of byte buffers for the I/O path
//! - [`ObjectPool`]: generic reuse pool with an explicit reset contract
//! - [`BlockingPool`]: fixed worker threads for calls that may block
//! - [`env`]: typed `MUD_*` environment knobs
//!
//! Nothing in this crate knows about sockets or the event loop.

pub mod blocking;
pub mod buffer;
pub mod env;
pub mod error;
pub mod pool;

pub use blocking::BlockingPool;
pub use buffer::BufferPool;
pub use error::{PoolError, Result};
pub use pool::ObjectPool;
