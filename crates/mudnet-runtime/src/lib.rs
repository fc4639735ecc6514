//! # mudnet-runtime
//!
//! The single-threaded cooperative scheduler every mudnet listener and
//! session is bound to.
//!
//! - [`Loop`]: cross-thread submission, liveness counting, run/update,
//!   named broadcast, failure routing
//! - [`Timer`]: one-shot or drift-free repeating callbacks ordered by
//!   `(expiry, index)`
//! - [`Clock`]: monotonic or manually driven time
//! - [`config`]: compile-time defaults plus `MUD_*` overrides
//!
//! ```ignore
//! use mudnet_runtime::{Loop, Timer};
//! use std::time::Duration;
//!
//! let lp = Loop::new();
//! let tick = Timer::with_callback(Duration::from_millis(100), true, |t| {
//!     println!("tick");
//!     t.stop().ok();
//! });
//! tick.start(&lp)?;
//! lp.run()?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod events;
pub mod failure;
pub mod parking;
pub mod timer;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::LoopConfig;
pub use error::{ConfigError, LoopError, TimerError};
pub use event_loop::Loop;
pub use events::{EventHandler, Payload, Subscription};
pub use failure::{CallbackFailure, Disposition, ErrorPolicy, FailureOrigin, RecentFailures};
pub use timer::{Timer, TimerKey, TimerSet};
