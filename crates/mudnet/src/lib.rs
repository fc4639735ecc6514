//! # mudnet - embeddable network runtime
//!
//! One owner thread runs a [`Loop`]: queued actions, ordered timers and
//! named broadcasts. TCP [`Listener`]s and [`Session`]s do their socket I/O
//! on a completion driver and post every callback back to that thread.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mudnet::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lp = Loop::new();
//!     let settings = Settings::<NulTerminated>::new(NetConfig::from_env().port(4000))
//!         .on_request(|session, req| {
//!             NulTerminated::new(format!("Echo {}", req.text())).send(session);
//!             session.flush();
//!         });
//!     let listener = Listener::new(&lp, settings);
//!     listener.start()?;
//!
//!     let tick = Timer::with_callback(Duration::from_secs(1), true, |_| log::info!("tick"));
//!     tick.start(&lp)?;
//!
//!     lp.run()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       User code                          │
//! │     callbacks, timers, execute(), broadcast()            │
//! └──────────────────────────────────────────────────────────┘
//!                │ runs on                 ▲ posts via execute()
//!                ▼                         │
//! ┌────────────────────────────┐   ┌──────────────────────────┐
//! │        Loop (owner)        │   │   Proactor thread        │
//! │ actions · TimerSet · pubsub│   │ epoll · accept/recv/send │
//! └────────────────────────────┘   └──────────────────────────┘
//!                                          │
//!                                  ┌──────────────────────────┐
//!                                  │ BufferPool · ObjectPool  │
//!                                  │ BlockingPool (resolver)  │
//!                                  └──────────────────────────┘
//! ```

// Re-export pools and env helpers
pub use mudnet_core::env::{env_get, env_get_bool, env_get_millis, env_get_opt, env_get_str};
pub use mudnet_core::{BlockingPool, BufferPool, ObjectPool, PoolError};

// Re-export the loop
pub use mudnet_runtime::{
    CallbackFailure, Clock, ConfigError, Disposition, ErrorPolicy, EventHandler, FailureOrigin,
    Loop, LoopConfig, LoopError, ManualClock, MonotonicClock, Payload, RecentFailures,
    Subscription, Timer, TimerError,
};

// Re-export networking
pub use mudnet_net::{
    is_cancelled, Accumulator, ConnectFuture, LengthPrefixed, Listener, NetConfig, NetError,
    NulTerminated, Proactor, Progress, Request, RequestError, Session, Settings,
};

pub mod prelude {
    pub use std::time::Duration;

    pub use crate::{
        Listener, Loop, LoopConfig, NetConfig, NetError, NulTerminated, Request, Session,
        Settings, Timer,
    };
}
