//! mudnet-net: TCP listeners and sessions for the mudnet event loop
//!
//! Socket I/O runs on a completion driver ([`Proactor`]); every
//! user-visible callback is posted back to the owning [`Loop`] thread.
//!
//! ```rust,ignore
//! use mudnet_net::{Listener, NetConfig, NulTerminated, Request, Settings};
//! use mudnet_runtime::Loop;
//!
//! let lp = Loop::new();
//! let settings = Settings::<NulTerminated>::new(NetConfig::from_env().port(4000))
//!     .on_request(|session, req| {
//!         NulTerminated::new(format!("Echo {}", req.text())).send(session);
//!         session.flush();
//!     });
//! let listener = Listener::new(&lp, settings);
//! listener.start()?;
//! lp.run()?;
//! ```
//!
//! [`Loop`]: mudnet_runtime::Loop

pub mod config;
pub mod connect;
pub mod error;
pub mod listener;
pub mod proactor;
pub mod request;
pub mod session;
pub mod settings;
mod socket;

pub use config::NetConfig;
pub use connect::ConnectFuture;
pub use error::{NetError, RequestError, Result};
pub use listener::Listener;
pub use proactor::{is_cancelled, Proactor};
pub use request::{Accumulator, LengthPrefixed, NulTerminated, Progress, Request};
pub use session::Session;
pub use settings::Settings;
