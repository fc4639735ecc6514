//! Environment variable helpers
//!
//! Every `MUD_*` knob in the workspace goes through these functions so a
//! malformed value degrades to the compiled-in default instead of failing.
//!
//! ```ignore
//! use mudnet_core::env::{env_get, env_get_bool, env_get_millis};
//!
//! let backlog: usize = env_get("MUD_BACKLOG", 256);
//! let fatal = env_get_bool("MUD_FATAL_ERRORS", false);
//! let timeout = env_get_millis("MUD_TIMEOUT_MS", 0);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or malformed.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T`; `None` when unset or malformed.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean knob. "1", "true", "yes" and "on" (any case) are true, any other
/// value is false, and an unset variable yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// String knob, no parsing.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Millisecond knob returned as a `Duration`.
#[inline]
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}
