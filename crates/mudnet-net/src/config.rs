//! Listener/session configuration
//!
//! Same layering as the loop configuration: compile-time defaults from
//! `mudnet_runtime::config::defaults`, then `MUD_*` environment overrides,
//! then builder calls.
//!
//! ```rust,ignore
//! use mudnet_net::NetConfig;
//!
//! let config = NetConfig::from_env()
//!     .port(4000)
//!     .timeout(Some(Duration::from_secs(30)))
//!     .sum_sending(8);
//! config.validate()?;
//! ```

use std::time::Duration;

use mudnet_core::env::{env_get, env_get_millis, env_get_str};
use mudnet_runtime::config::defaults;
use mudnet_runtime::ConfigError;

/// Upper bound for `send_vector`; Linux rejects longer iovec arrays.
pub const MAX_SEND_VECTOR: usize = 1024;

#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Bind or connect host. Empty binds every interface (IPv6 any,
    /// dual-stack); "localhost" binds the IPv6 loopback.
    pub ip: String,
    /// 0 binds an ephemeral port
    pub port: u16,
    /// Session idle timeout; `None` never expires
    pub timeout: Option<Duration>,
    /// Receive and send buffer size (B)
    pub buffer_size: usize,
    /// Maximum full or in-flight send buffers per session
    pub sum_sending: usize,
    /// Listen backlog; also sizes the accept pool
    pub backlog: usize,
    /// Send buffers gathered into one vectored send
    pub send_vector: usize,
    /// Idle request objects retained per listener
    pub request_pool: usize,
    /// Default connect timeout; zero waits indefinitely
    pub connect_timeout: Duration,
    /// Pause before an accept slot retries after a failed accept
    pub accept_backoff: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn timeout_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl NetConfig {
    /// Compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `MUD_IP`, `MUD_PORT`
    /// - `MUD_TIMEOUT_MS` - idle timeout, 0 = infinite
    /// - `MUD_BUFFER_SIZE`, `MUD_SUM_SENDING`, `MUD_BACKLOG`, `MUD_SEND_VECTOR`
    /// - `MUD_REQUEST_POOL`
    /// - `MUD_CONNECT_TIMEOUT_MS`
    /// - `MUD_ACCEPT_BACKOFF_MS`
    pub fn from_env() -> Self {
        Self {
            ip: env_get_str("MUD_IP", ""),
            port: env_get("MUD_PORT", 0),
            timeout: timeout_from_millis(env_get("MUD_TIMEOUT_MS", defaults::IDLE_TIMEOUT_MS)),
            buffer_size: env_get("MUD_BUFFER_SIZE", defaults::BUFFER_SIZE),
            sum_sending: env_get("MUD_SUM_SENDING", defaults::SUM_SENDING),
            backlog: env_get("MUD_BACKLOG", defaults::BACKLOG),
            send_vector: env_get("MUD_SEND_VECTOR", defaults::SEND_VECTOR),
            request_pool: env_get("MUD_REQUEST_POOL", defaults::REQUEST_POOL),
            connect_timeout: env_get_millis("MUD_CONNECT_TIMEOUT_MS", defaults::CONNECT_TIMEOUT_MS),
            accept_backoff: env_get_millis("MUD_ACCEPT_BACKOFF_MS", defaults::ACCEPT_BACKOFF_MS),
        }
    }

    /// Compile-time defaults only, no environment.
    pub fn new() -> Self {
        Self {
            ip: String::new(),
            port: 0,
            timeout: timeout_from_millis(defaults::IDLE_TIMEOUT_MS),
            buffer_size: defaults::BUFFER_SIZE,
            sum_sending: defaults::SUM_SENDING,
            backlog: defaults::BACKLOG,
            send_vector: defaults::SEND_VECTOR,
            request_pool: defaults::REQUEST_POOL,
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
            accept_backoff: Duration::from_millis(defaults::ACCEPT_BACKOFF_MS),
        }
    }

    // Builder methods

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn sum_sending(mut self, n: usize) -> Self {
        self.sum_sending = n;
        self
    }

    pub fn backlog(mut self, n: usize) -> Self {
        self.backlog = n;
        self
    }

    pub fn send_vector(mut self, n: usize) -> Self {
        self.send_vector = n;
        self
    }

    pub fn request_pool(mut self, n: usize) -> Self {
        self.request_pool = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }

    /// Accept operations kept outstanding by a started listener.
    pub fn accept_pool_size(&self) -> usize {
        self.backlog.min(libc::SOMAXCONN as usize).max(1)
    }

    /// Bytes a session may hold queued or in flight before writes fail.
    pub fn send_limit(&self) -> usize {
        self.sum_sending.saturating_mul(self.buffer_size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidValue("buffer_size must be > 0"));
        }
        if self.sum_sending == 0 {
            return Err(ConfigError::InvalidValue("sum_sending must be > 0"));
        }
        if self.backlog == 0 {
            return Err(ConfigError::InvalidValue("backlog must be > 0"));
        }
        if self.send_vector == 0 || self.send_vector > MAX_SEND_VECTOR {
            return Err(ConfigError::InvalidValue("send_vector must be in 1..=1024"));
        }
        if self.accept_backoff.is_zero() {
            return Err(ConfigError::InvalidValue("accept_backoff must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = NetConfig::new();
        assert_eq!(config.send_vector, defaults::SEND_VECTOR);
        assert_eq!(config.buffer_size, defaults::BUFFER_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = NetConfig::new()
            .ip("localhost")
            .port(4000)
            .timeout(Some(Duration::from_secs(5)))
            .buffer_size(1024)
            .sum_sending(3);
        assert_eq!(config.ip, "localhost");
        assert_eq!(config.port, 4000);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.send_limit(), 3072);
    }

    #[test]
    fn test_zero_timeout_is_infinite() {
        let config = NetConfig::new().timeout(Some(Duration::ZERO));
        assert_eq!(config.timeout, None);
        assert_eq!(timeout_from_millis(0), None);
    }

    #[test]
    fn test_accept_pool_capped() {
        let somaxconn = libc::SOMAXCONN as usize;
        assert_eq!(NetConfig::new().backlog(4).accept_pool_size(), 4.min(somaxconn));
        assert_eq!(NetConfig::new().backlog(usize::MAX).accept_pool_size(), somaxconn);
    }

    #[test]
    fn test_validation() {
        assert!(NetConfig::new().buffer_size(0).validate().is_err());
        assert!(NetConfig::new().sum_sending(0).validate().is_err());
        assert!(NetConfig::new().backlog(0).validate().is_err());
        assert!(NetConfig::new().send_vector(0).validate().is_err());
        assert!(NetConfig::new().send_vector(MAX_SEND_VECTOR + 1).validate().is_err());
        assert!(NetConfig::new().send_vector(1).validate().is_ok());
        assert!(NetConfig::new().accept_backoff(Duration::ZERO).validate().is_err());
    }
}
