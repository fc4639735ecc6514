//! Callbacks and resources shared by every session of a listener or
//! connector.
//!
//! All callbacks run on the owning loop's thread.

use std::fmt;
use std::sync::Arc;

use mudnet_core::{BufferPool, ObjectPool};

use crate::config::NetConfig;
use crate::error::NetError;
use crate::request::Request;
use crate::session::Session;

pub type SessionFn<R> = Arc<dyn Fn(&Session<R>) + Send + Sync>;
pub type RequestFn<R> = Arc<dyn Fn(&Session<R>, &R) + Send + Sync>;
pub type ProgressFn<R> = Arc<dyn Fn(&Session<R>, usize) + Send + Sync>;
pub type ExceptionFn<R> = Arc<dyn Fn(Option<&Session<R>>, &NetError) + Send + Sync>;

pub struct Settings<R: Request> {
    pub config: NetConfig,
    pub(crate) on_accept: Option<SessionFn<R>>,
    pub(crate) on_request: Option<RequestFn<R>>,
    pub(crate) on_read: Option<ProgressFn<R>>,
    pub(crate) on_write: Option<ProgressFn<R>>,
    pub(crate) on_close: Option<SessionFn<R>>,
    pub(crate) on_exception: Option<ExceptionFn<R>>,
    pub(crate) requests: Arc<ObjectPool<R>>,
    pub(crate) buffers: &'static BufferPool,
}

impl<R: Request> Settings<R> {
    pub fn new(config: NetConfig) -> Self {
        let requests = Arc::new(ObjectPool::new(config.request_pool));
        Self {
            config,
            on_accept: None,
            on_request: None,
            on_read: None,
            on_write: None,
            on_close: None,
            on_exception: None,
            requests,
            buffers: BufferPool::global(),
        }
    }

    /// A session was accepted and started.
    pub fn on_accept(mut self, f: impl Fn(&Session<R>) + Send + Sync + 'static) -> Self {
        self.on_accept = Some(Arc::new(f));
        self
    }

    /// A complete message arrived. The request goes back to the pool after
    /// the callback returns.
    pub fn on_request(mut self, f: impl Fn(&Session<R>, &R) + Send + Sync + 'static) -> Self {
        self.on_request = Some(Arc::new(f));
        self
    }

    pub fn on_read(mut self, f: impl Fn(&Session<R>, usize) + Send + Sync + 'static) -> Self {
        self.on_read = Some(Arc::new(f));
        self
    }

    pub fn on_write(mut self, f: impl Fn(&Session<R>, usize) + Send + Sync + 'static) -> Self {
        self.on_write = Some(Arc::new(f));
        self
    }

    pub fn on_close(mut self, f: impl Fn(&Session<R>) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(f));
        self
    }

    /// Session or listener errors. Without a handler they are logged.
    pub fn on_exception(
        mut self,
        f: impl Fn(Option<&Session<R>>, &NetError) + Send + Sync + 'static,
    ) -> Self {
        self.on_exception = Some(Arc::new(f));
        self
    }

    /// Replace the process-wide buffer pool.
    pub fn buffers(mut self, pool: &'static BufferPool) -> Self {
        self.buffers = pool;
        self
    }

    /// Replace the request factory, e.g. to set a message size limit.
    pub fn request_factory(mut self, f: impl Fn() -> R + Send + Sync + 'static) -> Self {
        self.requests = Arc::new(ObjectPool::with_factory(self.config.request_pool, f));
        self
    }

    pub fn idle_requests(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn raise(&self, session: Option<&Session<R>>, err: &NetError) {
        match &self.on_exception {
            Some(f) => f(session, err),
            None => match session {
                Some(s) => log::error!("session {} ({}): {}", s.id(), s.remote(), err),
                None => log::error!("{}", err),
            },
        }
    }
}

impl<R: Request> fmt::Debug for Settings<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("config", &self.config)
            .field("idle_requests", &self.idle_requests())
            .finish_non_exhaustive()
    }
}
