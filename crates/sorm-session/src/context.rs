//! Session factory.
//!
//! A [`Context`] holds what every session of one application needs: the
//! dialect and a way to open connections. Callers own the sessions it hands
//! out and close them (or drop them) when done.

use crate::{CacheMode, Session};
use sorm_core::{Connection, Dialect, Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Opens a new storage connection.
pub type Connector<C> = Box<dyn Fn() -> Result<C> + Send + Sync>;

pub struct Context<C: Connection> {
    dialect: Dialect,
    connector: Connector<C>,
    closed: AtomicBool,
}

impl<C: Connection> Context<C> {
    pub fn new<F>(dialect: impl Into<Dialect>, connector: F) -> Self
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        Self {
            dialect: dialect.into(),
            connector: Box::new(connector),
            closed: AtomicBool::new(false),
        }
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Open a session with the default [`CacheMode::Immediate`].
    pub fn session(&self) -> Result<Session<C>> {
        self.session_with(CacheMode::Immediate)
    }

    /// Open a session with an explicit cache mode.
    pub fn session_with(&self, cache_mode: CacheMode) -> Result<Session<C>> {
        if self.is_closed() {
            return Err(Error::IllegalState("context is closed".to_string()));
        }
        let connection = (self.connector)()?;
        Session::open(connection, self.dialect.clone(), cache_mode)
    }

    /// Stop handing out sessions. Sessions already open are unaffected.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::IllegalState("context is already closed".to_string()));
        }
        tracing::debug!(dialect = %self.dialect, "Context closed");
        Ok(())
    }
}

impl<C: Connection> std::fmt::Debug for Context<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("dialect", &self.dialect)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
