//! Data-access sessions for SORM.
//!
//! `sorm-session` is the **runtime state layer** the compiled routines run
//! against. A [`Session`] owns one storage connection, knows its dialect and
//! cache mode, and holds the [`IdentityCache`] that routines consult on
//! read and update on create/read/delete.
//!
//! # Lifecycle
//!
//! A session goes Open → Closed exactly once. Closing clears the cache and
//! closes the connection; every cache or connection operation afterwards
//! fails with [`Error::IllegalState`]. Dropping an open session closes it.
//!
//! # Cache modes
//!
//! - [`CacheMode::None`]: `cache_get` always misses, `cache_add` and
//!   `cache_del` do nothing
//! - [`CacheMode::Immediate`]: read-through and write-through
//! - [`CacheMode::Delayed`]: reserved; opening a session with it fails with
//!   [`Error::Unsupported`]
//!
//! # Example
//!
//! ```ignore
//! let context = Context::new(Dialect::SQLITE, || SqliteConnection::open_memory());
//! let session = context.session()?;
//!
//! let hero = Hero::orm().read_one(&session, 1)?;
//! session.close()?;
//! ```

pub mod context;
pub mod identity_cache;

pub use context::{Connector, Context};
pub use identity_cache::{EntityRef, IdentityCache};

use serde::{Deserialize, Serialize};
use sorm_core::{Connection, Dialect, Entity, Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// Configuration
// ============================================================================

/// How a session uses its identity cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// No caching at all.
    None,
    /// Read-through, write-through.
    #[default]
    Immediate,
    /// Reserved, not supported.
    Delayed,
}

impl CacheMode {
    fn enabled(self) -> bool {
        self == CacheMode::Immediate
    }
}

/// Session settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Dialect name matched against query blocks.
    pub dialect: Dialect,
    pub cache_mode: CacheMode,
}

impl SessionConfig {
    #[must_use]
    pub fn new(dialect: impl Into<Dialect>) -> Self {
        Self {
            dialect: dialect.into(),
            cache_mode: CacheMode::default(),
        }
    }

    #[must_use]
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }
}

// ============================================================================
// Session
// ============================================================================

/// An open data-access session.
///
/// All methods take `&self`: the cache is internally synchronized, so one
/// session may be shared between threads that run routines concurrently.
pub struct Session<C: Connection> {
    connection: C,
    dialect: Dialect,
    cache_mode: CacheMode,
    cache: IdentityCache,
    closed: AtomicBool,
}

impl<C: Connection> Session<C> {
    /// Open a session over a connection.
    pub fn open(connection: C, dialect: impl Into<Dialect>, cache_mode: CacheMode) -> Result<Self> {
        if cache_mode == CacheMode::Delayed {
            return Err(Error::Unsupported(
                "cache mode Delayed is not supported".to_string(),
            ));
        }
        let dialect = dialect.into();
        tracing::info!(dialect = %dialect, cache_mode = ?cache_mode, "Session opened");
        Ok(Self {
            connection,
            dialect,
            cache_mode,
            cache: IdentityCache::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Open a session with settings from a [`SessionConfig`].
    pub fn with_config(connection: C, config: &SessionConfig) -> Result<Self> {
        Self::open(connection, config.dialect.clone(), config.cache_mode)
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Name the query blocks are matched against.
    pub fn dialect_name(&self) -> &str {
        self.dialect.name()
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::IllegalState("session is closed".to_string()));
        }
        Ok(())
    }

    /// Close the session: clear the cache, then close the connection.
    ///
    /// Only the first call does anything; later calls fail with
    /// [`Error::IllegalState`].
    pub fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::IllegalState("session is already closed".to_string()));
        }
        self.cache.clear();
        self.connection.close()?;
        tracing::info!(dialect = %self.dialect, "Session closed");
        Ok(())
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// The underlying connection.
    pub fn connection(&self) -> Result<&C> {
        self.ensure_open()?;
        Ok(&self.connection)
    }

    /// Prepare a statement on the session's connection.
    pub fn prepare(&self, sql: &str) -> Result<C::Statement<'_>> {
        self.ensure_open()?;
        tracing::debug!(sql = sql, "Preparing statement");
        self.connection.prepare(sql)
    }

    // ========================================================================
    // Identity cache
    // ========================================================================

    /// Cache a handle under `key`.
    pub fn cache_add<E: Entity>(&self, key: E::Key, value: &EntityRef<E>) -> Result<()> {
        self.ensure_open()?;
        if self.cache_mode.enabled() {
            tracing::trace!(entity = E::NAME, key = ?key, "Cache add");
            self.cache.put(key, value);
        }
        Ok(())
    }

    /// The cached handle for `key`, if any.
    pub fn cache_get<E: Entity>(&self, key: &E::Key) -> Result<Option<EntityRef<E>>> {
        self.ensure_open()?;
        if !self.cache_mode.enabled() {
            return Ok(None);
        }
        let found = self.cache.get::<E>(key);
        tracing::debug!(entity = E::NAME, key = ?key, hit = found.is_some(), "Cache lookup");
        Ok(found)
    }

    /// Evict `key`.
    pub fn cache_del<E: Entity>(&self, key: &E::Key) -> Result<()> {
        self.ensure_open()?;
        if self.cache_mode.enabled() && self.cache.remove::<E>(key) {
            tracing::debug!(entity = E::NAME, key = ?key, "Cache evict");
        }
        Ok(())
    }
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                tracing::warn!(error = %e, "Failed to close session on drop");
            }
        }
    }
}

impl<C: Connection> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dialect", &self.dialect)
            .field("cache_mode", &self.cache_mode)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
