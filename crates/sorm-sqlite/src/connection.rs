//! SQLite connection and prepared statements.
//!
//! A [`SqliteStatement`] keeps its `sqlite3_stmt` across executions: each
//! execution resets the statement (keeping the bindings) so a routine can
//! bind and execute in a loop on one prepared statement. The statement is
//! finalized when dropped or explicitly closed.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)] // FFI requires raw pointers

use crate::types;
mod ffi {
    pub use libsqlite3_sys::*;

    // The bundled bindings omit this prototype; the symbol is in the
    // bundled amalgamation.
    unsafe extern "C" {
        pub fn sqlite3_close_v2(db: *mut sqlite3) -> ::std::ffi::c_int;
    }
}
use sorm_core::{
    ColumnInfo, Connection, Error, Result, Row, Statement, Value,
    error::{ConnectionError, ConnectionErrorKind, QueryErrorKind},
};
use std::ffi::{CStr, CString, c_int};
use std::marker::PhantomData;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub read_only: bool,
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Serialized mode, so statements may run on several threads.
    pub full_mutex: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            full_mutex: true,
            ..Default::default()
        }
    }

    /// Read-write access, creating the database if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            full_mutex: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;
        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }
        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// The raw handle; null once closed.
struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is opened in serialized mode and every access to the
// pointer itself goes through the Mutex.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

impl SqliteConnection {
    /// Open a connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str())
            .map_err(|_| connection_error(ConnectionErrorKind::Connect, "Invalid path: contains null byte"))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: valid pointers; the return code is checked below
        let rc = unsafe {
            ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, config.flags.to_sqlite_flags(), ptr::null())
        };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: db is a valid handle even though opening failed
                let msg = unsafe { errmsg(db) };
                unsafe { ffi::sqlite3_close(db) };
                msg
            };
            return Err(connection_error(
                ConnectionErrorKind::Connect,
                format!("Failed to open database: {}", msg),
            ));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe { ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int) };
        }

        tracing::debug!(path = %config.path, "Opened SQLite database");
        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The open handle, or an error once closed.
    fn handle(&self) -> Result<*mut ffi::sqlite3> {
        let db = self.lock().db;
        if db.is_null() {
            return Err(connection_error(
                ConnectionErrorKind::Disconnected,
                "connection is closed",
            ));
        }
        Ok(db)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let db = self.handle()?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(db) })
    }
}

impl Connection for SqliteConnection {
    type Statement<'conn> = SqliteStatement<'conn>;

    fn prepare(&self, sql: &str) -> Result<SqliteStatement<'_>> {
        let db = self.handle()?;
        let c_sql = CString::new(sql)
            .map_err(|_| Error::query(QueryErrorKind::Syntax, Some(sql), "SQL contains null byte"))?;

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: all pointers are valid
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut stmt,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid
            return Err(unsafe { db_error(db, sql) });
        }
        if stmt.is_null() {
            return Err(Error::query(QueryErrorKind::Syntax, Some(sql), "empty statement"));
        }

        Ok(SqliteStatement {
            stmt,
            sql: sql.to_string(),
            stepped: false,
            failed: false,
            _conn: PhantomData,
        })
    }

    fn execute_batch(&self, sql: &str) -> Result<()> {
        let db = self.handle()?;
        let c_sql = CString::new(sql)
            .map_err(|_| Error::query(QueryErrorKind::Syntax, Some(sql), "SQL contains null byte"))?;

        let mut err: *mut std::ffi::c_char = ptr::null_mut();
        // SAFETY: all pointers are valid
        let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut err) };
        if rc != ffi::SQLITE_OK {
            let msg = if err.is_null() {
                error_string(rc)
            } else {
                // SAFETY: err is a NUL-terminated string allocated by SQLite
                let msg = unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned();
                unsafe { ffi::sqlite3_free(err.cast()) };
                msg
            };
            return Err(Error::query(error_code_to_kind(rc), Some(sql), msg));
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.db.is_null() {
            return Ok(());
        }
        // close_v2 defers the real close until outstanding statements are
        // finalized.
        // SAFETY: db is valid and is nulled right after
        let rc = unsafe { ffi::sqlite3_close_v2(inner.db) };
        inner.db = ptr::null_mut();
        if rc != ffi::SQLITE_OK {
            return Err(connection_error(ConnectionErrorKind::Close, error_string(rc)));
        }
        tracing::debug!(path = %self.path, "Closed SQLite database");
        Ok(())
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid
            unsafe { ffi::sqlite3_close_v2(inner.db) };
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A prepared statement borrowed from a [`SqliteConnection`].
pub struct SqliteStatement<'conn> {
    stmt: *mut ffi::sqlite3_stmt,
    sql: String,
    /// Stepped since the last reset
    stepped: bool,
    /// The last step failed; finalize repeats that error
    failed: bool,
    _conn: PhantomData<&'conn SqliteConnection>,
}

impl SqliteStatement<'_> {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Rewind after a previous execution. Bindings are kept.
    fn rewind(&mut self) {
        if self.stepped {
            // SAFETY: stmt is valid; the error code repeats the last step's
            // error, which was already reported.
            unsafe { ffi::sqlite3_reset(self.stmt) };
            self.stepped = false;
        }
    }

    fn step(&mut self) -> Result<bool> {
        self.stepped = true;
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        self.failed = !matches!(rc, ffi::SQLITE_ROW | ffi::SQLITE_DONE);
        match rc {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            // SAFETY: stmt is valid, so is its connection handle
            _ => Err(unsafe { db_error(ffi::sqlite3_db_handle(self.stmt), &self.sql) }),
        }
    }

    fn check_bind(&self, rc: c_int, index: usize) -> Result<()> {
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }
        // SAFETY: stmt is valid
        let msg = unsafe { errmsg(ffi::sqlite3_db_handle(self.stmt)) };
        Err(Error::query(
            QueryErrorKind::Database,
            Some(&self.sql),
            format!("Failed to bind parameter {}: {}", index, msg),
        ))
    }
}

impl Statement for SqliteStatement<'_> {
    fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
        self.rewind();
        tracing::trace!(index, value = %value, "Bind");
        // SAFETY: stmt is valid; SQLite checks the index range
        let rc = unsafe { types::bind_value(self.stmt, index as c_int, value) };
        self.check_bind(rc, index)
    }

    fn bind_null(&mut self, index: usize, null_type: Option<&str>) -> Result<()> {
        self.rewind();
        tracing::trace!(index, null_type, "Bind NULL");
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_bind_null(self.stmt, index as c_int) };
        self.check_bind(rc, index)
    }

    fn execute(&mut self) -> Result<u64> {
        self.rewind();
        while self.step()? {}
        // SAFETY: stmt is valid, so is its connection handle
        let changes = unsafe { ffi::sqlite3_changes(ffi::sqlite3_db_handle(self.stmt)) };
        Ok(changes as u64)
    }

    fn query(&mut self) -> Result<Vec<Row>> {
        self.rewind();
        // SAFETY: stmt is valid
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        let names = (0..count)
            // SAFETY: index is in range
            .map(|i| unsafe { types::column_name(self.stmt, i) }.unwrap_or_else(|| format!("col{}", i)))
            .collect();
        let columns = Arc::new(ColumnInfo::new(names));

        let mut rows = Vec::new();
        while self.step()? {
            let values = (0..count)
                // SAFETY: the last step returned SQLITE_ROW
                .map(|i| unsafe { types::read_column(self.stmt, i) })
                .collect();
            rows.push(Row::with_columns(Arc::clone(&columns), values));
        }
        Ok(rows)
    }

    fn parameter_count(&self) -> usize {
        // SAFETY: stmt is valid
        unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) as usize }
    }

    fn close(mut self) -> Result<()> {
        let stmt = std::mem::replace(&mut self.stmt, ptr::null_mut());
        // SAFETY: stmt is valid and not used after this
        let rc = unsafe { ffi::sqlite3_finalize(stmt) };
        if rc != ffi::SQLITE_OK && !self.failed {
            return Err(Error::query(error_code_to_kind(rc), Some(&self.sql), error_string(rc)));
        }
        Ok(())
    }
}

impl Drop for SqliteStatement<'_> {
    fn drop(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlite3_finalize(self.stmt) };
        }
    }
}

// Helper functions

fn connection_error(kind: ConnectionErrorKind, message: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind,
        message: message.into(),
        source: None,
    })
}

/// # Safety
/// `db` must be a valid handle.
unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: guaranteed by the caller
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

/// # Safety
/// `db` must be a valid handle.
unsafe fn db_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: guaranteed by the caller
    let (code, msg) = unsafe { (ffi::sqlite3_errcode(db), errmsg(db)) };
    Error::query(error_code_to_kind(code), Some(sql), msg)
}

fn error_string(code: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe { CStr::from_ptr(ffi::sqlite3_errstr(code)) }
        .to_string_lossy()
        .into_owned()
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .unwrap();
        conn
    }

    #[test]
    fn test_open_memory() {
        let conn = SqliteConnection::open_memory().unwrap();
        assert_eq!(conn.path(), ":memory:");
    }

    #[test]
    fn test_bind_execute_loop_reuses_statement() {
        let conn = memory();
        let mut insert = conn.prepare("INSERT INTO t (name, score) VALUES (?, ?)").unwrap();
        assert_eq!(insert.parameter_count(), 2);
        for (name, score) in [("a", 1.5), ("b", 2.5), ("c", 3.5)] {
            insert.bind(1, &Value::Text(name.to_string())).unwrap();
            insert.bind(2, &Value::Double(score)).unwrap();
            assert_eq!(insert.execute().unwrap(), 1);
        }
        insert.close().unwrap();
        assert_eq!(conn.last_insert_rowid().unwrap(), 3);

        let mut select = conn.prepare("SELECT id, name, score FROM t ORDER BY id").unwrap();
        let rows = select.query().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get_by_name("name"), Some(&Value::Text("b".to_string())));
        assert_eq!(rows[2].get_by_name("score"), Some(&Value::Double(3.5)));
        assert_eq!(rows[0].get_by_name("id"), Some(&Value::BigInt(1)));
    }

    #[test]
    fn test_rebinding_between_queries() {
        let conn = memory();
        conn.execute_batch("INSERT INTO t (name) VALUES ('x'); INSERT INTO t (name) VALUES ('y');")
            .unwrap();
        let mut select = conn.prepare("SELECT name FROM t WHERE id = ?").unwrap();
        select.bind(1, &Value::BigInt(2)).unwrap();
        let first = select.query_one().unwrap().unwrap();
        select.bind(1, &Value::BigInt(1)).unwrap();
        let second = select.query_one().unwrap().unwrap();
        select.bind(1, &Value::BigInt(9)).unwrap();
        assert!(select.query_one().unwrap().is_none());
        assert_eq!(first.get(0), Some(&Value::Text("y".to_string())));
        assert_eq!(second.get(0), Some(&Value::Text("x".to_string())));
    }

    #[test]
    fn test_bind_null() {
        let conn = memory();
        let mut insert = conn.prepare("INSERT INTO t (name) VALUES (?)").unwrap();
        insert.bind_null(1, Some("VARCHAR")).unwrap();
        insert.execute().unwrap();
        let mut select = conn.prepare("SELECT name FROM t").unwrap();
        let row = select.query_one().unwrap().unwrap();
        assert_eq!(row.get(0), Some(&Value::Null));
    }

    #[test]
    fn test_constraint_violation_kind() {
        let conn = memory();
        conn.execute_batch("INSERT INTO t (id, name) VALUES (1, 'a')").unwrap();
        let mut insert = conn.prepare("INSERT INTO t (id, name) VALUES (1, 'b')").unwrap();
        match insert.execute() {
            Err(Error::Query(q)) => {
                assert_eq!(q.kind, QueryErrorKind::Constraint);
                assert_eq!(q.sql.as_deref(), Some("INSERT INTO t (id, name) VALUES (1, 'b')"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_prepare_error_carries_sql() {
        let conn = memory();
        let err = conn.prepare("SELEKT nope").err().unwrap();
        assert!(err.is_storage_error());
        assert_eq!(err.sql(), Some("SELEKT nope"));
    }

    #[test]
    fn test_closed_connection_refuses_prepare() {
        let conn = memory();
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(matches!(
            conn.prepare("SELECT 1"),
            Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                ..
            }))
        ));
    }
}
