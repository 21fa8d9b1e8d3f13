//! SQLite storage backend for SORM.
//!
// FFI calls require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Implements the synchronous [`Connection`](sorm_core::Connection) and
//! [`Statement`](sorm_core::Statement) traits over `libsqlite3-sys`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sorm_core::{Connection, Statement, Value};
//! use sorm_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let mut insert = conn.prepare("INSERT INTO users (name) VALUES (?)")?;
//! for name in ["Alice", "Bob"] {
//!     insert.bind(1, &Value::Text(name.into()))?;
//!     insert.execute()?;
//! }
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite Type |
//! |-------|-------------|
//! | `Bool` | INTEGER (0/1) |
//! | `TinyInt`, `SmallInt`, `Int`, `BigInt` | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Text`, `Decimal` | TEXT |
//! | `Bytes` | BLOB |
//! | `Date`, `Time`, `Timestamp` | INTEGER |
//! | `Json`, `Array` | TEXT (JSON) |
//!
//! Integers always read back as `BigInt` and reals as `Double`; codecs
//! narrow them to the declared type.

pub mod connection;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteStatement};

/// The SQLite library version.
pub fn sqlite_version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe { std::ffi::CStr::from_ptr(libsqlite3_sys::sqlite3_libversion()) }
        .to_str()
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
    }
}
