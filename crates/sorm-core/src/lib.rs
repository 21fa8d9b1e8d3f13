//! Core types and traits for SORM.
//!
//! This crate provides the foundation shared by the mapping compiler and the
//! runtime:
//!
//! - `Value` and `Row` for data moving to and from storage
//! - `SqlType` discriminators and the `CodecRegistry` that converts values
//! - `Connection` and `Statement` traits for storage backends
//! - `Record` and `Entity` traits for mapped application types
//! - `Error` and `Result`

pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, Statement};
pub use dialect::{Dialect, WILDCARD};
pub use entity::{Entity, EntityKey, Record};
pub use error::{
    BindError, ConfigError, ConfigErrorKind, ConnectionError, ConnectionErrorKind, Error,
    QueryError, QueryErrorKind, Result, TypeError,
};
pub use row::{ColumnInfo, FromValue, Row};
pub use types::{Codec, CodecRegistry, ConvertFn, SqlType};
pub use value::Value;
