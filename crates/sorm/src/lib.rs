//! SORM - compile declarative object-to-table mappings into data-access routines.
//!
//! An entity is described once, as fields, hand-written SQL per dialect and
//! link descriptions. SORM compiles that description into a plan of
//! positional statements with typed bindings and runs it:
//!
//! - create, read, update and delete by primary key
//! - streaming reads over a key sequence
//! - reads, inserts and deletes through link tables
//! - named queries returning keys
//! - a per-session identity cache, so one key maps to one shared instance
//!
//! # Quick Start
//!
//! ```ignore
//! use sorm::prelude::*;
//!
//! let orm: Orm<Person> = Orm::from_json(PERSON_SCHEMA)?;
//! let session = Session::open(SqliteConnection::open_memory()?, "sqlite", CacheMode::Immediate)?;
//!
//! let ada = orm.create_one(&session, Person::named("Ada"))?;
//! let again = orm.read_one(&session, 1)?;
//! assert!(Arc::ptr_eq(&ada, &again.unwrap()));
//! ```

mod bind;
mod mapping;
pub mod matches;
pub mod orm;

pub use matches::Matches;
pub use orm::{BoundOrm, Orm};

// Re-export all public types from sub-crates
pub use sorm_core::{
    BindError, Codec, CodecRegistry, ConfigError, ConfigErrorKind, Connection, ConnectionError,
    ConnectionErrorKind, Dialect, Entity, EntityKey, Error, FromValue, QueryError,
    QueryErrorKind, Record, Result, Row, SqlType, Statement, TypeError, Value, WILDCARD,
};
pub use sorm_query::{CompiledEntity, CompiledQuery, CompiledStatement, Compiler, compile};
pub use sorm_schema::{
    EntityDef, FieldDef, FieldGetter, FieldLink, FieldSetter, IdGenerator, LinkCollection,
    LinkMode, NamedQuery, Query, QueryParam, Visibility,
};
pub use sorm_session::{CacheMode, Context, EntityRef, IdentityCache, Session, SessionConfig};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        CacheMode, Connection, Context, Entity, EntityDef, EntityRef, Error, Orm, Record, Result,
        Session, SessionConfig, SqlType, Value,
    };
}
