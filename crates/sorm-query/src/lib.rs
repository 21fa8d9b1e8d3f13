//! Mapping compiler for SORM.
//!
//! This crate turns an [`EntityDef`](sorm_schema::EntityDef) into a
//! [`CompiledEntity`]:
//! - `scan` - quote-aware placeholder scanning
//! - `compile` - placeholder resolution into ordered bindings
//! - `dialect` - per-dialect statement tables selected at run time
//! - `assemble` - the complete per-entity plan
//!
//! # Example
//!
//! ```ignore
//! let entity = EntityDef::from_json(&std::fs::read_to_string("person.json")?)?;
//! let plan = sorm_query::compile(&entity)?;
//! let read = plan.read.as_ref().unwrap().select("postgresql")?;
//! println!("{} ({} parameters)", read.sql, read.bindings.len());
//! ```

pub mod assemble;
pub mod compile;
pub mod dialect;
pub mod plan;
pub mod scan;

pub use assemble::{Compiler, compile};
pub use compile::{Scope, StatementCompiler};
pub use dialect::{CompiledQuery, DialectBranch};
pub use plan::{
    AccessorPlan, BindSource, Binding, ColumnPlan, CompiledEntity, CompiledStatement, FieldPlan,
    LinkPlan, NamedQueryPlan, ParamPlan, PrimaryPlan, Target,
};
pub use scan::{Segment, scan};
