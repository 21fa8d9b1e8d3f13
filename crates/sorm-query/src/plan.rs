//! The compiled, language-neutral instruction set for one entity.
//!
//! A [`CompiledEntity`] is what the compiler hands to either the runtime
//! interpreter or a code emitter: per-field descriptors, per-operation
//! dialect tables of compiled statements, row mapping, link plans and named
//! query plans. Everything derives `Serialize`.

use crate::dialect::CompiledQuery;
use serde::{Deserialize, Serialize};
use sorm_core::SqlType;
use sorm_schema::{AccessPath, IdGenerator, LinkMode, Visibility};

/// Which object in scope a field binding reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// The instance the operation works on
    Object,
    /// The left-hand instance of a link operation, `%{1.x}`
    Lhs,
}

/// Where a bound value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindSource {
    /// `%{}`: the key in scope, else the primary field of the instance
    Key,
    /// `%{x}` / `%{1.x}`: a field read through its getter chain
    Field {
        target: Target,
        path: AccessPath,
        /// Whether this is the primary field, which the key in scope can stand for
        primary: bool,
    },
    /// `%{2.f():T}`: a zero-argument accessor called on the right-hand instance
    Call { accessor: String },
    /// `%{p}` in a named query: the argument at this index
    Param { index: usize },
}

/// One positional parameter of a compiled statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// 1-based position of the `?` marker
    pub position: usize,
    /// Placeholder text the binding was compiled from
    pub placeholder: String,
    pub source: BindSource,
    pub sql_type: SqlType,
    /// Emit the null branch: bind SQL NULL when the value is null
    pub nullable: bool,
}

/// Query text with positional markers and its ordered bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledStatement {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorPlan {
    pub name: String,
    pub visibility: Visibility,
    pub overrides: bool,
}

/// Field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPlan {
    pub name: String,
    /// Dotted name through parents
    pub qualified: String,
    /// Qualified name with dots replaced, for identifiers
    pub safe_name: String,
    pub declared_type: String,
    pub column: String,
    pub sql_type: Option<SqlType>,
    pub nullable: bool,
    pub primary: bool,
    pub group: bool,
    /// Inherited; emitters generate no accessors for it
    pub from_super: bool,
    pub link_mode: LinkMode,
    /// Getter chain from the entity to the value
    pub path: AccessPath,
    pub getter: AccessorPlan,
    pub setter: AccessorPlan,
}

impl FieldPlan {
    /// Whether the field is read from a column of the entity's own rows.
    pub fn is_persisted(&self) -> bool {
        !self.group && !self.link_mode.is_to_many()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryPlan {
    /// Index into [`CompiledEntity::fields`]
    pub field: usize,
    pub sql_type: SqlType,
    pub generator: IdGenerator,
}

/// Maps one result column onto a setter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPlan {
    pub column: String,
    pub setter: String,
    pub sql_type: SqlType,
}

/// Routines of one link field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPlan {
    /// Field name the link is addressed by
    pub field: String,
    pub safe_name: String,
    pub mode: LinkMode,
    /// Target entity name
    pub target: String,
    pub key_type: String,
    pub key_sql_type: SqlType,
    /// Getter chain of the stored key, for to-one links
    pub path: AccessPath,
    pub read: Option<CompiledQuery>,
    pub create: Option<CompiledQuery>,
    pub delete: Option<CompiledQuery>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamPlan {
    pub name: String,
    pub declared_type: String,
    pub sql_type: SqlType,
    /// Value expression template; `%{}` passes the argument through
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedQueryPlan {
    pub name: String,
    pub key_type: String,
    pub key_sql_type: Option<SqlType>,
    pub visibility: Visibility,
    pub params: Vec<ParamPlan>,
    pub query: CompiledQuery,
}

/// Everything the routines of one entity need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledEntity {
    pub name: String,
    pub package: String,
    pub superclass: Option<String>,
    pub visibility: Visibility,
    pub orm_visibility: Visibility,
    pub fields: Vec<FieldPlan>,
    pub primary: Option<PrimaryPlan>,
    pub create: Option<CompiledQuery>,
    pub pk: Option<CompiledQuery>,
    pub read: Option<CompiledQuery>,
    pub update: Option<CompiledQuery>,
    pub delete: Option<CompiledQuery>,
    /// Row mapping used by read
    pub columns: Vec<ColumnPlan>,
    pub links: Vec<LinkPlan>,
    pub queries: Vec<NamedQueryPlan>,
}

impl CompiledEntity {
    pub fn primary_field(&self) -> Option<&FieldPlan> {
        self.primary.as_ref().and_then(|p| self.fields.get(p.field))
    }

    pub fn link(&self, field: &str) -> Option<&LinkPlan> {
        self.links
            .iter()
            .find(|l| l.field == field || l.safe_name == field)
    }

    pub fn query(&self, name: &str) -> Option<&NamedQueryPlan> {
        self.queries.iter().find(|q| q.name == name)
    }
}
