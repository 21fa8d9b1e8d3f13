//! Entity and field definitions.

use crate::link::FieldLink;
use crate::query::{NamedQuery, Query};
use serde::{Deserialize, Serialize};
use sorm_core::SqlType;

/// Visibility of a generated item, for code emitters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
    /// Visible within the owning package/module only
    Package,
}

/// How a primary key comes into existence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdGenerator {
    /// The store assigns the key; it is fetched by the `pk` query after insert.
    #[default]
    Post,
    /// The application assigns the key before insert.
    Pre,
}

/// Read accessor of a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGetter {
    #[serde(default)]
    pub accessor: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "override")]
    pub overrides: bool,
    /// Expression template, `%{}.name()`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FieldGetter {
    /// Name passed to `Record::get`.
    ///
    /// An explicit name wins, then the method named by a `%{}.name()`
    /// template, then the field's own name.
    pub fn accessor_name(&self, field_name: &str) -> String {
        self.name
            .clone()
            .or_else(|| self.content.as_deref().and_then(template_method))
            .unwrap_or_else(|| field_name.to_string())
    }
}

/// Write accessor of a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSetter {
    #[serde(default)]
    pub accessor: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "override")]
    pub overrides: bool,
    /// Expression template, `%{}.name(%{value})`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FieldSetter {
    /// Name passed to `Entity::set`, defaulting to the qualified field name.
    pub fn setter_name(&self, qualified_name: &str) -> String {
        self.name
            .clone()
            .or_else(|| self.content.as_deref().and_then(template_method))
            .unwrap_or_else(|| qualified_name.to_string())
    }
}

/// Method name out of `%{}.method(...)`.
fn template_method(template: &str) -> Option<String> {
    let call = template.trim().strip_prefix("%{}.")?;
    let (method, rest) = call.split_once('(')?;
    let valid = !method.is_empty()
        && !method.starts_with(|c: char| c.is_ascii_digit())
        && method.chars().all(|c| c.is_alphanumeric() || c == '_');
    (valid && rest.ends_with(')')).then(|| method.to_string())
}

/// One field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<SqlType>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub nullable: bool,
    /// Inherited from a supertype; emitters skip its accessors.
    #[serde(default)]
    pub from_super: bool,
    /// A bundle of sub-fields, not persisted itself.
    #[serde(default)]
    pub group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub generator: IdGenerator,
    #[serde(default)]
    pub get: FieldGetter,
    #[serde(default)]
    pub set: FieldSetter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<FieldLink>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            sql_column: None,
            sql_type: None,
            primary: false,
            nullable: false,
            from_super: false,
            group: false,
            parent: None,
            generator: IdGenerator::default(),
            get: FieldGetter::default(),
            set: FieldSetter::default(),
            link: None,
        }
    }

    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary = value;
        self
    }

    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    pub fn group(mut self, value: bool) -> Self {
        self.group = value;
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.sql_column = Some(column.into());
        self
    }

    pub fn sql_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn generator(mut self, generator: IdGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn getter(mut self, name: impl Into<String>) -> Self {
        self.get.name = Some(name.into());
        self
    }

    pub fn setter(mut self, name: impl Into<String>) -> Self {
        self.set.name = Some(name.into());
        self
    }

    pub fn link(mut self, link: FieldLink) -> Self {
        self.link = Some(link);
        self
    }

    /// Column name, defaulting to the field name.
    pub fn column_name(&self) -> &str {
        self.sql_column.as_deref().unwrap_or(&self.name)
    }

    /// Declared SQL type, else the default for the declared type.
    pub fn effective_sql_type(&self) -> Option<SqlType> {
        self.sql_type
            .clone()
            .or_else(|| SqlType::for_declared_type(&self.ty))
    }

    pub fn link_mode(&self) -> crate::LinkMode {
        self.link.as_ref().map(|l| l.mode).unwrap_or_default()
    }

    /// Whether the field maps to a column of the entity's own table.
    pub fn is_persisted(&self) -> bool {
        !self.group && !self.link_mode().is_to_many()
    }
}

/// One mapped entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    #[serde(default, rename = "package")]
    pub pkg: String,
    #[serde(default)]
    pub accessor: Visibility,
    #[serde(default)]
    pub orm_accessor: Visibility,
    #[serde(default, rename = "super", skip_serializing_if = "Option::is_none")]
    pub superclass: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub create: Query,
    /// Fetches the key generated by the last create
    #[serde(default)]
    pub pk: Query,
    #[serde(default)]
    pub read: Query,
    #[serde(default)]
    pub update: Query,
    #[serde(default)]
    pub delete: Query,
    #[serde(default)]
    pub queries: Vec<NamedQuery>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pkg: String::new(),
            accessor: Visibility::default(),
            orm_accessor: Visibility::default(),
            superclass: None,
            fields: Vec::new(),
            create: Query::new(),
            pk: Query::new(),
            read: Query::new(),
            update: Query::new(),
            delete: Query::new(),
            queries: Vec::new(),
        }
    }

    pub fn package(mut self, pkg: impl Into<String>) -> Self {
        self.pkg = pkg.into();
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn named_query(mut self, query: NamedQuery) -> Self {
        self.queries.push(query);
        self
    }

    /// Look up a field by its unqualified name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All fields flagged primary.
    pub fn primary_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.primary)
    }

    /// Whether any routine needs a primary field to exist.
    pub fn needs_primary(&self) -> bool {
        !self.read.is_empty()
            || !self.delete.is_empty()
            || !self.queries.is_empty()
            || self.fields.iter().any(|f| f.link_mode().is_to_many())
    }
}
