//! Relationship links between entities.

use crate::query::Query;
use serde::{Deserialize, Serialize};
use sorm_core::SqlType;

/// Cardinality of a link between two entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkMode {
    /// Not a link; the field is an ordinary value.
    #[default]
    None,
    /// The field stores the key of one other entity, and that entity points back.
    OneToOne,
    /// The field stands for many other entities, read through a collection query.
    OneToMany,
    /// The field stores the key of one other entity shared by many.
    ManyToOne,
    /// Both sides stand for many, joined through a link table.
    ManyToMany,
}

impl LinkMode {
    /// Whether the link stands for a collection rather than a stored key.
    pub const fn is_to_many(self) -> bool {
        matches!(self, LinkMode::OneToMany | LinkMode::ManyToMany)
    }

    /// Whether the link stores a single key in the field itself.
    pub const fn is_to_one(self) -> bool {
        matches!(self, LinkMode::OneToOne | LinkMode::ManyToOne)
    }
}

/// Queries maintaining a to-many link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCollection {
    /// Reads the keys of the linked entities; the key column is `id`.
    pub read: Query,
    /// Inserts a join-table row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<Query>,
    /// Removes a join-table row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<Query>,
}

impl LinkCollection {
    pub fn new(read: Query) -> Self {
        Self {
            read,
            create: None,
            delete: None,
        }
    }

    pub fn create(mut self, query: Query) -> Self {
        self.create = Some(query);
        self
    }

    pub fn delete(mut self, query: Query) -> Self {
        self.delete = Some(query);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLink {
    #[serde(default)]
    pub mode: LinkMode,
    /// Target entity name
    #[serde(rename = "type")]
    pub target: String,
    /// Declared type of the target's key
    pub key_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<SqlType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<LinkCollection>,
}

impl FieldLink {
    pub fn new(mode: LinkMode, target: impl Into<String>, key_type: impl Into<String>) -> Self {
        Self {
            mode,
            target: target.into(),
            key_type: key_type.into(),
            sql_type: None,
            collection: None,
        }
    }

    pub fn collection(mut self, collection: LinkCollection) -> Self {
        self.collection = Some(collection);
        self
    }

    /// SQL type of the target key, defaulting from the key type.
    pub fn key_sql_type(&self) -> Option<SqlType> {
        self.sql_type
            .clone()
            .or_else(|| SqlType::for_declared_type(&self.key_type))
    }
}
