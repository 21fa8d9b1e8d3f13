//! Mapping schema model for SORM.
//!
//! This crate provides:
//! - The entity description (`EntityDef`, `FieldDef`, links, queries)
//! - Loading entity descriptions from JSON documents
//! - Structural validation of an entity description
//! - Field graph resolution for grouped fields (`FieldGraph`)
//!
//! The model is read-only once loaded; the compiler never mutates it.

pub mod link;
pub mod model;
pub mod query;
pub mod resolve;

pub use link::{FieldLink, LinkCollection, LinkMode};
pub use model::{EntityDef, FieldDef, FieldGetter, FieldSetter, IdGenerator, Visibility};
pub use query::{DialectSql, NamedQuery, Query, QueryParam};
pub use resolve::{AccessPath, FieldGraph, ResolvedField};

use sorm_core::{ConfigErrorKind, Error, Result};
use std::collections::HashSet;

impl EntityDef {
    /// Parse and validate an entity description.
    pub fn from_json(json: &str) -> Result<Self> {
        let entity: EntityDef = serde_json::from_str(json)?;
        entity.validate()?;
        tracing::debug!(entity = %entity.name, fields = entity.fields.len(), "Loaded entity description");
        Ok(entity)
    }

    /// Parse and validate a document holding a list of entity descriptions.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        let entities: Vec<EntityDef> = serde_json::from_str(json)?;
        for entity in &entities {
            entity.validate()?;
        }
        Ok(entities)
    }

    /// The primary field, if exactly one is declared.
    pub fn primary_field(&self) -> Result<Option<&FieldDef>> {
        let mut primaries = self.primary_fields();
        let first = primaries.next();
        if primaries.next().is_some() {
            return Err(Error::config(
                ConfigErrorKind::MultiplePrimary,
                format!("Multiple primary fields found in {}", self.name),
            ));
        }
        Ok(first)
    }

    /// Check the structural rules of an entity description.
    pub fn validate(&self) -> Result<()> {
        let primary = self.primary_field()?;
        if primary.is_none() && self.needs_primary() {
            return Err(Error::config(
                ConfigErrorKind::MissingPrimary,
                format!("{} declares key-based routines but no primary field", self.name),
            ));
        }

        FieldGraph::new(self).resolve_all()?;

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::config(
                    ConfigErrorKind::Invalid,
                    format!("{} declares field {} twice", self.name, field.name),
                ));
            }
            if let Some(link) = &field.link {
                validate_link(field, link)?;
            }
        }

        let mut names = HashSet::new();
        for query in &self.queries {
            if !names.insert(query.name.as_str()) {
                return Err(Error::config(
                    ConfigErrorKind::Invalid,
                    format!("{} declares query {} twice", self.name, query.name),
                ));
            }
            if query.query.is_empty() {
                return Err(Error::config(
                    ConfigErrorKind::Invalid,
                    format!("query {}.{} has no query text", self.name, query.name),
                ));
            }
        }
        Ok(())
    }
}

fn validate_link(field: &FieldDef, link: &FieldLink) -> Result<()> {
    match (&link.collection, link.mode.is_to_many()) {
        (Some(_), false) => Err(Error::config(
            ConfigErrorKind::IllegalCollection,
            format!(
                "Field {} has a collection but link mode {:?} does not allow one",
                field.name, link.mode
            ),
        )),
        (None, true) => Err(Error::config(
            ConfigErrorKind::MissingCollection,
            format!(
                "Field {} has link mode {:?} but no collection",
                field.name, link.mode
            ),
        )),
        (Some(collection), true) if collection.read.is_empty() => Err(Error::config(
            ConfigErrorKind::MissingCollection,
            format!("Collection of field {} has no read query", field.name),
        )),
        _ => Ok(()),
    }
}
