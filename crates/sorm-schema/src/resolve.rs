//! Field graph resolution.
//!
//! A field with a `parent` lives inside the parent's namespace: its qualified
//! name is `parent.name`, recursively, and reading it means reading the
//! parent group object first.

use crate::model::{EntityDef, FieldDef};
use serde::{Deserialize, Serialize};
use sorm_core::{ConfigErrorKind, Error, Result};

/// Getter chain reaching a field's value from its owning entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessPath {
    /// Group getters from the outermost inwards
    pub groups: Vec<String>,
    /// Getter of the field itself
    pub leaf: String,
}

impl AccessPath {
    pub fn direct(leaf: impl Into<String>) -> Self {
        Self {
            groups: Vec::new(),
            leaf: leaf.into(),
        }
    }
}

/// A field with its resolved names.
#[derive(Debug, Clone)]
pub struct ResolvedField<'a> {
    pub def: &'a FieldDef,
    /// Dotted name, the placeholder token for this field
    pub qualified: String,
    /// Qualified name usable as an identifier
    pub safe: String,
    pub path: AccessPath,
}

/// Resolves parents within one entity.
#[derive(Debug, Clone, Copy)]
pub struct FieldGraph<'a> {
    entity: &'a EntityDef,
}

impl<'a> FieldGraph<'a> {
    pub fn new(entity: &'a EntityDef) -> Self {
        Self { entity }
    }

    /// The parent field, if the field declares one.
    pub fn parent_of(&self, field: &FieldDef) -> Result<Option<&'a FieldDef>> {
        let Some(parent) = field.parent.as_deref() else {
            return Ok(None);
        };
        self.entity.field_by_name(parent).map(Some).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::MissingParent,
                format!(
                    "Field {} specifies non-existent parent field {}",
                    field.name, parent
                ),
            )
        })
    }

    /// Ancestors of a field, outermost first.
    fn ancestors(&self, field: &'a FieldDef) -> Result<Vec<&'a FieldDef>> {
        let mut chain: Vec<&'a FieldDef> = Vec::new();
        let mut current = field;
        while let Some(parent) = self.parent_of(current)? {
            if std::ptr::eq(parent, field) || chain.iter().any(|f| std::ptr::eq(*f, parent)) {
                return Err(Error::config(
                    ConfigErrorKind::ParentCycle,
                    format!("Field {} is its own ancestor through {}", field.name, parent.name),
                ));
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn qualified_name(&self, field: &'a FieldDef) -> Result<String> {
        let mut name = String::new();
        for ancestor in self.ancestors(field)? {
            name.push_str(&ancestor.name);
            name.push('.');
        }
        name.push_str(&field.name);
        Ok(name)
    }

    pub fn safe_name(&self, field: &'a FieldDef) -> Result<String> {
        Ok(self.qualified_name(field)?.replace('.', "_"))
    }

    /// Getter chain: each ancestor's getter, then the field's own.
    pub fn access_path(&self, field: &'a FieldDef) -> Result<AccessPath> {
        let groups = self
            .ancestors(field)?
            .into_iter()
            .map(|a| a.get.accessor_name(&a.name))
            .collect();
        Ok(AccessPath {
            groups,
            leaf: field.get.accessor_name(&field.name),
        })
    }

    pub fn resolve(&self, field: &'a FieldDef) -> Result<ResolvedField<'a>> {
        let qualified = self.qualified_name(field)?;
        Ok(ResolvedField {
            def: field,
            safe: qualified.replace('.', "_"),
            path: self.access_path(field)?,
            qualified,
        })
    }

    /// Every field in declaration order.
    pub fn resolve_all(&self) -> Result<Vec<ResolvedField<'a>>> {
        self.entity.fields.iter().map(|f| self.resolve(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityDef {
        EntityDef::new("Person")
            .field(FieldDef::new("id", "i64").primary_key(true))
            .field(FieldDef::new("description", "Description").group(true).getter("desc"))
            .field(FieldDef::new("hair", "Hair").group(true).parent("description"))
            .field(FieldDef::new("color", "String").parent("hair"))
            .field(FieldDef::new("height", "i32").parent("description"))
    }

    #[test]
    fn qualified_names_follow_parents() {
        let entity = person();
        let graph = FieldGraph::new(&entity);
        let names: Vec<String> = graph
            .resolve_all()
            .unwrap()
            .into_iter()
            .map(|r| r.qualified)
            .collect();
        assert_eq!(
            names,
            [
                "id",
                "description",
                "description.hair",
                "description.hair.color",
                "description.height"
            ]
        );
    }

    #[test]
    fn safe_names_and_paths() {
        let entity = person();
        let graph = FieldGraph::new(&entity);
        let color = entity.field_by_name("color").unwrap();
        assert_eq!(graph.safe_name(color).unwrap(), "description_hair_color");
        let path = graph.access_path(color).unwrap();
        assert_eq!(path.groups, ["desc", "hair"]);
        assert_eq!(path.leaf, "color");
    }

    #[test]
    fn missing_parent_is_a_config_error() {
        let entity = EntityDef::new("E").field(FieldDef::new("x", "i32").parent("nope"));
        let err = FieldGraph::new(&entity).resolve_all().unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::MissingParent));
        assert!(err.to_string().contains("Field x specifies non-existent parent field nope"));
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let entity = EntityDef::new("E")
            .field(FieldDef::new("a", "A").group(true).parent("b"))
            .field(FieldDef::new("b", "B").group(true).parent("a"))
            .field(FieldDef::new("c", "i32").parent("a"));
        let graph = FieldGraph::new(&entity);
        let c = entity.field_by_name("c").unwrap();
        let err = graph.qualified_name(c).unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::ParentCycle));

        let selfish = EntityDef::new("E").field(FieldDef::new("s", "S").parent("s"));
        let s = selfish.field_by_name("s").unwrap();
        assert_eq!(
            FieldGraph::new(&selfish).qualified_name(s).unwrap_err().config_kind(),
            Some(ConfigErrorKind::ParentCycle)
        );
    }
}
