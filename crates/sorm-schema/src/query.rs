//! Dialect-labeled query blocks and named queries.

use serde::{Deserialize, Serialize};
use sorm_core::{ConfigErrorKind, Error, Result, SqlType, WILDCARD};

/// One dialect-labeled query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectSql {
    pub dialect: String,
    pub sql: String,
}

/// An ordered mapping from dialect name (or `"*"`) to query text.
///
/// Declaration order matters: dialects are tried in that order at runtime.
/// A dialect may appear at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DialectSql>", into = "Vec<DialectSql>")]
pub struct Query {
    entries: Vec<DialectSql>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// A query with a single wildcard entry.
    pub fn any(sql: impl Into<String>) -> Self {
        Self {
            entries: vec![DialectSql {
                dialect: WILDCARD.to_string(),
                sql: sql.into(),
            }],
        }
    }

    /// Add query text for a dialect.
    pub fn insert(&mut self, dialect: impl Into<String>, sql: impl Into<String>) -> Result<()> {
        let dialect = dialect.into();
        if self.get(&dialect).is_some() {
            return Err(Error::config(
                ConfigErrorKind::DuplicateDialect,
                format!("dialect \"{}\" declared more than once", dialect),
            ));
        }
        self.entries.push(DialectSql {
            dialect,
            sql: sql.into(),
        });
        Ok(())
    }

    /// Builder form of [`Query::insert`].
    pub fn with(mut self, dialect: impl Into<String>, sql: impl Into<String>) -> Result<Self> {
        self.insert(dialect, sql)?;
        Ok(self)
    }

    pub fn get(&self, dialect: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.dialect == dialect)
            .map(|e| e.sql.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.dialect.as_str(), e.sql.as_str()))
    }
}

impl TryFrom<Vec<DialectSql>> for Query {
    type Error = Error;

    fn try_from(entries: Vec<DialectSql>) -> Result<Self> {
        let mut query = Query::new();
        for entry in entries {
            query.insert(entry.dialect, entry.sql)?;
        }
        Ok(query)
    }
}

impl From<Query> for Vec<DialectSql> {
    fn from(query: Query) -> Self {
        query.entries
    }
}

/// A parameter of a named query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<SqlType>,
    /// Expression producing the bound value from the argument.
    ///
    /// Arguments are plain [`sorm_core::Value`]s with no accessors to call,
    /// so only the identity template `%{}` can be evaluated. Compiling a
    /// query whose parameter uses any other template (such as
    /// `%{}.toString()`) fails with [`ConfigErrorKind::Invalid`].
    ///
    /// [`ConfigErrorKind::Invalid`]: sorm_core::ConfigErrorKind::Invalid
    #[serde(default = "identity_template")]
    pub set: String,
}

fn identity_template() -> String {
    "%{}".to_string()
}

impl QueryParam {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            sql_type: None,
            set: identity_template(),
        }
    }

    pub fn sql_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Declared SQL type, else the default for the declared type.
    pub fn effective_sql_type(&self) -> Option<SqlType> {
        self.sql_type
            .clone()
            .or_else(|| SqlType::for_declared_type(&self.ty))
    }

    /// Whether the value template passes the argument through unchanged.
    ///
    /// Only identity templates compile; see [`QueryParam::set`].
    pub fn is_identity(&self) -> bool {
        self.set.trim() == "%{}"
    }
}

/// A parameterized query returning a list of primary-key values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedQuery {
    pub name: String,
    /// Result key type
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub accessor: crate::Visibility,
    #[serde(default)]
    pub params: Vec<QueryParam>,
    pub query: Query,
}

impl NamedQuery {
    pub fn new(name: impl Into<String>, ty: impl Into<String>, query: Query) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            accessor: crate::Visibility::default(),
            params: Vec::new(),
            query,
        }
    }

    pub fn param(mut self, param: QueryParam) -> Self {
        self.params.push(param);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_dialect_is_rejected() {
        let mut q = Query::new();
        q.insert("mysql", "SELECT 1").unwrap();
        let err = q.insert("mysql", "SELECT 2").unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::DuplicateDialect));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn duplicate_dialect_in_document_is_rejected() {
        let json = r#"[{"dialect":"*","sql":"a"},{"dialect":"*","sql":"b"}]"#;
        let parsed: std::result::Result<Query, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn declaration_order_is_kept() {
        let q = Query::new()
            .with("postgresql", "p")
            .and_then(|q| q.with("*", "w"))
            .and_then(|q| q.with("mysql", "m"))
            .unwrap();
        let order: Vec<&str> = q.iter().map(|(d, _)| d).collect();
        assert_eq!(order, ["postgresql", "*", "mysql"]);
        assert_eq!(q.get("mysql"), Some("m"));
    }

    #[test]
    fn param_defaults() {
        let p: QueryParam = serde_json::from_str(r#"{"name":"n","type":"String"}"#).unwrap();
        assert!(p.is_identity());
        assert_eq!(p.effective_sql_type(), Some(SqlType::String));
    }
}
