//! Dialect names.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Dialect key matching every session dialect.
pub const WILDCARD: &str = "*";

/// The storage dialect a session speaks.
///
/// Query text is selected by comparing this name against the dialect keys
/// of a query block, so any string works; the well-known backends have
/// constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dialect(Cow<'static, str>);

impl Dialect {
    pub const H2: Dialect = Dialect(Cow::Borrowed("h2"));
    pub const MYSQL: Dialect = Dialect(Cow::Borrowed("mysql"));
    pub const POSTGRESQL: Dialect = Dialect(Cow::Borrowed("postgresql"));
    pub const SQLITE: Dialect = Dialect(Cow::Borrowed("sqlite"));

    pub fn new(name: impl Into<String>) -> Self {
        Dialect(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::SQLITE
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Dialect {
    fn from(name: &str) -> Self {
        Dialect::new(name)
    }
}

impl From<String> for Dialect {
    fn from(name: String) -> Self {
        Dialect::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_compare_with_owned_names() {
        assert_eq!(Dialect::from("postgresql"), Dialect::POSTGRESQL);
        assert_eq!(Dialect::MYSQL.name(), "mysql");
        assert_eq!(Dialect::default(), Dialect::SQLITE);
    }
}
