//! Runtime dialect selection.

use crate::plan::CompiledStatement;
use serde::{Deserialize, Serialize};
use sorm_core::{Error, Result, WILDCARD};
use sorm_schema::Query;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectBranch {
    pub dialect: String,
    pub statement: CompiledStatement,
}

/// Per-dialect compiled statements of one query block.
///
/// The active dialect is only known at run time, so the whole table is kept
/// and [`CompiledQuery::select`] walks it on each call: named dialects in
/// declaration order, then the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledQuery {
    branches: Vec<DialectBranch>,
    fallback: Option<CompiledStatement>,
}

impl CompiledQuery {
    /// Compile every dialect of a query block. An empty block compiles to `None`.
    pub fn compile<F>(query: &Query, mut compile: F) -> Result<Option<Self>>
    where
        F: FnMut(&str) -> Result<CompiledStatement>,
    {
        if query.is_empty() {
            return Ok(None);
        }
        let mut branches = Vec::new();
        let mut fallback = None;
        for (dialect, sql) in query.iter() {
            let statement = compile(sql)?;
            if dialect == WILDCARD {
                fallback = Some(statement);
            } else {
                branches.push(DialectBranch {
                    dialect: dialect.to_string(),
                    statement,
                });
            }
        }
        Ok(Some(Self { branches, fallback }))
    }

    /// The statement to run for a session dialect.
    pub fn select(&self, dialect: &str) -> Result<&CompiledStatement> {
        self.branches
            .iter()
            .find(|b| b.dialect == dialect)
            .map(|b| &b.statement)
            .or(self.fallback.as_ref())
            .ok_or_else(|| Error::UnknownDialect(dialect.to_string()))
    }

    pub fn branches(&self) -> &[DialectBranch] {
        &self.branches
    }

    pub fn fallback(&self) -> Option<&CompiledStatement> {
        self.fallback.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(sql: &str) -> Result<CompiledStatement> {
        Ok(CompiledStatement {
            sql: sql.to_string(),
            bindings: Vec::new(),
        })
    }

    #[test]
    fn wildcard_is_the_fallback() {
        let query = Query::new()
            .with("mysql", "Q1")
            .and_then(|q| q.with("*", "Q2"))
            .unwrap();
        let compiled = CompiledQuery::compile(&query, literal).unwrap().unwrap();
        assert_eq!(compiled.select("postgresql").unwrap().sql, "Q2");
        assert_eq!(compiled.select("mysql").unwrap().sql, "Q1");
    }

    #[test]
    fn no_match_without_wildcard_is_unknown_dialect() {
        let query = Query::new().with("mysql", "Q1").unwrap();
        let compiled = CompiledQuery::compile(&query, literal).unwrap().unwrap();
        match compiled.select("postgresql") {
            Err(Error::UnknownDialect(d)) => assert_eq!(d, "postgresql"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn named_dialect_beats_earlier_wildcard() {
        let query = Query::new()
            .with("*", "any")
            .and_then(|q| q.with("sqlite", "lite"))
            .unwrap();
        let compiled = CompiledQuery::compile(&query, literal).unwrap().unwrap();
        assert_eq!(compiled.select("sqlite").unwrap().sql, "lite");
        assert_eq!(compiled.select("h2").unwrap().sql, "any");
    }

    #[test]
    fn empty_block_compiles_to_none() {
        assert!(CompiledQuery::compile(&Query::new(), literal).unwrap().is_none());
    }
}
