//! Placeholder resolution.
//!
//! Turns one dialect's query text into positional SQL plus the ordered list
//! of bindings that feed it. Recognized forms, in priority order:
//!
//! 1. `%{}` - the key in scope
//! 2. `%{2.name():Type}` / `%{2.name():nullable Type}` - an accessor call on
//!    the right-hand instance
//! 3. `%{field}` - a non-group field of the instance, by qualified name
//! 4. `%{1.field}` - the same field of the left-hand instance
//!
//! Named queries recognize only `%{param}`. Anything else is left in the
//! text untouched.

use crate::plan::{BindSource, Binding, CompiledStatement, FieldPlan, ParamPlan, Target};
use crate::scan::{Segment, scan};
use regex::Regex;
use sorm_core::{ConfigErrorKind, Error, Result, SqlType};
use std::sync::OnceLock;

const RHS_CALL: &str = r"^2\.([A-Za-z_]\w*)\(\):(nullable )?(\w+)$";

fn rhs_call() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(RHS_CALL))
        .as_ref()
        .map_err(|e| Error::config(ConfigErrorKind::Invalid, e.to_string()))
}

/// What placeholders may refer to.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// Entity routines: key, fields, left- and right-hand instances
    Fields,
    /// Named queries: the declared parameters only
    Params(&'a [ParamPlan]),
}

struct Resolved {
    source: BindSource,
    sql_type: SqlType,
    nullable: bool,
}

/// Compiles query text against an entity's field descriptors.
#[derive(Debug, Clone, Copy)]
pub struct StatementCompiler<'a> {
    fields: &'a [FieldPlan],
    primary: Option<&'a FieldPlan>,
}

impl<'a> StatementCompiler<'a> {
    pub fn new(fields: &'a [FieldPlan], primary: Option<&'a FieldPlan>) -> Self {
        Self { fields, primary }
    }

    pub fn compile(&self, sql: &str, scope: Scope<'_>) -> Result<CompiledStatement> {
        let mut text = String::with_capacity(sql.len());
        let mut bindings: Vec<Binding> = Vec::new();

        for segment in scan(sql) {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Placeholder { raw, body } => match self.resolve(body, scope)? {
                    Some(resolved) => {
                        text.push('?');
                        bindings.push(Binding {
                            position: bindings.len() + 1,
                            placeholder: raw.to_string(),
                            source: resolved.source,
                            sql_type: resolved.sql_type,
                            nullable: resolved.nullable,
                        });
                    }
                    None => {
                        tracing::warn!(placeholder = raw, sql = sql, "Unrecognized placeholder left as text");
                        text.push_str(raw);
                    }
                },
            }
        }

        tracing::trace!(sql = %text, bindings = bindings.len(), "Compiled statement");
        Ok(CompiledStatement {
            sql: text,
            bindings,
        })
    }

    fn resolve(&self, body: &str, scope: Scope<'_>) -> Result<Option<Resolved>> {
        if let Scope::Params(params) = scope {
            return Ok(params
                .iter()
                .position(|p| p.name == body)
                .map(|index| Resolved {
                    source: BindSource::Param { index },
                    sql_type: params[index].sql_type.clone(),
                    nullable: false,
                }));
        }

        if body.is_empty() {
            let primary = self.primary.ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::MissingPrimary,
                    "%{} needs a primary field",
                )
            })?;
            return Ok(Some(Resolved {
                source: BindSource::Key,
                sql_type: field_sql_type(primary)?,
                nullable: false,
            }));
        }

        if body.starts_with("2.") {
            let Some(caps) = rhs_call()?.captures(body) else {
                tracing::warn!(placeholder = body, "Malformed right-hand placeholder");
                return Ok(None);
            };
            return Ok(Some(Resolved {
                source: BindSource::Call {
                    accessor: caps[1].to_string(),
                },
                sql_type: SqlType::from(caps[3].to_string()),
                nullable: caps.get(2).is_some(),
            }));
        }

        let (target, name) = match body.strip_prefix("1.") {
            Some(name) => (Target::Lhs, name),
            None => (Target::Object, body),
        };
        let Some(field) = self.fields.iter().find(|f| !f.group && f.qualified == name) else {
            return Ok(None);
        };
        Ok(Some(Resolved {
            source: BindSource::Field {
                target,
                path: field.path.clone(),
                primary: field.primary,
            },
            sql_type: field_sql_type(field)?,
            nullable: field.nullable,
        }))
    }
}

fn field_sql_type(field: &FieldPlan) -> Result<SqlType> {
    field.sql_type.clone().ok_or_else(|| {
        Error::config(
            ConfigErrorKind::UnknownSqlType,
            format!(
                "Field {} of type {} has no SQL type",
                field.qualified, field.declared_type
            ),
        )
    })
}
