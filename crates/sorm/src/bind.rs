//! Evaluating compiled bindings against the objects in scope.

use sorm_core::{BindError, CodecRegistry, Error, Record, Result, Statement, Value};
use sorm_query::{BindSource, Binding, CompiledStatement, Target};
use sorm_schema::AccessPath;

/// The values a statement's placeholders can draw from.
#[derive(Default, Clone, Copy)]
pub(crate) struct BindScope<'a> {
    /// `%{}`, and the primary field when no instance is in scope
    pub key: Option<&'a Value>,
    pub object: Option<&'a dyn Record>,
    pub lhs: Option<&'a dyn Record>,
    pub rhs: Option<&'a dyn Record>,
    pub params: &'a [Value],
}

impl<'a> BindScope<'a> {
    pub fn key(key: &'a Value) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    pub fn object(object: &'a dyn Record) -> Self {
        Self {
            object: Some(object),
            ..Self::default()
        }
    }
}

/// Read a value through its getter chain. A missing group object reads as NULL.
pub(crate) fn read_path(record: &dyn Record, path: &AccessPath) -> Option<Value> {
    let mut current = record;
    for group in &path.groups {
        match current.group(group) {
            Some(next) => current = next,
            None => return Some(Value::Null),
        }
    }
    current.get(&path.leaf)
}

fn bind_error(binding: &Binding, message: impl Into<String>) -> Error {
    Error::Bind(BindError {
        position: binding.position,
        placeholder: binding.placeholder.clone(),
        message: message.into(),
    })
}

fn evaluate(binding: &Binding, scope: &BindScope<'_>) -> Result<Value> {
    match &binding.source {
        BindSource::Key => scope
            .key
            .cloned()
            .ok_or_else(|| bind_error(binding, "no key in scope")),
        BindSource::Field {
            target,
            path,
            primary,
        } => {
            let record = match target {
                Target::Object => scope.object,
                Target::Lhs => scope.lhs,
            };
            match (record, scope.key) {
                (Some(record), _) => read_path(record, path)
                    .ok_or_else(|| bind_error(binding, format!("unknown accessor {}", path.leaf))),
                (None, Some(key)) if *primary => Ok(key.clone()),
                (None, _) => Err(bind_error(binding, "no instance in scope")),
            }
        }
        BindSource::Call { accessor } => scope
            .rhs
            .ok_or_else(|| bind_error(binding, "no right-hand instance in scope"))?
            .call(accessor)
            .ok_or_else(|| bind_error(binding, format!("unknown accessor {}()", accessor))),
        BindSource::Param { index } => scope
            .params
            .get(*index)
            .cloned()
            .ok_or_else(|| bind_error(binding, format!("missing argument {}", index))),
    }
}

/// Bind every parameter of `statement` on a prepared statement, in position order.
pub(crate) fn bind_all<S: Statement>(
    prepared: &mut S,
    statement: &CompiledStatement,
    codecs: &CodecRegistry,
    scope: &BindScope<'_>,
) -> Result<()> {
    for binding in &statement.bindings {
        let value = evaluate(binding, scope)?;
        let codec = codecs.codec(&binding.sql_type)?;
        if binding.nullable && value.is_null() {
            tracing::trace!(position = binding.position, placeholder = %binding.placeholder, "Bind NULL");
            prepared.bind_null(binding.position, codec.null_type)?;
            continue;
        }
        let encoded = (codec.encode)(&value).map_err(|e| bind_error(binding, e.to_string()))?;
        tracing::trace!(position = binding.position, placeholder = %binding.placeholder, value = %encoded, "Bind");
        prepared.bind(binding.position, &encoded)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorm_core::{Row, SqlType};

    #[derive(Default)]
    struct Recorded {
        binds: Vec<(usize, Value)>,
        nulls: Vec<(usize, Option<String>)>,
    }

    impl Statement for Recorded {
        fn bind(&mut self, index: usize, value: &Value) -> Result<()> {
            self.binds.push((index, value.clone()));
            Ok(())
        }

        fn bind_null(&mut self, index: usize, null_type: Option<&str>) -> Result<()> {
            self.nulls.push((index, null_type.map(str::to_string)));
            Ok(())
        }

        fn execute(&mut self) -> Result<u64> {
            Ok(0)
        }

        fn query(&mut self) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        fn parameter_count(&self) -> usize {
            0
        }
    }

    struct Desc {
        height: Option<i32>,
    }

    struct Person {
        id: i64,
        name: Option<String>,
        desc: Option<Desc>,
    }

    impl Record for Desc {
        fn get(&self, accessor: &str) -> Option<Value> {
            (accessor == "height").then(|| self.height.into())
        }
    }

    impl Record for Person {
        fn get(&self, accessor: &str) -> Option<Value> {
            match accessor {
                "id" => Some(self.id.into()),
                "name" => Some(self.name.clone().into()),
                _ => None,
            }
        }

        fn group(&self, accessor: &str) -> Option<&dyn Record> {
            match accessor {
                "desc" => self.desc.as_ref().map(|d| d as &dyn Record),
                _ => None,
            }
        }

        fn call(&self, accessor: &str) -> Option<Value> {
            match accessor {
                "shout" => self.name.as_ref().map(|n| n.to_uppercase().into()),
                other => self.get(other),
            }
        }
    }

    fn binding(position: usize, source: BindSource, sql_type: SqlType, nullable: bool) -> Binding {
        Binding {
            position,
            placeholder: format!("%{{{}}}", position),
            source,
            sql_type,
            nullable,
        }
    }

    fn field(leaf: &str, groups: &[&str]) -> BindSource {
        BindSource::Field {
            target: Target::Object,
            path: AccessPath {
                groups: groups.iter().map(|g| g.to_string()).collect(),
                leaf: leaf.to_string(),
            },
            primary: leaf == "id",
        }
    }

    fn statement(bindings: Vec<Binding>) -> CompiledStatement {
        CompiledStatement {
            sql: String::new(),
            bindings,
        }
    }

    #[test]
    fn nullable_null_binds_sql_null_with_marker() {
        let person = Person {
            id: 1,
            name: None,
            desc: None,
        };
        let stmt = statement(vec![
            binding(1, field("name", &[]), SqlType::String, true),
            binding(2, field("height", &["desc"]), SqlType::Integer, true),
            binding(3, field("id", &[]), SqlType::Long, false),
        ]);
        let mut rec = Recorded::default();
        bind_all(&mut rec, &stmt, &CodecRegistry::default(), &BindScope::object(&person)).unwrap();
        assert_eq!(
            rec.nulls,
            [(1, Some("VARCHAR".to_string())), (2, Some("INTEGER".to_string()))]
        );
        assert_eq!(rec.binds, [(3, Value::BigInt(1))]);
    }

    #[test]
    fn present_values_are_encoded() {
        let person = Person {
            id: 4,
            name: Some("Ann".to_string()),
            desc: Some(Desc { height: Some(170) }),
        };
        let stmt = statement(vec![
            binding(1, field("name", &[]), SqlType::String, true),
            binding(2, field("height", &["desc"]), SqlType::Long, true),
        ]);
        let mut rec = Recorded::default();
        bind_all(&mut rec, &stmt, &CodecRegistry::default(), &BindScope::object(&person)).unwrap();
        assert!(rec.nulls.is_empty());
        assert_eq!(
            rec.binds,
            [(1, Value::Text("Ann".to_string())), (2, Value::BigInt(170))]
        );
    }

    #[test]
    fn non_nullable_null_is_a_bind_error() {
        let person = Person {
            id: 1,
            name: None,
            desc: None,
        };
        let stmt = statement(vec![binding(1, field("name", &[]), SqlType::String, false)]);
        let mut rec = Recorded::default();
        let err = bind_all(&mut rec, &stmt, &CodecRegistry::default(), &BindScope::object(&person))
            .unwrap_err();
        assert!(matches!(err, Error::Bind(BindError { position: 1, .. })));
        assert!(rec.nulls.is_empty());
    }

    #[test]
    fn key_lhs_rhs_and_params() {
        let lhs = Person {
            id: 1,
            name: None,
            desc: None,
        };
        let rhs = Person {
            id: 2,
            name: Some("bo".to_string()),
            desc: None,
        };
        let key = Value::BigInt(9);
        let params = [Value::Text("p".to_string())];
        let stmt = statement(vec![
            binding(1, BindSource::Key, SqlType::Long, false),
            binding(
                2,
                BindSource::Field {
                    target: Target::Lhs,
                    path: AccessPath::direct("id"),
                    primary: true,
                },
                SqlType::Long,
                false,
            ),
            binding(3, BindSource::Call { accessor: "id".to_string() }, SqlType::Long, false),
            binding(4, BindSource::Call { accessor: "shout".to_string() }, SqlType::String, true),
            binding(5, BindSource::Param { index: 0 }, SqlType::String, false),
        ]);
        let scope = BindScope {
            key: Some(&key),
            object: None,
            lhs: Some(&lhs),
            rhs: Some(&rhs),
            params: &params,
        };
        let mut rec = Recorded::default();
        bind_all(&mut rec, &stmt, &CodecRegistry::default(), &scope).unwrap();
        assert_eq!(
            rec.binds,
            [
                (1, Value::BigInt(9)),
                (2, Value::BigInt(1)),
                (3, Value::BigInt(2)),
                (4, Value::Text("BO".to_string())),
                (5, Value::Text("p".to_string())),
            ]
        );
    }

    #[test]
    fn primary_field_falls_back_to_key() {
        let key = Value::BigInt(5);
        let stmt = statement(vec![binding(1, field("id", &[]), SqlType::Long, false)]);
        let mut rec = Recorded::default();
        bind_all(&mut rec, &stmt, &CodecRegistry::default(), &BindScope::key(&key)).unwrap();
        assert_eq!(rec.binds, [(1, Value::BigInt(5))]);

        let other = statement(vec![binding(1, field("name", &[]), SqlType::String, false)]);
        let err = bind_all(&mut rec, &other, &CodecRegistry::default(), &BindScope::key(&key))
            .unwrap_err();
        assert!(matches!(err, Error::Bind(_)));
    }

    #[test]
    fn unknown_accessor_is_a_bind_error() {
        let person = Person {
            id: 1,
            name: None,
            desc: None,
        };
        let stmt = statement(vec![binding(1, field("nope", &[]), SqlType::String, false)]);
        let mut rec = Recorded::default();
        let err = bind_all(&mut rec, &stmt, &CodecRegistry::default(), &BindScope::object(&person))
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
