//! Routine assembly: entity description in, [`CompiledEntity`] out.

use crate::compile::{Scope, StatementCompiler};
use crate::dialect::CompiledQuery;
use crate::plan::{
    AccessorPlan, ColumnPlan, CompiledEntity, CompiledStatement, FieldPlan, LinkPlan,
    NamedQueryPlan, ParamPlan, PrimaryPlan,
};
use sorm_core::{CodecRegistry, ConfigErrorKind, Error, Result, SqlType};
use sorm_schema::{EntityDef, FieldGraph, NamedQuery, Query};

/// Compiles entity descriptions against a codec registry.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'c> {
    codecs: &'c CodecRegistry,
}

impl<'c> Compiler<'c> {
    pub fn new(codecs: &'c CodecRegistry) -> Self {
        Self { codecs }
    }

    #[tracing::instrument(level = "debug", skip(self, entity), fields(entity = %entity.name))]
    pub fn compile(&self, entity: &EntityDef) -> Result<CompiledEntity> {
        entity.validate()?;

        let fields = field_plans(entity)?;
        let primary = primary_plan(entity, &fields)?;
        let primary_field = primary.as_ref().map(|p| &fields[p.field]);
        let statements = StatementCompiler::new(&fields, primary_field);
        let block = |query: &Query| {
            CompiledQuery::compile(query, |sql| statements.compile(sql, Scope::Fields))
        };

        let compiled = CompiledEntity {
            name: entity.name.clone(),
            package: entity.pkg.clone(),
            superclass: entity.superclass.clone(),
            visibility: entity.accessor,
            orm_visibility: entity.orm_accessor,
            create: block(&entity.create)?,
            pk: block(&entity.pk)?,
            read: block(&entity.read)?,
            update: block(&entity.update)?,
            delete: block(&entity.delete)?,
            columns: column_plans(&fields)?,
            links: link_plans(entity, &fields, &block)?,
            queries: entity
                .queries
                .iter()
                .map(|nq| named_query_plan(nq, &statements))
                .collect::<Result<_>>()?,
            primary,
            fields,
        };

        self.check_codecs(&compiled)?;
        tracing::debug!(
            fields = compiled.fields.len(),
            links = compiled.links.len(),
            queries = compiled.queries.len(),
            "Compiled entity"
        );
        Ok(compiled)
    }

    /// Every SQL type the routines will encode or decode must have a codec.
    fn check_codecs(&self, entity: &CompiledEntity) -> Result<()> {
        let mut types: Vec<&SqlType> = Vec::new();
        types.extend(entity.primary.iter().map(|p| &p.sql_type));
        types.extend(entity.columns.iter().map(|c| &c.sql_type));
        types.extend(entity.links.iter().map(|l| &l.key_sql_type));
        types.extend(entity.queries.iter().flat_map(|q| q.params.iter().map(|p| &p.sql_type)));
        types.extend(entity.queries.iter().filter_map(|q| q.key_sql_type.as_ref()));

        let queries = [
            &entity.create,
            &entity.pk,
            &entity.read,
            &entity.update,
            &entity.delete,
        ];
        let link_queries = entity
            .links
            .iter()
            .flat_map(|l| [&l.read, &l.create, &l.delete]);
        for query in queries.into_iter().chain(link_queries).flatten() {
            types.extend(statements_of(query).flat_map(|s| s.bindings.iter().map(|b| &b.sql_type)));
        }
        for query in &entity.queries {
            types.extend(statements_of(&query.query).flat_map(|s| s.bindings.iter().map(|b| &b.sql_type)));
        }

        for ty in types {
            self.codecs.codec(ty).map_err(|_| {
                Error::config(
                    ConfigErrorKind::UnknownSqlType,
                    format!("{}: no codec registered for SQL type {}", entity.name, ty),
                )
            })?;
        }
        Ok(())
    }
}

/// Compile with the built-in codecs.
pub fn compile(entity: &EntityDef) -> Result<CompiledEntity> {
    Compiler::new(&CodecRegistry::default()).compile(entity)
}

fn statements_of(query: &CompiledQuery) -> impl Iterator<Item = &CompiledStatement> {
    query
        .branches()
        .iter()
        .map(|b| &b.statement)
        .chain(query.fallback())
}

fn field_plans(entity: &EntityDef) -> Result<Vec<FieldPlan>> {
    let graph = FieldGraph::new(entity);
    graph
        .resolve_all()?
        .into_iter()
        .map(|resolved| {
            let def = resolved.def;
            Ok(FieldPlan {
                name: def.name.clone(),
                declared_type: def.ty.clone(),
                column: def.column_name().to_string(),
                sql_type: def.effective_sql_type(),
                nullable: def.nullable,
                primary: def.primary,
                group: def.group,
                from_super: def.from_super,
                link_mode: def.link_mode(),
                getter: AccessorPlan {
                    name: resolved.path.leaf.clone(),
                    visibility: def.get.accessor,
                    overrides: def.get.overrides,
                },
                setter: AccessorPlan {
                    name: def.set.setter_name(&resolved.qualified),
                    visibility: def.set.accessor,
                    overrides: def.set.overrides,
                },
                path: resolved.path,
                safe_name: resolved.safe,
                qualified: resolved.qualified,
            })
        })
        .collect()
}

fn primary_plan(entity: &EntityDef, fields: &[FieldPlan]) -> Result<Option<PrimaryPlan>> {
    let Some(def) = entity.primary_field()? else {
        return Ok(None);
    };
    let index = fields.iter().position(|f| f.primary).ok_or_else(|| {
        Error::config(ConfigErrorKind::Invalid, "primary field lost during resolution")
    })?;
    let sql_type = fields[index].sql_type.clone().ok_or_else(|| {
        Error::config(
            ConfigErrorKind::UnknownSqlType,
            format!("Primary field {} of type {} has no SQL type", def.name, def.ty),
        )
    })?;
    Ok(Some(PrimaryPlan {
        field: index,
        sql_type,
        generator: def.generator,
    }))
}

fn column_plans(fields: &[FieldPlan]) -> Result<Vec<ColumnPlan>> {
    fields
        .iter()
        .filter(|f| f.is_persisted() && !f.primary)
        .map(|f| {
            let sql_type = f.sql_type.clone().ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::UnknownSqlType,
                    format!(
                        "Field {} of type {} is persisted but has no SQL type",
                        f.qualified, f.declared_type
                    ),
                )
            })?;
            Ok(ColumnPlan {
                column: f.column.clone(),
                setter: f.setter.name.clone(),
                sql_type,
            })
        })
        .collect()
}

fn link_plans<F>(entity: &EntityDef, fields: &[FieldPlan], block: &F) -> Result<Vec<LinkPlan>>
where
    F: Fn(&Query) -> Result<Option<CompiledQuery>>,
{
    let mut links = Vec::new();
    for (def, plan) in entity.fields.iter().zip(fields) {
        let Some(link) = def.link.as_ref().filter(|l| l.mode != sorm_schema::LinkMode::None) else {
            continue;
        };
        let key_sql_type = link.key_sql_type().ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownSqlType,
                format!(
                    "Link {} has key type {} with no SQL type",
                    plan.qualified, link.key_type
                ),
            )
        })?;
        let (read, create, delete) = match &link.collection {
            Some(c) => (
                block(&c.read)?,
                c.create.as_ref().map(block).transpose()?.flatten(),
                c.delete.as_ref().map(block).transpose()?.flatten(),
            ),
            None => (None, None, None),
        };
        links.push(LinkPlan {
            field: plan.qualified.clone(),
            safe_name: plan.safe_name.clone(),
            mode: link.mode,
            target: link.target.clone(),
            key_type: link.key_type.clone(),
            key_sql_type,
            path: plan.path.clone(),
            read,
            create,
            delete,
        });
    }
    Ok(links)
}

fn named_query_plan(nq: &NamedQuery, statements: &StatementCompiler<'_>) -> Result<NamedQueryPlan> {
    let params = nq
        .params
        .iter()
        .map(|p| {
            if !p.is_identity() {
                return Err(Error::config(
                    ConfigErrorKind::Invalid,
                    format!(
                        "Parameter {} of query {} uses value template {:?}; only %{{}} can be evaluated",
                        p.name, nq.name, p.set
                    ),
                ));
            }
            let sql_type = p.effective_sql_type().ok_or_else(|| {
                Error::config(
                    ConfigErrorKind::UnknownSqlType,
                    format!(
                        "Parameter {} of query {} has type {} with no SQL type",
                        p.name, nq.name, p.ty
                    ),
                )
            })?;
            Ok(ParamPlan {
                name: p.name.clone(),
                declared_type: p.ty.clone(),
                sql_type,
                template: p.set.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let query = CompiledQuery::compile(&nq.query, |sql| {
        statements.compile(sql, Scope::Params(&params))
    })?
    .ok_or_else(|| {
        Error::config(
            ConfigErrorKind::Invalid,
            format!("query {} has no query text", nq.name),
        )
    })?;

    Ok(NamedQueryPlan {
        name: nq.name.clone(),
        key_type: nq.ty.clone(),
        key_sql_type: SqlType::for_declared_type(&nq.ty),
        visibility: nq.accessor,
        params,
        query,
    })
}
