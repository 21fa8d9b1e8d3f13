//! The routine interpreter.
//!
//! An [`Orm`] pairs one entity's [`CompiledEntity`] with the codec registry
//! it was compiled against, and runs its routines on a [`Session`]: the
//! statement for the session's dialect is selected, prepared once per call,
//! bound and executed once per instance, and the identity cache is
//! consulted and updated along the way.

use crate::bind::{BindScope, bind_all, read_path};
use crate::mapping::{instance_key, map_row, read, row_key, write};
use crate::matches::Matches;
use sorm_core::{
    BindError, CodecRegistry, ConfigErrorKind, Connection, Entity, Error, FromValue,
    QueryErrorKind, Record, Result, Statement, Value,
};
use sorm_query::{CompiledEntity, CompiledQuery, CompiledStatement, Compiler, LinkPlan};
use sorm_schema::{EntityDef, IdGenerator};
use sorm_session::{EntityRef, Session};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

/// The statement of a query block for a dialect.
fn select<'p>(
    entity: &str,
    block: Option<&'p CompiledQuery>,
    op: &str,
    dialect: &str,
) -> Result<&'p CompiledStatement> {
    block
        .ok_or_else(|| Error::Unsupported(format!("{} declares no {} query", entity, op)))?
        .select(dialect)
}

/// Compiled routines of one entity type.
pub struct Orm<E: Entity> {
    plan: Arc<CompiledEntity>,
    codecs: Arc<CodecRegistry>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Orm<E> {
    fn clone(&self) -> Self {
        Self {
            plan: Arc::clone(&self.plan),
            codecs: Arc::clone(&self.codecs),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Orm<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orm").field("entity", &self.plan.name).finish()
    }
}

impl<E: Entity> Orm<E> {
    /// Compile an entity description with the built-in codecs.
    pub fn compile(entity: &EntityDef) -> Result<Self> {
        Self::compile_with(entity, Arc::new(CodecRegistry::default()))
    }

    /// Compile an entity description against a custom codec registry.
    pub fn compile_with(entity: &EntityDef, codecs: Arc<CodecRegistry>) -> Result<Self> {
        let plan = Compiler::new(&codecs).compile(entity)?;
        Self::from_plan(plan, codecs)
    }

    /// Wrap an already compiled plan.
    pub fn from_plan(plan: CompiledEntity, codecs: Arc<CodecRegistry>) -> Result<Self> {
        if plan.name != E::NAME {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                format!("plan for {} used for entity type {}", plan.name, E::NAME),
            ));
        }
        Ok(Self {
            plan: Arc::new(plan),
            codecs,
            _entity: PhantomData,
        })
    }

    /// Parse, validate and compile a JSON entity description.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::compile(&EntityDef::from_json(json)?)
    }

    /// The compiled plan as JSON, for code emitters.
    pub fn plan_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.plan)?)
    }

    pub fn plan(&self) -> &CompiledEntity {
        &self.plan
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Routines bound to one session.
    pub fn bind<'a, C: Connection>(&'a self, session: &'a Session<C>) -> BoundOrm<'a, E, C> {
        BoundOrm { orm: self, session }
    }

    /// The key of an instance as a bindable value, when it has one.
    fn key_value(&self, entity: &E) -> Option<Value> {
        let primary = self.plan.primary_field()?;
        read_path(entity, &primary.path).filter(|v| !v.is_null())
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Insert instances, fetch or read their keys, and cache them.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = E::NAME, count = objects.len()))]
    pub fn create<C: Connection>(&self, session: &Session<C>, objects: &[EntityRef<E>]) -> Result<()> {
        let dialect = session.dialect_name();
        let insert = select(&self.plan.name, self.plan.create.as_ref(), "create", dialect)?;
        let mut prepared = session.prepare(&insert.sql)?;

        let primary = self.plan.primary.as_ref();
        let mut fetch = match (primary.map(|p| p.generator), self.plan.pk.as_ref()) {
            (Some(IdGenerator::Post), Some(pk)) => {
                let statement = pk.select(dialect)?;
                Some((statement, session.prepare(&statement.sql)?))
            }
            _ => None,
        };

        for object in objects {
            {
                let entity = read(object);
                let key = self.key_value(&entity);
                let mut scope = BindScope::object(&*entity);
                scope.key = key.as_ref();
                bind_all(&mut prepared, insert, &self.codecs, &scope)?;
            }
            prepared.execute()?;

            let key = match (fetch.as_mut(), primary) {
                (Some((statement, pk)), Some(primary)) => {
                    let row = {
                        let entity = read(object);
                        bind_all(pk, statement, &self.codecs, &BindScope::object(&*entity))?;
                        pk.query_one()?
                    };
                    let row = row.ok_or_else(|| {
                        Error::query(
                            QueryErrorKind::NotFound,
                            Some(statement.sql.as_str()),
                            "primary key fetch returned no row",
                        )
                    })?;
                    let key: E::Key = row_key(&row, Some(&primary.sql_type), &self.codecs)?
                        .ok_or_else(|| {
                            Error::query(
                                QueryErrorKind::NotFound,
                                Some(statement.sql.as_str()),
                                "primary key fetch returned NULL",
                            )
                        })?;
                    let setter = &self.plan.fields[primary.field].setter.name;
                    write(object).set(setter, key.clone().into())?;
                    Some(key)
                }
                (None, Some(primary)) if primary.generator == IdGenerator::Pre => {
                    Some(instance_key(&self.plan, &*read(object))?)
                }
                _ => None,
            };
            if let Some(key) = key {
                tracing::debug!(entity = E::NAME, key = ?key, "Created");
                session.cache_add(key, object)?;
            }
        }
        Ok(())
    }

    /// Create one instance and return its shared handle.
    pub fn create_one<C: Connection>(&self, session: &Session<C>, value: E) -> Result<EntityRef<E>> {
        let handle = Arc::new(RwLock::new(value));
        self.create(session, std::slice::from_ref(&handle))?;
        Ok(handle)
    }

    /// Create every value, returning the handles in order.
    pub fn create_all<C: Connection>(
        &self,
        session: &Session<C>,
        values: impl IntoIterator<Item = E>,
    ) -> Result<Vec<EntityRef<E>>> {
        let handles: Vec<EntityRef<E>> = values
            .into_iter()
            .map(|v| Arc::new(RwLock::new(v)))
            .collect();
        self.create(session, &handles)?;
        Ok(handles)
    }

    // ========================================================================
    // Read
    // ========================================================================

    /// Read instances by key.
    ///
    /// When every key is already cached the cached handles are returned in
    /// unspecified order, one per distinct key. Otherwise results follow the
    /// order of `keys`, and keys with no row are left out.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = E::NAME, count = keys.len()))]
    pub fn read<C: Connection>(&self, session: &Session<C>, keys: &[E::Key]) -> Result<Vec<EntityRef<E>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cached: HashMap<E::Key, EntityRef<E>> = HashMap::new();
        for key in keys {
            if let Some(handle) = session.cache_get::<E>(key)? {
                cached.insert(key.clone(), handle);
            }
        }
        if keys.iter().all(|k| cached.contains_key(k)) {
            tracing::debug!(entity = E::NAME, "All keys cached");
            return Ok(cached.into_values().collect());
        }

        let statement = select(
            &self.plan.name,
            self.plan.read.as_ref(),
            "read",
            session.dialect_name(),
        )?;
        let mut prepared = session.prepare(&statement.sql)?;
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(handle) = cached.get(key) {
                found.push(Arc::clone(handle));
                continue;
            }
            let key_value: Value = key.clone().into();
            bind_all(&mut prepared, statement, &self.codecs, &BindScope::key(&key_value))?;
            let Some(row) = prepared.query_one()? else {
                tracing::debug!(entity = E::NAME, key = ?key, "Not found");
                continue;
            };
            let entity: E = map_row(&self.plan, &self.codecs, &row, key)?;
            let handle = Arc::new(RwLock::new(entity));
            session.cache_add(key.clone(), &handle)?;
            found.push(handle);
        }
        Ok(found)
    }

    pub fn read_one<C: Connection>(&self, session: &Session<C>, key: E::Key) -> Result<Option<EntityRef<E>>> {
        Ok(self.read(session, std::slice::from_ref(&key))?.into_iter().next())
    }

    /// Stream instances for a key sequence. See [`Matches`].
    pub fn matches<'a, C: Connection>(
        &'a self,
        session: &'a Session<C>,
        keys: impl IntoIterator<Item = E::Key>,
    ) -> Result<Matches<'a, E, C>> {
        let statement = select(
            &self.plan.name,
            self.plan.read.as_ref(),
            "read",
            session.dialect_name(),
        )?;
        Matches::new(self, session, statement, keys.into_iter().collect())
    }

    // ========================================================================
    // Update / Delete
    // ========================================================================

    /// Update instances, returning the total number of rows affected.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = E::NAME, count = objects.len()))]
    pub fn update<C: Connection>(&self, session: &Session<C>, objects: &[EntityRef<E>]) -> Result<u64> {
        self.execute_each(session, self.plan.update.as_ref(), "update", objects, false)
    }

    pub fn update_one<C: Connection>(&self, session: &Session<C>, object: &EntityRef<E>) -> Result<u64> {
        self.update(session, std::slice::from_ref(object))
    }

    /// Delete instances and evict their keys from the cache.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = E::NAME, count = objects.len()))]
    pub fn delete<C: Connection>(&self, session: &Session<C>, objects: &[EntityRef<E>]) -> Result<u64> {
        self.execute_each(session, self.plan.delete.as_ref(), "delete", objects, true)
    }

    pub fn delete_one<C: Connection>(&self, session: &Session<C>, object: &EntityRef<E>) -> Result<u64> {
        self.delete(session, std::slice::from_ref(object))
    }

    fn execute_each<C: Connection>(
        &self,
        session: &Session<C>,
        block: Option<&CompiledQuery>,
        op: &str,
        objects: &[EntityRef<E>],
        evict: bool,
    ) -> Result<u64> {
        let statement = select(&self.plan.name, block, op, session.dialect_name())?;
        let mut prepared = session.prepare(&statement.sql)?;
        let mut affected = 0;
        for object in objects {
            let entity = read(object);
            let key = self.key_value(&entity);
            let mut scope = BindScope::object(&*entity);
            scope.key = key.as_ref();
            bind_all(&mut prepared, statement, &self.codecs, &scope)?;
            affected += prepared.execute()?;
            if evict && self.plan.primary.is_some() {
                // An instance without a usable key was never cached.
                if let Ok(key) = instance_key(&self.plan, &*entity) {
                    session.cache_del::<E>(&key)?;
                }
            }
        }
        Ok(affected)
    }

    // ========================================================================
    // Links
    // ========================================================================

    fn link(&self, field: &str, target: &str, to_many: bool) -> Result<&LinkPlan> {
        let link = self.plan.link(field).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::Invalid,
                format!("{} has no link field {}", self.plan.name, field),
            )
        })?;
        if link.mode.is_to_many() != to_many {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                format!(
                    "link {}.{} is {:?}, not a {} link",
                    self.plan.name,
                    field,
                    link.mode,
                    if to_many { "to-many" } else { "to-one" }
                ),
            ));
        }
        if link.target != target {
            return Err(Error::config(
                ConfigErrorKind::Invalid,
                format!(
                    "link {}.{} targets {}, not {}",
                    self.plan.name, field, link.target, target
                ),
            ));
        }
        Ok(link)
    }

    /// Read the instances linked to `object` through a to-many link.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = E::NAME, link = field))]
    pub fn read_mapped<T: Entity, C: Connection>(
        &self,
        session: &Session<C>,
        object: &E,
        field: &str,
        target: &Orm<T>,
    ) -> Result<Vec<EntityRef<T>>> {
        let link = self.link(field, T::NAME, true)?;
        let statement = select(&self.plan.name, link.read.as_ref(), "map-read", session.dialect_name())?;
        let key = self.key_value(object);
        let mut scope = BindScope::object(object);
        scope.key = key.as_ref();

        let rows = {
            let mut prepared = session.prepare(&statement.sql)?;
            bind_all(&mut prepared, statement, &self.codecs, &scope)?;
            prepared.query()?
        };
        let keys = rows
            .iter()
            .filter_map(|row| row_key::<T::Key>(row, Some(&link.key_sql_type), &self.codecs).transpose())
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(keys = keys.len(), "Linked keys");
        target.read(session, &keys)
    }

    /// Record a link between `lhs` and `rhs`.
    pub fn map<C: Connection>(
        &self,
        session: &Session<C>,
        field: &str,
        lhs: &E,
        rhs: &dyn Record,
        target: &str,
    ) -> Result<u64> {
        let link = self.link(field, target, true)?;
        self.execute_link(session, link.create.as_ref(), "map-create", lhs, rhs)
    }

    /// Remove a link between `lhs` and `rhs`.
    pub fn unmap<C: Connection>(
        &self,
        session: &Session<C>,
        field: &str,
        lhs: &E,
        rhs: &dyn Record,
        target: &str,
    ) -> Result<u64> {
        let link = self.link(field, target, true)?;
        self.execute_link(session, link.delete.as_ref(), "map-delete", lhs, rhs)
    }

    fn execute_link<C: Connection>(
        &self,
        session: &Session<C>,
        block: Option<&CompiledQuery>,
        op: &str,
        lhs: &E,
        rhs: &dyn Record,
    ) -> Result<u64> {
        let statement = select(&self.plan.name, block, op, session.dialect_name())?;
        let key = self.key_value(lhs);
        let scope = BindScope {
            key: key.as_ref(),
            object: Some(lhs as &dyn Record),
            lhs: Some(lhs as &dyn Record),
            rhs: Some(rhs),
            params: &[],
        };
        let mut prepared = session.prepare(&statement.sql)?;
        bind_all(&mut prepared, statement, &self.codecs, &scope)?;
        prepared.execute()
    }

    /// Read the instance a to-one link points at, by the key stored on `object`.
    pub fn read_linked<T: Entity, C: Connection>(
        &self,
        session: &Session<C>,
        object: &E,
        field: &str,
        target: &Orm<T>,
    ) -> Result<Option<EntityRef<T>>> {
        let link = self.link(field, T::NAME, false)?;
        let stored = read_path(object, &link.path).unwrap_or(Value::Null);
        let stored = self.codecs.decode(&link.key_sql_type, &stored)?;
        if stored.is_null() {
            return Ok(None);
        }
        target.read_one(session, T::Key::from_value(&stored)?)
    }

    // ========================================================================
    // Named queries
    // ========================================================================

    /// Run a named query and collect the first column of every row, in row order.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = E::NAME, query = name))]
    pub fn query<K: FromValue, C: Connection>(
        &self,
        session: &Session<C>,
        name: &str,
        args: &[Value],
    ) -> Result<Vec<K>> {
        let plan = self.plan.query(name).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::Invalid,
                format!("{} has no named query {}", self.plan.name, name),
            )
        })?;
        if args.len() != plan.params.len() {
            return Err(Error::Bind(BindError {
                position: args.len(),
                placeholder: name.to_string(),
                message: format!("expected {} arguments, got {}", plan.params.len(), args.len()),
            }));
        }
        let statement = plan.query.select(session.dialect_name())?;
        let mut prepared = session.prepare(&statement.sql)?;
        let scope = BindScope {
            params: args,
            ..BindScope::default()
        };
        bind_all(&mut prepared, statement, &self.codecs, &scope)?;

        let mut keys = Vec::new();
        for row in prepared.query()? {
            let raw = row.get(0).cloned().unwrap_or(Value::Null);
            let value = match &plan.key_sql_type {
                Some(ty) => self.codecs.decode(ty, &raw)?,
                None => raw,
            };
            keys.push(K::from_value(&value)?);
        }
        Ok(keys)
    }
}

/// An [`Orm`] bound to one session, for calling routines without passing
/// the session each time.
pub struct BoundOrm<'a, E: Entity, C: Connection> {
    orm: &'a Orm<E>,
    session: &'a Session<C>,
}

impl<'a, E: Entity, C: Connection> BoundOrm<'a, E, C> {
    pub fn session(&self) -> &'a Session<C> {
        self.session
    }

    pub fn create(&self, objects: &[EntityRef<E>]) -> Result<()> {
        self.orm.create(self.session, objects)
    }

    pub fn create_one(&self, value: E) -> Result<EntityRef<E>> {
        self.orm.create_one(self.session, value)
    }

    pub fn create_all(&self, values: impl IntoIterator<Item = E>) -> Result<Vec<EntityRef<E>>> {
        self.orm.create_all(self.session, values)
    }

    pub fn read(&self, keys: &[E::Key]) -> Result<Vec<EntityRef<E>>> {
        self.orm.read(self.session, keys)
    }

    pub fn read_one(&self, key: E::Key) -> Result<Option<EntityRef<E>>> {
        self.orm.read_one(self.session, key)
    }

    pub fn matches(&self, keys: impl IntoIterator<Item = E::Key>) -> Result<Matches<'a, E, C>> {
        self.orm.matches(self.session, keys)
    }

    pub fn update(&self, objects: &[EntityRef<E>]) -> Result<u64> {
        self.orm.update(self.session, objects)
    }

    pub fn update_one(&self, object: &EntityRef<E>) -> Result<u64> {
        self.orm.update_one(self.session, object)
    }

    pub fn delete(&self, objects: &[EntityRef<E>]) -> Result<u64> {
        self.orm.delete(self.session, objects)
    }

    pub fn delete_one(&self, object: &EntityRef<E>) -> Result<u64> {
        self.orm.delete_one(self.session, object)
    }

    pub fn read_mapped<T: Entity>(&self, object: &E, field: &str, target: &Orm<T>) -> Result<Vec<EntityRef<T>>> {
        self.orm.read_mapped(self.session, object, field, target)
    }

    pub fn map<T: Entity>(&self, field: &str, lhs: &E, rhs: &T) -> Result<u64> {
        self.orm.map(self.session, field, lhs, rhs, T::NAME)
    }

    pub fn unmap<T: Entity>(&self, field: &str, lhs: &E, rhs: &T) -> Result<u64> {
        self.orm.unmap(self.session, field, lhs, rhs, T::NAME)
    }

    pub fn read_linked<T: Entity>(&self, object: &E, field: &str, target: &Orm<T>) -> Result<Option<EntityRef<T>>> {
        self.orm.read_linked(self.session, object, field, target)
    }

    pub fn query<K: FromValue>(&self, name: &str, args: &[Value]) -> Result<Vec<K>> {
        self.orm.query(self.session, name, args)
    }
}
