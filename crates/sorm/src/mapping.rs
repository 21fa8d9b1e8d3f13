//! Moving values between result rows and entities.

use crate::bind::read_path;
use sorm_core::{
    CodecRegistry, ConfigErrorKind, Entity, Error, FromValue, Result, Row, SqlType, Value,
};
use sorm_query::CompiledEntity;
use sorm_session::EntityRef;
use std::sync::{PoisonError, RwLockReadGuard, RwLockWriteGuard};

/// Column a key is read from: `id` when present, else the first column.
const KEY_COLUMN: &str = "id";

pub(crate) fn read<E>(handle: &EntityRef<E>) -> RwLockReadGuard<'_, E> {
    handle.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<E>(handle: &EntityRef<E>) -> RwLockWriteGuard<'_, E> {
    handle.write().unwrap_or_else(PoisonError::into_inner)
}

/// Build a fresh entity from one row of the read query.
///
/// Columns missing from the row are left at their default. The primary
/// field is set from the key the row was read for.
pub(crate) fn map_row<E: Entity>(
    plan: &CompiledEntity,
    codecs: &CodecRegistry,
    row: &Row,
    key: &E::Key,
) -> Result<E> {
    let mut entity = E::default();
    for column in &plan.columns {
        let Some(raw) = row.get_by_name(&column.column) else {
            continue;
        };
        let value = codecs.decode(&column.sql_type, raw)?;
        entity.set(&column.setter, value)?;
    }
    if let Some(primary) = plan.primary_field() {
        entity.set(&primary.setter.name, key.clone().into())?;
    }
    Ok(entity)
}

/// Decode the key column of a row.
pub(crate) fn row_key<K: FromValue>(
    row: &Row,
    sql_type: Option<&SqlType>,
    codecs: &CodecRegistry,
) -> Result<Option<K>> {
    let raw = row.get_by_name(KEY_COLUMN).or_else(|| row.get(0));
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = match sql_type {
        Some(ty) => codecs.decode(ty, raw)?,
        None => raw.clone(),
    };
    if value.is_null() {
        return Ok(None);
    }
    K::from_value(&value).map(Some)
}

/// The primary key held by an instance.
pub(crate) fn instance_key<E: Entity>(plan: &CompiledEntity, entity: &E) -> Result<E::Key> {
    let primary = plan.primary_field().ok_or_else(|| {
        Error::config(
            ConfigErrorKind::MissingPrimary,
            format!("{} declares no primary field", plan.name),
        )
    })?;
    let value = read_path(entity, &primary.path).unwrap_or(Value::Null);
    E::Key::from_value(&value)
}
