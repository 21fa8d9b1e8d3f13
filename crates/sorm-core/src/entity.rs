//! Traits implemented by mapped application types.
//!
//! Compiled routines never see concrete struct fields. They read values
//! through [`Record`] by accessor name, drill into group fields through
//! [`Record::group`], and write fetched values back through [`Entity::set`]
//! by setter name.

use crate::Result;
use crate::row::FromValue;
use crate::value::Value;
use std::fmt::Debug;
use std::hash::Hash;

/// Read access to a value object by accessor name.
///
/// Returning `None` from [`Record::get`] means the accessor does not exist;
/// an existing accessor holding no value returns `Some(Value::Null)`.
pub trait Record {
    /// Read the value behind a getter.
    fn get(&self, accessor: &str) -> Option<Value>;

    /// Borrow the nested object behind a group field's getter.
    ///
    /// `None` means the group object is absent; its sub-fields then read
    /// as NULL.
    fn group(&self, accessor: &str) -> Option<&dyn Record> {
        let _ = accessor;
        None
    }

    /// Call a zero-argument accessor that is not backed by a field.
    fn call(&self, accessor: &str) -> Option<Value> {
        self.get(accessor)
    }
}

/// Key type of an entity's primary field.
pub trait EntityKey:
    Clone + Eq + Hash + Debug + Send + Sync + Into<crate::Value> + FromValue + 'static
{
}

impl<T> EntityKey for T where
    T: Clone + Eq + Hash + Debug + Send + Sync + Into<crate::Value> + FromValue + 'static
{
}

/// A mapped entity type.
pub trait Entity: Record + Default + Send + Sync + 'static {
    /// Entity name as declared in the mapping schema.
    const NAME: &'static str;

    /// Type of the primary field.
    type Key: EntityKey;

    /// Write a fetched or generated value through a setter.
    fn set(&mut self, setter: &str, value: Value) -> Result<()>;
}
