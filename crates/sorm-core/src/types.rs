//! SQL type discriminators and the codec registry.
//!
//! Every bound or fetched value passes through a [`Codec`] selected by the
//! field's [`SqlType`]. The codec converts between the entity-side [`Value`]
//! and the storage-side one, and names the null marker used when a nullable
//! binding holds no value.

use crate::Result;
use crate::error::{ConfigErrorKind, Error};
use crate::row::FromValue;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// SQL type discriminator of a field, parameter or link key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SqlType {
    Array,
    BigDecimal,
    Blob,
    Boolean,
    Byte,
    ByteA,
    Clob,
    Date,
    Double,
    Float,
    Integer,
    Long,
    NClob,
    NString,
    Object,
    Short,
    String,
    Time,
    Timestamp,
    Url,
    /// A discriminator registered by the application
    Custom(String),
}

impl SqlType {
    /// All built-in discriminators.
    pub const BUILTIN: [SqlType; 20] = [
        SqlType::Array,
        SqlType::BigDecimal,
        SqlType::Blob,
        SqlType::Boolean,
        SqlType::Byte,
        SqlType::ByteA,
        SqlType::Clob,
        SqlType::Date,
        SqlType::Double,
        SqlType::Float,
        SqlType::Integer,
        SqlType::Long,
        SqlType::NClob,
        SqlType::NString,
        SqlType::Object,
        SqlType::Short,
        SqlType::String,
        SqlType::Time,
        SqlType::Timestamp,
        SqlType::Url,
    ];

    pub fn name(&self) -> &str {
        match self {
            SqlType::Array => "Array",
            SqlType::BigDecimal => "BigDecimal",
            SqlType::Blob => "Blob",
            SqlType::Boolean => "Boolean",
            SqlType::Byte => "Byte",
            SqlType::ByteA => "ByteA",
            SqlType::Clob => "Clob",
            SqlType::Date => "Date",
            SqlType::Double => "Double",
            SqlType::Float => "Float",
            SqlType::Integer => "Integer",
            SqlType::Long => "Long",
            SqlType::NClob => "NClob",
            SqlType::NString => "NString",
            SqlType::Object => "Object",
            SqlType::Short => "Short",
            SqlType::String => "String",
            SqlType::Time => "Time",
            SqlType::Timestamp => "Timestamp",
            SqlType::Url => "URL",
            SqlType::Custom(name) => name,
        }
    }

    /// Default SQL type for a declared field type.
    ///
    /// Accepts the discriminator names themselves plus the common primitive
    /// spellings. Returns `None` when there is no sensible default.
    pub fn for_declared_type(declared: &str) -> Option<SqlType> {
        let ty = match declared.trim() {
            "i32" | "int" | "Integer" => SqlType::Integer,
            "i64" | "long" | "Long" => SqlType::Long,
            "i16" | "short" | "Short" => SqlType::Short,
            "i8" | "byte" | "Byte" => SqlType::Byte,
            "bool" | "boolean" | "Boolean" => SqlType::Boolean,
            "f64" | "double" | "Double" => SqlType::Double,
            "f32" | "float" | "Float" => SqlType::Float,
            "String" | "&str" | "str" => SqlType::String,
            "Vec<u8>" | "byte[]" => SqlType::ByteA,
            other => match SqlType::builtin(other) {
                Some(ty) => ty,
                None => return None,
            },
        };
        Some(ty)
    }

    fn builtin(name: &str) -> Option<SqlType> {
        SqlType::BUILTIN.into_iter().find(|ty| ty.name() == name)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlType {
    type Err = std::convert::Infallible;

    /// Built-in names resolve to their variant; anything else is `Custom`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(SqlType::builtin(s).unwrap_or_else(|| SqlType::Custom(s.to_string())))
    }
}

impl From<String> for SqlType {
    fn from(s: String) -> Self {
        SqlType::builtin(&s).unwrap_or(SqlType::Custom(s))
    }
}

impl From<SqlType> for String {
    fn from(ty: SqlType) -> Self {
        match ty {
            SqlType::Custom(name) => name,
            other => other.name().to_string(),
        }
    }
}

/// Converts a value on its way to or from storage.
pub type ConvertFn = fn(&Value) -> Result<Value>;

/// How one SQL type is written, read and nulled.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    /// Name of the result-reading accessor, for code emitters
    pub getter: &'static str,
    /// Name of the statement-writing accessor, for code emitters
    pub setter: &'static str,
    /// Type marker passed along with SQL NULL, if the type has one
    pub null_type: Option<&'static str>,
    /// Entity value to storage value; never sees NULL from a guarded binding
    pub encode: ConvertFn,
    /// Storage value to entity value; NULL passes through
    pub decode: ConvertFn,
}

/// Discriminator to codec table.
///
/// `CodecRegistry::default()` holds every built-in type; applications add
/// or replace entries with [`CodecRegistry::register`].
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<SqlType, Codec>,
}

impl CodecRegistry {
    /// A registry with no codecs at all.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Add or replace the codec for a discriminator.
    pub fn register(&mut self, ty: SqlType, codec: Codec) -> Option<Codec> {
        self.codecs.insert(ty, codec)
    }

    pub fn get(&self, ty: &SqlType) -> Option<&Codec> {
        self.codecs.get(ty)
    }

    pub fn contains(&self, ty: &SqlType) -> bool {
        self.codecs.contains_key(ty)
    }

    /// Look up a codec, failing with a configuration error when absent.
    pub fn codec(&self, ty: &SqlType) -> Result<&Codec> {
        self.get(ty).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownSqlType,
                format!("no codec registered for SQL type {}", ty),
            )
        })
    }

    pub fn encode(&self, ty: &SqlType, value: &Value) -> Result<Value> {
        (self.codec(ty)?.encode)(value)
    }

    pub fn decode(&self, ty: &SqlType, value: &Value) -> Result<Value> {
        (self.codec(ty)?.decode)(value)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for ty in SqlType::BUILTIN {
            let codec = builtin_codec(&ty);
            registry.register(ty, codec);
        }
        registry
    }
}

macro_rules! nullable {
    ($($decode:ident => $encode:ident),* $(,)?) => {$(
        fn $decode(value: &Value) -> Result<Value> {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                $encode(value)
            }
        }
    )*};
}

fn to_bool(v: &Value) -> Result<Value> {
    bool::from_value(v).map(Value::Bool)
}

fn to_byte(v: &Value) -> Result<Value> {
    i8::from_value(v).map(Value::TinyInt)
}

fn to_short(v: &Value) -> Result<Value> {
    i16::from_value(v).map(Value::SmallInt)
}

fn to_int(v: &Value) -> Result<Value> {
    i32::from_value(v).map(Value::Int)
}

fn to_long(v: &Value) -> Result<Value> {
    i64::from_value(v).map(Value::BigInt)
}

fn to_float(v: &Value) -> Result<Value> {
    f32::from_value(v).map(Value::Float)
}

fn to_double(v: &Value) -> Result<Value> {
    f64::from_value(v).map(Value::Double)
}

fn to_decimal(v: &Value) -> Result<Value> {
    match v {
        Value::Decimal(s) | Value::Text(s) => Ok(Value::Decimal(s.clone())),
        Value::Double(d) => Ok(Value::Decimal(d.to_string())),
        Value::Float(d) => Ok(Value::Decimal(d.to_string())),
        other => i64::from_value(other).map(|i| Value::Decimal(i.to_string())),
    }
}

fn to_text(v: &Value) -> Result<Value> {
    String::from_value(v).map(Value::Text)
}

fn to_bytes(v: &Value) -> Result<Value> {
    Vec::<u8>::from_value(v).map(Value::Bytes)
}

fn to_date(v: &Value) -> Result<Value> {
    i32::from_value(v).map(Value::Date)
}

fn to_time(v: &Value) -> Result<Value> {
    i64::from_value(v).map(Value::Time)
}

fn to_timestamp(v: &Value) -> Result<Value> {
    i64::from_value(v).map(Value::Timestamp)
}

fn to_array(v: &Value) -> Result<Value> {
    match v {
        Value::Array(_) => Ok(v.clone()),
        Value::Json(serde_json::Value::Array(items)) => Ok(Value::Array(
            items.iter().cloned().map(Value::Json).collect(),
        )),
        other => Err(Error::Type(crate::error::TypeError {
            expected: "ARRAY",
            actual: other.type_name().to_string(),
            column: None,
        })),
    }
}

fn to_object(v: &Value) -> Result<Value> {
    if v.is_null() {
        Err(Error::Type(crate::error::TypeError {
            expected: "a value",
            actual: "NULL".to_string(),
            column: None,
        }))
    } else {
        Ok(v.clone())
    }
}

fn passthrough(v: &Value) -> Result<Value> {
    Ok(v.clone())
}

nullable!(
    from_bool => to_bool,
    from_byte => to_byte,
    from_short => to_short,
    from_int => to_int,
    from_long => to_long,
    from_float => to_float,
    from_double => to_double,
    from_decimal => to_decimal,
    from_text => to_text,
    from_bytes => to_bytes,
    from_date => to_date,
    from_time => to_time,
    from_timestamp => to_timestamp,
    from_array => to_array,
);

fn builtin_codec(ty: &SqlType) -> Codec {
    let (getter, setter, null_type, encode, decode): (_, _, _, ConvertFn, ConvertFn) = match ty {
        SqlType::Array => ("getArray", "setArray", Some("ARRAY"), to_array, from_array),
        SqlType::BigDecimal => (
            "getBigDecimal",
            "setBigDecimal",
            Some("NUMERIC"),
            to_decimal,
            from_decimal,
        ),
        SqlType::Blob => ("getBlob", "setBlob", Some("BLOB"), to_bytes, from_bytes),
        SqlType::Boolean => ("getBoolean", "setBoolean", Some("BOOLEAN"), to_bool, from_bool),
        SqlType::Byte => ("getByte", "setByte", Some("SMALLINT"), to_byte, from_byte),
        SqlType::ByteA => ("getBytes", "setBytes", Some("VARBINARY"), to_bytes, from_bytes),
        SqlType::Clob => ("getClob", "setClob", Some("CLOB"), to_text, from_text),
        SqlType::Date => ("getDate", "setDate", Some("DATE"), to_date, from_date),
        SqlType::Double => ("getDouble", "setDouble", Some("DOUBLE"), to_double, from_double),
        SqlType::Float => ("getFloat", "setFloat", Some("FLOAT"), to_float, from_float),
        SqlType::Integer => ("getInt", "setInt", Some("INTEGER"), to_int, from_int),
        SqlType::Long => ("getLong", "setLong", Some("BIGINT"), to_long, from_long),
        SqlType::NClob => ("getNClob", "setNClob", Some("NCLOB"), to_text, from_text),
        SqlType::NString => ("getNString", "setNString", Some("NVARCHAR"), to_text, from_text),
        SqlType::Object => ("getObject", "setObject", None, to_object, passthrough),
        SqlType::Short => ("getShort", "setShort", Some("SMALLINT"), to_short, from_short),
        SqlType::String => ("getString", "setString", Some("VARCHAR"), to_text, from_text),
        SqlType::Time => ("getTime", "setTime", Some("TIME"), to_time, from_time),
        SqlType::Timestamp => (
            "getTimestamp",
            "setTimestamp",
            Some("TIMESTAMP"),
            to_timestamp,
            from_timestamp,
        ),
        SqlType::Url => ("getURL", "setURL", Some("DATALINK"), to_text, from_text),
        SqlType::Custom(_) => ("getObject", "setObject", None, to_object, passthrough),
    };
    Codec {
        getter,
        setter,
        null_type,
        encode,
        decode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_types_pick_defaults() {
        assert_eq!(SqlType::for_declared_type("i64"), Some(SqlType::Long));
        assert_eq!(SqlType::for_declared_type("Integer"), Some(SqlType::Integer));
        assert_eq!(SqlType::for_declared_type("String"), Some(SqlType::String));
        assert_eq!(SqlType::for_declared_type("Timestamp"), Some(SqlType::Timestamp));
        assert_eq!(SqlType::for_declared_type("Address"), None);
    }

    #[test]
    fn names_round_trip_through_strings() {
        for ty in SqlType::BUILTIN {
            let parsed: SqlType = ty.name().parse().unwrap();
            assert_eq!(parsed, ty);
        }
        assert_eq!(
            "Money".parse::<SqlType>().unwrap(),
            SqlType::Custom("Money".to_string())
        );
    }

    #[test]
    fn encode_converts_and_rejects_null() {
        let codecs = CodecRegistry::default();
        assert_eq!(
            codecs.encode(&SqlType::Integer, &Value::BigInt(5)).unwrap(),
            Value::Int(5)
        );
        assert!(codecs.encode(&SqlType::Integer, &Value::Null).is_err());
        assert_eq!(
            codecs.decode(&SqlType::Integer, &Value::Null).unwrap(),
            Value::Null
        );
        assert_eq!(
            codecs.decode(&SqlType::Boolean, &Value::BigInt(1)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn every_builtin_has_a_codec() {
        let codecs = CodecRegistry::default();
        for ty in SqlType::BUILTIN {
            assert!(codecs.contains(&ty), "missing codec for {ty}");
        }
        assert_eq!(codecs.codec(&SqlType::Long).unwrap().null_type, Some("BIGINT"));
        assert_eq!(codecs.codec(&SqlType::Object).unwrap().null_type, None);
    }

    #[test]
    fn custom_types_need_registration() {
        let money = SqlType::Custom("Money".to_string());
        let mut codecs = CodecRegistry::default();
        let err = codecs.codec(&money).unwrap_err();
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownSqlType));

        fn cents(v: &Value) -> Result<Value> {
            i64::from_value(v).map(|c| Value::Decimal(format!("{}.{:02}", c / 100, c % 100)))
        }
        codecs.register(
            money.clone(),
            Codec {
                getter: "getMoney",
                setter: "setMoney",
                null_type: Some("NUMERIC"),
                encode: cents,
                decode: passthrough,
            },
        );
        assert_eq!(
            codecs.encode(&money, &Value::BigInt(1234)).unwrap(),
            Value::Decimal("12.34".to_string())
        );
    }
}
