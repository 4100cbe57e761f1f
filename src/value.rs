//! In-memory value model
//!
//! [`Value`] is the typed intermediate between domain entities and the wire.
//! Entities produce it through [`ToValue`] and are rebuilt from it through
//! [`FromValue`]; the serializers translate it to and from the tagged JSON
//! form.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use uuid::Uuid;

use crate::entity::FieldKind;
use crate::error::SerializationError;

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Set(Vec<Value>),
    Tuple(Vec<Value>),
    Record(Record),
    ValueObject { type_name: String, value: Box<Value> },
    /// A value with no structured encoding; only its textual form survives
    Opaque { type_name: String, repr: String },
}

impl Value {
    /// Short name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Record(_) => "record",
            Value::ValueObject { .. } => "value object",
            Value::Opaque { .. } => "opaque",
        }
    }

    /// Wrap an arbitrary displayable value as an opaque value
    pub fn opaque(type_name: impl Into<String>, repr: impl ToString) -> Self {
        Value::Opaque {
            type_name: type_name.into(),
            repr: repr.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A nested record: type identity plus its ordered fields
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: String,
    pub module: String,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            module: module.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field, keeping declaration order
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Conversion into a [`Value`]
pub trait ToValue {
    fn to_value(&self) -> Value;

    /// The declared kind of this type, used for schema derivation
    fn field_kind() -> FieldKind
    where
        Self: Sized;
}

/// Reconstruction from a [`Value`]
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, SerializationError>;
}

fn mismatch<T>(expected: &str, found: &Value) -> Result<T, SerializationError> {
    Err(SerializationError::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind_name().to_string(),
    })
}

fn arity_mismatch(expected: usize, found: usize) -> SerializationError {
    SerializationError::TypeMismatch {
        expected: format!("{}-tuple", expected),
        found: format!("{} items", found),
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn field_kind() -> FieldKind {
        FieldKind::Opaque
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        Ok(value)
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn field_kind() -> FieldKind {
        FieldKind::Boolean
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => mismatch("boolean", &other),
        }
    }
}

macro_rules! impl_integer_value {
    ($($ty:ty),+) => {$(
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn field_kind() -> FieldKind {
                FieldKind::Integer
            }
        }

        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, SerializationError> {
                match value {
                    Value::Int(i) => {
                        <$ty>::try_from(i).map_err(|_| SerializationError::TypeMismatch {
                            expected: stringify!($ty).to_string(),
                            found: format!("integer {}", i),
                        })
                    }
                    other => mismatch("integer", &other),
                }
            }
        }
    )+};
}

impl_integer_value!(i64, i32, i16, u32, u16, u8);

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn field_kind() -> FieldKind {
        FieldKind::Float
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => mismatch("float", &other),
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn field_kind() -> FieldKind {
        FieldKind::String
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::String((*self).to_string())
    }

    fn field_kind() -> FieldKind {
        FieldKind::String
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::String(s) => Ok(s),
            other => mismatch("string", &other),
        }
    }
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn field_kind() -> FieldKind {
        FieldKind::Uuid
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Uuid(id) => Ok(id),
            other => mismatch("uuid", &other),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn field_kind() -> FieldKind {
        FieldKind::DateTime
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => mismatch("datetime", &other),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn field_kind() -> FieldKind {
        FieldKind::Optional(Box::new(T::field_kind()))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue> ToValue for Box<T> {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn field_kind() -> FieldKind {
        T::field_kind()
    }
}

impl<T: FromValue> FromValue for Box<T> {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        T::from_value(value).map(Box::new)
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }

    fn field_kind() -> FieldKind {
        FieldKind::List(Box::new(T::field_kind()))
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch("list", &other),
        }
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }

    fn field_kind() -> FieldKind {
        FieldKind::Map(Box::new(T::field_kind()))
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => mismatch("map", &other),
        }
    }
}

impl<T: ToValue> ToValue for HashMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }

    fn field_kind() -> FieldKind {
        FieldKind::Map(Box::new(T::field_kind()))
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => mismatch("map", &other),
        }
    }
}

impl<T: ToValue> ToValue for BTreeSet<T> {
    fn to_value(&self) -> Value {
        Value::Set(self.iter().map(ToValue::to_value).collect())
    }

    fn field_kind() -> FieldKind {
        FieldKind::Set(Box::new(T::field_kind()))
    }
}

impl<T: FromValue + Ord> FromValue for BTreeSet<T> {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Set(items) | Value::List(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            other => mismatch("set", &other),
        }
    }
}

impl<T: ToValue> ToValue for HashSet<T> {
    fn to_value(&self) -> Value {
        Value::Set(self.iter().map(ToValue::to_value).collect())
    }

    fn field_kind() -> FieldKind {
        FieldKind::Set(Box::new(T::field_kind()))
    }
}

impl<T: FromValue + Eq + Hash> FromValue for HashSet<T> {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Set(items) | Value::List(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            other => mismatch("set", &other),
        }
    }
}

impl<A: ToValue, B: ToValue> ToValue for (A, B) {
    fn to_value(&self) -> Value {
        Value::Tuple(vec![self.0.to_value(), self.1.to_value()])
    }

    fn field_kind() -> FieldKind {
        FieldKind::Tuple(vec![A::field_kind(), B::field_kind()])
    }
}

impl<A: FromValue, B: FromValue> FromValue for (A, B) {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Tuple(items) | Value::List(items) => match <[Value; 2]>::try_from(items) {
                Ok([a, b]) => Ok((A::from_value(a)?, B::from_value(b)?)),
                Err(items) => Err(arity_mismatch(2, items.len())),
            },
            other => mismatch("2-tuple", &other),
        }
    }
}

impl<A: ToValue, B: ToValue, C: ToValue> ToValue for (A, B, C) {
    fn to_value(&self) -> Value {
        Value::Tuple(vec![self.0.to_value(), self.1.to_value(), self.2.to_value()])
    }

    fn field_kind() -> FieldKind {
        FieldKind::Tuple(vec![A::field_kind(), B::field_kind(), C::field_kind()])
    }
}

impl<A: FromValue, B: FromValue, C: FromValue> FromValue for (A, B, C) {
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Tuple(items) | Value::List(items) => match <[Value; 3]>::try_from(items) {
                Ok([a, b, c]) => Ok((A::from_value(a)?, B::from_value(b)?, C::from_value(c)?)),
                Err(items) => Err(arity_mismatch(3, items.len())),
            },
            other => mismatch("3-tuple", &other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_maps_to_null() {
        let none: Option<String> = None;
        assert_eq!(none.to_value(), Value::Null);
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(Value::String("x".into())).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_integer_narrowing_is_checked() {
        assert_eq!(u8::from_value(Value::Int(200)).unwrap(), 200);
        assert!(u8::from_value(Value::Int(300)).is_err());
        assert!(i64::from_value(Value::Bool(true)).is_err());
    }

    #[test]
    fn test_tuple_length_is_checked() {
        let v = Value::Tuple(vec![Value::Int(1), Value::String("a".into())]);
        let (n, s): (i64, String) = FromValue::from_value(v).unwrap();
        assert_eq!((n, s.as_str()), (1, "a"));

        let short = Value::Tuple(vec![Value::Int(1)]);
        assert!(<(i64, String)>::from_value(short).is_err());
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(
            Vec::<Option<i64>>::field_kind(),
            FieldKind::List(Box::new(FieldKind::Optional(Box::new(FieldKind::Integer))))
        );
        assert_eq!(
            BTreeSet::<String>::field_kind(),
            FieldKind::Set(Box::new(FieldKind::String))
        );
    }
}
