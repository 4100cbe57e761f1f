//! Entity and value-object capabilities
//!
//! Persisted types describe themselves explicitly: an [`Entity`] exposes its
//! identity, its declared fields (for schema derivation) and an ordered field
//! list (for encoding). A [`ValueObject`] wraps a single inner value.
//!
//! ```ignore
//! struct Task { id: Uuid, title: String, tags: Vec<String> }
//!
//! impl Entity for Task {
//!     const TYPE_NAME: &'static str = "Task";
//!     const MODULE: &'static str = "familiar.pipeline.task";
//!
//!     fn fields() -> Vec<FieldDecl> {
//!         vec![
//!             FieldDecl::of::<Uuid>("id"),
//!             FieldDecl::of::<String>("title"),
//!             FieldDecl::of::<Vec<String>>("tags").with_default(),
//!         ]
//!     }
//!
//!     fn to_fields(&self) -> Vec<(String, Value)> {
//!         fields![id => self.id, title => self.title, tags => self.tags]
//!     }
//!
//!     fn from_fields(mut fields: FieldMap) -> Result<Self, SerializationError> {
//!         Ok(Self {
//!             id: fields.required("id")?,
//!             title: fields.required("title")?,
//!             tags: fields.optional("tags")?.unwrap_or_default(),
//!         })
//!     }
//! }
//! impl_entity_value!(Task);
//! ```

use std::collections::HashMap;

use crate::error::SerializationError;
use crate::schema::Constraint;
use crate::value::{FromValue, Record, ToValue, Value};

/// Declared shape of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
    List(Box<FieldKind>),
    Optional(Box<FieldKind>),
    Map(Box<FieldKind>),
    Set(Box<FieldKind>),
    Tuple(Vec<FieldKind>),
    /// A nested record, by registered type name
    Record(String),
    /// A value object, by registered type name
    ValueObject(String),
    /// No structured shape
    Opaque,
}

impl FieldKind {
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldKind::Optional(_))
    }
}

/// A single declared field of an entity
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub kind: FieldKind,
    /// Field may be omitted from stored data
    pub has_default: bool,
    /// Extra constraints applied by the derived schema
    pub constraints: Vec<Constraint>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            has_default: false,
            constraints: Vec::new(),
        }
    }

    /// Declare a field from its Rust type
    pub fn of<T: ToValue>(name: impl Into<String>) -> Self {
        Self::new(name, T::field_kind())
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// A multi-field record that can be persisted
pub trait Entity: Sized {
    /// Registered type name, written as `__type__` / `__dataclass__`
    const TYPE_NAME: &'static str;
    /// Owning module, written as `__module__`
    const MODULE: &'static str;

    /// Declared fields, in order
    fn fields() -> Vec<FieldDecl>;

    /// Current field values, in declaration order
    fn to_fields(&self) -> Vec<(String, Value)>;

    /// Rebuild from decoded field values
    fn from_fields(fields: FieldMap) -> Result<Self, SerializationError>;

    fn to_record(&self) -> Record {
        Record {
            type_name: Self::TYPE_NAME.to_string(),
            module: Self::MODULE.to_string(),
            fields: self.to_fields(),
        }
    }

    fn from_record(record: Record) -> Result<Self, SerializationError> {
        if record.type_name != Self::TYPE_NAME {
            return Err(SerializationError::TypeMismatch {
                expected: Self::TYPE_NAME.to_string(),
                found: record.type_name,
            });
        }
        Self::from_fields(FieldMap::new(Self::TYPE_NAME, record.fields))
    }
}

/// A single-value wrapper type
pub trait ValueObject: Sized {
    const TYPE_NAME: &'static str;
    const MODULE: &'static str;

    /// Declared shape of the wrapped value
    fn inner_kind() -> FieldKind;

    fn to_inner(&self) -> Value;

    fn from_inner(value: Value) -> Result<Self, SerializationError>;

    fn to_wrapped(&self) -> Value {
        Value::ValueObject {
            type_name: Self::TYPE_NAME.to_string(),
            value: Box::new(self.to_inner()),
        }
    }

    fn from_wrapped(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::ValueObject { type_name, value } if type_name == Self::TYPE_NAME => {
                Self::from_inner(*value)
            }
            Value::ValueObject { type_name, .. } => Err(SerializationError::TypeMismatch {
                expected: Self::TYPE_NAME.to_string(),
                found: type_name,
            }),
            other => Err(SerializationError::TypeMismatch {
                expected: Self::TYPE_NAME.to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }
}

/// Decoded field values handed to [`Entity::from_fields`]
#[derive(Debug)]
pub struct FieldMap {
    type_name: String,
    values: HashMap<String, Value>,
}

impl FieldMap {
    pub fn new(type_name: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Self {
            type_name: type_name.into(),
            values: fields.into_iter().collect(),
        }
    }

    /// Take a field that must be present
    pub fn required<T: FromValue>(&mut self, name: &str) -> Result<T, SerializationError> {
        let value = self.values.remove(name).ok_or_else(|| SerializationError::MissingField {
            type_name: self.type_name.clone(),
            field: name.to_string(),
        })?;
        self.convert(name, value)
    }

    /// Take a field that may be absent or null
    pub fn optional<T: FromValue>(&mut self, name: &str) -> Result<Option<T>, SerializationError> {
        match self.values.remove(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.convert(name, value).map(Some),
        }
    }

    fn convert<T: FromValue>(&self, name: &str, value: Value) -> Result<T, SerializationError> {
        T::from_value(value).map_err(|e| SerializationError::InvalidField {
            type_name: self.type_name.clone(),
            field: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Build an ordered field list from `name => expr` pairs
#[macro_export]
macro_rules! fields {
    ($($name:ident => $value:expr),* $(,)?) => {
        vec![$((stringify!($name).to_string(), $crate::ToValue::to_value(&$value))),*]
    };
}

/// Make entity types usable as nested field values
#[macro_export]
macro_rules! impl_entity_value {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::ToValue for $ty {
            fn to_value(&self) -> $crate::Value {
                $crate::Value::Record($crate::Entity::to_record(self))
            }

            fn field_kind() -> $crate::FieldKind {
                $crate::FieldKind::Record(<$ty as $crate::Entity>::TYPE_NAME.to_string())
            }
        }

        impl $crate::FromValue for $ty {
            fn from_value(
                value: $crate::Value,
            ) -> ::std::result::Result<Self, $crate::SerializationError> {
                match value {
                    $crate::Value::Record(record) => <$ty as $crate::Entity>::from_record(record),
                    other => Err($crate::SerializationError::TypeMismatch {
                        expected: <$ty as $crate::Entity>::TYPE_NAME.to_string(),
                        found: other.kind_name().to_string(),
                    }),
                }
            }
        }
    )+};
}

/// Make value-object types usable as field values
#[macro_export]
macro_rules! impl_value_object_value {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::ToValue for $ty {
            fn to_value(&self) -> $crate::Value {
                $crate::ValueObject::to_wrapped(self)
            }

            fn field_kind() -> $crate::FieldKind {
                $crate::FieldKind::ValueObject(<$ty as $crate::ValueObject>::TYPE_NAME.to_string())
            }
        }

        impl $crate::FromValue for $ty {
            fn from_value(
                value: $crate::Value,
            ) -> ::std::result::Result<Self, $crate::SerializationError> {
                <$ty as $crate::ValueObject>::from_wrapped(value)
            }
        }
    )+};
}
