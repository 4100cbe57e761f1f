//! Type Registry
//!
//! Maps registered type names to descriptors so nested records and value
//! objects can be recognised in generic wire data. A registry is populated
//! during setup and handed to a serializer by value; the serializer only
//! mutates it through `&mut self` registration calls.

use std::collections::HashMap;

use tracing::debug;

use crate::entity::{Entity, FieldDecl, FieldKind, ValueObject};
use crate::error::SerializationError;

/// What kind of type a descriptor describes
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// Multi-field record
    Record { fields: Vec<FieldDecl> },
    /// Single wrapped value
    ValueObject { inner: FieldKind },
}

/// Registered description of a persisted type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: String,
    pub module: String,
    pub kind: TypeKind,
}

impl TypeDescriptor {
    pub fn record(
        name: impl Into<String>,
        module: impl Into<String>,
        fields: Vec<FieldDecl>,
    ) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            kind: TypeKind::Record { fields },
        }
    }

    pub fn value_object(
        name: impl Into<String>,
        module: impl Into<String>,
        inner: FieldKind,
    ) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            kind: TypeKind::ValueObject { inner },
        }
    }

    /// Descriptor for an entity type
    pub fn of_entity<T: Entity>() -> Self {
        Self::record(T::TYPE_NAME, T::MODULE, T::fields())
    }

    /// Descriptor for a value-object type
    pub fn of_value_object<T: ValueObject>() -> Self {
        Self::value_object(T::TYPE_NAME, T::MODULE, T::inner_kind())
    }

    pub fn is_record(&self) -> bool {
        matches!(self.kind, TypeKind::Record { .. })
    }

    pub fn is_value_object(&self) -> bool {
        matches!(self.kind, TypeKind::ValueObject { .. })
    }
}

/// Name to descriptor map shared by the codecs
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type; re-registering a name replaces it
    pub fn register_type<T: Entity>(&mut self) -> &mut Self {
        self.register(TypeDescriptor::of_entity::<T>())
    }

    /// Register a value-object type
    pub fn register_value_object<T: ValueObject>(&mut self) -> &mut Self {
        self.register(TypeDescriptor::of_value_object::<T>())
    }

    /// Register a raw descriptor
    pub fn register(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        debug!(type_name = %descriptor.name, module = %descriptor.module, "registering type");
        self.types.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    /// Look up a name, failing for unregistered types
    pub fn resolve(&self, name: &str) -> Result<&TypeDescriptor, SerializationError> {
        self.types
            .get(name)
            .ok_or_else(|| SerializationError::UnknownType(name.to_string()))
    }

    /// Look up a record type by name
    pub fn resolve_record(&self, name: &str) -> Result<&TypeDescriptor, SerializationError> {
        let descriptor = self.resolve(name)?;
        if !descriptor.is_record() {
            return Err(SerializationError::TypeMismatch {
                expected: format!("record type {}", name),
                found: "value object".to_string(),
            });
        }
        Ok(descriptor)
    }

    /// Look up a value-object type by name
    pub fn resolve_value_object(&self, name: &str) -> Result<&TypeDescriptor, SerializationError> {
        let descriptor = self.resolve(name)?;
        if !descriptor.is_value_object() {
            return Err(SerializationError::TypeMismatch {
                expected: format!("value object type {}", name),
                found: "record".to_string(),
            });
        }
        Ok(descriptor)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
