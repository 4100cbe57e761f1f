//! Schema derivation from declared entity fields

use std::collections::{BTreeMap, HashSet};

use crate::codec::{DATA_KEY, FORMAT_KEY, MODULE_KEY, TYPE_KEY, VERSION_KEY};
use crate::entity::{Entity, FieldDecl, FieldKind};
use crate::error::SchemaValidationError;
use crate::registry::{TypeKind, TypeRegistry};

use super::{Constraint, Schema, SchemaField};

/// Upper bound on declared list lengths, matching the codec's collection limit
pub const DEFAULT_MAX_LIST_LENGTH: usize = 10_000;

/// Derives [`Schema`]s from field declarations
///
/// Record definitions are memoized for the lifetime of the builder; a type
/// that is already defined, or currently being defined higher up the stack,
/// is referenced rather than derived again.
pub struct SchemaBuilder<'a> {
    registry: &'a TypeRegistry,
    definitions: BTreeMap<String, SchemaField>,
    in_progress: HashSet<String>,
    max_list_length: usize,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            definitions: BTreeMap::new(),
            in_progress: HashSet::new(),
            max_list_length: DEFAULT_MAX_LIST_LENGTH,
        }
    }

    pub fn with_max_list_length(mut self, max: usize) -> Self {
        self.max_list_length = max;
        self
    }

    /// Envelope schema for an entity type
    pub fn entity_envelope<T: Entity>(self) -> Result<Schema, SchemaValidationError> {
        self.envelope(T::TYPE_NAME, &T::fields())
    }

    /// Envelope schema: the four metadata strings plus `data`
    pub fn envelope(
        mut self,
        type_name: &str,
        fields: &[FieldDecl],
    ) -> Result<Schema, SchemaValidationError> {
        let data = self.define_root(type_name, fields)?;

        let mut properties = BTreeMap::new();
        for key in [VERSION_KEY, FORMAT_KEY, TYPE_KEY, MODULE_KEY] {
            properties.insert(key.to_string(), SchemaField::string());
        }
        properties.insert(DATA_KEY.to_string(), data);

        Ok(Schema {
            root: SchemaField::object(properties),
            definitions: self.definitions,
        })
    }

    /// Schema for a record's field map, without the envelope
    pub fn record(
        mut self,
        type_name: &str,
        fields: &[FieldDecl],
    ) -> Result<Schema, SchemaValidationError> {
        let root = self.define_root(type_name, fields)?;
        Ok(Schema {
            root,
            definitions: self.definitions,
        })
    }

    fn define_root(
        &mut self,
        type_name: &str,
        fields: &[FieldDecl],
    ) -> Result<SchemaField, SchemaValidationError> {
        self.in_progress.insert(type_name.to_string());
        let object = self.record_object(type_name, fields)?;
        self.in_progress.remove(type_name);
        self.definitions.insert(type_name.to_string(), object.clone());
        Ok(object)
    }

    fn record_object(
        &mut self,
        type_name: &str,
        fields: &[FieldDecl],
    ) -> Result<SchemaField, SchemaValidationError> {
        let mut properties = BTreeMap::new();
        for decl in fields {
            let field = self.field(type_name, decl)?;
            properties.insert(decl.name.clone(), field);
        }
        Ok(SchemaField::object(properties))
    }

    fn field(
        &mut self,
        owner: &str,
        decl: &FieldDecl,
    ) -> Result<SchemaField, SchemaValidationError> {
        let mut field = self.kind(owner, &decl.kind)?;
        field.required = !decl.has_default;
        field.constraints.extend(decl.constraints.iter().cloned());
        Ok(field)
    }

    fn kind(
        &mut self,
        owner: &str,
        kind: &FieldKind,
    ) -> Result<SchemaField, SchemaValidationError> {
        Ok(match kind {
            FieldKind::String => SchemaField::string(),
            FieldKind::Integer => SchemaField::integer(),
            FieldKind::Float => SchemaField::float(),
            FieldKind::Boolean => SchemaField::boolean(),
            FieldKind::Uuid => SchemaField::uuid(),
            FieldKind::DateTime => SchemaField::datetime(),
            FieldKind::List(inner) => SchemaField::array(self.kind(owner, inner)?)
                .with_constraint(Constraint::max_length(self.max_list_length)),
            FieldKind::Optional(inner) => self.kind(owner, inner)?.nullable(),
            FieldKind::Record(name) => {
                self.define_record(owner, name)?;
                SchemaField::record(name.clone())
            }
            FieldKind::ValueObject(name) => {
                let inner = match self.registry.get(name).map(|d| &d.kind) {
                    Some(TypeKind::ValueObject { inner }) => inner.clone(),
                    Some(TypeKind::Record { .. }) => {
                        return Err(derivation(
                            owner,
                            format!("'{}' is a record, not a value object", name),
                        ))
                    }
                    None => {
                        return Err(derivation(
                            owner,
                            format!("value object '{}' is not registered", name),
                        ))
                    }
                };
                SchemaField::value_object(name, self.kind(owner, &inner)?)
            }
            FieldKind::Map(_) | FieldKind::Set(_) | FieldKind::Tuple(_) => {
                SchemaField::any_object()
            }
            FieldKind::Opaque => SchemaField::any(),
        })
    }

    fn define_record(&mut self, owner: &str, name: &str) -> Result<(), SchemaValidationError> {
        if self.definitions.contains_key(name) || self.in_progress.contains(name) {
            return Ok(());
        }
        let fields = match self.registry.get(name).map(|d| &d.kind) {
            Some(TypeKind::Record { fields }) => fields.clone(),
            Some(TypeKind::ValueObject { .. }) => {
                return Err(derivation(owner, format!("'{}' is a value object, not a record", name)))
            }
            None => return Err(derivation(owner, format!("record '{}' is not registered", name))),
        };

        self.in_progress.insert(name.to_string());
        let object = self.record_object(name, &fields)?;
        self.in_progress.remove(name);
        self.definitions.insert(name.to_string(), object);
        Ok(())
    }
}

fn derivation(type_name: &str, reason: String) -> SchemaValidationError {
    SchemaValidationError::Derivation {
        type_name: type_name.to_string(),
        reason,
    }
}
