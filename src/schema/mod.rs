//! Structural schemas for stored payloads
//!
//! A [`Schema`] is a root [`SchemaField`] plus named record definitions, in
//! the same spirit as JSON Schema `definitions`: nested records are checked by
//! reference, so self-referencing and mutually referencing record types need
//! no special handling.
//!
//! Validation runs against the tagged wire form (the JSON envelope), after
//! migration and before typed reconstruction.

pub mod builder;
pub mod constraint;

pub use builder::SchemaBuilder;
pub use constraint::Constraint;

use std::collections::BTreeMap;

use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

use crate::codec::{
    parse_datetime, DATACLASS_KEY, DATETIME_KEY, MODULE_KEY, UUID_KEY, VALUE_OBJECT_KEY,
};
use crate::error::SchemaValidationError;

/// Structural type tag of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaTag {
    String,
    Integer,
    Float,
    Boolean,
    Null,
    Array,
    Object,
    Uuid,
    DateTime,
    Record,
    ValueObject,
    /// Any JSON value, including null
    Any,
}

impl SchemaTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaTag::String => "string",
            SchemaTag::Integer => "integer",
            SchemaTag::Float => "float",
            SchemaTag::Boolean => "boolean",
            SchemaTag::Null => "null",
            SchemaTag::Array => "array",
            SchemaTag::Object => "object",
            SchemaTag::Uuid => "uuid",
            SchemaTag::DateTime => "datetime",
            SchemaTag::Record => "record",
            SchemaTag::ValueObject => "value_object",
            SchemaTag::Any => "any",
        }
    }
}

/// Schema for a single value
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub tag: SchemaTag,
    pub required: bool,
    pub nullable: bool,
    pub constraints: Vec<Constraint>,
    /// Element schema for arrays
    pub items: Option<Box<SchemaField>>,
    /// Declared properties for objects and value objects; `None` means any keys
    pub properties: Option<BTreeMap<String, SchemaField>>,
    /// Referenced definition for records
    pub record_type: Option<String>,
}

impl SchemaField {
    pub fn new(tag: SchemaTag) -> Self {
        Self {
            tag,
            required: true,
            nullable: false,
            constraints: Vec::new(),
            items: None,
            properties: None,
            record_type: None,
        }
    }

    pub fn string() -> Self {
        Self::new(SchemaTag::String)
    }

    pub fn integer() -> Self {
        Self::new(SchemaTag::Integer)
    }

    pub fn float() -> Self {
        Self::new(SchemaTag::Float)
    }

    pub fn boolean() -> Self {
        Self::new(SchemaTag::Boolean)
    }

    pub fn null() -> Self {
        Self::new(SchemaTag::Null)
    }

    pub fn uuid() -> Self {
        Self::new(SchemaTag::Uuid)
    }

    pub fn datetime() -> Self {
        Self::new(SchemaTag::DateTime)
    }

    pub fn array(items: SchemaField) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaTag::Array)
        }
    }

    /// Strict object with the given properties
    pub fn object(properties: BTreeMap<String, SchemaField>) -> Self {
        Self {
            properties: Some(properties),
            ..Self::new(SchemaTag::Object)
        }
    }

    /// Object with no property schema; any keys are accepted
    pub fn any_object() -> Self {
        Self::new(SchemaTag::Object)
    }

    /// Unconstrained value of any JSON type
    pub fn any() -> Self {
        Self::new(SchemaTag::Any)
    }

    /// Reference to a record definition
    pub fn record(type_name: impl Into<String>) -> Self {
        Self {
            record_type: Some(type_name.into()),
            ..Self::new(SchemaTag::Record)
        }
    }

    /// Fixed two-property wrapper schema of a value object
    pub fn value_object(type_name: &str, inner: SchemaField) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            VALUE_OBJECT_KEY.to_string(),
            SchemaField::string().with_constraint(Constraint::allowed([type_name])),
        );
        properties.insert("value".to_string(), inner);
        Self {
            properties: Some(properties),
            record_type: Some(type_name.to_string()),
            ..Self::new(SchemaTag::ValueObject)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Validate `value` located at `path`
    pub fn validate(
        &self,
        value: &JsonValue,
        path: &str,
        definitions: &BTreeMap<String, SchemaField>,
    ) -> Result<(), SchemaValidationError> {
        if value.is_null() {
            return if self.nullable || matches!(self.tag, SchemaTag::Null | SchemaTag::Any) {
                Ok(())
            } else {
                Err(SchemaValidationError::NullNotAllowed { path: path.to_string() })
            };
        }

        self.check_tag(value, path)?;

        for constraint in &self.constraints {
            constraint.check(value, path)?;
        }

        match self.tag {
            SchemaTag::Array => {
                if let (Some(items), Some(values)) = (&self.items, value.as_array()) {
                    for (i, item) in values.iter().enumerate() {
                        items.validate(item, &format!("{}[{}]", path, i), definitions)?;
                    }
                }
                Ok(())
            }
            SchemaTag::Object | SchemaTag::ValueObject => {
                match (&self.properties, value.as_object()) {
                    (Some(properties), Some(object)) => {
                        validate_properties(properties, object, path, definitions)
                    }
                    _ => Ok(()),
                }
            }
            SchemaTag::Uuid => {
                let raw = wrapped_string(value, UUID_KEY, path)?;
                Uuid::parse_str(raw).map(|_| ()).map_err(|e| SchemaValidationError::InvalidFormat {
                    path: path.to_string(),
                    message: format!("invalid uuid '{}': {}", raw, e),
                })
            }
            SchemaTag::DateTime => {
                let raw = wrapped_string(value, DATETIME_KEY, path)?;
                match parse_datetime(raw) {
                    Some(_) => Ok(()),
                    None => Err(SchemaValidationError::InvalidFormat {
                        path: path.to_string(),
                        message: format!("invalid datetime '{}'", raw),
                    }),
                }
            }
            SchemaTag::Record => self.validate_record(value, path, definitions),
            _ => Ok(()),
        }
    }

    fn check_tag(&self, value: &JsonValue, path: &str) -> Result<(), SchemaValidationError> {
        let ok = match self.tag {
            SchemaTag::String => value.is_string(),
            SchemaTag::Integer => value.is_i64() || value.is_u64(),
            SchemaTag::Float => value.is_number(),
            SchemaTag::Boolean => value.is_boolean(),
            SchemaTag::Null => value.is_null(),
            SchemaTag::Any => true,
            SchemaTag::Array => value.is_array(),
            SchemaTag::Object
            | SchemaTag::Uuid
            | SchemaTag::DateTime
            | SchemaTag::Record
            | SchemaTag::ValueObject => value.is_object(),
        };
        if ok {
            Ok(())
        } else {
            Err(SchemaValidationError::TypeMismatch {
                path: path.to_string(),
                expected: self.tag.as_str().to_string(),
                found: json_type_name(value).to_string(),
            })
        }
    }

    fn validate_record(
        &self,
        value: &JsonValue,
        path: &str,
        definitions: &BTreeMap<String, SchemaField>,
    ) -> Result<(), SchemaValidationError> {
        let Some(type_name) = self.record_type.as_deref() else {
            return Ok(());
        };
        let definition = definitions.get(type_name).ok_or_else(|| {
            SchemaValidationError::UnknownDefinition {
                path: path.to_string(),
                name: type_name.to_string(),
            }
        })?;

        let mut wrapper = BTreeMap::new();
        wrapper.insert(
            DATACLASS_KEY.to_string(),
            SchemaField::string().with_constraint(Constraint::allowed([type_name])),
        );
        wrapper.insert(MODULE_KEY.to_string(), SchemaField::string());
        wrapper.insert("data".to_string(), SchemaField::any_object());
        let object = value.as_object().ok_or_else(|| SchemaValidationError::TypeMismatch {
            path: path.to_string(),
            expected: "record".to_string(),
            found: json_type_name(value).to_string(),
        })?;
        validate_properties(&wrapper, object, path, definitions)?;

        definition.validate(&value["data"], &format!("{}.data", path), definitions)
    }

    /// Render as a JSON Schema fragment
    pub fn to_json_schema(&self) -> JsonValue {
        let mut out = Map::new();
        match self.tag {
            SchemaTag::String => {
                out.insert("type".into(), json!("string"));
            }
            SchemaTag::Integer => {
                out.insert("type".into(), json!("integer"));
            }
            SchemaTag::Float => {
                out.insert("type".into(), json!("number"));
            }
            SchemaTag::Boolean => {
                out.insert("type".into(), json!("boolean"));
            }
            SchemaTag::Null => {
                out.insert("type".into(), json!("null"));
            }
            SchemaTag::Array => {
                out.insert("type".into(), json!("array"));
                if let Some(items) = &self.items {
                    out.insert("items".into(), items.to_json_schema());
                }
            }
            SchemaTag::Object | SchemaTag::ValueObject => {
                out.insert("type".into(), json!("object"));
                if let Some(properties) = &self.properties {
                    export_properties(&mut out, properties);
                }
            }
            SchemaTag::Any => {}
            SchemaTag::Uuid => {
                out.extend(wrapper_schema(UUID_KEY));
            }
            SchemaTag::DateTime => {
                out.extend(wrapper_schema(DATETIME_KEY));
            }
            SchemaTag::Record => {
                let name = self.record_type.clone().unwrap_or_default();
                out.insert("type".into(), json!("object"));
                out.insert(
                    "properties".into(),
                    json!({
                        DATACLASS_KEY: { "const": name },
                        MODULE_KEY: { "type": "string" },
                        "data": { "$ref": format!("#/definitions/{}", name) },
                    }),
                );
                out.insert("required".into(), json!([DATACLASS_KEY, MODULE_KEY, "data"]));
                out.insert("additionalProperties".into(), json!(false));
            }
        }
        for constraint in &self.constraints {
            constraint.export(&mut out, self.tag == SchemaTag::Array);
        }

        let schema = JsonValue::Object(out);
        if self.nullable {
            json!({ "anyOf": [schema, { "type": "null" }] })
        } else {
            schema
        }
    }
}

/// A derived schema: root field plus record definitions
#[derive(Debug, Clone)]
pub struct Schema {
    pub root: SchemaField,
    pub definitions: BTreeMap<String, SchemaField>,
}

impl Schema {
    pub fn new(root: SchemaField) -> Self {
        Self {
            root,
            definitions: BTreeMap::new(),
        }
    }

    /// Validate a complete value against the root field
    pub fn validate(&self, value: &JsonValue) -> Result<(), SchemaValidationError> {
        self.root.validate(value, "$", &self.definitions)
    }

    /// Render as a draft-07 JSON Schema document
    pub fn to_json_schema(&self) -> JsonValue {
        let mut document = match self.root.to_json_schema() {
            JsonValue::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("allOf".into(), json!([other]));
                map
            }
        };
        document.insert("$schema".into(), json!("http://json-schema.org/draft-07/schema#"));
        let definitions: Map<String, JsonValue> = self
            .definitions
            .iter()
            .map(|(name, field)| (name.clone(), field.to_json_schema()))
            .collect();
        document.insert("definitions".into(), JsonValue::Object(definitions));
        JsonValue::Object(document)
    }
}

fn validate_properties(
    properties: &BTreeMap<String, SchemaField>,
    object: &Map<String, JsonValue>,
    path: &str,
    definitions: &BTreeMap<String, SchemaField>,
) -> Result<(), SchemaValidationError> {
    let unexpected: Vec<String> = object
        .keys()
        .filter(|k| !properties.contains_key(*k))
        .cloned()
        .collect();
    if !unexpected.is_empty() {
        return Err(SchemaValidationError::UnexpectedProperties {
            path: path.to_string(),
            properties: unexpected,
        });
    }

    for (name, field) in properties {
        match object.get(name) {
            Some(value) => field.validate(value, &format!("{}.{}", path, name), definitions)?,
            None if field.required => {
                return Err(SchemaValidationError::MissingProperty {
                    path: path.to_string(),
                    property: name.clone(),
                })
            }
            None => {}
        }
    }
    Ok(())
}

fn wrapped_string<'a>(
    value: &'a JsonValue,
    key: &str,
    path: &str,
) -> Result<&'a str, SchemaValidationError> {
    let object = value.as_object().ok_or_else(|| SchemaValidationError::TypeMismatch {
        path: path.to_string(),
        expected: key.to_string(),
        found: json_type_name(value).to_string(),
    })?;
    if object.len() != 1 {
        let extra = object.keys().filter(|k| *k != key).cloned().collect::<Vec<_>>();
        if !extra.is_empty() {
            return Err(SchemaValidationError::UnexpectedProperties {
                path: path.to_string(),
                properties: extra,
            });
        }
    }
    object
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| SchemaValidationError::MissingProperty {
            path: path.to_string(),
            property: key.to_string(),
        })
}

fn wrapper_schema(key: &str) -> Map<String, JsonValue> {
    let mut out = Map::new();
    out.insert("type".into(), json!("object"));
    out.insert("properties".into(), json!({ key: { "type": "string" } }));
    out.insert("required".into(), json!([key]));
    out.insert("additionalProperties".into(), json!(false));
    out
}

fn export_properties(out: &mut Map<String, JsonValue>, properties: &BTreeMap<String, SchemaField>) {
    let props: Map<String, JsonValue> = properties
        .iter()
        .map(|(name, field)| (name.clone(), field.to_json_schema()))
        .collect();
    let required: Vec<&String> = properties
        .iter()
        .filter(|(_, field)| field.required)
        .map(|(name, _)| name)
        .collect();
    out.insert("properties".into(), JsonValue::Object(props));
    out.insert("required".into(), json!(required));
    out.insert("additionalProperties".into(), json!(false));
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_f64() => "float",
        JsonValue::Number(_) => "integer",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
