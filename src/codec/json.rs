//! JSON entity serializer
//!
//! Owns the envelope layout and value tagging. The MessagePack serializer
//! reuses [`JsonSerializer::encode_envelope`] and
//! [`JsonSerializer::decode_envelope`] unchanged.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Datelike;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value as JsonValue};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    check_json_nesting, format_datetime, parse_datetime, Format, ModuleAliases, DATACLASS_KEY,
    DATA_KEY, DATETIME_KEY, FORMAT_KEY, MODULE_KEY, SET_KEY, STR_KEY, STR_TYPE_KEY, TUPLE_KEY,
    TYPE_KEY, UUID_KEY, VALUE_KEY, VALUE_OBJECT_KEY, VERSION_KEY,
};
use crate::config::{CodecConfig, Limits};
use crate::entity::{Entity, FieldMap, ValueObject};
use crate::error::{Result, SchemaValidationError, SerializationError, VersionCompatibilityError};
use crate::migration::{DataMigration, MigrationManager};
use crate::registry::TypeRegistry;
use crate::schema::{Schema, SchemaBuilder};
use crate::value::{Record, Value};
use crate::version::VersionInfo;

/// Entity serializer producing JSON envelopes
pub struct JsonSerializer {
    registry: TypeRegistry,
    migrations: MigrationManager,
    limits: Limits,
    format: Format,
    validate_schema: bool,
    fail_on_derivation_error: bool,
    aliases: ModuleAliases,
    /// Derived schemas per type name; `None` marks a failed derivation
    schema_cache: RwLock<HashMap<String, Option<Arc<Schema>>>>,
}

impl JsonSerializer {
    /// Create a serializer at the default version (1.0.0) with default limits
    pub fn new(registry: TypeRegistry) -> Self {
        Self::with_migrations(registry, MigrationManager::new(VersionInfo::default()))
    }

    /// Create a serializer whose current version and upgrade path come from `migrations`
    pub fn with_migrations(registry: TypeRegistry, migrations: MigrationManager) -> Self {
        Self {
            registry,
            migrations,
            limits: Limits::default(),
            format: Format::Json,
            validate_schema: true,
            fail_on_derivation_error: false,
            aliases: ModuleAliases::new(),
            schema_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Create a serializer from loaded configuration
    pub fn from_config(registry: TypeRegistry, config: &CodecConfig) -> Result<Self> {
        let current = VersionInfo::parse(&config.serializer.current_version)?;
        let migrations = MigrationManager::new(current).with_strategy(config.migration.strategy);

        let mut serializer = Self::with_migrations(registry, migrations)
            .with_limits(config.limits.clone())
            .with_schema_validation(config.serializer.validate_schema);
        serializer.fail_on_derivation_error = config.serializer.fail_on_schema_derivation_error;
        for alias in &config.serializer.module_aliases {
            serializer.allow_module_rename(&alias.from, &alias.to);
        }
        Ok(serializer)
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self.schema_cache.get_mut().clear();
        self
    }

    pub fn with_schema_validation(mut self, enabled: bool) -> Self {
        self.validate_schema = enabled;
        self
    }

    /// Fail instead of skipping validation when a type's schema cannot be derived
    pub fn with_strict_schema_derivation(mut self, strict: bool) -> Self {
        self.fail_on_derivation_error = strict;
        self
    }

    pub(crate) fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn register_type<T: Entity>(&mut self) {
        self.registry.register_type::<T>();
        self.schema_cache.get_mut().clear();
    }

    pub fn register_value_object<T: ValueObject>(&mut self) {
        self.registry.register_value_object::<T>();
        self.schema_cache.get_mut().clear();
    }

    pub fn register_migration(
        &mut self,
        migration: DataMigration,
    ) -> std::result::Result<(), VersionCompatibilityError> {
        self.migrations.register(migration).map(|_| ())
    }

    /// Accept payloads whose module is `old` when loading types from `new`
    pub fn allow_module_rename(&mut self, old: &str, new: &str) {
        self.aliases.allow(old, new);
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn migrations(&self) -> &MigrationManager {
        &self.migrations
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn current_version(&self) -> VersionInfo {
        self.migrations.current_version()
    }

    /// Serialize an entity to JSON bytes
    pub fn serialize<T: Entity>(&self, entity: &T) -> Result<Vec<u8>> {
        let envelope = self.encode_envelope(entity)?;
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Deserialize JSON bytes into an entity
    pub fn deserialize<T: Entity>(&self, bytes: &[u8]) -> Result<T> {
        let payload = self.parse(bytes)?;
        self.decode_envelope(payload)
    }

    /// Parse JSON bytes without interpreting the envelope
    pub fn parse(&self, bytes: &[u8]) -> std::result::Result<JsonValue, SerializationError> {
        check_json_nesting(bytes, self.limits.wire_nesting_limit())?;
        let mut de = serde_json::Deserializer::from_slice(bytes);
        de.disable_recursion_limit();
        let value = JsonValue::deserialize(&mut de)?;
        de.end()?;
        Ok(value)
    }

    /// Build the envelope for an entity
    pub fn encode_envelope<T: Entity>(&self, entity: &T) -> Result<JsonValue> {
        let encoder = Encoder {
            registry: &self.registry,
            limits: &self.limits,
        };

        let fields = entity.to_fields();
        encoder.check_collection(fields.len(), T::TYPE_NAME)?;
        let mut data = Map::new();
        for (name, value) in &fields {
            let path = format!("{}.{}", T::TYPE_NAME, name);
            data.insert(name.clone(), encoder.encode(value, 1, &path)?);
        }

        // Metadata keys first, field data last
        let mut envelope = Map::new();
        envelope.insert(VERSION_KEY.to_string(), json!(self.current_version().to_string()));
        envelope.insert(FORMAT_KEY.to_string(), json!(self.format.name()));
        envelope.insert(TYPE_KEY.to_string(), json!(T::TYPE_NAME));
        envelope.insert(MODULE_KEY.to_string(), json!(T::MODULE));
        envelope.insert(DATA_KEY.to_string(), JsonValue::Object(data));
        let envelope = JsonValue::Object(envelope);

        if self.validate_schema {
            if let Some(schema) = self.schema_for::<T>()? {
                schema.validate(&envelope)?;
            }
        }
        Ok(envelope)
    }

    /// Migrate, check and rebuild an entity from a parsed envelope
    pub fn decode_envelope<T: Entity>(&self, payload: JsonValue) -> Result<T> {
        if !payload.is_object() {
            return Err(SerializationError::MalformedEnvelope(
                "payload is not an object".to_string(),
            )
            .into());
        }
        let payload = self.migrations.migrate_data(payload)?;
        let envelope = payload.as_object().ok_or_else(|| {
            SerializationError::MalformedEnvelope("migrated payload is not an object".to_string())
        })?;

        let format = metadata(envelope, FORMAT_KEY)?;
        if format != self.format.name() {
            return Err(SerializationError::FormatMismatch {
                expected: self.format.name().to_string(),
                found: format.to_string(),
            }
            .into());
        }

        let type_name = metadata(envelope, TYPE_KEY)?;
        if type_name != T::TYPE_NAME {
            return Err(SerializationError::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: type_name.to_string(),
            }
            .into());
        }

        let module = metadata(envelope, MODULE_KEY)?;
        if !self.aliases.accepts(module, T::MODULE) {
            return Err(SerializationError::ModuleMismatch {
                type_name: T::TYPE_NAME.to_string(),
                expected: T::MODULE.to_string(),
                found: module.to_string(),
            }
            .into());
        }
        if module != T::MODULE {
            debug!(
                type_name = T::TYPE_NAME,
                from = module,
                to = T::MODULE,
                "accepting renamed module"
            );
        }

        if self.validate_schema {
            if let Some(schema) = self.schema_for::<T>()? {
                schema.validate(&payload)?;
            }
        }

        let data = envelope
            .get(DATA_KEY)
            .and_then(JsonValue::as_object)
            .ok_or_else(|| {
                SerializationError::MalformedEnvelope("missing data object".to_string())
            })?;

        let decoder = Decoder {
            registry: &self.registry,
            limits: &self.limits,
            aliases: &self.aliases,
        };
        decoder.check_collection(data.len(), T::TYPE_NAME)?;
        let fields = data
            .iter()
            .map(|(name, value)| {
                let path = format!("{}.{}", T::TYPE_NAME, name);
                decoder.decode(value, 1, &path).map(|v| (name.clone(), v))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(T::from_fields(FieldMap::new(T::TYPE_NAME, fields))?)
    }

    /// Derived envelope schema for `T`, memoized per type
    ///
    /// A type whose schema cannot be derived is validated no further (and a
    /// warning is logged) unless strict derivation is enabled.
    pub fn schema_for<T: Entity>(
        &self,
    ) -> std::result::Result<Option<Arc<Schema>>, SchemaValidationError> {
        if let Some(cached) = self.schema_cache.read().get(T::TYPE_NAME) {
            return Ok(cached.clone());
        }

        let derived = SchemaBuilder::new(&self.registry)
            .with_max_list_length(self.limits.max_collection_size)
            .entity_envelope::<T>();
        let entry = match derived {
            Ok(schema) => Some(Arc::new(schema)),
            Err(e) if self.fail_on_derivation_error => return Err(e),
            Err(e) => {
                warn!(
                    type_name = T::TYPE_NAME,
                    error = %e,
                    "schema derivation failed, skipping validation for this type"
                );
                None
            }
        };
        self.schema_cache
            .write()
            .insert(T::TYPE_NAME.to_string(), entry.clone());
        Ok(entry)
    }
}

impl Clone for JsonSerializer {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            migrations: self.migrations.clone(),
            limits: self.limits.clone(),
            format: self.format,
            validate_schema: self.validate_schema,
            fail_on_derivation_error: self.fail_on_derivation_error,
            aliases: self.aliases.clone(),
            schema_cache: RwLock::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for JsonSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSerializer")
            .field("format", &self.format)
            .field("current_version", &self.current_version())
            .field("types", &self.registry.len())
            .field("limits", &self.limits)
            .finish()
    }
}

fn metadata<'a>(
    envelope: &'a Map<String, JsonValue>,
    key: &str,
) -> std::result::Result<&'a str, SerializationError> {
    envelope
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| {
            SerializationError::MalformedEnvelope(format!("missing or non-string {}", key))
        })
}

fn check_depth(
    limits: &Limits,
    depth: usize,
    path: &str,
) -> std::result::Result<(), SerializationError> {
    if depth > limits.max_depth {
        return Err(SerializationError::DepthExceeded {
            max: limits.max_depth,
            path: path.to_string(),
        });
    }
    Ok(())
}

fn check_string(
    limits: &Limits,
    s: &str,
    path: &str,
) -> std::result::Result<(), SerializationError> {
    // byte length bounds the char count from above
    if s.len() > limits.max_string_length {
        let length = s.chars().count();
        if length > limits.max_string_length {
            return Err(SerializationError::StringTooLong {
                length,
                max: limits.max_string_length,
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

fn check_collection(
    limits: &Limits,
    size: usize,
    path: &str,
) -> std::result::Result<(), SerializationError> {
    if size > limits.max_collection_size {
        return Err(SerializationError::CollectionTooLarge {
            size,
            max: limits.max_collection_size,
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Value to tagged JSON
struct Encoder<'a> {
    registry: &'a TypeRegistry,
    limits: &'a Limits,
}

impl Encoder<'_> {
    fn check_collection(
        &self,
        size: usize,
        path: &str,
    ) -> std::result::Result<(), SerializationError> {
        check_collection(self.limits, size, path)
    }

    fn encode(
        &self,
        value: &Value,
        depth: usize,
        path: &str,
    ) -> std::result::Result<JsonValue, SerializationError> {
        Ok(match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => Number::from_f64(*f).map(JsonValue::Number).ok_or_else(|| {
                SerializationError::Unsupported {
                    path: path.to_string(),
                    reason: format!("non-finite float {}", f),
                }
            })?,
            Value::String(s) => {
                check_string(self.limits, s, path)?;
                JsonValue::String(s.clone())
            }
            Value::Uuid(id) => json!({ UUID_KEY: id.to_string() }),
            Value::DateTime(dt) => {
                // four-digit years only; anything else does not read back
                if !(0..=9999).contains(&dt.year()) {
                    return Err(SerializationError::Unsupported {
                        path: path.to_string(),
                        reason: format!("datetime year {} is outside 0000-9999", dt.year()),
                    });
                }
                json!({ DATETIME_KEY: format_datetime(dt) })
            }
            Value::List(items) => {
                check_depth(self.limits, depth, path)?;
                JsonValue::Array(self.encode_items(items, depth, path)?)
            }
            Value::Map(entries) => {
                check_depth(self.limits, depth, path)?;
                self.check_collection(entries.len(), path)?;
                let mut object = Map::new();
                for (key, item) in entries {
                    check_string(self.limits, key, path)?;
                    object.insert(
                        key.clone(),
                        self.encode(item, depth + 1, &format!("{}.{}", path, key))?,
                    );
                }
                JsonValue::Object(object)
            }
            Value::Set(items) => {
                check_depth(self.limits, depth, path)?;
                json!({ SET_KEY: self.encode_items(items, depth, path)? })
            }
            Value::Tuple(items) => {
                check_depth(self.limits, depth, path)?;
                json!({ TUPLE_KEY: self.encode_items(items, depth, path)? })
            }
            Value::Record(record) => {
                check_depth(self.limits, depth, path)?;
                self.registry.resolve_record(&record.type_name)?;
                self.check_collection(record.fields.len(), path)?;
                let mut data = Map::new();
                for (name, item) in &record.fields {
                    data.insert(
                        name.clone(),
                        self.encode(item, depth + 1, &format!("{}.{}", path, name))?,
                    );
                }
                json!({
                    DATACLASS_KEY: record.type_name,
                    MODULE_KEY: record.module,
                    DATA_KEY: JsonValue::Object(data),
                })
            }
            Value::ValueObject { type_name, value } => {
                check_depth(self.limits, depth, path)?;
                self.registry.resolve_value_object(type_name)?;
                json!({
                    VALUE_OBJECT_KEY: type_name,
                    VALUE_KEY: self.encode(value, depth + 1, path)?,
                })
            }
            Value::Opaque { type_name, repr } => {
                warn!(
                    type_name = %type_name,
                    path,
                    "encoding opaque value as string; type is not recoverable"
                );
                let truncated: String = repr.chars().take(self.limits.max_repr_length).collect();
                json!({ STR_KEY: truncated, STR_TYPE_KEY: type_name })
            }
        })
    }

    fn encode_items(
        &self,
        items: &[Value],
        depth: usize,
        path: &str,
    ) -> std::result::Result<Vec<JsonValue>, SerializationError> {
        self.check_collection(items.len(), path)?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.encode(item, depth + 1, &format!("{}[{}]", path, i)))
            .collect()
    }
}

/// Tagged JSON back to values
struct Decoder<'a> {
    registry: &'a TypeRegistry,
    limits: &'a Limits,
    aliases: &'a ModuleAliases,
}

impl Decoder<'_> {
    fn check_collection(
        &self,
        size: usize,
        path: &str,
    ) -> std::result::Result<(), SerializationError> {
        check_collection(self.limits, size, path)
    }

    fn decode(
        &self,
        value: &JsonValue,
        depth: usize,
        path: &str,
    ) -> std::result::Result<Value, SerializationError> {
        match value {
            JsonValue::Null => Ok(Value::Null),
            JsonValue::Bool(b) => Ok(Value::Bool(*b)),
            JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Value::Int(i)),
                (None, Some(f)) => Ok(Value::Float(f)),
                (None, None) => Err(invalid(path, format!("unrepresentable number {}", n))),
            },
            JsonValue::String(s) => {
                check_string(self.limits, s, path)?;
                Ok(Value::String(s.clone()))
            }
            JsonValue::Array(items) => {
                check_depth(self.limits, depth, path)?;
                Ok(Value::List(self.decode_items(items, depth, path)?))
            }
            JsonValue::Object(object) => self.decode_object(object, depth, path),
        }
    }

    /// Sentinel keys are checked in a fixed priority order
    fn decode_object(
        &self,
        object: &Map<String, JsonValue>,
        depth: usize,
        path: &str,
    ) -> std::result::Result<Value, SerializationError> {
        if let Some(raw) = object.get(UUID_KEY) {
            let raw = sentinel_str(raw, UUID_KEY, path)?;
            return Uuid::parse_str(raw)
                .map(Value::Uuid)
                .map_err(|e| invalid(path, format!("invalid uuid '{}': {}", raw, e)));
        }

        if let Some(raw) = object.get(DATETIME_KEY) {
            let raw = sentinel_str(raw, DATETIME_KEY, path)?;
            return parse_datetime(raw)
                .map(Value::DateTime)
                .ok_or_else(|| invalid(path, format!("invalid datetime '{}'", raw)));
        }

        if let Some(raw) = object.get(VALUE_OBJECT_KEY) {
            check_depth(self.limits, depth, path)?;
            let type_name = sentinel_str(raw, VALUE_OBJECT_KEY, path)?;
            self.registry.resolve_value_object(type_name)?;
            let inner = object.get(VALUE_KEY).unwrap_or(&JsonValue::Null);
            return Ok(Value::ValueObject {
                type_name: type_name.to_string(),
                value: Box::new(self.decode(inner, depth + 1, path)?),
            });
        }

        if let Some(raw) = object.get(DATACLASS_KEY) {
            check_depth(self.limits, depth, path)?;
            let type_name = sentinel_str(raw, DATACLASS_KEY, path)?;
            let descriptor = self.registry.resolve_record(type_name)?;
            if let Some(module) = object.get(MODULE_KEY).and_then(JsonValue::as_str) {
                if !self.aliases.accepts(module, &descriptor.module) {
                    return Err(SerializationError::ModuleMismatch {
                        type_name: type_name.to_string(),
                        expected: descriptor.module.clone(),
                        found: module.to_string(),
                    });
                }
            }
            let data = object
                .get(DATA_KEY)
                .and_then(JsonValue::as_object)
                .ok_or_else(|| invalid(path, format!("record {} has no data object", type_name)))?;
            self.check_collection(data.len(), path)?;

            let mut record = Record::new(type_name, descriptor.module.clone());
            for (name, item) in data {
                let field = self.decode(item, depth + 1, &format!("{}.{}", path, name))?;
                record.fields.push((name.clone(), field));
            }
            return Ok(Value::Record(record));
        }

        if let Some(raw) = object.get(SET_KEY) {
            check_depth(self.limits, depth, path)?;
            let items = sentinel_array(raw, SET_KEY, path)?;
            return Ok(Value::Set(self.decode_items(items, depth, path)?));
        }

        if let Some(raw) = object.get(TUPLE_KEY) {
            check_depth(self.limits, depth, path)?;
            let items = sentinel_array(raw, TUPLE_KEY, path)?;
            return Ok(Value::Tuple(self.decode_items(items, depth, path)?));
        }

        if let Some(raw) = object.get(STR_KEY) {
            // lossy fallback: only the string form survives
            let s = sentinel_str(raw, STR_KEY, path)?;
            check_string(self.limits, s, path)?;
            return Ok(Value::String(s.to_string()));
        }

        check_depth(self.limits, depth, path)?;
        self.check_collection(object.len(), path)?;
        let mut entries = BTreeMap::new();
        for (key, item) in object {
            check_string(self.limits, key, path)?;
            entries.insert(
                key.clone(),
                self.decode(item, depth + 1, &format!("{}.{}", path, key))?,
            );
        }
        Ok(Value::Map(entries))
    }

    fn decode_items(
        &self,
        items: &[JsonValue],
        depth: usize,
        path: &str,
    ) -> std::result::Result<Vec<Value>, SerializationError> {
        self.check_collection(items.len(), path)?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.decode(item, depth + 1, &format!("{}[{}]", path, i)))
            .collect()
    }
}

fn invalid(path: &str, reason: String) -> SerializationError {
    SerializationError::InvalidWireValue {
        path: path.to_string(),
        reason,
    }
}

fn sentinel_str<'a>(
    raw: &'a JsonValue,
    key: &str,
    path: &str,
) -> std::result::Result<&'a str, SerializationError> {
    raw.as_str()
        .ok_or_else(|| invalid(path, format!("{} must be a string", key)))
}

fn sentinel_array<'a>(
    raw: &'a JsonValue,
    key: &str,
    path: &str,
) -> std::result::Result<&'a Vec<JsonValue>, SerializationError> {
    raw.as_array()
        .ok_or_else(|| invalid(path, format!("{} must be an array", key)))
}
