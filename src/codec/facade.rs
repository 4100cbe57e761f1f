//! Format-dispatching facade
//!
//! Stored bytes carry a short ASCII tag naming their codec. The facade
//! writes that tag, reads it back to pick a codec, and refuses payloads
//! that look like legacy pickle data.

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::{
    legacy_signature, Format, JsonSerializer, MessagePackSerializer, DATA_KEY, FORMAT_KEY,
    MODULE_KEY, TYPE_KEY, VERSION_KEY,
};
use crate::config::CodecConfig;
use crate::entity::{Entity, ValueObject};
use crate::error::{CodecError, Result, SerializationError, VersionCompatibilityError};
use crate::migration::DataMigration;
use crate::registry::TypeRegistry;

/// How stored bytes were recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    /// Prefixed with a known tag
    Tagged(Format),
    /// No tag; read as best-effort JSON
    Untagged,
}

/// Identify the codec for stored bytes
///
/// Legacy signatures are rejected here, before any decoding is attempted.
pub fn detect_format(bytes: &[u8]) -> std::result::Result<DetectedFormat, SerializationError> {
    if let Some(format) = Format::from_prefix(bytes) {
        return Ok(DetectedFormat::Tagged(format));
    }
    if let Some(signature) = legacy_signature(bytes) {
        warn!(signature, "rejecting legacy payload");
        return Err(SerializationError::LegacyFormatRejected {
            signature: signature.to_string(),
        });
    }
    Ok(DetectedFormat::Untagged)
}

/// Envelope metadata of stored bytes, without rebuilding an entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeInfo {
    pub detected: DetectedFormat,
    pub schema_version: Option<String>,
    pub format: Option<String>,
    pub type_name: Option<String>,
    pub module: Option<String>,
    /// Keys of `data`, in stored order
    pub fields: Vec<String>,
    pub payload: JsonValue,
}

impl EnvelopeInfo {
    fn new(detected: DetectedFormat, payload: JsonValue) -> Self {
        let text = |key: &str| payload.get(key).and_then(JsonValue::as_str).map(str::to_string);
        let fields = payload
            .get(DATA_KEY)
            .and_then(JsonValue::as_object)
            .map(|data| data.keys().cloned().collect())
            .unwrap_or_default();

        Self {
            detected,
            schema_version: text(VERSION_KEY),
            format: text(FORMAT_KEY),
            type_name: text(TYPE_KEY),
            module: text(MODULE_KEY),
            fields,
            payload,
        }
    }
}

/// Composes the JSON and MessagePack serializers behind one tagged byte format
#[derive(Debug, Clone)]
pub struct SafeSerializer {
    json: JsonSerializer,
    msgpack: Option<MessagePackSerializer>,
    preferred: Format,
}

impl SafeSerializer {
    pub fn new(registry: TypeRegistry) -> Self {
        Self::from_json(JsonSerializer::new(registry))
    }

    /// Build both codecs from one configured JSON serializer
    pub fn from_json(json: JsonSerializer) -> Self {
        let msgpack = MessagePackSerializer::wrap(json.clone()).ok();
        if msgpack.is_none() {
            debug!("msgpack codec unavailable, facade will write json only");
        }
        Self {
            json,
            msgpack,
            preferred: Format::Json,
        }
    }

    pub fn from_config(registry: TypeRegistry, config: &CodecConfig) -> Result<Self> {
        let json = JsonSerializer::from_config(registry, config)?;
        Ok(Self::from_json(json).with_preferred_format(config.serializer.preferred_format))
    }

    /// Format written when `serialize` is not given one
    pub fn with_preferred_format(mut self, format: Format) -> Self {
        self.preferred = format;
        self
    }

    pub fn register_type<T: Entity>(&mut self) {
        self.json.register_type::<T>();
        if let Some(msgpack) = &mut self.msgpack {
            msgpack.register_type::<T>();
        }
    }

    pub fn register_value_object<T: ValueObject>(&mut self) {
        self.json.register_value_object::<T>();
        if let Some(msgpack) = &mut self.msgpack {
            msgpack.register_value_object::<T>();
        }
    }

    pub fn register_migration(
        &mut self,
        migration: DataMigration,
    ) -> std::result::Result<(), VersionCompatibilityError> {
        if let Some(msgpack) = &mut self.msgpack {
            msgpack.register_migration(migration.clone())?;
        }
        self.json.register_migration(migration)
    }

    pub fn allow_module_rename(&mut self, old: &str, new: &str) {
        self.json.allow_module_rename(old, new);
        if let Some(msgpack) = &mut self.msgpack {
            msgpack.allow_module_rename(old, new);
        }
    }

    pub fn json(&self) -> &JsonSerializer {
        &self.json
    }

    pub fn msgpack(&self) -> Option<&MessagePackSerializer> {
        self.msgpack.as_ref()
    }

    pub fn preferred_format(&self) -> Format {
        self.preferred
    }

    /// Serialize to tagged bytes
    ///
    /// An unavailable MessagePack request quietly writes JSON. A MessagePack
    /// failure is retried once as JSON; if that fails too, both errors are
    /// reported together.
    pub fn serialize<T: Entity>(&self, entity: &T, format: Option<Format>) -> Result<Vec<u8>> {
        let chosen = match format.unwrap_or(self.preferred) {
            Format::MessagePack if self.msgpack.is_none() => {
                debug!(type_name = T::TYPE_NAME, "msgpack requested but unavailable, writing json");
                Format::Json
            }
            other => other,
        };

        match self.encode_with(chosen, entity) {
            Ok(bytes) => Ok(bytes),
            Err(e) if chosen == Format::Json => Err(e),
            Err(primary) => {
                warn!(
                    type_name = T::TYPE_NAME,
                    format = %chosen,
                    error = %primary,
                    "serialization failed, retrying as json"
                );
                self.encode_with(Format::Json, entity).map_err(|fallback| {
                    SerializationError::FallbackFailed {
                        primary: chosen.name().to_string(),
                        primary_error: primary.to_string(),
                        fallback_error: fallback.to_string(),
                    }
                    .into()
                })
            }
        }
    }

    /// Deserialize tagged (or untagged JSON) bytes into an entity
    pub fn deserialize<T: Entity>(&self, bytes: &[u8]) -> Result<T> {
        match detect_format(bytes)? {
            DetectedFormat::Tagged(Format::Json) => {
                self.json.deserialize(strip(bytes, Format::Json))
            }
            DetectedFormat::Tagged(Format::MessagePack) => {
                self.msgpack_codec()?.deserialize(strip(bytes, Format::MessagePack))
            }
            DetectedFormat::Untagged => {
                warn!(type_name = T::TYPE_NAME, "untagged payload, attempting json");
                self.json.deserialize(bytes)
            }
        }
    }

    /// Read envelope metadata, optionally after migrating to the current version
    pub fn inspect(&self, bytes: &[u8], migrate: bool) -> Result<EnvelopeInfo> {
        let detected = detect_format(bytes)?;
        let payload = match detected {
            DetectedFormat::Tagged(Format::Json) => self.json.parse(strip(bytes, Format::Json))?,
            DetectedFormat::Tagged(Format::MessagePack) => {
                self.msgpack_codec()?.parse(strip(bytes, Format::MessagePack))?
            }
            DetectedFormat::Untagged => self.json.parse(bytes)?,
        };
        let payload = if migrate {
            self.json.migrations().migrate_data(payload)?
        } else {
            payload
        };
        Ok(EnvelopeInfo::new(detected, payload))
    }

    fn encode_with<T: Entity>(&self, format: Format, entity: &T) -> Result<Vec<u8>> {
        let body = match format {
            Format::Json => self.json.serialize(entity)?,
            Format::MessagePack => self.msgpack_codec()?.serialize(entity)?,
        };
        let prefix = format.prefix();
        let mut bytes = Vec::with_capacity(prefix.len() + body.len());
        bytes.extend_from_slice(prefix);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    fn msgpack_codec(&self) -> Result<&MessagePackSerializer> {
        self.msgpack.as_ref().ok_or_else(|| {
            CodecError::from(SerializationError::CodecUnavailable(
                Format::MessagePack.name().to_string(),
            ))
        })
    }
}

fn strip(bytes: &[u8], format: Format) -> &[u8] {
    &bytes[format.prefix().len()..]
}
