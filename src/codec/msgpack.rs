//! MessagePack entity serializer
//!
//! Same envelope and tagging as [`JsonSerializer`]; only the byte codec
//! differs.

use serde_json::Value as JsonValue;

use super::{Format, JsonSerializer};
use crate::config::CodecConfig;
use crate::entity::{Entity, ValueObject};
use crate::error::{Result, SerializationError, VersionCompatibilityError};
use crate::migration::DataMigration;
use crate::registry::TypeRegistry;

#[derive(Debug, Clone)]
pub struct MessagePackSerializer {
    inner: JsonSerializer,
}

impl MessagePackSerializer {
    /// Whether this build carries the MessagePack codec
    pub const fn is_available() -> bool {
        cfg!(feature = "msgpack")
    }

    pub fn new(registry: TypeRegistry) -> Result<Self> {
        Self::wrap(JsonSerializer::new(registry))
    }

    pub fn from_config(registry: TypeRegistry, config: &CodecConfig) -> Result<Self> {
        Self::wrap(JsonSerializer::from_config(registry, config)?)
    }

    /// Reuse a configured JSON serializer's registry, limits and migrations
    pub fn wrap(json: JsonSerializer) -> Result<Self> {
        if !Self::is_available() {
            return Err(SerializationError::CodecUnavailable(
                Format::MessagePack.name().to_string(),
            )
            .into());
        }
        Ok(Self {
            inner: json.with_format(Format::MessagePack),
        })
    }

    pub fn register_type<T: Entity>(&mut self) {
        self.inner.register_type::<T>();
    }

    pub fn register_value_object<T: ValueObject>(&mut self) {
        self.inner.register_value_object::<T>();
    }

    pub fn register_migration(
        &mut self,
        migration: DataMigration,
    ) -> std::result::Result<(), VersionCompatibilityError> {
        self.inner.register_migration(migration)
    }

    pub fn allow_module_rename(&mut self, old: &str, new: &str) {
        self.inner.allow_module_rename(old, new);
    }

    /// The envelope codec this serializer delegates to
    pub fn envelope_codec(&self) -> &JsonSerializer {
        &self.inner
    }

    pub fn serialize<T: Entity>(&self, entity: &T) -> Result<Vec<u8>> {
        let envelope = self.inner.encode_envelope(entity)?;
        Ok(pack(&envelope)?)
    }

    pub fn deserialize<T: Entity>(&self, bytes: &[u8]) -> Result<T> {
        let payload = self.parse(bytes)?;
        self.inner.decode_envelope(payload)
    }

    /// Unpack bytes into the generic envelope form
    pub fn parse(&self, bytes: &[u8]) -> std::result::Result<JsonValue, SerializationError> {
        unpack(bytes)
    }
}

#[cfg(feature = "msgpack")]
fn pack(value: &JsonValue) -> std::result::Result<Vec<u8>, SerializationError> {
    rmp_serde::to_vec(value).map_err(|e| SerializationError::MessagePack(e.to_string()))
}

#[cfg(feature = "msgpack")]
fn unpack(bytes: &[u8]) -> std::result::Result<JsonValue, SerializationError> {
    rmp_serde::from_slice(bytes).map_err(|e| SerializationError::MessagePack(e.to_string()))
}

#[cfg(not(feature = "msgpack"))]
fn pack(_value: &JsonValue) -> std::result::Result<Vec<u8>, SerializationError> {
    Err(SerializationError::CodecUnavailable(Format::MessagePack.name().to_string()))
}

#[cfg(not(feature = "msgpack"))]
fn unpack(_bytes: &[u8]) -> std::result::Result<JsonValue, SerializationError> {
    Err(SerializationError::CodecUnavailable(Format::MessagePack.name().to_string()))
}
