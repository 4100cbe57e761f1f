//! Entity repository over a byte-oriented key-value store
//!
//! The store only ever sees opaque tagged bytes. Codec failures surface as
//! [`RepositoryError`]s that keep the key and the underlying [`CodecError`],
//! so corrupt data, legacy payloads and schema drift stay distinguishable.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{Format, SafeSerializer};
use crate::entity::Entity;
use crate::error::{CodecError, SerializationError};
use crate::migration::BoxError;

/// Minimal key-value contract the repository needs
pub trait KvStore {
    /// Value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError>;

    /// Create or replace the value under `key`
    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BoxError>;

    /// Remove `key`; returns whether it existed
    fn delete(&self, key: &str) -> Result<bool, BoxError>;
}

/// In-process store, mostly for tests and tooling
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BoxError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, BoxError> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

/// Failures of repository operations
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Failed to encode '{key}': {source}")]
    Encode { key: String, source: CodecError },

    #[error("Failed to decode '{key}': {source}")]
    Decode { key: String, source: CodecError },

    #[error("Storage failure for '{key}': {source}")]
    Storage { key: String, source: BoxError },
}

impl RepositoryError {
    pub fn key(&self) -> &str {
        match self {
            Self::Encode { key, .. } | Self::Decode { key, .. } | Self::Storage { key, .. } => key,
        }
    }

    /// The codec failure behind an encode or decode error
    pub fn codec_error(&self) -> Option<&CodecError> {
        match self {
            Self::Encode { source, .. } | Self::Decode { source, .. } => Some(source),
            Self::Storage { .. } => None,
        }
    }

    /// Whether the stored bytes were refused as a legacy format
    pub fn is_legacy_rejection(&self) -> bool {
        self.codec_error().is_some_and(CodecError::is_legacy_rejection)
    }

    /// Whether the stored bytes no longer match the entity's schema
    pub fn is_schema_drift(&self) -> bool {
        matches!(self.codec_error(), Some(CodecError::Schema(_)))
    }

    /// Whether the stored bytes could not be parsed at all
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self.codec_error(),
            Some(CodecError::Serialization(
                SerializationError::Json(_)
                    | SerializationError::MessagePack(_)
                    | SerializationError::MalformedEnvelope(_)
            ))
        )
    }
}

/// Typed access to entities kept in a [`KvStore`]
#[derive(Debug)]
pub struct Repository<S> {
    store: S,
    codec: SafeSerializer,
    format: Option<Format>,
}

impl<S: KvStore> Repository<S> {
    pub fn new(store: S, codec: SafeSerializer) -> Self {
        Self {
            store,
            codec,
            format: None,
        }
    }

    /// Write with `format` instead of the codec's preferred format
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &SafeSerializer {
        &self.codec
    }

    pub fn save<T: Entity>(&self, key: &str, entity: &T) -> Result<(), RepositoryError> {
        let bytes = self
            .codec
            .serialize(entity, self.format)
            .map_err(|source| RepositoryError::Encode {
                key: key.to_string(),
                source,
            })?;
        debug!(key, type_name = T::TYPE_NAME, bytes = bytes.len(), "saving entity");
        self.store.put(key, bytes).map_err(|source| RepositoryError::Storage {
            key: key.to_string(),
            source,
        })
    }

    pub fn load<T: Entity>(&self, key: &str) -> Result<Option<T>, RepositoryError> {
        let Some(bytes) = self.store.get(key).map_err(|source| RepositoryError::Storage {
            key: key.to_string(),
            source,
        })?
        else {
            return Ok(None);
        };

        self.codec.deserialize(&bytes).map(Some).map_err(|source| {
            warn!(key, type_name = T::TYPE_NAME, error = %source, "failed to load entity");
            RepositoryError::Decode {
                key: key.to_string(),
                source,
            }
        })
    }

    pub fn remove(&self, key: &str) -> Result<bool, RepositoryError> {
        self.store.delete(key).map_err(|source| RepositoryError::Storage {
            key: key.to_string(),
            source,
        })
    }
}
