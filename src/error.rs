//! Error types for the persistence codec
//!
//! Three families, one per failure domain:
//! - [`SerializationError`]: encode/decode, bounds, type/module/format mismatch
//! - [`SchemaValidationError`]: structural or constraint violations
//! - [`VersionCompatibilityError`]: version tags, strategies, migration paths
//!
//! [`CodecError`] wraps all three for call sites that can hit any of them.

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Encoding and decoding failures
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Maximum nesting depth {max} exceeded at {path}")]
    DepthExceeded { max: usize, path: String },

    #[error("String of length {length} at {path} exceeds maximum {max}")]
    StringTooLong { length: usize, max: usize, path: String },

    #[error("Collection of size {size} at {path} exceeds maximum {max}")]
    CollectionTooLarge { size: usize, max: usize, path: String },

    #[error("Cannot encode value at {path}: {reason}")]
    Unsupported { path: String, reason: String },

    #[error("Invalid wire value at {path}: {reason}")]
    InvalidWireValue { path: String, reason: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Module mismatch for {type_name}: expected {expected}, found {found}")]
    ModuleMismatch {
        type_name: String,
        expected: String,
        found: String,
    },

    #[error("Format mismatch: expected {expected}, found {found}")]
    FormatMismatch { expected: String, found: String },

    #[error("Missing field '{field}' while reconstructing {type_name}")]
    MissingField { type_name: String, field: String },

    #[error("Invalid value for field '{field}' of {type_name}: {reason}")]
    InvalidField {
        type_name: String,
        field: String,
        reason: String,
    },

    #[error("Unknown type '{0}' is not registered")]
    UnknownType(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Refusing to decode legacy {signature} payload: unsafe deserialization format")]
    LegacyFormatRejected { signature: String },

    #[error("Codec '{0}' is unavailable in this build")]
    CodecUnavailable(String),

    #[error("{primary} serialization failed ({primary_error}); JSON fallback also failed ({fallback_error})")]
    FallbackFailed {
        primary: String,
        primary_error: String,
        fallback_error: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack error: {0}")]
    MessagePack(String),
}

/// Structural or constraint violations found by the schema validator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaValidationError {
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("{path}: null is not allowed")]
    NullNotAllowed { path: String },

    #[error("{path}: missing required property '{property}'")]
    MissingProperty { path: String, property: String },

    #[error("{path}: unexpected properties {}", .properties.join(", "))]
    UnexpectedProperties { path: String, properties: Vec<String> },

    #[error("{path}: {message}")]
    ConstraintViolation { path: String, message: String },

    #[error("{path}: {message}")]
    InvalidFormat { path: String, message: String },

    #[error("{path}: no schema definition for record '{name}'")]
    UnknownDefinition { path: String, name: String },

    #[error("Cannot derive schema for {type_name}: {reason}")]
    Derivation { type_name: String, reason: String },
}

impl SchemaValidationError {
    /// The path of the offending value, if the error is tied to one
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::TypeMismatch { path, .. }
            | Self::NullNotAllowed { path }
            | Self::MissingProperty { path, .. }
            | Self::UnexpectedProperties { path, .. }
            | Self::ConstraintViolation { path, .. }
            | Self::InvalidFormat { path, .. }
            | Self::UnknownDefinition { path, .. } => Some(path),
            Self::Derivation { .. } => None,
        }
    }
}

/// Version tag and migration failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VersionCompatibilityError {
    #[error("Payload has no schema version")]
    MissingVersion,

    #[error("Invalid version '{0}': expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("Version {found} is incompatible with {current} under {strategy} strategy")]
    Incompatible {
        found: String,
        current: String,
        strategy: String,
    },

    #[error("No migration path from {from} to {to}")]
    NoMigrationPath { from: String, to: String },

    #[error("Invalid migration {from} -> {to}: {reason}")]
    InvalidMigration {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Migration {from} -> {to} failed: {reason}")]
    MigrationFailed {
        from: String,
        to: String,
        reason: String,
    },
}

/// Any failure the codec can surface
#[derive(Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("Schema validation failed: {0}")]
    Schema(#[from] SchemaValidationError),

    #[error("Version compatibility error: {0}")]
    Version(#[from] VersionCompatibilityError),
}

impl CodecError {
    /// True when the payload was rejected as an unsafe legacy format
    pub fn is_legacy_rejection(&self) -> bool {
        matches!(
            self,
            CodecError::Serialization(SerializationError::LegacyFormatRejected { .. })
        )
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Serialization(SerializationError::Json(e))
    }
}
