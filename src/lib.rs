//! Familiar Persist
//!
//! A safe, versioned persistence codec for Familiar entities: typed records
//! go in, tagged byte strings come out, ready for an embedded key-value store.
//!
//! ## Features
//!
//! - **Tagged Envelopes**: Every payload carries its schema version, format, type and module
//! - **Safe Decoding**: Legacy pickle payloads are refused before any decoding happens
//! - **Resource Bounds**: Nesting depth, string length and collection size are capped
//! - **Strict Schemas**: Structural schemas derived from declared entity fields
//! - **Migrations**: Stale payloads are upgraded along a registered version graph
//! - **Two Codecs**: JSON, and MessagePack behind the `msgpack` feature
//!
//! ## Architecture
//!
//! ```text
//! entity ──► JsonSerializer ──► envelope ──► schema check ──► SJSON:/SMSGP: bytes
//!                 ▲                                                │
//!           TypeRegistry                                           ▼
//!                 │                                          key-value store
//! entity ◄── reconstruct ◄── schema check ◄── MigrationManager ◄───┘
//! ```
//!
//! Registration (`register_type`, `register_value_object`,
//! `register_migration`) takes `&mut self` and happens at start-up; after
//! that a serializer is shared read-only across threads.

pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod migration;
pub mod registry;
pub mod repository;
pub mod schema;
pub mod value;
pub mod version;

pub use codec::{
    detect_format, DetectedFormat, EnvelopeInfo, Format, JsonSerializer, MessagePackSerializer,
    ModuleAliases, SafeSerializer,
};
pub use config::{CodecConfig, Limits, ModuleAlias};
pub use entity::{Entity, FieldDecl, FieldKind, FieldMap, ValueObject};
pub use error::{
    CodecError, Result, SchemaValidationError, SerializationError, VersionCompatibilityError,
};
pub use migration::{CompatibilityStrategy, DataMigration, MigrationKind, MigrationManager};
pub use registry::{TypeDescriptor, TypeKind, TypeRegistry};
pub use repository::{KvStore, MemoryStore, Repository, RepositoryError};
pub use schema::{Constraint, Schema, SchemaBuilder, SchemaField, SchemaTag};
pub use value::{FromValue, Record, ToValue, Value};
pub use version::VersionInfo;
