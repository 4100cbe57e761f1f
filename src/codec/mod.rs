//! Wire codecs
//!
//! ```text
//! SJSON:{"__schema_version__":"1.0.0","__format__":"json","__type__":"Task",
//!        "__module__":"familiar.tasks","data":{...}}
//! SMSGP:<msgpack of the same object graph>
//! ```
//!
//! [`JsonSerializer`] owns the envelope and value-tagging logic;
//! [`MessagePackSerializer`] reuses it and swaps the byte codec;
//! [`SafeSerializer`] picks a codec by prefix tag and refuses legacy formats.

pub mod facade;
pub mod json;
pub mod msgpack;

pub use facade::{detect_format, DetectedFormat, EnvelopeInfo, SafeSerializer};
pub use json::JsonSerializer;
pub use msgpack::MessagePackSerializer;

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SerializationError;

// Envelope keys
pub const VERSION_KEY: &str = "__schema_version__";
pub const FORMAT_KEY: &str = "__format__";
pub const TYPE_KEY: &str = "__type__";
pub const MODULE_KEY: &str = "__module__";
pub const DATA_KEY: &str = "data";

// Sentinel keys
pub const UUID_KEY: &str = "__uuid__";
pub const DATETIME_KEY: &str = "__datetime__";
pub const VALUE_OBJECT_KEY: &str = "__value_object__";
pub const VALUE_KEY: &str = "value";
pub const DATACLASS_KEY: &str = "__dataclass__";
pub const SET_KEY: &str = "__set__";
pub const TUPLE_KEY: &str = "__tuple__";
pub const STR_KEY: &str = "__str__";
pub const STR_TYPE_KEY: &str = "__type__";

/// Byte-level payload format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Format {
    #[default]
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "msgpack")]
    MessagePack,
}

impl Format {
    /// Name written into `__format__`
    pub fn name(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::MessagePack => "msgpack",
        }
    }

    /// ASCII tag prepended to stored bytes
    pub fn prefix(&self) -> &'static [u8] {
        match self {
            Format::Json => b"SJSON:",
            Format::MessagePack => b"SMSGP:",
        }
    }

    /// Match a stored byte string against the known prefixes
    pub fn from_prefix(bytes: &[u8]) -> Option<Format> {
        [Format::Json, Format::MessagePack]
            .into_iter()
            .find(|f| bytes.starts_with(f.prefix()))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unsafe legacy payload signatures: pickle protocol 4 and 5 headers and
/// the explicit `PICKLE:` tag. These are never decoded.
pub const LEGACY_SIGNATURES: &[(&[u8], &str)] = &[
    (&[0x80, 0x04], "pickle protocol 4"),
    (&[0x80, 0x05], "pickle protocol 5"),
    (b"PICKLE:".as_slice(), "PICKLE"),
];

/// Name of the legacy format `bytes` starts with, if any
pub fn legacy_signature(bytes: &[u8]) -> Option<&'static str> {
    LEGACY_SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, name)| *name)
}

/// ISO-8601 form written for datetimes
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse an ISO-8601 datetime; offset-less values are taken as UTC
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Explicitly allowed `(old, new)` module renames
#[derive(Debug, Clone, Default)]
pub struct ModuleAliases {
    pairs: HashSet<(String, String)>,
}

impl ModuleAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow payloads stamped with `old` to load into types living in `new`
    pub fn allow(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.pairs.insert((old.into(), new.into()));
    }

    /// Whether a stored module name is acceptable for the expected one
    pub fn accepts(&self, found: &str, expected: &str) -> bool {
        found == expected || self.pairs.contains(&(found.to_string(), expected.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Reject JSON text nested deeper than `limit` before handing it to the parser
///
/// The logical depth check happens during decoding; this bounds the parser's
/// own recursion on hostile input.
pub(crate) fn check_json_nesting(bytes: &[u8], limit: usize) -> Result<(), SerializationError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &b in bytes {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > limit {
                    return Err(SerializationError::DepthExceeded {
                        max: limit,
                        path: "<json>".to_string(),
                    });
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}
