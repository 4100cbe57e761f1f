//! Resource bounds and unsafe-format rejection

mod common;

use std::collections::BTreeMap;

use common::{chain, codec, document, registry, Document, Node, Person};
use familiar_persist::{
    CodecError, Format, JsonSerializer, Limits, SafeSerializer, SchemaValidationError,
    SerializationError,
};
use proptest::prelude::*;

fn serialization_error(err: CodecError) -> SerializationError {
    match err {
        CodecError::Serialization(e) => e,
        other => panic!("expected a serialization error, got {:?}", other),
    }
}

// =============================================================================
// Depth
// =============================================================================

#[test]
fn test_depth_100_is_accepted() {
    let codec = codec();
    let node = chain(100);
    let bytes = codec.serialize(&node, Some(Format::Json)).unwrap();
    let back: Node = codec.deserialize(&bytes).unwrap();
    assert_eq!(back, node);
}

#[test]
fn test_depth_101_is_rejected_on_write() {
    let codec = codec();
    let err = codec.serialize(&chain(101), Some(Format::Json)).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::DepthExceeded { max: 100, .. }
    ));
}

#[test]
fn test_depth_101_is_rejected_on_read() {
    let deep = JsonSerializer::new(registry()).with_limits(Limits {
        max_depth: 200,
        ..Limits::default()
    });
    let bytes = deep.serialize(&chain(101)).unwrap();

    let codec = codec();
    let err = codec.deserialize::<Node>(&bytes).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::DepthExceeded { max: 100, .. }
    ));
}

#[test]
fn test_hostile_nesting_fails_before_parsing() {
    let codec = codec();
    let bytes = format!("SJSON:{}{}", "[".repeat(100_000), "]".repeat(100_000));
    let err = codec.deserialize::<Node>(bytes.as_bytes()).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::DepthExceeded { .. }
    ));
}

// =============================================================================
// Size
// =============================================================================

#[test]
fn test_string_over_default_limit() {
    let codec = codec();
    let mut doc = document();
    doc.body = "a".repeat(1_000_001);
    let err = codec.serialize(&doc, Some(Format::Json)).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::StringTooLong { length: 1_000_001, max: 1_000_000, .. }
    ));

    doc.body = "a".repeat(1_000_000);
    assert!(codec.serialize(&doc, Some(Format::Json)).is_ok());
}

#[test]
fn test_list_over_default_limit() {
    let codec = codec();
    let mut doc = document();
    doc.items = (0..10_001).collect();
    let err = codec.serialize(&doc, Some(Format::Json)).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::CollectionTooLarge { size: 10_001, max: 10_000, .. }
    ));
}

#[test]
fn test_map_over_configured_limit() {
    let json = JsonSerializer::new(registry()).with_limits(Limits {
        max_collection_size: 4,
        ..Limits::default()
    });
    let mut doc = document();
    doc.meta = (0..5).map(|i| (format!("k{}", i), "v".to_string())).collect::<BTreeMap<_, _>>();

    let err = json.serialize(&doc).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::CollectionTooLarge { size: 5, max: 4, .. }
    ));
}

#[test]
fn test_limits_apply_on_read() {
    let bytes = JsonSerializer::new(registry()).serialize(&document()).unwrap();
    let strict = JsonSerializer::new(registry()).with_limits(Limits {
        max_string_length: 3,
        ..Limits::default()
    });
    let err = strict.deserialize::<Document>(&bytes).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::StringTooLong { .. }
    ));
}

// =============================================================================
// Legacy formats
// =============================================================================

#[test]
fn test_legacy_signatures_are_rejected() {
    let codec = codec();
    let cases: [&[u8]; 3] = [
        b"\x80\x04\x95\x10\x00",
        b"\x80\x05\x95\x10\x00",
        b"PICKLE:gASVEAAAAAAAAAB9lC4=",
    ];
    for bytes in cases {
        let err = codec.deserialize::<Person>(bytes).unwrap_err();
        assert!(err.is_legacy_rejection(), "not rejected: {:?}", err);

        let err = codec.deserialize::<Document>(bytes).unwrap_err();
        assert!(err.is_legacy_rejection());
    }
}

proptest! {
    #[test]
    fn prop_legacy_prefix_always_rejected(
        magic in prop_oneof![
            Just(b"\x80\x04".to_vec()),
            Just(b"\x80\x05".to_vec()),
            Just(b"PICKLE:".to_vec()),
        ],
        tail in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let codec = SafeSerializer::new(registry());
        let mut bytes = magic;
        bytes.extend(tail);
        let err = codec.deserialize::<Document>(&bytes).unwrap_err();
        prop_assert!(err.is_legacy_rejection());
    }
}

// =============================================================================
// Schema strictness
// =============================================================================

#[test]
fn test_undeclared_property_is_rejected() {
    let codec = codec();
    let bytes = codec.serialize(&document(), Some(Format::Json)).unwrap();
    let text = String::from_utf8(bytes)
        .unwrap()
        .replace(r#""body":"hello""#, r#""body":"hello","extra":1"#);

    let err = codec.deserialize::<Document>(text.as_bytes()).unwrap_err();
    match err {
        CodecError::Schema(SchemaValidationError::UnexpectedProperties { properties, .. }) => {
            assert_eq!(properties, vec!["extra".to_string()]);
        }
        other => panic!("expected unexpected-properties error, got {:?}", other),
    }
}

#[test]
fn test_boolean_is_not_an_integer() {
    let codec = codec();
    let bytes = codec.serialize(&document(), Some(Format::Json)).unwrap();
    let text = String::from_utf8(bytes).unwrap().replace("[1,2,3]", "[1,true,3]");

    let err = codec.deserialize::<Document>(text.as_bytes()).unwrap_err();
    assert!(matches!(err, CodecError::Schema(SchemaValidationError::TypeMismatch { .. })));
}

#[test]
fn test_wrong_target_type_is_rejected() {
    let codec = codec();
    let bytes = codec.serialize(&document(), None).unwrap();
    let err = codec.deserialize::<Node>(&bytes).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::TypeMismatch { .. }
    ));
}

#[test]
fn test_unregistered_nested_type_is_an_error() {
    // Address and Email are missing from this registry
    let codec = SafeSerializer::new(Default::default());
    let err = codec.serialize(&common::person(), Some(Format::Json)).unwrap_err();
    assert!(matches!(
        serialization_error(err),
        SerializationError::UnknownType(name) if name == "Email"
    ));
}
