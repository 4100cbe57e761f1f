//! Round-trip tests through the tagged facade

mod common;

use chrono::{TimeZone, Utc};
use common::{codec, person, Address, Person};
use familiar_persist::{
    fields, DetectedFormat, Entity, FieldDecl, FieldMap, Format, JsonSerializer, MemoryStore,
    MessagePackSerializer, Repository, SafeSerializer, SerializationError, Value,
};
use serde_json::json;

// =============================================================================
// JSON
// =============================================================================

#[test]
fn test_json_roundtrip_all_shapes() {
    let codec = codec();
    let original = person();
    let bytes = codec.serialize(&original, Some(Format::Json)).unwrap();
    assert!(bytes.starts_with(b"SJSON:"));

    let back: Person = codec.deserialize(&bytes).unwrap();
    assert_eq!(back, original);
}

#[test]
fn test_json_wire_form() {
    let codec = codec();
    let bytes = codec.serialize(&person(), Some(Format::Json)).unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&bytes[6..]).unwrap();

    let keys: Vec<&str> = envelope.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec!["__schema_version__", "__format__", "__type__", "__module__", "data"]
    );

    let data = &envelope["data"];
    assert_eq!(data["id"], json!({ "__uuid__": "6f1c1d1e-8a6b-4c53-9a51-3f7e0f1b2c3d" }));
    assert_eq!(data["created"], json!({ "__datetime__": "2024-01-01T00:00:00+00:00" }));
    assert_eq!(data["email"], json!({ "__value_object__": "Email", "value": "ada@example.com" }));
    assert_eq!(data["roles"], json!({ "__set__": ["admin", "author"] }));
    assert_eq!(data["location"], json!({ "__tuple__": [51.5, -0.125] }));
    assert_eq!(data["counters"], json!({ "edits": 12, "logins": 3 }));
    assert_eq!(
        data["address"],
        json!({
            "__dataclass__": "Address",
            "__module__": "familiar.identity",
            "data": { "street": "1 Analytical Way", "city": "London" }
        })
    );
    assert_eq!(data["nickname"], json!(null));
}

#[test]
fn test_optional_nested_record_absent() {
    let codec = codec();
    let mut original = person();
    original.address = None;
    original.nickname = Some("Countess".to_string());

    let bytes = codec.serialize(&original, None).unwrap();
    let back: Person = codec.deserialize(&bytes).unwrap();
    assert_eq!(back, original);
}

#[test]
fn test_scenario_uuid_datetime_tags() {
    let codec = codec();
    let bytes = codec.serialize(&person(), Some(Format::Json)).unwrap();

    let info = codec.inspect(&bytes, false).unwrap();
    assert_eq!(info.detected, DetectedFormat::Tagged(Format::Json));
    assert_eq!(info.payload["data"]["tags"], json!(["a", "b"]));

    let back: Person = codec.deserialize(&bytes).unwrap();
    assert_eq!(back.created, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(back.tags, vec!["a", "b"]);
}

#[test]
fn test_untagged_json_is_accepted() {
    let codec = codec();
    let raw = codec.json().serialize(&person()).unwrap();
    assert!(raw.starts_with(b"{"));

    let back: Person = codec.deserialize(&raw).unwrap();
    assert_eq!(back, person());
}

#[test]
fn test_offsetless_datetime_reads_as_utc() {
    let codec = codec();
    let bytes = codec.serialize(&person(), Some(Format::Json)).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let naive = text.replace("2024-01-01T00:00:00+00:00", "2024-01-01T00:00:00");

    let back: Person = codec.deserialize(naive.as_bytes()).unwrap();
    assert_eq!(back.created, person().created);
}

#[test]
fn test_nested_record_from_renamed_module() {
    let mut codec = codec();
    let bytes = codec.serialize(&person(), Some(Format::Json)).unwrap();
    let text = String::from_utf8(bytes).unwrap().replace(
        r#""__dataclass__":"Address","__module__":"familiar.identity""#,
        r#""__dataclass__":"Address","__module__":"familiar.people""#,
    );

    assert!(codec.deserialize::<Person>(text.as_bytes()).is_err());

    codec.allow_module_rename("familiar.people", "familiar.identity");
    let back: Person = codec.deserialize(text.as_bytes()).unwrap();
    assert_eq!(
        back.address,
        Some(Address {
            street: "1 Analytical Way".to_string(),
            city: "London".to_string(),
        })
    );
}

#[test]
fn test_standalone_json_serializer() {
    let mut json = JsonSerializer::new(Default::default());
    json.register_type::<Address>();
    json.register_type::<common::Node>();
    json.register_value_object::<common::Email>();

    let bytes = json.serialize(&person()).unwrap();
    assert_eq!(json.deserialize::<Person>(&bytes).unwrap(), person());
}

/// Entity with an untyped field
#[derive(Debug, Clone, PartialEq)]
struct Setting {
    key: String,
    value: Value,
}

impl Entity for Setting {
    const TYPE_NAME: &'static str = "Setting";
    const MODULE: &'static str = "familiar.settings";

    fn fields() -> Vec<FieldDecl> {
        vec![FieldDecl::of::<String>("key"), FieldDecl::of::<Value>("value")]
    }

    fn to_fields(&self) -> Vec<(String, Value)> {
        fields![key => self.key, value => self.value]
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, SerializationError> {
        Ok(Self {
            key: fields.required("key")?,
            value: fields.required("value")?,
        })
    }
}

#[test]
fn test_untyped_field_holds_any_value() {
    let codec = codec();
    let values = [
        Value::Int(3),
        Value::String("dark".to_string()),
        Value::List(vec![Value::Int(1), Value::String("two".to_string())]),
        Value::Null,
    ];
    for value in values {
        let setting = Setting {
            key: "theme".to_string(),
            value,
        };
        let bytes = codec.serialize(&setting, Some(Format::Json)).unwrap();
        assert_eq!(codec.deserialize::<Setting>(&bytes).unwrap(), setting);
    }
}

// =============================================================================
// Sharing across threads
// =============================================================================

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn test_codecs_are_send_and_sync() {
    assert_send_sync::<JsonSerializer>();
    assert_send_sync::<MessagePackSerializer>();
    assert_send_sync::<SafeSerializer>();
    assert_send_sync::<Repository<MemoryStore>>();
}

#[test]
fn test_concurrent_reads_share_one_codec() {
    let codec = codec();
    let bytes = codec.serialize(&person(), Some(Format::Json)).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| codec.deserialize::<Person>(&bytes).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), person());
        }
    });
}

// =============================================================================
// MessagePack
// =============================================================================

#[cfg(feature = "msgpack")]
#[test]
fn test_msgpack_roundtrip_all_shapes() {
    let codec = codec();
    let original = person();
    let bytes = codec.serialize(&original, Some(Format::MessagePack)).unwrap();
    assert!(bytes.starts_with(b"SMSGP:"));

    let back: Person = codec.deserialize(&bytes).unwrap();
    assert_eq!(back, original);
}

#[cfg(feature = "msgpack")]
#[test]
fn test_msgpack_carries_the_same_graph() {
    let codec = codec();
    let json_info = codec
        .inspect(&codec.serialize(&person(), Some(Format::Json)).unwrap(), false)
        .unwrap();
    let msgpack_info = codec
        .inspect(&codec.serialize(&person(), Some(Format::MessagePack)).unwrap(), false)
        .unwrap();

    assert_eq!(msgpack_info.format.as_deref(), Some("msgpack"));
    assert_eq!(json_info.payload["data"], msgpack_info.payload["data"]);
}

#[cfg(feature = "msgpack")]
#[test]
fn test_standalone_msgpack_serializer() {
    let mut msgpack = MessagePackSerializer::new(common::registry()).unwrap();
    msgpack.register_type::<Person>();
    let bytes = msgpack.serialize(&person()).unwrap();
    assert_eq!(msgpack.deserialize::<Person>(&bytes).unwrap(), person());
}

#[cfg(not(feature = "msgpack"))]
#[test]
fn test_msgpack_unavailable_falls_back_to_json() {
    assert!(!MessagePackSerializer::is_available());
    assert!(MessagePackSerializer::new(common::registry()).is_err());

    let codec = codec();
    let bytes = codec.serialize(&person(), Some(Format::MessagePack)).unwrap();
    assert!(bytes.starts_with(b"SJSON:"));
}
