//! Shared entity fixtures for integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use familiar_persist::{
    fields, impl_entity_value, impl_value_object_value, Entity, FieldDecl, FieldKind, FieldMap,
    SafeSerializer, SerializationError, TypeRegistry, Value, ValueObject,
};
use uuid::Uuid;

// =============================================================================
// Value objects
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Email(pub String);

impl ValueObject for Email {
    const TYPE_NAME: &'static str = "Email";
    const MODULE: &'static str = "familiar.identity";

    fn inner_kind() -> FieldKind {
        FieldKind::String
    }

    fn to_inner(&self) -> Value {
        Value::String(self.0.clone())
    }

    fn from_inner(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::String(s) => Ok(Email(s)),
            other => Err(SerializationError::TypeMismatch {
                expected: "string".to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }
}
impl_value_object_value!(Email);

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: String,
}

impl Entity for Address {
    const TYPE_NAME: &'static str = "Address";
    const MODULE: &'static str = "familiar.identity";

    fn fields() -> Vec<FieldDecl> {
        vec![FieldDecl::of::<String>("street"), FieldDecl::of::<String>("city")]
    }

    fn to_fields(&self) -> Vec<(String, Value)> {
        fields![street => self.street, city => self.city]
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, SerializationError> {
        Ok(Self {
            street: fields.required("street")?,
            city: fields.required("city")?,
        })
    }
}
impl_entity_value!(Address);

/// Exercises every supported field shape
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub age: i64,
    pub score: f64,
    pub active: bool,
    pub email: Email,
    pub created: DateTime<Utc>,
    pub tags: Vec<String>,
    pub counters: BTreeMap<String, i64>,
    pub roles: BTreeSet<String>,
    pub location: (f64, f64),
    pub address: Option<Address>,
    pub nickname: Option<String>,
}

impl Entity for Person {
    const TYPE_NAME: &'static str = "Person";
    const MODULE: &'static str = "familiar.identity";

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::of::<Uuid>("id"),
            FieldDecl::of::<String>("name"),
            FieldDecl::of::<i64>("age"),
            FieldDecl::of::<f64>("score"),
            FieldDecl::of::<bool>("active"),
            FieldDecl::of::<Email>("email"),
            FieldDecl::of::<DateTime<Utc>>("created"),
            FieldDecl::of::<Vec<String>>("tags"),
            FieldDecl::of::<BTreeMap<String, i64>>("counters"),
            FieldDecl::of::<BTreeSet<String>>("roles"),
            FieldDecl::of::<(f64, f64)>("location"),
            FieldDecl::of::<Option<Address>>("address"),
            FieldDecl::of::<Option<String>>("nickname").with_default(),
        ]
    }

    fn to_fields(&self) -> Vec<(String, Value)> {
        fields![
            id => self.id,
            name => self.name,
            age => self.age,
            score => self.score,
            active => self.active,
            email => self.email,
            created => self.created,
            tags => self.tags,
            counters => self.counters,
            roles => self.roles,
            location => self.location,
            address => self.address,
            nickname => self.nickname,
        ]
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, SerializationError> {
        Ok(Self {
            id: fields.required("id")?,
            name: fields.required("name")?,
            age: fields.required("age")?,
            score: fields.required("score")?,
            active: fields.required("active")?,
            email: fields.required("email")?,
            created: fields.required("created")?,
            tags: fields.required("tags")?,
            counters: fields.required("counters")?,
            roles: fields.required("roles")?,
            location: fields.required("location")?,
            address: fields.optional("address")?,
            nickname: fields.optional("nickname")?,
        })
    }
}

pub fn person() -> Person {
    Person {
        id: Uuid::parse_str("6f1c1d1e-8a6b-4c53-9a51-3f7e0f1b2c3d").unwrap(),
        name: "Ada".to_string(),
        age: 36,
        score: 99.5,
        active: true,
        email: Email("ada@example.com".to_string()),
        created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        tags: vec!["a".to_string(), "b".to_string()],
        counters: [("logins".to_string(), 3), ("edits".to_string(), 12)].into_iter().collect(),
        roles: ["admin".to_string(), "author".to_string()].into_iter().collect(),
        location: (51.5, -0.125),
        address: Some(Address {
            street: "1 Analytical Way".to_string(),
            city: "London".to_string(),
        }),
        nickname: None,
    }
}

/// Linked chain of nested records
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: i64,
    pub child: Option<Box<Node>>,
}

impl Entity for Node {
    const TYPE_NAME: &'static str = "Node";
    const MODULE: &'static str = "familiar.test";

    fn fields() -> Vec<FieldDecl> {
        vec![FieldDecl::of::<i64>("value"), FieldDecl::of::<Option<Box<Node>>>("child")]
    }

    fn to_fields(&self) -> Vec<(String, Value)> {
        fields![value => self.value, child => self.child]
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, SerializationError> {
        Ok(Self {
            value: fields.required("value")?,
            child: fields.optional("child")?,
        })
    }
}
impl_entity_value!(Node);

/// A root node whose `child` chain holds `nested` records
pub fn chain(nested: usize) -> Node {
    let mut node = Node { value: 0, child: None };
    for i in 1..=nested {
        node = Node {
            value: i as i64,
            child: Some(Box::new(node)),
        };
    }
    node
}

/// Free-form document for size limits
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub body: String,
    pub items: Vec<i64>,
    pub meta: BTreeMap<String, String>,
}

impl Entity for Document {
    const TYPE_NAME: &'static str = "Document";
    const MODULE: &'static str = "familiar.docs";

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::of::<String>("body"),
            FieldDecl::of::<Vec<i64>>("items"),
            FieldDecl::of::<BTreeMap<String, String>>("meta"),
        ]
    }

    fn to_fields(&self) -> Vec<(String, Value)> {
        fields![body => self.body, items => self.items, meta => self.meta]
    }

    fn from_fields(mut fields: FieldMap) -> Result<Self, SerializationError> {
        Ok(Self {
            body: fields.required("body")?,
            items: fields.required("items")?,
            meta: fields.required("meta")?,
        })
    }
}

pub fn document() -> Document {
    Document {
        body: "hello".to_string(),
        items: vec![1, 2, 3],
        meta: BTreeMap::new(),
    }
}

/// Registry holding every nested fixture type
pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register_type::<Address>()
        .register_type::<Node>()
        .register_value_object::<Email>();
    registry
}

pub fn codec() -> SafeSerializer {
    SafeSerializer::new(registry())
}
