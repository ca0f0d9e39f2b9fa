//! Shared fixtures for the integration tests
//!
//! Every fixture runs against [`MemoryBackend`] so the tests need no cluster.

#![allow(dead_code)]

use es_indexable::{
    FieldDef, FieldKind, IndexConfig, Manager, MemoryBackend, ModelMeta, ModelRegistry, Record,
    SearchBackend, Settings, Value,
};
use std::sync::Arc;

pub const INDEX: &str = "es_indexable_test";

pub fn settings() -> Arc<Settings> {
    Arc::new(
        Settings::builder()
            .default_index(INDEX)
            .reindex_chunk_size(2)
            .build(),
    )
}

pub fn test_model() -> ModelMeta {
    ModelMeta::builder("TestModel")
        .nullable_field("first_name", FieldKind::CharField)
        .nullable_field("last_name", FieldKind::CharField)
        .nullable_field("email", FieldKind::EmailField)
        .ordering(["id"])
        .build()
}

pub fn test_config() -> IndexConfig {
    IndexConfig::builder()
        .completion_fields(["first_name"])
        .build()
}

/// Self-referential model: every node may point at a parent node
pub fn node_model() -> ModelMeta {
    ModelMeta::builder("Node")
        .field("name", FieldKind::CharField)
        .with_field(FieldDef::foreign_key("parent", "Node").nullable())
        .build()
}

/// Model with a timestamp, for filters on date fields
pub fn event_model() -> ModelMeta {
    ModelMeta::builder("Event")
        .field("title", FieldKind::CharField)
        .field("at", FieldKind::DateTimeField)
        .ordering(["id"])
        .build()
}

pub fn registry() -> Arc<ModelRegistry> {
    Arc::new(
        ModelRegistry::new()
            .with_indexable(test_model(), test_config())
            .with_indexable(node_model(), IndexConfig::default())
            .with_indexable(event_model(), IndexConfig::default()),
    )
}

pub fn person(id: i64, first_name: &str, last_name: &str, email: Option<&str>) -> Record {
    Record::new(&test_model())
        .with("id", id)
        .with("first_name", first_name)
        .with("last_name", last_name)
        .with("email", email.map(Value::from).unwrap_or(Value::Null))
}

/// t1..t4 of the query tests
pub fn people() -> Vec<Record> {
    vec![
        person(1, "John", "Smith", Some("john@example.com")),
        person(2, "Jack", "Smith", Some("jack@example.com")),
        person(3, "Jane", "Smith", None),
        person(4, "Foo", "Bar", None),
    ]
}

pub struct Fixture {
    pub backend: Arc<MemoryBackend>,
    pub manager: Manager,
    pub people: Vec<Record>,
}

impl Fixture {
    /// Ids of `docs`, in order
    pub fn ids(docs: &[es_indexable::Document]) -> Vec<i64> {
        docs.iter()
            .filter_map(|d| d.get("id").and_then(|id| id.as_i64()))
            .collect()
    }
}

pub fn manager(backend: Arc<MemoryBackend>) -> Manager {
    let shared: Arc<dyn SearchBackend> = backend;
    Manager::new(shared, registry(), settings(), "TestModel").unwrap()
}

/// Index created, t1..t4 indexed, request counters reset
pub async fn seeded() -> Fixture {
    let backend = Arc::new(MemoryBackend::new());
    let manager = manager(backend.clone());
    let people = people();

    manager.create_index(true).await.unwrap();
    manager.bulk_index(&people).await.unwrap();
    manager.do_update().await.unwrap();
    backend.reset_requests();

    Fixture {
        backend,
        manager,
        people,
    }
}
