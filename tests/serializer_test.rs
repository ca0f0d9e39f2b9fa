//! Document serialization through managers and registries

mod common;

use chrono::NaiveDate;
use es_indexable::models::IndexConfigBuilder;
use es_indexable::{
    EsError, FieldDef, FieldKind, IndexConfig, JsonSerializer, Manager, MemoryBackend,
    MemoryModelStore, ModelMeta, ModelRegistry, ModelStore, Record, SearchBackend,
    SerializerHooks, SerializerKind, Value,
};
use serde_json::json;
use std::sync::Arc;

fn node(id: i64, name: &str, parent: Option<Record>) -> Record {
    Record::new(&common::node_model())
        .with("id", id)
        .with("name", name)
        .with("parent", parent.map(Value::from).unwrap_or(Value::Null))
}

#[test]
fn test_document_round_trip() {
    let serializer = JsonSerializer::for_model(common::registry(), "TestModel").unwrap();
    let original = common::person(1, "John", "Smith", None);

    let document = serializer.to_document(&original).unwrap();
    assert_eq!(
        serde_json::Value::Object(document.clone()),
        json!({
            "id": 1,
            "first_name": "John",
            "last_name": "Smith",
            "email": null,
            "first_name_complete": "John",
        })
    );

    let restored = serializer.from_document(&document).unwrap();
    assert_eq!(restored.values(), original.values());
    assert!(restored.is_from_index());
}

#[test]
fn test_unknown_document_keys_are_skipped() {
    let serializer = JsonSerializer::for_model(common::registry(), "TestModel").unwrap();
    let document = json!({"id": 7, "first_name": "Ann", "score_boost": 3})
        .as_object()
        .cloned()
        .unwrap();

    let record = serializer.from_document(&document).unwrap();
    assert_eq!(record.get("first_name"), Some(&Value::from("Ann")));
    assert!(record.get("score_boost").is_none());
}

#[test]
fn test_self_reference_stops_at_max_depth() {
    let root = node(1, "root", None);
    let child = node(2, "child", Some(root));
    let grandchild = node(3, "grandchild", Some(child));

    let serializer = JsonSerializer::for_model(common::registry(), "Node").unwrap();
    assert_eq!(serializer.max_depth(), 2);

    let document = serializer.to_document(&grandchild).unwrap();
    assert_eq!(document["name"], json!("grandchild"));
    assert_eq!(document["parent"]["name"], json!("child"));
    assert_eq!(document["parent"]["parent"], json!(null));
}

#[test]
fn test_cyclic_self_reference_is_bounded() {
    let meta = common::node_model();
    let looped = Arc::new_cyclic(|me| {
        Record::new(&meta)
            .with("id", 1)
            .with("name", "loop")
            .with("parent", me.clone())
    });

    let serializer = JsonSerializer::for_model(common::registry(), "Node")
        .unwrap()
        .with_depth(3, 1);
    let document = serializer.to_document(&looped).unwrap();

    assert_eq!(document["parent"]["name"], json!("loop"));
    assert_eq!(document["parent"]["parent"]["name"], json!("loop"));
    assert_eq!(document["parent"]["parent"]["parent"], json!(null));
}

fn tagged_registry(max_depth: usize) -> Arc<ModelRegistry> {
    let tag = ModelMeta::builder("Tag")
        .field("label", FieldKind::CharField)
        .display_field("label")
        .build();
    let article = ModelMeta::builder("Article")
        .field("title", FieldKind::CharField)
        .with_field(FieldDef::foreign_key("main_tag", "Tag").nullable())
        .with_field(FieldDef::many_to_many("tags", "Tag"))
        .build();

    Arc::new(
        ModelRegistry::new()
            .with_model(tag)
            .with_indexable(article, IndexConfig::builder().max_depth(max_depth).build()),
    )
}

fn article(registry: &ModelRegistry) -> Record {
    let tag_meta = registry.meta("Tag").unwrap();
    let rust = Record::new(&tag_meta).with("id", 10).with("label", "rust");
    let async_tag = Record::new(&tag_meta).with("id", 11).with("label", "async");

    Record::new(&registry.meta("Article").unwrap())
        .with("id", 1)
        .with("title", "Tokio internals")
        .with("main_tag", rust.clone())
        .with("tags", vec![rust, async_tag])
}

#[test]
fn test_non_indexable_relations_use_display_value() {
    let registry = tagged_registry(2);
    let serializer = JsonSerializer::for_model(registry.clone(), "Article").unwrap();

    let document = serializer.to_document(&article(&registry)).unwrap();
    assert_eq!(document["main_tag"], json!({"id": 10, "value": "rust"}));
    assert_eq!(
        document["tags"],
        json!([{"id": 10, "value": "rust"}, {"id": 11, "value": "async"}])
    );

    let restored = serializer.from_document(&document).unwrap();
    let tag = restored.get("main_tag").and_then(Value::as_related).unwrap();
    assert_eq!(tag.pk(), Some(&Value::Int(10)));
    assert_eq!(tag.to_string(), "rust");
    assert!(tag.is_from_index());
}

#[test]
fn test_relations_at_depth_bound() {
    let registry = tagged_registry(1);
    let serializer = JsonSerializer::for_model(registry.clone(), "Article").unwrap();

    let document = serializer.to_document(&article(&registry)).unwrap();
    assert_eq!(document["main_tag"], json!(null));
    assert_eq!(document["tags"], json!([]));
}

#[test]
fn test_unresolvable_field_names_the_hook() {
    let registry = Arc::new(ModelRegistry::new().with_indexable(
        common::test_model(),
        IndexConfig::builder()
            .fields(["first_name", "full_name"])
            .build(),
    ));
    let serializer = JsonSerializer::for_model(registry, "TestModel").unwrap();

    let err = serializer
        .to_document(&common::person(1, "John", "Smith", None))
        .unwrap_err();
    match err {
        EsError::UnknownField { model, field, hook } => {
            assert_eq!(model, "TestModel");
            assert_eq!(field, "full_name");
            assert_eq!(hook, "serialize_full_name");
        }
        other => panic!("unexpected error: {other}"),
    }

    // a computed attribute set on the record resolves
    let record = common::person(1, "John", "Smith", None).with("full_name", "John Smith");
    let document = serializer.to_document(&record).unwrap();
    assert_eq!(document["full_name"], json!("John Smith"));
}

#[test]
fn test_field_hooks_take_precedence_over_kind_hooks() {
    let hooks = SerializerHooks::new()
        .serialize_field("first_name", |record, field| {
            let value = record.get(field).and_then(Value::as_str).unwrap_or_default();
            Ok(json!(format!("<{}>", value)))
        })
        .serialize_kind(FieldKind::CharField, |record, field| {
            let value = record.get(field).and_then(Value::as_str).unwrap_or_default();
            Ok(json!(value.to_uppercase()))
        })
        .deserialize_field("last_name", |document, key| {
            let value = document[key].as_str().unwrap_or_default();
            Ok(Value::from(value.to_lowercase()))
        });
    let registry = Arc::new(ModelRegistry::new().with_indexable_hooks(
        common::test_model(),
        IndexConfig::default(),
        hooks,
    ));
    let serializer = JsonSerializer::for_model(registry, "TestModel").unwrap();

    let document = serializer
        .to_document(&common::person(1, "John", "Smith", None))
        .unwrap();
    assert_eq!(document["first_name"], json!("<John>"));
    assert_eq!(document["last_name"], json!("SMITH"));

    let record = serializer.from_document(&document).unwrap();
    assert_eq!(record.get("last_name"), Some(&Value::from("smith")));
}

#[test]
fn test_datetimes_round_trip() {
    let meta = ModelMeta::builder("Event")
        .field("at", FieldKind::DateTimeField)
        .field("on", FieldKind::DateField)
        .build();
    let registry = Arc::new(ModelRegistry::new().with_indexable(meta.clone(), IndexConfig::default()));
    let serializer = JsonSerializer::for_model(registry, "Event").unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let at = day.and_hms_opt(3, 4, 5).unwrap();
    let event = Record::new(&meta).with("id", 1).with("at", at).with("on", day);

    let document = serializer.to_document(&event).unwrap();
    assert_eq!(document["at"], json!("2024-01-02T03:04:05.000000"));
    assert_eq!(document["on"], json!("2024-01-02"));

    let restored = serializer.from_document(&document).unwrap();
    assert_eq!(restored.get("at"), Some(&Value::DateTime(at)));
    assert_eq!(restored.get("on"), Some(&Value::Date(day)));
}

#[tokio::test]
async fn test_index_sourced_records_refuse_writes() {
    let fx = common::seeded().await;
    let store = MemoryModelStore::new();

    let record = fx.manager.get_record(1).await.unwrap();
    assert!(record.is_from_index());

    let err = store.save(&record).await.unwrap_err();
    assert!(matches!(err, EsError::UnsafeWrite(_)));
    let err = store.delete(&record).await.unwrap_err();
    assert!(matches!(err, EsError::UnsafeWrite(_)));
    assert!(store.is_empty("TestModel"));
}

#[tokio::test]
async fn test_db_serializer_loads_persisted_records() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(MemoryModelStore::new());
    for person in common::people() {
        store.insert(person).unwrap();
    }

    let shared: Arc<dyn SearchBackend> = backend;
    let manager = Manager::new(shared, common::registry(), common::settings(), "TestModel")
        .unwrap()
        .with_store(store.clone());
    let manager = manager
        .with_config(
            IndexConfigBuilder::from_config(manager.config())
                .serializer(SerializerKind::Db)
                .build(),
        )
        .unwrap();

    manager.create_index(true).await.unwrap();
    manager.reindex_all(None).await.unwrap();

    let records = manager
        .queryset()
        .filter("last_name", "smith")
        .deserialize()
        .fetch()
        .await
        .unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| !r.is_from_index()));

    // persisted records may be written back
    store.save(&records[0]).await.unwrap();
}

#[test]
fn test_db_serializer_requires_a_store() {
    let shared: Arc<dyn SearchBackend> = Arc::new(MemoryBackend::new());
    let manager = Manager::new(shared, common::registry(), common::settings(), "TestModel").unwrap();
    let manager = manager
        .with_config(
            IndexConfigBuilder::from_config(manager.config())
                .serializer(SerializerKind::Db)
                .build(),
        )
        .unwrap();

    let err = manager.serializer().err().unwrap();
    assert!(matches!(err, EsError::Configuration(_)));
}
