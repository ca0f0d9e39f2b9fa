use crate::config::Settings;
use crate::mapping::field_type::{es_type, indexed_fields};
use crate::models::{FieldKind, IndexConfig, ModelMeta, ModelRegistry};
use serde_json::{json, Map, Value};

/// Builds the engine mapping of one model.
///
/// Relation fields become `object` (or `nested`, when designated) sub-schemas:
/// the related model's own properties when it is indexed and the depth bound
/// allows, else the `{id, value}` fallback shape the serializer emits.
pub struct MappingBuilder<'a> {
    registry: &'a ModelRegistry,
    settings: &'a Settings,
    max_depth: usize,
}

impl<'a> MappingBuilder<'a> {
    pub fn new(registry: &'a ModelRegistry, settings: &'a Settings, max_depth: usize) -> Self {
        Self {
            registry,
            settings,
            max_depth,
        }
    }

    /// `{doc_type: {properties: {...}}}`
    pub fn build(&self, meta: &ModelMeta, config: &IndexConfig, doc_type: &str) -> Value {
        let properties = self.properties(meta, config, 1);
        json!({ doc_type: { "properties": properties } })
    }

    pub fn properties(&self, meta: &ModelMeta, config: &IndexConfig, depth: usize) -> Map<String, Value> {
        let mut properties = Map::new();

        for field in indexed_fields(meta, config, self.settings) {
            let mut mapping = match field.kind {
                // computed attribute: only overrides apply
                None => Map::new(),
                Some(kind) if kind.is_relation() => {
                    self.relation_mapping(meta, config, &field.name, depth)
                }
                Some(_) => {
                    let mut mapping = Map::new();
                    if let Some(es_type) = field.es_type {
                        mapping.insert("type".to_string(), json!(es_type));
                    }
                    if let Some(analyzer) = field.analyzer {
                        mapping.insert("analyzer".to_string(), json!(analyzer));
                    }
                    mapping
                }
            };

            if let Some(Value::Object(overrides)) = config.mappings.get(&field.name) {
                for (key, value) in overrides {
                    mapping.insert(key.clone(), value.clone());
                }
            }

            properties.insert(field.name, Value::Object(mapping));
        }

        for field in &config.completion_fields {
            properties.insert(format!("{}_complete", field), json!({"type": "completion"}));
        }

        properties
    }

    fn relation_mapping(
        &self,
        meta: &ModelMeta,
        config: &IndexConfig,
        field: &str,
        depth: usize,
    ) -> Map<String, Value> {
        let kind = if config.is_nested_field(field) {
            "nested"
        } else {
            "object"
        };

        let related = meta
            .field(field)
            .and_then(|f| f.related_model.as_deref())
            .and_then(|name| self.registry.get(name));

        let properties = match related {
            Some(related) => match &related.config {
                Some(related_config) if depth < self.max_depth => {
                    self.properties(&related.meta, related_config, depth + 1)
                }
                _ => fallback_properties(
                    related
                        .meta
                        .field(&related.meta.pk)
                        .map(|f| f.kind)
                        .unwrap_or(FieldKind::AutoField),
                ),
            },
            None => fallback_properties(FieldKind::AutoField),
        };

        let mut mapping = Map::new();
        mapping.insert("type".to_string(), json!(kind));
        mapping.insert("properties".to_string(), Value::Object(properties));
        mapping
    }
}

fn fallback_properties(pk_kind: FieldKind) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("id".to_string(), json!({"type": es_type(pk_kind)}));
    properties.insert("value".to_string(), json!({"type": "string"}));
    properties
}
