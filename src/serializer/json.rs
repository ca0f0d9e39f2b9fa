use crate::error::{EsError, Result};
use crate::mapping::field_names;
use crate::models::value::DATE_FORMAT;
use crate::models::{
    FieldCategory, FieldDef, FieldKind, IndexConfig, ModelMeta, ModelRegistry, Record, RecordRef,
    Value,
};
use crate::serializer::hooks::{hook_name, SerializerHooks};
use crate::serializer::{Document, DocumentSerializer};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// Default serializer: documents are built from, and rebuilt into, records
/// without touching the primary store.
///
/// Nested relations recurse with an incremented depth; at `max_depth` a
/// single relation serializes to `null` and a multi relation to `[]`. This
/// bounds self- and mutually-referential graphs without cycle detection.
#[derive(Clone)]
pub struct JsonSerializer {
    registry: Arc<ModelRegistry>,
    meta: Arc<ModelMeta>,
    config: Arc<IndexConfig>,
    hooks: Arc<SerializerHooks>,
    max_depth: usize,
    cur_depth: usize,
}

impl JsonSerializer {
    pub fn new(
        registry: Arc<ModelRegistry>,
        meta: Arc<ModelMeta>,
        config: Arc<IndexConfig>,
        hooks: Arc<SerializerHooks>,
    ) -> Self {
        let max_depth = config.max_depth;
        Self {
            registry,
            meta,
            config,
            hooks,
            max_depth,
            cur_depth: 1,
        }
    }

    /// Serializer for a registered, indexed model
    pub fn for_model(registry: Arc<ModelRegistry>, model: &str) -> Result<Self> {
        let registered = registry.require(model)?.clone();
        let config = registered.config.ok_or_else(|| {
            EsError::Configuration(format!("Model {} is not indexable", model))
        })?;
        Ok(Self::new(registry, registered.meta, config, registered.hooks))
    }

    pub fn with_depth(mut self, max_depth: usize, cur_depth: usize) -> Self {
        self.max_depth = max_depth;
        self.cur_depth = cur_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn cur_depth(&self) -> usize {
        self.cur_depth
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    fn at_bound(&self) -> bool {
        self.cur_depth >= self.max_depth
    }

    /// Build the document for `record`
    pub fn to_document(&self, record: &Record) -> Result<Document> {
        let mut document = Document::new();

        for field in field_names(&self.meta, &self.config) {
            let value = self.serialize_field(record, &field)?;
            document.insert(field, value);
        }

        for field in &self.config.completion_fields {
            let value = self.serialize_field(record, field)?;
            document.insert(format!("{}_complete", field), value);
        }

        Ok(document)
    }

    fn serialize_field(&self, record: &Record, field: &str) -> Result<Json> {
        let def = self.meta.field(field);

        if let Some(hook) = self.hooks.serializer_for(field, def.map(|d| d.kind)) {
            return hook(record, field);
        }

        match def {
            Some(def) => match def.category() {
                FieldCategory::RelationSingle => match record.get(field).and_then(Value::as_related) {
                    Some(_) if self.at_bound() => Ok(Json::Null),
                    Some(related) => self.nested_serialize(&related),
                    None => Ok(Json::Null),
                },
                FieldCategory::RelationMany | FieldCategory::ReverseRelation => {
                    self.serialize_many(record.get(field))
                }
                FieldCategory::Scalar | FieldCategory::Date => Ok(record
                    .get(field)
                    .and_then(Value::to_json)
                    .unwrap_or(Json::Null)),
            },
            // computed attribute set on the record
            None => match record.get(field) {
                Some(Value::Related(related)) => match related.get() {
                    Some(_) if self.at_bound() => Ok(Json::Null),
                    Some(related) => self.nested_serialize(&related),
                    None => Ok(Json::Null),
                },
                Some(value @ Value::RelatedMany(_)) => self.serialize_many(Some(value)),
                Some(value) => Ok(value.to_json().unwrap_or(Json::Null)),
                None => Err(EsError::UnknownField {
                    model: self.meta.name.clone(),
                    field: field.to_string(),
                    hook: hook_name(field),
                }),
            },
        }
    }

    fn serialize_many(&self, value: Option<&Value>) -> Result<Json> {
        let related = match value {
            Some(Value::RelatedMany(related)) => related,
            _ => return Ok(json!([])),
        };
        if self.at_bound() {
            return Ok(json!([]));
        }

        related
            .iter()
            .filter_map(RecordRef::get)
            .map(|r| self.nested_serialize(&r))
            .collect::<Result<Vec<_>>>()
            .map(Json::Array)
    }

    fn nested_serialize(&self, related: &Record) -> Result<Json> {
        match self.registry.get(related.model()) {
            Some(registered) if registered.is_indexable() => {
                let nested = JsonSerializer::for_model(self.registry.clone(), related.model())?
                    .with_depth(self.max_depth, self.cur_depth + 1);
                Ok(Json::Object(nested.to_document(related)?))
            }
            // id + display value of a model that isn't indexed
            _ => Ok(json!({
                "id": related.pk_json().unwrap_or(Json::Null),
                "value": related.display(),
            })),
        }
    }

    /// Rebuild a record from `source`; unknown keys are skipped
    pub fn from_document(&self, source: &Document) -> Result<Record> {
        let mut record = Record::new(&self.meta);

        for key in source.keys() {
            if let Some(value) = self.deserialize_field(source, key)? {
                record.set(key.clone(), value);
            }
        }

        Ok(record.mark_from_index())
    }

    fn deserialize_field(&self, source: &Document, key: &str) -> Result<Option<Value>> {
        if let Some(base) = key.strip_suffix("_complete") {
            if self.config.is_completion_field(base) {
                return Ok(None);
            }
        }

        let def = self.meta.field(key);
        if let Some(hook) = self.hooks.deserializer_for(key, def.map(|d| d.kind)) {
            return hook(source, key).map(Some);
        }

        let def = match def {
            Some(def) => def,
            None => return Ok(None),
        };
        let raw = source.get(key).unwrap_or(&Json::Null);

        let value = match def.category() {
            FieldCategory::Date => parse_temporal(def.kind, raw)?,
            FieldCategory::RelationSingle => self.nested_deserialize(def, raw)?,
            FieldCategory::RelationMany | FieldCategory::ReverseRelation => match raw {
                Json::Array(items) => {
                    let mut related = Vec::with_capacity(items.len());
                    for item in items {
                        if let Value::Related(r) = self.nested_deserialize(def, item)? {
                            related.push(r);
                        }
                    }
                    Value::RelatedMany(related)
                }
                _ => Value::RelatedMany(Vec::new()),
            },
            FieldCategory::Scalar => Value::from_json(raw),
        };

        Ok(Some(value))
    }

    fn nested_deserialize(&self, def: &FieldDef, raw: &Json) -> Result<Value> {
        let source = match raw {
            Json::Object(source) if !source.is_empty() => source,
            _ => return Ok(Value::Null),
        };
        let target = def.related_model.as_deref().unwrap_or_default();

        match self.registry.get(target) {
            Some(registered) if registered.is_indexable() => {
                let nested = JsonSerializer::for_model(self.registry.clone(), target)?
                    .with_depth(self.max_depth, self.cur_depth + 1);
                Ok(nested.from_document(source)?.into())
            }
            Some(registered) if source.contains_key("id") && source.contains_key("value") => {
                let stub = Record::new(&registered.meta)
                    .with(registered.meta.pk.clone(), Value::from_json(&source["id"]))
                    .with_display(source["value"].as_str().unwrap_or_default())
                    .mark_from_index();
                Ok(stub.into())
            }
            _ => Ok(Value::Json(raw.clone())),
        }
    }
}

#[async_trait]
impl DocumentSerializer for JsonSerializer {
    fn serialize(&self, record: &Record) -> Result<Document> {
        self.to_document(record)
    }

    async fn deserialize(&self, source: &Document) -> Result<Record> {
        self.from_document(source)
    }
}

fn parse_temporal(kind: FieldKind, raw: &Json) -> Result<Value> {
    let text = match raw {
        Json::String(text) => text.as_str(),
        Json::Null => return Ok(Value::Null),
        other => return Ok(Value::Json(other.clone())),
    };

    let invalid = || EsError::Serialization(format!("Invalid {} value: {}", kind, text));

    match kind {
        FieldKind::DateField => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .or_else(|_| parse_datetime(text).map(|dt| dt.date()))
            .map(Value::Date)
            .map_err(|_| invalid()),
        FieldKind::TimeField => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .map(Value::Time)
            .map_err(|_| invalid()),
        _ => parse_datetime(text)
            .or_else(|_| {
                NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .map(|d| d.and_time(NaiveTime::MIN))
            })
            .map(Value::DateTime)
            .map_err(|_| invalid()),
    }
}

fn parse_datetime(text: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(text).map(|dt| dt.naive_utc()))
}
