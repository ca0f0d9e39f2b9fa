//! Per-model indexing façade
//!
//! A [`Manager`] binds one registered model to a search backend: it builds
//! and pushes the mapping, indexes and deletes records, reindexes the
//! primary store in chunks, and hands out querysets.

use crate::backend::{BulkItem, RequestParams, SearchBackend};
use crate::config::Settings;
use crate::error::{EsError, Result};
use crate::mapping::{fingerprint, MappingBuilder, MappingCache, MappingCacheStats};
use crate::models::{IndexConfig, ModelMeta, ModelRegistry, Record, SerializerKind};
use crate::query::{Queryset, Raw};
use crate::serializer::{DbSerializer, Document, DocumentSerializer, JsonSerializer, SerializerHooks};
use crate::store::{chunked, ModelStore};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options of [`Manager::search_with`]; unset facets and suggestions fall
/// back to the model's index configuration
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub facets: Option<Vec<String>>,
    pub facets_limit: Option<usize>,
    /// Facet over the whole index (default `true`)
    pub global_facets: Option<bool>,
    pub suggest_fields: Option<Vec<String>>,
    pub suggest_limit: Option<usize>,
    pub fuzziness: Option<f64>,
}

/// A field whose indexed value differs from the record's
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub indexed: Json,
    pub current: Json,
}

#[derive(Clone)]
pub struct Manager {
    backend: Arc<dyn SearchBackend>,
    store: Option<Arc<dyn ModelStore>>,
    registry: Arc<ModelRegistry>,
    settings: Arc<Settings>,
    meta: Arc<ModelMeta>,
    config: Arc<IndexConfig>,
    hooks: Arc<SerializerHooks>,
    mapping_cache: Arc<MappingCache>,
    /// Fingerprint of everything the mapping is built from
    mapping_key: Arc<str>,
}

impl Manager {
    /// Manager of registered, indexable `model`
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        registry: Arc<ModelRegistry>,
        settings: Arc<Settings>,
        model: &str,
    ) -> Result<Self> {
        let registered = registry.require(model)?.clone();
        let config = registered
            .config
            .ok_or_else(|| EsError::Configuration(format!("Model {} is not indexable", model)))?;

        let mut manager = Self {
            backend,
            store: None,
            registry,
            settings,
            meta: registered.meta,
            config,
            hooks: registered.hooks,
            mapping_cache: Arc::new(MappingCache::new()),
            mapping_key: Arc::from(""),
        };
        manager.mapping_key = manager.compute_mapping_key().into();
        Ok(manager)
    }

    /// Attach the primary store (reindexing, `db` serializer, diffs)
    pub fn with_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// A manager for the same model under a different index configuration.
    ///
    /// The receiver is left untouched; the mapping cache is shared and keyed
    /// by configuration, so neither manager can see the other's mapping.
    pub fn with_config(&self, config: IndexConfig) -> Result<Self> {
        let mut manager = self.clone();
        manager.config = Arc::new(config.validated()?);
        manager.mapping_key = manager.compute_mapping_key().into();
        Ok(manager)
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index_name(&self) -> String {
        self.config
            .index
            .clone()
            .unwrap_or_else(|| self.settings.default_index.clone())
    }

    pub fn doc_type(&self) -> String {
        self.config
            .doc_type
            .clone()
            .unwrap_or_else(|| format!("model-{}", self.meta.name))
    }

    /// Index configuration ordering, else the model's
    pub fn default_ordering(&self) -> Option<Vec<String>> {
        match &self.config.ordering {
            Some(ordering) => Some(ordering.clone()),
            None if !self.meta.ordering.is_empty() => Some(self.meta.ordering.clone()),
            None => None,
        }
    }

    pub async fn check_cluster(&self) -> Result<bool> {
        self.backend.ping().await
    }

    fn json_serializer(&self) -> JsonSerializer {
        JsonSerializer::new(
            self.registry.clone(),
            self.meta.clone(),
            self.config.clone(),
            self.hooks.clone(),
        )
    }

    /// Serializer selected by the index configuration
    pub fn serializer(&self) -> Result<Arc<dyn DocumentSerializer>> {
        match self.config.serializer {
            SerializerKind::Json => Ok(Arc::new(self.json_serializer())),
            SerializerKind::Db => {
                let store = self.store.clone().ok_or_else(|| {
                    EsError::Configuration(format!(
                        "{} uses the db serializer but no primary store is attached",
                        self.meta.name
                    ))
                })?;
                Ok(Arc::new(DbSerializer::new(self.json_serializer(), store)))
            }
        }
    }

    fn check_model(&self, record: &Record) -> Result<()> {
        if record.model() != self.meta.name {
            return Err(EsError::Configuration(format!(
                "{} manager given a {} record",
                self.meta.name,
                record.model()
            )));
        }
        Ok(())
    }

    fn doc_id(&self, record: &Record) -> Result<String> {
        record.doc_id().ok_or_else(|| {
            EsError::Configuration(format!("{} record has no primary key", self.meta.name))
        })
    }

    pub fn serialize(&self, record: &Record) -> Result<Document> {
        self.check_model(record)?;
        self.serializer()?.serialize(record)
    }

    /// Rebuild a record from a document; the result refuses to be saved
    pub async fn deserialize(&self, source: &Document) -> Result<Record> {
        self.serializer()?.deserialize(source).await
    }

    pub async fn deserialize_many(&self, sources: &[Document]) -> Result<Vec<Record>> {
        self.serializer()?.deserialize_many(sources).await
    }

    pub async fn do_index(&self, record: &Record) -> Result<()> {
        let id = self.doc_id(record)?;
        let document = self.serialize(record)?;
        self.backend
            .index(&self.index_name(), &self.doc_type(), &id, &Json::Object(document))
            .await?;
        debug!(index = %self.index_name(), doc_type = %self.doc_type(), id = %id, "Indexed record");
        Ok(())
    }

    /// Remove a record's document; a missing document is not an error
    pub async fn delete(&self, record: &Record) -> Result<()> {
        let id = self.doc_id(record)?;
        match self
            .backend
            .delete(&self.index_name(), &self.doc_type(), &id)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                warn!(index = %self.index_name(), id = %id, "Deleting a document that is not indexed");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Indexed document of `pk`
    pub async fn get(&self, pk: impl Into<Json>) -> Result<Document> {
        self.queryset().get(pk).await
    }

    /// Indexed document of `pk`, as a record
    pub async fn get_record(&self, pk: impl Into<Json>) -> Result<Record> {
        self.queryset().deserialize().get(pk).await
    }

    /// Documents like `record`, compared on `fields` (all fields when empty)
    pub fn mlt(&self, record: &Record, fields: &[&str]) -> Result<Queryset<Raw>> {
        let id = self.doc_id(record)?;
        let mut params = RequestParams::new();
        if !fields.is_empty() {
            params.insert("mlt_fields".to_string(), json!(fields));
        }
        Ok(self.queryset().mlt(id, params))
    }

    pub fn queryset(&self) -> Queryset<Raw> {
        Queryset::new(self.clone())
    }

    pub fn all(&self) -> Queryset<Raw> {
        self.queryset().all()
    }

    pub async fn count(&self) -> Result<u64> {
        self.queryset().count().await
    }

    /// Free-text search with the model's default facets and suggestions
    pub fn search(&self, text: impl Into<String>) -> Queryset<Raw> {
        self.search_with(text, SearchOptions::default())
    }

    pub fn search_with(&self, text: impl Into<String>, options: SearchOptions) -> Queryset<Raw> {
        let mut queryset = self.queryset().query(text);

        let facets = options
            .facets
            .unwrap_or_else(|| self.config.facets_fields.clone());
        if !facets.is_empty() {
            let limit = options.facets_limit.or(self.config.facets_limit);
            queryset = queryset.facet(facets, limit, options.global_facets.unwrap_or(true));
        }

        let suggest = options
            .suggest_fields
            .unwrap_or_else(|| self.config.suggest_fields.clone());
        if !suggest.is_empty() {
            let limit = options.suggest_limit.or(self.config.suggest_limit);
            queryset = queryset.suggest(suggest, limit);
        }

        if let Some(fuzziness) = options.fuzziness {
            queryset = queryset.fuzziness(fuzziness);
        }
        queryset
    }

    /// Completions of `text` from a designated completion field
    pub async fn complete(&self, field: &str, text: &str) -> Result<Vec<String>> {
        if !self.config.is_completion_field(field) {
            return Err(EsError::Configuration(format!(
                "{} is not in the completion_fields list, it is required to have a specific mapping",
                field
            )));
        }

        let complete_name = format!("{}_complete", field);
        let body = json!({
            complete_name.clone(): {
                "text": text,
                "completion": {"field": complete_name.clone(), "fuzzy": {}}
            }
        });
        let response = self.backend.suggest(&self.index_name(), &body).await?;

        let options = response
            .get(&complete_name)
            .and_then(|entries| entries.get(0))
            .and_then(|entry| entry.get("options"))
            .and_then(Json::as_array)
            .ok_or_else(|| EsError::InvalidResponse(format!("no {} suggestions", complete_name)))?;

        Ok(options
            .iter()
            .filter_map(|o| o.get("text").and_then(Json::as_str).map(str::to_string))
            .collect())
    }

    /// Make recent writes searchable now
    pub async fn do_update(&self) -> Result<()> {
        self.backend.refresh(&self.index_name()).await?;
        Ok(())
    }

    fn compute_mapping_key(&self) -> String {
        let related: BTreeMap<&str, (&ModelMeta, Option<&IndexConfig>)> = self
            .registry
            .names()
            .filter_map(|name| {
                self.registry
                    .get(name)
                    .map(|m| (name, (m.meta.as_ref(), m.config.as_deref())))
            })
            .collect();

        fingerprint(&(
            self.meta.as_ref(),
            self.config.as_ref(),
            self.doc_type(),
            &self.settings.default_analyzer,
            &self.settings.index_settings,
            related,
        ))
    }

    /// Fingerprint the cached mapping is keyed by, fixed for this manager
    pub fn mapping_fingerprint(&self) -> &str {
        &self.mapping_key
    }

    /// Mapping of this model, `{doc_type: {properties}}`, built on demand and
    /// cached until any input to it changes
    pub fn make_mapping(&self) -> Arc<Json> {
        self.mapping_cache.get_or_build(&self.mapping_key, || {
            MappingBuilder::new(&self.registry, &self.settings, self.config.max_depth).build(
                &self.meta,
                &self.config,
                &self.doc_type(),
            )
        })
    }

    /// `properties` of the local mapping
    pub fn mapped_properties(&self) -> Option<Map<String, Json>> {
        self.properties_in(&self.make_mapping()).cloned()
    }

    /// `properties` section of `mapping`, borrowed
    pub fn properties_in<'a>(&self, mapping: &'a Json) -> Option<&'a Map<String, Json>> {
        mapping
            .get(self.doc_type())
            .and_then(|m| m.get("properties"))
            .and_then(Json::as_object)
    }

    pub fn mapping_cache(&self) -> &MappingCache {
        &self.mapping_cache
    }

    pub fn mapping_cache_stats(&self) -> MappingCacheStats {
        self.mapping_cache.stats()
    }

    /// Mapping properties as stored by the cluster
    pub async fn get_mapping(&self) -> Result<Json> {
        let index = self.index_name();
        let doc_type = self.doc_type();
        let full = self.backend.get_mapping(&index, &doc_type).await?;

        full.get(&index)
            .and_then(|i| i.get("mappings"))
            .and_then(|m| m.get(&doc_type))
            .and_then(|t| t.get("properties"))
            .cloned()
            .ok_or_else(|| EsError::InvalidResponse(format!("no mapping for {}/{}", index, doc_type)))
    }

    pub async fn get_settings(&self) -> Result<Json> {
        self.backend.get_settings(&self.index_name()).await
    }

    /// Create the index (with the configured settings) and push the mapping.
    ///
    /// With `ignore_existing`, an index that already exists is kept.
    pub async fn create_index(&self, ignore_existing: bool) -> Result<()> {
        let index = self.index_name();
        let mut body = json!({});
        if let Some(settings) = &self.settings.index_settings {
            body["settings"] = settings.clone();
        }

        match self.backend.create_index(&index, &body).await {
            Ok(_) => info!(index = %index, "Created index"),
            Err(err) if ignore_existing && err.status() == Some(400) => {
                debug!(index = %index, "Index already exists")
            }
            Err(err) => return Err(err),
        }

        self.backend
            .put_mapping(&index, &self.doc_type(), self.make_mapping().as_ref())
            .await?;
        info!(index = %index, doc_type = %self.doc_type(), "Put mapping");
        Ok(())
    }

    /// Index `records` with one bulk request
    pub async fn bulk_index(&self, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let serializer = self.serializer()?;
        let mut items: Vec<BulkItem> = Vec::with_capacity(records.len());
        for record in records {
            self.check_model(record)?;
            items.push((self.doc_id(record)?, Json::Object(serializer.serialize(record)?)));
        }

        let response = self
            .backend
            .bulk_index(&self.index_name(), &self.doc_type(), &items)
            .await?;
        if response.get("errors").and_then(Json::as_bool).unwrap_or(false) {
            return Err(EsError::Transport {
                status: 400,
                message: format!("bulk index of {} reported item errors", self.meta.name),
            });
        }
        Ok(items.len())
    }

    /// Reindex `records`, or the whole primary store in primary-key ordered
    /// chunks of `reindex_chunk_size`
    pub async fn reindex_all(&self, records: Option<&[Record]>) -> Result<usize> {
        if let Some(records) = records {
            return self.bulk_index(records).await;
        }

        let store = self.store.clone().ok_or_else(|| {
            EsError::Configuration(format!("No primary store attached to reindex {}", self.meta.name))
        })?;

        let mut chunks = Box::pin(chunked(
            store,
            self.meta.name.clone(),
            self.settings.reindex_chunk_size,
            self.config.prefetch_related.clone(),
        ));

        let mut indexed = 0;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            indexed += self.bulk_index(&chunk).await?;
            info!(model = %self.meta.name, chunk = chunk.len(), indexed, "Reindexed chunk");
        }
        Ok(indexed)
    }

    /// Drop the mapping and its documents, recreate, and reindex everything
    pub async fn flush(&self) -> Result<usize> {
        match self
            .backend
            .delete_mapping(&self.index_name(), &self.doc_type())
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                warn!(index = %self.index_name(), doc_type = %self.doc_type(), "No mapping to delete")
            }
            Err(err) => return Err(err),
        }

        self.create_index(true).await?;
        self.reindex_all(None).await
    }

    /// Fields whose indexed value differs from `record`'s current one
    pub async fn diff(&self, record: &Record) -> Result<BTreeMap<String, FieldDiff>> {
        let indexed = self.get(self.doc_id(record)?).await?;
        let current = self.serialize(record)?;

        let mut diff = BTreeMap::new();
        for (field, value) in &current {
            let stored = indexed.get(field).cloned().unwrap_or(Json::Null);
            if &stored != value {
                diff.insert(
                    field.clone(),
                    FieldDiff {
                        indexed: stored,
                        current: value.clone(),
                    },
                );
            }
        }
        Ok(diff)
    }
}
