use crate::error::{EsError, Result};
use crate::models::Record;
use crate::serializer::json::JsonSerializer;
use crate::serializer::{Document, DocumentSerializer};
use crate::store::ModelStore;
use async_trait::async_trait;
use std::sync::Arc;

/// Serializes like [`JsonSerializer`] but resolves hits to persisted records
/// with one primary-store lookup per batch.
///
/// Records returned here come from the primary store and are writable.
#[derive(Clone)]
pub struct DbSerializer {
    json: JsonSerializer,
    store: Arc<dyn ModelStore>,
}

impl DbSerializer {
    pub fn new(json: JsonSerializer, store: Arc<dyn ModelStore>) -> Self {
        Self { json, store }
    }

    fn pk_of(&self, source: &Document) -> Option<serde_json::Value> {
        source
            .get(&self.json.meta().pk)
            .filter(|v| !v.is_null())
            .cloned()
    }
}

#[async_trait]
impl DocumentSerializer for DbSerializer {
    fn serialize(&self, record: &Record) -> Result<Document> {
        self.json.to_document(record)
    }

    async fn deserialize(&self, source: &Document) -> Result<Record> {
        let model = &self.json.meta().name;
        let pk = self.pk_of(source).ok_or_else(|| {
            EsError::InvalidResponse(format!("{} document without a primary key", model))
        })?;

        self.store
            .fetch_by_ids(model, std::slice::from_ref(&pk))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EsError::NotFound(format!("{} {} not found", model, pk)))
    }

    async fn deserialize_many(&self, sources: &[Document]) -> Result<Vec<Record>> {
        let ids: Vec<serde_json::Value> = sources.iter().filter_map(|s| self.pk_of(s)).collect();
        tracing::debug!(model = %self.json.meta().name, ids = ids.len(), "Loading hits from primary store");
        self.store.fetch_by_ids(&self.json.meta().name, &ids).await
    }
}
