//! Primary store access

pub mod memory;

pub use memory::MemoryModelStore;

use crate::error::{EsError, Result};
use crate::models::Record;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::sync::Arc;

/// The primary (relational) store the search index mirrors
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Load records of `model` whose primary key is in `ids`
    async fn fetch_by_ids(&self, model: &str, ids: &[serde_json::Value]) -> Result<Vec<Record>>;

    /// Up to `limit` records with a primary key greater than `after`, in key order
    async fn fetch_chunk(
        &self,
        model: &str,
        after: Option<&serde_json::Value>,
        limit: usize,
        prefetch: &[String],
    ) -> Result<Vec<Record>>;

    /// Persist without the index-sourced guard
    async fn write(&self, record: &Record) -> Result<()>;

    /// Remove without the index-sourced guard
    async fn remove(&self, record: &Record) -> Result<()>;

    async fn save(&self, record: &Record) -> Result<()> {
        record.ensure_persistable()?;
        self.write(record).await
    }

    async fn delete(&self, record: &Record) -> Result<()> {
        record.ensure_persistable()?;
        self.remove(record).await
    }
}

/// Walk every record of `model` in primary-key ordered chunks.
///
/// Only one chunk is held at a time.
pub fn chunked(
    store: Arc<dyn ModelStore>,
    model: impl Into<String>,
    chunk_size: usize,
    prefetch: Vec<String>,
) -> impl Stream<Item = Result<Vec<Record>>> + Send {
    let model = model.into();
    let chunk_size = chunk_size.max(1);

    // None: exhausted; Some(None): first chunk; Some(Some(pk)): resume after pk
    stream::try_unfold(Some(None), move |cursor: Option<Option<serde_json::Value>>| {
        let store = store.clone();
        let model = model.clone();
        let prefetch = prefetch.clone();
        async move {
            let after = match cursor {
                Some(after) => after,
                None => return Ok(None),
            };

            let chunk = store
                .fetch_chunk(&model, after.as_ref(), chunk_size, &prefetch)
                .await?;
            if chunk.is_empty() {
                return Ok(None);
            }

            tracing::debug!(model = %model, size = chunk.len(), "Fetched chunk");

            let next = if chunk.len() < chunk_size {
                None
            } else {
                chunk.last().and_then(Record::pk_json).map(Some)
            };
            Ok::<_, EsError>(Some((chunk, next)))
        }
    })
}
