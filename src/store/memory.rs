use crate::error::{EsError, Result};
use crate::models::Record;
use crate::store::ModelStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Orderable primary key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum PkKey {
    Int(i64),
    Text(String),
}

impl PkKey {
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(PkKey::Int),
            serde_json::Value::String(s) => Some(
                s.parse::<i64>()
                    .map(PkKey::Int)
                    .unwrap_or_else(|_| PkKey::Text(s.clone())),
            ),
            _ => None,
        }
    }

    fn of(record: &Record) -> Result<Self> {
        record
            .pk_json()
            .as_ref()
            .and_then(Self::from_json)
            .ok_or_else(|| {
                EsError::Configuration(format!("{} has no usable primary key", record.model()))
            })
    }
}

/// In-memory primary store (for embedding and testing)
#[derive(Clone, Default)]
pub struct MemoryModelStore {
    tables: Arc<DashMap<String, BTreeMap<PkKey, Record>>>,
    chunk_requests: Arc<AtomicUsize>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert without going through the async trait
    pub fn insert(&self, record: Record) -> Result<()> {
        let key = PkKey::of(&record)?;
        self.tables
            .entry(record.model().to_string())
            .or_default()
            .insert(key, record);
        Ok(())
    }

    pub fn len(&self, model: &str) -> usize {
        self.tables.get(model).map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, model: &str) -> bool {
        self.len(model) == 0
    }

    /// Number of `fetch_chunk` calls served
    pub fn chunk_requests(&self) -> usize {
        self.chunk_requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ModelStore for MemoryModelStore {
    async fn fetch_by_ids(&self, model: &str, ids: &[serde_json::Value]) -> Result<Vec<Record>> {
        let table = match self.tables.get(model) {
            Some(table) => table,
            None => return Ok(Vec::new()),
        };

        Ok(ids
            .iter()
            .filter_map(PkKey::from_json)
            .filter_map(|key| table.get(&key).cloned())
            .collect())
    }

    async fn fetch_chunk(
        &self,
        model: &str,
        after: Option<&serde_json::Value>,
        limit: usize,
        prefetch: &[String],
    ) -> Result<Vec<Record>> {
        self.chunk_requests.fetch_add(1, Ordering::Relaxed);
        if !prefetch.is_empty() {
            // relations are held on the records themselves
            tracing::trace!(model = %model, ?prefetch, "Prefetch hint ignored");
        }

        let table = match self.tables.get(model) {
            Some(table) => table,
            None => return Ok(Vec::new()),
        };

        let lower = match after.and_then(PkKey::from_json) {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        Ok(table
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn write(&self, record: &Record) -> Result<()> {
        self.insert(record.clone())?;
        tracing::debug!(model = %record.model(), id = ?record.doc_id(), "Record saved");
        Ok(())
    }

    async fn remove(&self, record: &Record) -> Result<()> {
        let key = PkKey::of(record)?;
        let removed = self
            .tables
            .get_mut(record.model())
            .and_then(|mut table| table.remove(&key));

        match removed {
            Some(_) => {
                tracing::debug!(model = %record.model(), id = ?record.doc_id(), "Record deleted");
                Ok(())
            }
            None => Err(EsError::NotFound(format!(
                "{} {} not found",
                record.model(),
                record.doc_id().unwrap_or_default()
            ))),
        }
    }
}
