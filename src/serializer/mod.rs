//! Record to document conversion
//!
//! Two strategies share one trait: [`JsonSerializer`] rebuilds records from
//! the documents themselves (marked as index-sourced), [`DbSerializer`] loads
//! the persisted records from the primary store by id.

pub mod db;
pub mod hooks;
pub mod json;

pub use db::DbSerializer;
pub use hooks::{DeserializeHook, SerializeHook, SerializerHooks};
pub use json::JsonSerializer;

use crate::error::Result;
use crate::models::Record;
use async_trait::async_trait;

/// A search-engine document body
pub type Document = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait DocumentSerializer: Send + Sync {
    /// Document for `record`
    fn serialize(&self, record: &Record) -> Result<Document>;

    /// Record for one document
    async fn deserialize(&self, source: &Document) -> Result<Record>;

    /// Records for a batch of documents
    async fn deserialize_many(&self, sources: &[Document]) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(sources.len());
        for source in sources {
            records.push(self.deserialize(source).await?);
        }
        Ok(records)
    }
}
