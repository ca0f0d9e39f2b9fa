//! Search engine clients
//!
//! The core talks to the cluster only through [`SearchBackend`]: request
//! bodies go out as raw JSON and responses come back as raw engine JSON.

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// URL parameters sent alongside a request body
pub type RequestParams = BTreeMap<String, Json>;

/// One `(id, document)` pair of a bulk index request
pub type BulkItem = (String, Json);

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// True when the cluster answers
    async fn ping(&self) -> Result<bool>;

    async fn search(&self, index: &str, doc_type: &str, body: &Json, params: &RequestParams) -> Result<Json>;

    /// `{"count": n}`
    async fn count(&self, index: &str, doc_type: &str, body: Option<&Json>) -> Result<Json>;

    /// Stored document; `EsError::NotFound` when missing
    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Json>;

    async fn index(&self, index: &str, doc_type: &str, id: &str, body: &Json) -> Result<Json>;

    async fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<Json>;

    /// Documents similar to `id`
    async fn mlt(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Json,
        params: &RequestParams,
    ) -> Result<Json>;

    async fn suggest(&self, index: &str, body: &Json) -> Result<Json>;

    async fn bulk_index(&self, index: &str, doc_type: &str, items: &[BulkItem]) -> Result<Json>;

    /// `Transport { status: 400 }` when the index already exists
    async fn create_index(&self, index: &str, body: &Json) -> Result<Json>;

    async fn delete_index(&self, index: &str) -> Result<Json>;

    async fn put_mapping(&self, index: &str, doc_type: &str, body: &Json) -> Result<Json>;

    async fn delete_mapping(&self, index: &str, doc_type: &str) -> Result<Json>;

    /// `{index: {mappings: {doc_type: {...}}}}`
    async fn get_mapping(&self, index: &str, doc_type: &str) -> Result<Json>;

    async fn get_settings(&self, index: &str) -> Result<Json>;

    async fn refresh(&self, index: &str) -> Result<Json>;
}
