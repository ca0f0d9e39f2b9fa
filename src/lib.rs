//! # es-indexable
//!
//! Index ORM-style models into an Elasticsearch cluster and query them back
//! through a lazy, chainable [`Queryset`].
//!
//! ```no_run
//! use es_indexable::{
//!     FieldKind, HttpBackend, IndexConfig, Manager, ModelMeta, ModelRegistry, Settings,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> es_indexable::Result<()> {
//! let settings = Arc::new(Settings::load()?);
//! let meta = ModelMeta::builder("Article")
//!     .field("title", FieldKind::CharField)
//!     .field("body", FieldKind::TextField)
//!     .build();
//! let registry = Arc::new(ModelRegistry::new().with_indexable(meta, IndexConfig::default()));
//! let backend = Arc::new(HttpBackend::new(&settings)?);
//!
//! let articles = Manager::new(backend, registry, settings, "Article")?;
//! articles.create_index(true).await?;
//!
//! let hits = articles
//!     .search("rust")
//!     .filter("title__contains", "async")
//!     .order_by(["-id"])
//!     .fetch()
//!     .await?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod manager;
pub mod mapping;
pub mod models;
pub mod query;
pub mod serializer;
pub mod store;

pub use backend::{HttpBackend, MemoryBackend, RequestParams, SearchBackend};
pub use config::Settings;
pub use error::{EsError, Result};
pub use manager::{FieldDiff, Manager, SearchOptions};
pub use mapping::{MappingBuilder, MappingCache};
pub use models::{
    FieldCategory, FieldDef, FieldKind, IndexConfig, ModelMeta, ModelRegistry, Record,
    RecordRef, RecordSource, SerializerKind, Value,
};
pub use query::{Deserialized, FilterValue, LookupOp, Queryset, Raw};
pub use serializer::{DbSerializer, Document, DocumentSerializer, JsonSerializer, SerializerHooks};
pub use store::{MemoryModelStore, ModelStore};
