//! Per-model indexing configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Serializer strategy used to turn hits back into records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    /// Rebuild records from the document itself
    #[default]
    Json,
    /// Load persisted records from the primary store by id
    Db,
}

/// How one model is indexed.
///
/// Immutable once handed to a manager; use [`IndexConfigBuilder::from_config`]
/// to derive a modified copy.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct IndexConfig {
    /// Index name (defaults to the process-wide default index)
    #[serde(default)]
    pub index: Option<String>,

    /// Document type (defaults to `model-<ModelName>`)
    #[serde(default)]
    pub doc_type: Option<String>,

    /// Field allow-list; all concrete fields when unset
    #[serde(default)]
    pub fields: Option<Vec<String>>,

    /// Fields removed from the serialized output
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Per-field mapping overrides merged over the derived mapping
    #[serde(default)]
    pub mappings: BTreeMap<String, serde_json::Value>,

    /// Fields that get a `<field>_complete` completion companion
    #[serde(default)]
    pub completion_fields: Vec<String>,

    /// Relation fields mapped as `nested` instead of `object`
    #[serde(default)]
    pub nested_fields: Vec<String>,

    /// Ordering applied before the model's own
    #[serde(default)]
    pub ordering: Option<Vec<String>>,

    /// Facets requested by default on `search`
    #[serde(default)]
    pub facets_fields: Vec<String>,

    #[serde(default = "default_facets_limit")]
    pub facets_limit: Option<usize>,

    /// Term suggestions requested by default on `search`
    #[serde(default)]
    pub suggest_fields: Vec<String>,

    #[serde(default)]
    pub suggest_limit: Option<usize>,

    /// Relations loaded alongside each chunk while reindexing
    #[serde(default)]
    pub prefetch_related: Vec<String>,

    #[serde(default)]
    pub serializer: SerializerKind,

    /// Relation nesting bound for serialization
    #[validate(range(min = 1))]
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl IndexConfig {
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::new()
    }

    /// Validate and return self
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub fn is_excluded(&self, field: &str) -> bool {
        self.exclude.iter().any(|f| f == field)
    }

    pub fn is_completion_field(&self, field: &str) -> bool {
        self.completion_fields.iter().any(|f| f == field)
    }

    pub fn is_nested_field(&self, field: &str) -> bool {
        self.nested_fields.iter().any(|f| f == field)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index: None,
            doc_type: None,
            fields: None,
            exclude: Vec::new(),
            mappings: BTreeMap::new(),
            completion_fields: Vec::new(),
            nested_fields: Vec::new(),
            ordering: None,
            facets_fields: Vec::new(),
            facets_limit: default_facets_limit(),
            suggest_fields: Vec::new(),
            suggest_limit: None,
            prefetch_related: Vec::new(),
            serializer: SerializerKind::default(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_facets_limit() -> Option<usize> {
    Some(10)
}

fn default_max_depth() -> usize {
    2
}

/// Builder for IndexConfig
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexConfig::default(),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.config.index = Some(index.into());
        self
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.config.doc_type = Some(doc_type.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.exclude = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn mapping(mut self, field: impl Into<String>, mapping: serde_json::Value) -> Self {
        self.config.mappings.insert(field.into(), mapping);
        self
    }

    pub fn completion_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.completion_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn nested_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.nested_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn ordering<I, S>(mut self, ordering: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ordering = Some(ordering.into_iter().map(Into::into).collect());
        self
    }

    pub fn facets<I, S>(mut self, fields: I, limit: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.facets_fields = fields.into_iter().map(Into::into).collect();
        self.config.facets_limit = limit;
        self
    }

    pub fn suggest<I, S>(mut self, fields: I, limit: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.suggest_fields = fields.into_iter().map(Into::into).collect();
        self.config.suggest_limit = limit;
        self
    }

    pub fn prefetch_related<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.prefetch_related = relations.into_iter().map(Into::into).collect();
        self
    }

    pub fn serializer(mut self, kind: SerializerKind) -> Self {
        self.config.serializer = kind;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}

impl Default for IndexConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.facets_limit, Some(10));
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.serializer, SerializerKind::Json);
        assert!(config.fields.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: IndexConfig = serde_json::from_value(json!({
            "completion_fields": ["title"],
            "serializer": "db",
        }))
        .unwrap();
        assert!(config.is_completion_field("title"));
        assert_eq!(config.serializer, SerializerKind::Db);
        assert_eq!(config.facets_limit, Some(10));
    }

    #[test]
    fn test_builder_copy_leaves_original() {
        let base = IndexConfig::builder().fields(["foo"]).build();
        let derived = IndexConfigBuilder::from_config(&base)
            .exclude(["foo"])
            .build();
        assert!(derived.is_excluded("foo"));
        assert!(!base.is_excluded("foo"));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = IndexConfig::builder().max_depth(0).build();
        assert!(config.validated().is_err());
    }
}
