use crate::error::{EsError, Result};
use crate::models::index_config::IndexConfig;
use crate::models::meta::ModelMeta;
use crate::serializer::SerializerHooks;
use std::collections::HashMap;
use std::sync::Arc;

/// A model known to the registry
#[derive(Clone)]
pub struct RegisteredModel {
    pub meta: Arc<ModelMeta>,
    /// Present when the model is itself indexed
    pub config: Option<Arc<IndexConfig>>,
    pub hooks: Arc<SerializerHooks>,
}

impl RegisteredModel {
    pub fn is_indexable(&self) -> bool {
        self.config.is_some()
    }
}

/// Model name to metadata, index configuration and serializer hooks.
///
/// Built once, then shared behind an `Arc`.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, RegisteredModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plain (non-indexed) model
    pub fn with_model(mut self, meta: ModelMeta) -> Self {
        self.insert(meta, None, SerializerHooks::default());
        self
    }

    pub fn with_indexable(mut self, meta: ModelMeta, config: IndexConfig) -> Self {
        self.insert(meta, Some(config), SerializerHooks::default());
        self
    }

    pub fn with_indexable_hooks(
        mut self,
        meta: ModelMeta,
        config: IndexConfig,
        hooks: SerializerHooks,
    ) -> Self {
        self.insert(meta, Some(config), hooks);
        self
    }

    fn insert(&mut self, meta: ModelMeta, config: Option<IndexConfig>, hooks: SerializerHooks) {
        tracing::debug!(model = %meta.name, indexable = config.is_some(), "Model registered");
        self.models.insert(
            meta.name.clone(),
            RegisteredModel {
                meta: Arc::new(meta),
                config: config.map(Arc::new),
                hooks: Arc::new(hooks),
            },
        );
    }

    pub fn get(&self, model: &str) -> Option<&RegisteredModel> {
        self.models.get(model)
    }

    pub fn require(&self, model: &str) -> Result<&RegisteredModel> {
        self.get(model)
            .ok_or_else(|| EsError::Configuration(format!("Model {} is not registered", model)))
    }

    pub fn meta(&self, model: &str) -> Result<Arc<ModelMeta>> {
        Ok(self.require(model)?.meta.clone())
    }

    pub fn is_indexable(&self, model: &str) -> bool {
        self.get(model).map(|m| m.is_indexable()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::FieldKind;

    #[test]
    fn test_indexable_lookup() {
        let registry = ModelRegistry::new()
            .with_model(ModelMeta::builder("Tag").build())
            .with_indexable(
                ModelMeta::builder("Article")
                    .field("title", FieldKind::CharField)
                    .build(),
                IndexConfig::default(),
            );

        assert_eq!(registry.len(), 2);
        assert!(registry.is_indexable("Article"));
        assert!(!registry.is_indexable("Tag"));
        assert!(!registry.is_indexable("Missing"));
        assert_eq!(
            registry.require("Missing").err().map(|e| e.error_code().to_string()),
            Some("CONFIGURATION_ERROR".to_string())
        );
    }
}
