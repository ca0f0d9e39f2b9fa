use crate::models::field::{FieldCategory, FieldDef, FieldKind};
use serde::{Deserialize, Serialize};

/// Model metadata read from the host ORM
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelMeta {
    /// Model name (e.g. `Article`)
    pub name: String,

    /// Primary key field name
    pub pk: String,

    /// Declared fields, in declaration order
    pub fields: Vec<FieldDef>,

    /// Default ordering (`-field` for descending)
    #[serde(default)]
    pub ordering: Vec<String>,

    /// Field whose value stands for the record in `{id, value}` fallbacks
    #[serde(default)]
    pub display_field: Option<String>,
}

impl ModelMeta {
    /// Start a model with an `id` auto field as primary key
    pub fn builder(name: impl Into<String>) -> ModelMetaBuilder {
        ModelMetaBuilder::new(name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields stored on the model's own table (no reverse relations)
    pub fn concrete_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.category() != FieldCategory::ReverseRelation)
    }
}

pub struct ModelMetaBuilder {
    meta: ModelMeta,
}

impl ModelMetaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            meta: ModelMeta {
                name: name.into(),
                pk: "id".to_string(),
                fields: vec![FieldDef::new("id", FieldKind::AutoField)],
                ordering: Vec::new(),
                display_field: None,
            },
        }
    }

    /// Replace the default `id` primary key
    pub fn pk(mut self, field: FieldDef) -> Self {
        let old = std::mem::replace(&mut self.meta.pk, field.name.clone());
        self.meta.fields.retain(|f| f.name != old);
        self.meta.fields.insert(0, field);
        self
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.meta.fields.push(FieldDef::new(name, kind));
        self
    }

    pub fn nullable_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.meta.fields.push(FieldDef::new(name, kind).nullable());
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.meta.fields.push(field);
        self
    }

    pub fn ordering<I, S>(mut self, ordering: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.ordering = ordering.into_iter().map(Into::into).collect();
        self
    }

    pub fn display_field(mut self, field: impl Into<String>) -> Self {
        self.meta.display_field = Some(field.into());
        self
    }

    pub fn build(self) -> ModelMeta {
        self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let meta = ModelMeta::builder("Dummy")
            .nullable_field("foo", FieldKind::CharField)
            .build();
        assert_eq!(meta.pk, "id");
        assert_eq!(meta.fields.len(), 2);
        assert_eq!(meta.field("id").unwrap().kind, FieldKind::AutoField);
        assert!(meta.field("foo").unwrap().null);
    }

    #[test]
    fn test_custom_pk_replaces_id() {
        let meta = ModelMeta::builder("Tag")
            .pk(FieldDef::new("slug", FieldKind::SlugField))
            .build();
        assert_eq!(meta.pk, "slug");
        assert!(meta.field("id").is_none());
    }

    #[test]
    fn test_concrete_fields_skip_reverse() {
        let meta = ModelMeta::builder("Author")
            .with_field(FieldDef::reverse("articles", "Article"))
            .build();
        assert_eq!(meta.concrete_fields().count(), 1);
    }
}
