use crate::config::Settings;
use crate::models::{FieldCategory, FieldKind, IndexConfig, ModelMeta};

/// Engine type for a scalar field kind; everything unlisted is a string
pub fn es_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::AutoField
        | FieldKind::BigAutoField
        | FieldKind::BigIntegerField
        | FieldKind::IntegerField
        | FieldKind::PositiveIntegerField => "long",
        FieldKind::BinaryField => "binary",
        FieldKind::BooleanField | FieldKind::NullBooleanField => "boolean",
        FieldKind::DateField | FieldKind::DateTimeField => "date",
        FieldKind::FloatField => "double",
        FieldKind::PositiveSmallIntegerField | FieldKind::SmallIntegerField => "short",
        _ => "string",
    }
}

/// Analyzer applied to string mappings, if one is configured
pub fn default_analyzer(settings: &Settings) -> Option<String> {
    settings.default_analyzer.clone().or_else(|| {
        settings
            .analysis_default()
            .map(|_| "default".to_string())
    })
}

/// One entry of a model's serialization output set
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedField {
    pub name: String,
    /// Model field kind; `None` for computed attributes and hook-only fields
    pub kind: Option<FieldKind>,
    pub es_type: Option<&'static str>,
    pub analyzer: Option<String>,
}

impl IndexedField {
    pub fn category(&self) -> Option<FieldCategory> {
        self.kind.map(|k| k.category())
    }
}

/// Names serialized for a model: the allow-list, else every concrete field, minus excludes
pub fn field_names(meta: &ModelMeta, config: &IndexConfig) -> Vec<String> {
    let names: Vec<String> = match &config.fields {
        Some(fields) => fields.clone(),
        None => meta.concrete_fields().map(|f| f.name.clone()).collect(),
    };

    names
        .into_iter()
        .filter(|name| !config.is_excluded(name))
        .collect()
}

/// Resolve the serialization output set of a model
pub fn indexed_fields(meta: &ModelMeta, config: &IndexConfig, settings: &Settings) -> Vec<IndexedField> {
    let analyzer = default_analyzer(settings);

    field_names(meta, config)
        .into_iter()
        .map(|name| {
            let kind = meta.field(&name).map(|f| f.kind);
            let es_type = kind.filter(|k| !k.is_relation()).map(es_type);
            let analyzer = match es_type {
                Some("string") => analyzer.clone(),
                _ => None,
            };
            IndexedField {
                name,
                kind,
                es_type,
                analyzer,
            }
        })
        .collect()
}
