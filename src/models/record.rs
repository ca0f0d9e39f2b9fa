use crate::error::{EsError, Result};
use crate::models::meta::ModelMeta;
use crate::models::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a record's values came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RecordSource {
    /// Loaded from (or destined for) the primary store
    #[default]
    Primary,
    /// Rebuilt from a search-index document; may be stale
    SearchIndex,
}

/// A dynamic domain instance of some model
#[derive(Debug, Clone)]
pub struct Record {
    model: String,
    pk_field: String,
    display_field: Option<String>,
    display_override: Option<String>,
    values: BTreeMap<String, Value>,
    source: RecordSource,
}

impl Record {
    pub fn new(meta: &ModelMeta) -> Self {
        Self {
            model: meta.name.clone(),
            pk_field: meta.pk.clone(),
            display_field: meta.display_field.clone(),
            display_override: None,
            values: BTreeMap::new(),
            source: RecordSource::Primary,
        }
    }

    /// Builder-style setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn pk_field(&self) -> &str {
        &self.pk_field
    }

    /// Primary key value, if set and not null
    pub fn pk(&self) -> Option<&Value> {
        self.values.get(&self.pk_field).filter(|v| !v.is_null())
    }

    pub fn pk_json(&self) -> Option<serde_json::Value> {
        self.pk().and_then(Value::to_json)
    }

    /// Primary key rendered as a document id
    pub fn doc_id(&self) -> Option<String> {
        match self.pk_json()? {
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    /// Human-readable label, used by `{id, value}` fallbacks
    pub fn display(&self) -> String {
        if let Some(label) = &self.display_override {
            return label.clone();
        }

        let from_field = self
            .display_field
            .as_ref()
            .and_then(|f| self.values.get(f))
            .and_then(Value::to_json);

        match from_field {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => {
                let pk = self
                    .doc_id()
                    .unwrap_or_else(|| "None".to_string());
                format!("{} object ({})", self.model, pk)
            }
            Some(other) => other.to_string(),
        }
    }

    pub(crate) fn with_display(mut self, label: impl Into<String>) -> Self {
        self.display_override = Some(label.into());
        self
    }

    pub fn source(&self) -> RecordSource {
        self.source
    }

    pub fn is_from_index(&self) -> bool {
        self.source == RecordSource::SearchIndex
    }

    pub(crate) fn mark_from_index(mut self) -> Self {
        self.source = RecordSource::SearchIndex;
        self
    }

    /// Refuse primary-store writes for records rebuilt from the index
    pub fn ensure_persistable(&self) -> Result<()> {
        if self.is_from_index() {
            return Err(EsError::UnsafeWrite(format!(
                "{} was deserialized from a search index source, it is not safe to write it back",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        if self.model != other.model {
            return false;
        }
        match (self.pk(), other.pk()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.values == other.values,
            _ => false,
        }
    }
}
