use crate::error::Result;
use crate::models::{FieldKind, Record, Value};
use crate::serializer::Document;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Custom conversion of one field of a record into document JSON
pub type SerializeHook = Arc<dyn Fn(&Record, &str) -> Result<serde_json::Value> + Send + Sync>;

/// Custom conversion of one document key back into a record value
pub type DeserializeHook = Arc<dyn Fn(&Document, &str) -> Result<Value> + Send + Sync>;

/// Per-field and per-kind override tables.
///
/// Lookup order is field name, then field kind, then the default conversion.
#[derive(Clone, Default)]
pub struct SerializerHooks {
    serialize_fields: HashMap<String, SerializeHook>,
    serialize_kinds: HashMap<FieldKind, SerializeHook>,
    deserialize_fields: HashMap<String, DeserializeHook>,
    deserialize_kinds: HashMap<FieldKind, DeserializeHook>,
}

impl SerializerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serialize_field<F>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Record, &str) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.serialize_fields.insert(field.into(), Arc::new(hook));
        self
    }

    pub fn serialize_kind<F>(mut self, kind: FieldKind, hook: F) -> Self
    where
        F: Fn(&Record, &str) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.serialize_kinds.insert(kind, Arc::new(hook));
        self
    }

    pub fn deserialize_field<F>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Document, &str) -> Result<Value> + Send + Sync + 'static,
    {
        self.deserialize_fields.insert(field.into(), Arc::new(hook));
        self
    }

    pub fn deserialize_kind<F>(mut self, kind: FieldKind, hook: F) -> Self
    where
        F: Fn(&Document, &str) -> Result<Value> + Send + Sync + 'static,
    {
        self.deserialize_kinds.insert(kind, Arc::new(hook));
        self
    }

    pub fn serializer_for(&self, field: &str, kind: Option<FieldKind>) -> Option<&SerializeHook> {
        self.serialize_fields
            .get(field)
            .or_else(|| kind.and_then(|k| self.serialize_kinds.get(&k)))
    }

    pub fn deserializer_for(&self, field: &str, kind: Option<FieldKind>) -> Option<&DeserializeHook> {
        self.deserialize_fields
            .get(field)
            .or_else(|| kind.and_then(|k| self.deserialize_kinds.get(&k)))
    }

    pub fn is_empty(&self) -> bool {
        self.serialize_fields.is_empty()
            && self.serialize_kinds.is_empty()
            && self.deserialize_fields.is_empty()
            && self.deserialize_kinds.is_empty()
    }
}

impl fmt::Debug for SerializerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerHooks")
            .field("serialize_fields", &self.serialize_fields.keys().collect::<Vec<_>>())
            .field("serialize_kinds", &self.serialize_kinds.keys().collect::<Vec<_>>())
            .field("deserialize_fields", &self.deserialize_fields.keys().collect::<Vec<_>>())
            .field("deserialize_kinds", &self.deserialize_kinds.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Name of the hook a caller should register for an unresolvable field
pub fn hook_name(field: &str) -> String {
    format!("serialize_{}", field)
}
