use crate::models::record::Record;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::{Arc, Weak};

/// Format used for datetimes in documents
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// Handle on a related record.
///
/// `Weak` handles make self-referential and mutually-referential graphs
/// constructible with `Arc::new_cyclic`.
#[derive(Debug, Clone)]
pub enum RecordRef {
    Strong(Arc<Record>),
    Weak(Weak<Record>),
}

impl RecordRef {
    pub fn get(&self) -> Option<Arc<Record>> {
        match self {
            RecordRef::Strong(record) => Some(record.clone()),
            RecordRef::Weak(record) => record.upgrade(),
        }
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        match (self.get(), other.get()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }
}

impl From<Record> for RecordRef {
    fn from(record: Record) -> Self {
        RecordRef::Strong(Arc::new(record))
    }
}

impl From<Arc<Record>> for RecordRef {
    fn from(record: Arc<Record>) -> Self {
        RecordRef::Strong(record)
    }
}

impl From<Weak<Record>> for RecordRef {
    fn from(record: Weak<Record>) -> Self {
        RecordRef::Weak(record)
    }
}

/// A field value on a [`Record`]
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    /// Structured value produced by a custom hook or a computed attribute
    Json(serde_json::Value),
    Related(RecordRef),
    RelatedMany(Vec<RecordRef>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Json(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn as_related(&self) -> Option<Arc<Record>> {
        match self {
            Value::Related(r) => r.get(),
            _ => None,
        }
    }

    /// Plain JSON form of a non-relational value; `None` for relations
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as Json;
        let json = match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Text(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(d.format(DATE_FORMAT).to_string()),
            Value::DateTime(d) => Json::String(d.format(DATETIME_FORMAT).to_string()),
            Value::Time(t) => Json::String(t.format(TIME_FORMAT).to_string()),
            Value::Json(v) => v.clone(),
            Value::Related(_) | Value::RelatedMany(_) => return None,
        };
        Some(json)
    }

    /// Best-effort conversion of an untyped JSON value
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            Json::String(s) => Value::Text(s.clone()),
            other => Value::Json(other.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Related(a), Value::Related(b)) => a == b,
            (Value::RelatedMany(a), Value::RelatedMany(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Related(v.into())
    }
}

impl From<Arc<Record>> for Value {
    fn from(v: Arc<Record>) -> Self {
        Value::Related(v.into())
    }
}

impl From<Weak<Record>> for Value {
    fn from(v: Weak<Record>) -> Self {
        Value::Related(v.into())
    }
}

impl From<Vec<Record>> for Value {
    fn from(v: Vec<Record>) -> Self {
        Value::RelatedMany(v.into_iter().map(RecordRef::from).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_datetime_to_json_is_iso() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(12, 30, 5, 42)
            .unwrap();
        assert_eq!(
            Value::DateTime(dt).to_json(),
            Some(json!("2024-03-01T12:30:05.000042"))
        );
    }

    #[test]
    fn test_relations_have_no_plain_json() {
        assert!(Value::RelatedMany(vec![]).to_json().is_none());
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(&json!(3)), Value::Int(3));
        assert_eq!(Value::from_json(&json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(&json!(null)), Value::Null);
    }

    #[test]
    fn test_option_conversion() {
        let none: Option<&str> = None;
        assert!(Value::from(none).is_null());
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }
}
