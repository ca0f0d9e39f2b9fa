//! Filter lookups: `field`, `field__op`, `relation__field__op`

use crate::error::{EsError, Result};
use crate::models::{Record, Value};
use serde_json::Value as Json;
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};

/// Lookup operator of a filter predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LookupOp {
    Exact,
    Not,
    Should,
    ShouldNot,
    Contains,
    Gt,
    Gte,
    Lt,
    Lte,
    Range,
    #[strum(serialize = "isnull")]
    IsNull,
}

impl LookupOp {
    /// Operator used when this lookup is excluded.
    ///
    /// `isnull` keeps its operator and negates the value instead.
    pub fn invert(self) -> Result<Self> {
        let inverted = match self {
            LookupOp::Exact => LookupOp::Not,
            LookupOp::Not => LookupOp::Exact,
            LookupOp::Should => LookupOp::ShouldNot,
            LookupOp::ShouldNot => LookupOp::Should,
            LookupOp::Gt => LookupOp::Lte,
            LookupOp::Gte => LookupOp::Lt,
            LookupOp::Lt => LookupOp::Gte,
            LookupOp::Lte => LookupOp::Gt,
            LookupOp::IsNull => LookupOp::IsNull,
            LookupOp::Range | LookupOp::Contains => {
                return Err(EsError::UnsupportedLookup(format!(
                    "{} is not a valid exclude lookup type",
                    self
                )))
            }
        };
        Ok(inverted)
    }

    pub fn is_range(self) -> bool {
        matches!(self, LookupOp::Gt | LookupOp::Gte | LookupOp::Lt | LookupOp::Lte)
    }
}

/// Split a lookup key into a dotted field path and an operator.
///
/// A trailing segment that is not an operator is part of the path, so
/// `author__name` filters `author.name` for equality.
pub fn parse_lookup(key: &str) -> (String, LookupOp) {
    let mut segments: Vec<&str> = key.split("__").collect();
    let op = match segments.last().map(|last| LookupOp::from_str(last)) {
        Some(Ok(op)) if segments.len() > 1 => {
            segments.pop();
            op
        }
        _ => LookupOp::Exact,
    };
    (segments.join("."), op)
}

/// Right-hand side of a filter predicate
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Value(Json),
    List(Vec<Json>),
    /// Inclusive `(low, high)` bounds
    Pair(Json, Json),
    /// A domain object, filtered on by primary key
    Record(Arc<Record>),
}

impl FilterValue {
    /// Truthiness, for `isnull`
    pub fn is_truthy(&self) -> bool {
        match self {
            FilterValue::Value(Json::Bool(b)) => *b,
            FilterValue::Value(Json::Null) => false,
            FilterValue::Value(Json::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            FilterValue::Value(Json::String(s)) => !s.is_empty(),
            FilterValue::Value(Json::Array(items)) | FilterValue::List(items) => !items.is_empty(),
            FilterValue::Value(Json::Object(map)) => !map.is_empty(),
            FilterValue::Pair(_, _) | FilterValue::Record(_) => true,
        }
    }

    /// Negated truthiness as a value, for excluded `isnull` lookups
    pub fn negated(&self) -> FilterValue {
        FilterValue::Value(Json::Bool(!self.is_truthy()))
    }
}

impl From<Json> for FilterValue {
    fn from(value: Json) -> Self {
        FilterValue::Value(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Value(Json::from(value))
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Value(Json::from(value))
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Value(Json::from(value))
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Value(Json::from(value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Value(Json::from(value))
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Value(Json::from(value))
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Related(related) => match related.get() {
                Some(record) => FilterValue::Record(record),
                None => FilterValue::Value(Json::Null),
            },
            Value::RelatedMany(related) => FilterValue::List(
                related
                    .iter()
                    .filter_map(|r| r.get().and_then(|record| record.pk_json()))
                    .collect(),
            ),
            other => FilterValue::Value(other.to_json().unwrap_or(Json::Null)),
        }
    }
}

impl From<Record> for FilterValue {
    fn from(record: Record) -> Self {
        FilterValue::Record(Arc::new(record))
    }
}

impl From<Arc<Record>> for FilterValue {
    fn from(record: Arc<Record>) -> Self {
        FilterValue::Record(record)
    }
}

impl From<&Record> for FilterValue {
    fn from(record: &Record) -> Self {
        FilterValue::Record(Arc::new(record.clone()))
    }
}

impl<T: Into<Json>> From<Vec<T>> for FilterValue {
    fn from(values: Vec<T>) -> Self {
        FilterValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Json>, B: Into<Json>> From<(A, B)> for FilterValue {
    fn from((low, high): (A, B)) -> Self {
        FilterValue::Pair(low.into(), high.into())
    }
}

/// One accumulated filter predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Dotted field path
    pub field: String,
    pub op: LookupOp,
    pub value: FilterValue,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: LookupOp, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Predicate selecting what this one rejects
    pub fn inverted(&self) -> Result<Self> {
        let op = self.op.invert()?;
        let value = if op == LookupOp::IsNull {
            self.value.negated()
        } else {
            self.value.clone()
        };
        Ok(Self::new(self.field.clone(), op, value))
    }
}
