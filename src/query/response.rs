//! Search response parsing

use crate::error::{EsError, Result};
use crate::query::body::GLOBAL_AGGREGATION;
use crate::serializer::Document;
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// Everything a queryset keeps from one executed request
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// `_source` of every returned hit, in order
    pub hits: Vec<Document>,
    pub total: u64,
    pub max_score: Option<f64>,
    pub facets: Option<Json>,
    pub suggestions: Option<Json>,
    pub raw: Arc<Json>,
}

impl SearchOutcome {
    /// Parse a search (or more-like-this) response.
    ///
    /// With `facets` set, buckets are read from `aggregations`, unwrapping
    /// the global aggregation when `global_facets` is set.
    pub fn parse(response: Json, facets: bool, global_facets: bool) -> Result<Self> {
        let hits_section = response
            .get("hits")
            .ok_or_else(|| EsError::InvalidResponse("search response has no hits".to_string()))?;

        let hits = hits_section
            .get("hits")
            .and_then(Json::as_array)
            .map(|hits| {
                hits.iter()
                    .map(|hit| hit.get("_source").and_then(Json::as_object).cloned().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        let total = total_of(hits_section.get("total"))?;
        let max_score = hits_section.get("max_score").and_then(Json::as_f64);

        let facets = if facets {
            let aggregations = response.get("aggregations");
            let buckets = if global_facets {
                aggregations.and_then(|a| a.get(GLOBAL_AGGREGATION))
            } else {
                aggregations
            };
            Some(buckets.cloned().unwrap_or_else(|| json!({})))
        } else {
            None
        };

        let suggestions = response.get("suggest").cloned();

        Ok(Self {
            hits,
            total,
            max_score,
            facets,
            suggestions,
            raw: Arc::new(response),
        })
    }
}

/// `hits.total`, either a number or a `{value}` object
fn total_of(total: Option<&Json>) -> Result<u64> {
    match total {
        Some(Json::Number(n)) => n
            .as_u64()
            .ok_or_else(|| EsError::InvalidResponse(format!("invalid hit total {}", n))),
        Some(Json::Object(total)) => total
            .get("value")
            .and_then(Json::as_u64)
            .ok_or_else(|| EsError::InvalidResponse("invalid hit total".to_string())),
        _ => Err(EsError::InvalidResponse("search response has no hit total".to_string())),
    }
}

/// `count` of a count response
pub fn count_of(response: &Json) -> Result<u64> {
    response
        .get("count")
        .and_then(Json::as_u64)
        .ok_or_else(|| EsError::InvalidResponse("count response has no count".to_string()))
}

/// `_source` of a get response
pub fn source_of(response: &Json) -> Result<Document> {
    response
        .get("_source")
        .and_then(Json::as_object)
        .cloned()
        .ok_or_else(|| EsError::InvalidResponse("get response has no _source".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> Json {
        json!({
            "took": 2,
            "hits": {
                "total": 4,
                "max_score": 1.5,
                "hits": [
                    {"_id": "4", "_score": 1.5, "_source": {"id": 4, "last_name": "Bar"}}
                ]
            },
            "aggregations": {"global_count": {"doc_count": 4, "last_name": {"buckets": []}}},
            "suggest": {"last_name": []}
        })
    }

    #[test]
    fn test_parse_global_facets() {
        let outcome = SearchOutcome::parse(response(), true, true).unwrap();
        assert_eq!(outcome.total, 4);
        assert_eq!(outcome.max_score, Some(1.5));
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0]["last_name"], json!("Bar"));
        assert_eq!(outcome.facets.unwrap()["doc_count"], json!(4));
        assert_eq!(outcome.suggestions, Some(json!({"last_name": []})));
    }

    #[test]
    fn test_parse_without_facets() {
        let outcome = SearchOutcome::parse(response(), false, false).unwrap();
        assert!(outcome.facets.is_none());
    }

    #[test]
    fn test_missing_global_wrapper_is_empty() {
        let mut raw = response();
        raw.as_object_mut().unwrap().remove("aggregations");
        let outcome = SearchOutcome::parse(raw, true, true).unwrap();
        assert_eq!(outcome.facets, Some(json!({})));
    }

    #[test]
    fn test_object_total_and_errors() {
        assert_eq!(total_of(Some(&json!({"value": 3, "relation": "eq"}))).unwrap(), 3);
        assert!(SearchOutcome::parse(json!({"error": "x"}), false, false).is_err());
        assert_eq!(count_of(&json!({"count": 0})).unwrap(), 0);
    }
}
