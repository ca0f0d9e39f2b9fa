//! Request body construction

use crate::error::{EsError, Result};
use crate::mapping::{is_analyzed, property_at};
use crate::query::lookup::{FilterValue, LookupOp, Predicate};
use serde_json::{json, Map, Value as Json};

type Properties = Map<String, Json>;

/// Bucketed counts requested per field
#[derive(Debug, Clone, PartialEq)]
pub struct FacetSpec {
    pub fields: Vec<String>,
    pub limit: Option<usize>,
    /// Count over the whole corpus rather than the matching documents
    pub use_globals: bool,
}

/// Term suggestions requested per field
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestSpec {
    pub fields: Vec<String>,
    pub limit: Option<usize>,
}

/// Name of the aggregation wrapping global facets
pub const GLOBAL_AGGREGATION: &str = "global_count";

/// Free-text clause over `_all`; `None` when `text` is empty
pub fn text_query(text: &str, fuzziness: f64) -> Option<Json> {
    if text.is_empty() {
        return None;
    }
    Some(json!({
        "match": {
            "_all": {
                "query": text,
                "fuzziness": fuzziness,
            }
        }
    }))
}

/// Query part of a search body: the free-text clause filtered by `predicates`.
///
/// Without predicates the body is the bare text clause (or empty, matching
/// everything); with predicates it is a `filtered` query.
pub fn search_body(
    text: &str,
    fuzziness: f64,
    predicates: &[Predicate],
    properties: Option<&Properties>,
) -> Result<Json> {
    let query = text_query(text, fuzziness);
    let mut body = Map::new();

    match filter_clause(predicates, properties)? {
        Some(filter) => {
            let mut filtered = Map::new();
            if let Some(query) = query {
                filtered.insert("query".to_string(), query);
            }
            filtered.insert("filter".to_string(), filter);
            body.insert("query".to_string(), json!({ "filtered": filtered }));
        }
        None => {
            if let Some(query) = query {
                body.insert("query".to_string(), query);
            }
        }
    }

    Ok(Json::Object(body))
}

/// Merge all predicates into one `bool` filter
pub fn filter_clause(predicates: &[Predicate], properties: Option<&Properties>) -> Result<Option<Json>> {
    if predicates.is_empty() {
        return Ok(None);
    }

    let mut must = Vec::new();
    let mut must_not = Vec::new();
    let mut should = Vec::new();

    for predicate in predicates {
        let target = FilterTarget::resolve(&predicate.field, properties);
        let value = target.normalize(&predicate.value);

        match predicate.op {
            LookupOp::Exact => must.push(term(&target.field, value)),
            LookupOp::Not => must_not.push(term(&target.field, value)),
            LookupOp::Should => should.push(term(&target.field, value)),
            LookupOp::ShouldNot => should.push(json!({
                "bool": {"must_not": [term(&target.field, value)]}
            })),
            LookupOp::Contains => must.push(json!({
                "query": {"match": {target.field.clone(): {"query": single(value)}}}
            })),
            LookupOp::Gt | LookupOp::Gte | LookupOp::Lt | LookupOp::Lte => must.push(json!({
                "range": {target.field.clone(): {predicate.op.to_string(): single(value)}}
            })),
            LookupOp::Range => {
                let (low, high) = bounds(&predicate.field, value)?;
                must.push(json!({
                    "range": {target.field.clone(): {"gte": low, "lte": high}}
                }));
            }
            LookupOp::IsNull => {
                if predicate.value.is_truthy() {
                    must.push(json!({"missing": {"field": target.field}}));
                } else {
                    must.push(json!({"exists": {"field": target.field}}));
                }
            }
        }
    }

    let mut clauses = Map::new();
    for (occur, list) in [("must", must), ("must_not", must_not), ("should", should)] {
        if !list.is_empty() {
            clauses.insert(occur.to_string(), Json::Array(list));
        }
    }
    Ok(Some(json!({ "bool": clauses })))
}

/// Normalized right-hand side
enum Operand {
    One(Json),
    Many(Vec<Json>),
    Pair(Json, Json),
}

fn term(field: &str, value: Operand) -> Json {
    match value {
        Operand::Many(values) => json!({"terms": {field: values}}),
        Operand::One(value) => json!({"term": {field: value}}),
        Operand::Pair(low, high) => json!({"terms": {field: [low, high]}}),
    }
}

fn single(value: Operand) -> Json {
    match value {
        Operand::One(value) => value,
        Operand::Many(values) => Json::Array(values),
        Operand::Pair(low, high) => json!([low, high]),
    }
}

fn bounds(field: &str, value: Operand) -> Result<(Json, Json)> {
    match value {
        Operand::Pair(low, high) => Ok((low, high)),
        Operand::Many(values) if values.len() == 2 => {
            let mut values = values.into_iter();
            match (values.next(), values.next()) {
                (Some(low), Some(high)) => Ok((low, high)),
                _ => Err(range_error(field)),
            }
        }
        _ => Err(range_error(field)),
    }
}

fn range_error(field: &str) -> EsError {
    EsError::UnsupportedLookup(format!("{}__range needs a (low, high) pair", field))
}

/// Field a predicate actually filters on
struct FilterTarget {
    field: String,
    /// Strings are compared as stored (no lowercasing): dates, numbers and
    /// `not_analyzed` strings
    verbatim: bool,
}

impl FilterTarget {
    /// A field mapped with sub-properties (a related object) is filtered on its `id`
    fn resolve(field: &str, properties: Option<&Properties>) -> Self {
        let mapping = property_at(properties, field);
        let is_object = mapping.map(|m| m.contains_key("properties")).unwrap_or(false);

        if is_object {
            let id = format!("{}.id", field);
            let verbatim = !is_analyzed(property_at(properties, &id));
            Self { field: id, verbatim }
        } else {
            Self {
                field: field.to_string(),
                verbatim: !is_analyzed(mapping),
            }
        }
    }

    fn scalar(&self, value: &Json) -> Json {
        match value {
            Json::String(s) if !self.verbatim => Json::String(s.to_lowercase()),
            other => other.clone(),
        }
    }

    fn normalize(&self, value: &FilterValue) -> Operand {
        match value {
            FilterValue::Value(Json::Array(values)) | FilterValue::List(values) => {
                Operand::Many(values.iter().map(|v| self.scalar(v)).collect())
            }
            FilterValue::Value(value) => Operand::One(self.scalar(value)),
            FilterValue::Pair(low, high) => Operand::Pair(self.scalar(low), self.scalar(high)),
            FilterValue::Record(record) => Operand::One(record.pk_json().unwrap_or(Json::Null)),
        }
    }
}

/// `aggs` section for a facet request
pub fn facet_aggs(spec: &FacetSpec) -> Json {
    let mut aggs = Map::new();
    for field in &spec.fields {
        let mut terms = json!({"field": field});
        if let Some(limit) = spec.limit {
            terms["size"] = json!(limit);
        }
        aggs.insert(field.clone(), json!({ "terms": terms }));
    }

    if spec.use_globals {
        json!({ GLOBAL_AGGREGATION: {"global": {}, "aggs": aggs} })
    } else {
        Json::Object(aggs)
    }
}

/// `suggest` section seeded with the free-text query
pub fn suggest_clause(spec: &SuggestSpec, text: &str) -> Json {
    let mut suggest = Map::new();
    for field in &spec.fields {
        let mut term = json!({"field": field});
        if let Some(limit) = spec.limit {
            term["size"] = json!(limit);
        }
        suggest.insert(field.clone(), json!({"text": text, "term": term}));
    }
    Json::Object(suggest)
}

/// `sort` section: `-field` sorts descending; relevance always breaks ties
pub fn sort_clause(ordering: &[String]) -> Json {
    let mut sort: Vec<Json> = ordering
        .iter()
        .map(|field| match field.strip_prefix('-') {
            Some(field) => json!({ field: "desc" }),
            None => json!({ field.as_str(): "asc" }),
        })
        .collect();
    sort.push(json!("_score"));
    Json::Array(sort)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::lookup::parse_lookup;

    fn predicate(key: &str, value: impl Into<FilterValue>) -> Predicate {
        let (field, op) = parse_lookup(key);
        Predicate::new(field, op, value.into())
    }

    fn properties() -> Properties {
        json!({
            "last_name": {"type": "string"},
            "code": {"type": "string", "index": "not_analyzed"},
            "at": {"type": "date"},
            "author": {"type": "object", "properties": {
                "id": {"type": "long"},
                "name": {"type": "string"}
            }}
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_text_query_only() {
        let body = search_body("Foo", 0.5, &[], None).unwrap();
        assert_eq!(
            body,
            json!({"query": {"match": {"_all": {"query": "Foo", "fuzziness": 0.5}}}})
        );
        assert_eq!(search_body("", 0.5, &[], None).unwrap(), json!({}));
    }

    #[test]
    fn test_zero_fuzziness_kept() {
        let body = search_body("foo", 0.0, &[], None).unwrap();
        assert_eq!(body["query"]["match"]["_all"]["fuzziness"], json!(0.0));
    }

    #[test]
    fn test_filters_merge_into_one_bool() {
        let props = properties();
        let predicates = vec![
            predicate("last_name", "Smith"),
            predicate("first_name__not", "Jack"),
            predicate("id__gte", 2),
            predicate("email__isnull", true),
            predicate("id__range", (2, 3)),
        ];
        let body = search_body("", 0.5, &predicates, Some(&props)).unwrap();

        assert_eq!(
            body,
            json!({"query": {"filtered": {"filter": {"bool": {
                "must": [
                    {"term": {"last_name": "smith"}},
                    {"range": {"id": {"gte": 2}}},
                    {"missing": {"field": "email"}},
                    {"range": {"id": {"gte": 2, "lte": 3}}}
                ],
                "must_not": [{"term": {"first_name": "jack"}}]
            }}}}})
        );
    }

    #[test]
    fn test_not_analyzed_value_is_verbatim() {
        let props = properties();
        let clause = filter_clause(&[predicate("code", "AbC")], Some(&props))
            .unwrap()
            .unwrap();
        assert_eq!(clause["bool"]["must"][0], json!({"term": {"code": "AbC"}}));
    }

    #[test]
    fn test_non_string_values_are_verbatim() {
        let props = properties();
        let predicates = vec![
            predicate("at__gte", "2024-01-02T03:04:05.000000"),
            predicate("at__range", ("2024-01-01T00:00:00", "2024-01-31T00:00:00")),
        ];
        let clause = filter_clause(&predicates, Some(&props)).unwrap().unwrap();

        assert_eq!(
            clause["bool"]["must"],
            json!([
                {"range": {"at": {"gte": "2024-01-02T03:04:05.000000"}}},
                {"range": {"at": {"gte": "2024-01-01T00:00:00", "lte": "2024-01-31T00:00:00"}}}
            ])
        );
    }

    #[test]
    fn test_relation_rewritten_to_id() {
        let props = properties();
        let clause = filter_clause(&[predicate("author", 7)], Some(&props))
            .unwrap()
            .unwrap();
        assert_eq!(clause["bool"]["must"][0], json!({"term": {"author.id": 7}}));

        let clause = filter_clause(&[predicate("author__name", "Jo")], Some(&props))
            .unwrap()
            .unwrap();
        assert_eq!(clause["bool"]["must"][0], json!({"term": {"author.name": "jo"}}));
    }

    #[test]
    fn test_should_not_is_a_negated_should() {
        let clause = filter_clause(&[predicate("tag__should_not", "x")], None)
            .unwrap()
            .unwrap();
        assert_eq!(
            clause,
            json!({"bool": {"should": [{"bool": {"must_not": [{"term": {"tag": "x"}}]}}]}})
        );
    }

    #[test]
    fn test_range_needs_pair() {
        let err = filter_clause(&[predicate("id__range", 3)], None).unwrap_err();
        assert!(matches!(err, EsError::UnsupportedLookup(_)));
    }

    #[test]
    fn test_global_facets_wrapped() {
        let spec = FacetSpec {
            fields: vec!["last_name".to_string(), "first_name".to_string()],
            limit: Some(5),
            use_globals: true,
        };
        let aggs = facet_aggs(&spec);
        assert_eq!(
            aggs[GLOBAL_AGGREGATION]["aggs"]["last_name"],
            json!({"terms": {"field": "last_name", "size": 5}})
        );
        assert_eq!(
            aggs[GLOBAL_AGGREGATION]["aggs"]["first_name"]["terms"]["size"],
            json!(5)
        );
    }

    #[test]
    fn test_sort_clause() {
        let sort = sort_clause(&["last_name".to_string(), "-id".to_string()]);
        assert_eq!(sort, json!([{"last_name": "asc"}, {"id": "desc"}, "_score"]));
        assert_eq!(sort_clause(&[]), json!(["_score"]));
    }
}
