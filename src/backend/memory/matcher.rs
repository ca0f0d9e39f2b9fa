//! Query and filter evaluation for the in-memory engine

use crate::backend::memory::analysis::{fuzzy_eq, max_edits, tokens_of};
use crate::error::{EsError, Result};
use crate::mapping::{self, property_at};
use serde_json::{Map, Value as Json};
use std::cmp::Ordering;

type Properties = Map<String, Json>;

/// Leaf values at a dotted path; arrays are flattened and nulls dropped
pub fn values_at<'a>(source: &'a Json, path: &str) -> Vec<&'a Json> {
    let mut current = vec![source];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            collect_field(value, segment, &mut next);
        }
        current = next;
    }

    let mut leaves = Vec::new();
    for value in current {
        flatten(value, &mut leaves);
    }
    leaves
}

fn collect_field<'a>(value: &'a Json, segment: &str, out: &mut Vec<&'a Json>) {
    match value {
        Json::Object(map) => {
            if let Some(v) = map.get(segment) {
                out.push(v);
            }
        }
        Json::Array(items) => {
            for item in items {
                collect_field(item, segment, out);
            }
        }
        _ => {}
    }
}

fn flatten<'a>(value: &'a Json, out: &mut Vec<&'a Json>) {
    match value {
        Json::Null => {}
        Json::Array(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        other => out.push(other),
    }
}

/// Every scalar leaf of a document (the `_all` field)
pub fn all_leaves(source: &Json) -> Vec<&Json> {
    let mut leaves = Vec::new();
    all_leaves_into(source, &mut leaves);
    leaves
}

fn all_leaves_into<'a>(value: &'a Json, out: &mut Vec<&'a Json>) {
    match value {
        Json::Object(map) => map.values().for_each(|v| all_leaves_into(v, out)),
        Json::Array(items) => items.iter().for_each(|v| all_leaves_into(v, out)),
        Json::Null => {}
        other => out.push(other),
    }
}

/// Strings are analyzed unless mapped `not_analyzed` or as a non-string type
pub fn is_analyzed(properties: Option<&Properties>, path: &str) -> bool {
    mapping::is_analyzed(property_at(properties, path))
}

/// Terms a document holds for `field`, as the index would store them
pub fn indexed_terms(properties: Option<&Properties>, source: &Json, field: &str) -> Vec<Json> {
    let analyzed = is_analyzed(properties, field);
    values_at(source, field)
        .into_iter()
        .flat_map(|value| match value {
            Json::String(_) if analyzed => tokens_of(value).into_iter().map(Json::String).collect(),
            other => vec![other.clone()],
        })
        .collect()
}

/// Loose equality between a stored value and a query value
pub fn loose_eq(stored: &Json, wanted: &Json) -> bool {
    compare(stored, wanted) == Some(Ordering::Equal)
}

/// Ordering between scalar values, coercing numeric strings
pub fn compare(a: &Json, b: &Json) -> Option<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Json::Number(x), Json::String(s)) => x.as_f64()?.partial_cmp(&s.parse::<f64>().ok()?),
        (Json::String(s), Json::Number(y)) => s.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        (Json::String(x), Json::String(y)) => Some(x.cmp(y)),
        (Json::Bool(x), Json::Bool(y)) => Some(x.cmp(y)),
        (Json::Bool(x), Json::String(s)) | (Json::String(s), Json::Bool(x)) => {
            (s == &x.to_string()).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

fn unsupported(clause: &str) -> EsError {
    EsError::Transport {
        status: 400,
        message: format!("QueryParsingException: No query registered for [{}]", clause),
    }
}

/// Evaluates a query DSL clause against one document.
///
/// `Ok(Some(score))` on match, `Ok(None)` otherwise. Filters score `1.0`.
pub struct Matcher<'a> {
    properties: Option<&'a Properties>,
}

impl<'a> Matcher<'a> {
    pub fn new(properties: Option<&'a Properties>) -> Self {
        Self { properties }
    }

    pub fn matches(&self, clause: &Json, doc: &Json) -> Result<bool> {
        Ok(self.score(clause, doc)?.is_some())
    }

    pub fn score(&self, clause: &Json, doc: &Json) -> Result<Option<f64>> {
        let clause = match clause.as_object() {
            Some(clause) if !clause.is_empty() => clause,
            _ => return Ok(Some(1.0)),
        };

        let mut total = 0.0;
        for (kind, spec) in clause {
            let score = match kind.as_str() {
                "match_all" => Some(1.0),
                "match" => self.match_query(spec, doc)?,
                "filtered" => self.filtered(spec, doc)?,
                "bool" => self.boolean(spec, doc)?,
                "constant_score" => {
                    let inner = spec.get("filter").or_else(|| spec.get("query"));
                    match inner {
                        Some(inner) => self.score(inner, doc)?.map(|_| 1.0),
                        None => Some(1.0),
                    }
                }
                "query" => self.score(spec, doc)?,
                "nested" => {
                    let inner = spec.get("query").or_else(|| spec.get("filter"));
                    match inner {
                        Some(inner) => self.score(inner, doc)?,
                        None => Some(1.0),
                    }
                }
                "term" => self.term(spec, doc).then_some(1.0),
                "terms" => self.terms(spec, doc).then_some(1.0),
                "range" => self.range(spec, doc).then_some(1.0),
                "exists" => self.exists(spec, doc).then_some(1.0),
                "missing" => (!self.exists(spec, doc)).then_some(1.0),
                "and" => self.all_of(spec, doc)?.then_some(1.0),
                "or" => self.any_of(spec, doc)?.then_some(1.0),
                "not" => {
                    let inner = spec.get("filter").unwrap_or(spec);
                    (!self.matches(inner, doc)?).then_some(1.0)
                }
                other => return Err(unsupported(other)),
            };
            match score {
                Some(score) => total += score,
                None => return Ok(None),
            }
        }
        Ok(Some(total))
    }

    fn match_query(&self, spec: &Json, doc: &Json) -> Result<Option<f64>> {
        let (field, options) = match spec.as_object().and_then(|m| m.iter().next()) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let (text, fuzziness, require_all) = match options {
            Json::Object(opts) => (
                opts.get("query").cloned().unwrap_or(Json::Null),
                opts.get("fuzziness"),
                opts.get("operator").and_then(Json::as_str) == Some("and"),
            ),
            other => (other.clone(), None, false),
        };

        let (query_terms, doc_terms): (Vec<String>, Vec<String>) =
            if field == "_all" || is_analyzed(self.properties, field) {
                let leaves = if field == "_all" {
                    all_leaves(doc)
                } else {
                    values_at(doc, field)
                };
                (
                    tokens_of(&text),
                    leaves.into_iter().flat_map(tokens_of).collect(),
                )
            } else {
                let raw = |v: &Json| match v {
                    Json::String(s) => Some(s.clone()),
                    Json::Null => None,
                    other => Some(other.to_string()),
                };
                (
                    raw(&text).into_iter().collect(),
                    values_at(doc, field).into_iter().filter_map(raw).collect(),
                )
            };

        if query_terms.is_empty() {
            return Ok(None);
        }

        let matched = query_terms
            .iter()
            .filter(|term| {
                let edits = max_edits(fuzziness, term);
                doc_terms.iter().any(|candidate| fuzzy_eq(term, candidate, edits))
            })
            .count();

        if matched == 0 || (require_all && matched < query_terms.len()) {
            return Ok(None);
        }
        Ok(Some(matched as f64 / query_terms.len() as f64))
    }

    fn filtered(&self, spec: &Json, doc: &Json) -> Result<Option<f64>> {
        let score = match spec.get("query") {
            Some(query) => self.score(query, doc)?,
            None => Some(1.0),
        };
        let score = match score {
            Some(score) => score,
            None => return Ok(None),
        };
        match spec.get("filter") {
            Some(filter) if !self.matches(filter, doc)? => Ok(None),
            _ => Ok(Some(score)),
        }
    }

    fn boolean(&self, spec: &Json, doc: &Json) -> Result<Option<f64>> {
        let clauses = |key: &str| -> Vec<&Json> {
            match spec.get(key) {
                Some(Json::Array(items)) => items.iter().collect(),
                Some(Json::Null) | None => Vec::new(),
                Some(single) => vec![single],
            }
        };

        let mut score = 0.0;
        for clause in clauses("must").into_iter().chain(clauses("filter")) {
            match self.score(clause, doc)? {
                Some(s) => score += s,
                None => return Ok(None),
            }
        }

        for clause in clauses("must_not") {
            if self.matches(clause, doc)? {
                return Ok(None);
            }
        }

        let should = clauses("should");
        if !should.is_empty() {
            let mut matched = false;
            for clause in should {
                if let Some(s) = self.score(clause, doc)? {
                    matched = true;
                    score += s;
                }
            }
            if !matched {
                return Ok(None);
            }
        }

        Ok(Some(if score > 0.0 { score } else { 1.0 }))
    }

    fn field_and_value<'s>(spec: &'s Json) -> Option<(&'s String, &'s Json)> {
        let (field, value) = spec.as_object()?.iter().next()?;
        let value = match value {
            Json::Object(opts) => opts.get("value").or_else(|| opts.get("term"))?,
            other => other,
        };
        Some((field, value))
    }

    fn term(&self, spec: &Json, doc: &Json) -> bool {
        match Self::field_and_value(spec) {
            Some((field, wanted)) => indexed_terms(self.properties, doc, field)
                .iter()
                .any(|stored| loose_eq(stored, wanted)),
            None => false,
        }
    }

    fn terms(&self, spec: &Json, doc: &Json) -> bool {
        let entry = spec
            .as_object()
            .and_then(|m| m.iter().find(|(k, _)| k.as_str() != "execution"));
        match entry {
            Some((field, Json::Array(wanted))) => {
                let stored = indexed_terms(self.properties, doc, field);
                wanted
                    .iter()
                    .any(|w| stored.iter().any(|s| loose_eq(s, w)))
            }
            _ => false,
        }
    }

    fn range(&self, spec: &Json, doc: &Json) -> bool {
        let (field, bounds) = match spec.as_object().and_then(|m| m.iter().next()) {
            Some((field, Json::Object(bounds))) => (field, bounds),
            _ => return false,
        };

        values_at(doc, field).into_iter().any(|value| {
            bounds.iter().all(|(op, bound)| {
                if bound.is_null() {
                    return true;
                }
                match (op.as_str(), compare(value, bound)) {
                    ("gt", Some(o)) => o == Ordering::Greater,
                    ("gte" | "from", Some(o)) => o != Ordering::Less,
                    ("lt", Some(o)) => o == Ordering::Less,
                    ("lte" | "to", Some(o)) => o != Ordering::Greater,
                    ("include_lower" | "include_upper" | "boost" | "format", _) => true,
                    _ => false,
                }
            })
        })
    }

    fn exists(&self, spec: &Json, doc: &Json) -> bool {
        match spec.get("field").and_then(Json::as_str) {
            Some(field) => values_at(doc, field)
                .into_iter()
                .any(|v| !matches!(v, Json::String(s) if s.is_empty())),
            None => false,
        }
    }

    fn all_of(&self, spec: &Json, doc: &Json) -> Result<bool> {
        let items = spec.get("filters").unwrap_or(spec);
        match items {
            Json::Array(items) => {
                for item in items {
                    if !self.matches(item, doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn any_of(&self, spec: &Json, doc: &Json) -> Result<bool> {
        let items = spec.get("filters").unwrap_or(spec);
        match items {
            Json::Array(items) => {
                for item in items {
                    if self.matches(item, doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }
}
