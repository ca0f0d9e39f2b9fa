//! In-memory search engine
//!
//! Evaluates the subset of the query DSL this crate emits (match, filtered,
//! bool, term, range, exists/missing, terms and global aggregations, term and
//! completion suggesters, sorting, from/size) against documents held in a
//! `DashMap`. Writes are visible immediately. Every request is counted so
//! callers can assert how many round trips an operation made.

pub mod aggregate;
pub mod analysis;
pub mod matcher;

use crate::backend::{BulkItem, RequestParams, SearchBackend};
use crate::error::{EsError, Result};
use aggregate::{aggregate, completion_suggest, term_suggest};
use analysis::tokens_of;
use async_trait::async_trait;
use dashmap::DashMap;
use matcher::{all_leaves, compare, is_analyzed, values_at, Matcher};
use parking_lot::Mutex;
use serde_json::{json, Map, Value as Json};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

const DEFAULT_SIZE: usize = 10;

type Properties = Map<String, Json>;

#[derive(Debug, Clone)]
struct StoredDoc {
    seq: u64,
    version: u64,
    source: Json,
}

#[derive(Debug, Default)]
struct IndexState {
    settings: Json,
    /// doc_type -> properties
    mappings: HashMap<String, Properties>,
    /// doc_type -> id -> document
    docs: HashMap<String, BTreeMap<String, StoredDoc>>,
}

impl IndexState {
    fn corpus(&self, doc_type: &str) -> Vec<(&String, &StoredDoc)> {
        let mut docs: Vec<_> = self
            .docs
            .get(doc_type)
            .map(|docs| docs.iter().collect())
            .unwrap_or_default();
        docs.sort_by_key(|(_, d)| d.seq);
        docs
    }

    fn merge_properties(&mut self, doc_type: &str, properties: &Properties) {
        let entry = self.mappings.entry(doc_type.to_string()).or_default();
        for (field, mapping) in properties {
            entry.insert(field.clone(), mapping.clone());
        }
    }
}

struct Hit<'a> {
    id: &'a str,
    seq: u64,
    score: f64,
    source: &'a Json,
}

/// In-memory [`SearchBackend`] (for embedding and testing)
#[derive(Clone)]
pub struct MemoryBackend {
    indices: Arc<DashMap<String, IndexState>>,
    requests: Arc<Mutex<HashMap<&'static str, usize>>>,
    seq: Arc<AtomicU64>,
    reachable: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            indices: Arc::new(DashMap::new()),
            requests: Arc::new(Mutex::new(HashMap::new())),
            seq: Arc::new(AtomicU64::new(0)),
            reachable: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Requests served for one operation (`search`, `count`, `get`, ...)
    pub fn request_count(&self, operation: &str) -> usize {
        self.requests.lock().get(operation).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().values().sum()
    }

    pub fn reset_requests(&self) {
        self.requests.lock().clear();
    }

    /// Simulate an unreachable cluster
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, AtomicOrdering::SeqCst);
    }

    pub fn document_count(&self, index: &str, doc_type: &str) -> usize {
        self.indices
            .get(index)
            .and_then(|state| state.docs.get(doc_type).map(BTreeMap::len))
            .unwrap_or(0)
    }

    fn record(&self, operation: &'static str) -> Result<()> {
        *self.requests.lock().entry(operation).or_default() += 1;
        if self.reachable.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(EsError::Connection(format!(
                "{}: connection refused (in-memory cluster offline)",
                operation
            )))
        }
    }

    fn missing_index(index: &str) -> EsError {
        EsError::NotFound(format!("IndexMissingException[[{}] missing]", index))
    }

    fn store(&self, index: &str, doc_type: &str, id: &str, source: &Json) -> (u64, bool) {
        let mut state = self.indices.entry(index.to_string()).or_default();
        let docs = state.docs.entry(doc_type.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) => {
                existing.version += 1;
                existing.source = source.clone();
                (existing.version, false)
            }
            None => {
                let seq = self.seq.fetch_add(1, AtomicOrdering::SeqCst);
                docs.insert(
                    id.to_string(),
                    StoredDoc {
                        seq,
                        version: 1,
                        source: source.clone(),
                    },
                );
                (1, true)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn respond(
        index: &str,
        doc_type: &str,
        mut hits: Vec<Hit<'_>>,
        corpus: &[&Json],
        body: &Json,
        properties: Option<&Properties>,
        from: usize,
        size: usize,
    ) -> Result<Json> {
        sort_hits(&mut hits, body.get("sort"), properties);

        let total = hits.len();
        let max_score = hits
            .iter()
            .map(|h| h.score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));

        let mut response = json!({
            "took": 1,
            "timed_out": false,
            "_shards": {"total": 1, "successful": 1, "failed": 0},
        });

        if let Some(Json::Object(aggs)) = body.get("aggs").or_else(|| body.get("aggregations")) {
            let matched: Vec<&Json> = hits.iter().map(|h| h.source).collect();
            response["aggregations"] = Json::Object(aggregate(aggs, &matched, corpus, properties)?);
        }

        if let Some(Json::Object(suggest)) = body.get("suggest") {
            let mut suggestions = Map::new();
            for (name, spec) in suggest {
                suggestions.insert(name.clone(), term_suggest(spec, corpus, properties)?);
            }
            response["suggest"] = Json::Object(suggestions);
        }

        let page: Vec<Json> = hits
            .iter()
            .skip(from)
            .take(size)
            .map(|h| {
                json!({
                    "_index": index,
                    "_type": doc_type,
                    "_id": h.id,
                    "_score": h.score,
                    "_source": h.source,
                })
            })
            .collect();

        response["hits"] = json!({
            "total": total,
            "max_score": max_score,
            "hits": page,
        });
        Ok(response)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn param_usize(params: &RequestParams, body: &Json, key: &str) -> Option<usize> {
    let value = params.get(key).or_else(|| body.get(key))?;
    match value {
        Json::Number(n) => n.as_u64().map(|n| n as usize),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn param_list(params: &RequestParams, key: &str) -> Option<Vec<String>> {
    match params.get(key)? {
        Json::Array(items) => Some(
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect(),
        ),
        Json::String(s) => Some(s.split(',').map(|f| f.trim().to_string()).collect()),
        _ => None,
    }
}

/// Sort keys of a `sort` clause: `(field, descending)`
fn sort_keys(sort: Option<&Json>) -> Vec<(String, bool)> {
    let entries = match sort {
        Some(Json::Array(entries)) => entries.clone(),
        Some(single) => vec![single.clone()],
        None => return vec![("_score".to_string(), true)],
    };

    entries
        .iter()
        .filter_map(|entry| match entry {
            Json::String(field) if field == "_score" => Some((field.clone(), true)),
            Json::String(field) => Some((field.clone(), false)),
            Json::Object(spec) => spec.iter().next().map(|(field, order)| {
                let order = order
                    .as_str()
                    .or_else(|| order.get("order").and_then(Json::as_str));
                let desc = match order {
                    Some(order) => order == "desc",
                    None => field == "_score",
                };
                (field.clone(), desc)
            }),
            _ => None,
        })
        .collect()
}

fn sort_value(source: &Json, field: &str, properties: Option<&Properties>) -> Option<Json> {
    let value = values_at(source, field).into_iter().next()?.clone();
    match value {
        Json::String(s) if is_analyzed(properties, field) => Some(Json::String(s.to_lowercase())),
        other => Some(other),
    }
}

fn sort_hits(hits: &mut [Hit<'_>], sort: Option<&Json>, properties: Option<&Properties>) {
    let keys = sort_keys(sort);

    hits.sort_by(|a, b| {
        for (field, desc) in &keys {
            let ordering = if field == "_score" {
                a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal)
            } else {
                match (
                    sort_value(a.source, field, properties),
                    sort_value(b.source, field, properties),
                ) {
                    (Some(x), Some(y)) => compare(&x, &y).unwrap_or(Ordering::Equal),
                    // missing values sort last in either direction
                    (Some(_), None) => return Ordering::Less,
                    (None, Some(_)) => return Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            };
            let ordering = if *desc { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.seq.cmp(&b.seq)
    });
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn ping(&self) -> Result<bool> {
        Ok(self.record("ping").is_ok())
    }

    async fn search(&self, index: &str, doc_type: &str, body: &Json, params: &RequestParams) -> Result<Json> {
        self.record("search")?;
        let state = self
            .indices
            .get(index)
            .ok_or_else(|| Self::missing_index(index))?;
        let properties = state.mappings.get(doc_type);
        let matcher = Matcher::new(properties);

        let docs = state.corpus(doc_type);
        let mut hits = Vec::new();
        for (id, doc) in &docs {
            let score = match body.get("query") {
                Some(query) => matcher.score(query, &doc.source)?,
                None => Some(1.0),
            };
            if let Some(score) = score {
                hits.push(Hit {
                    id: id.as_str(),
                    seq: doc.seq,
                    score,
                    source: &doc.source,
                });
            }
        }

        let corpus: Vec<&Json> = docs.iter().map(|(_, d)| &d.source).collect();
        let from = param_usize(params, body, "from").unwrap_or(0);
        let size = param_usize(params, body, "size").unwrap_or(DEFAULT_SIZE);

        tracing::debug!(index = %index, doc_type = %doc_type, hits = hits.len(), "In-memory search");
        Self::respond(index, doc_type, hits, &corpus, body, properties, from, size)
    }

    async fn count(&self, index: &str, doc_type: &str, body: Option<&Json>) -> Result<Json> {
        self.record("count")?;
        let state = self
            .indices
            .get(index)
            .ok_or_else(|| Self::missing_index(index))?;
        let matcher = Matcher::new(state.mappings.get(doc_type));

        let mut count = 0;
        for (_, doc) in state.corpus(doc_type) {
            let matched = match body.and_then(|b| b.get("query")) {
                Some(query) => matcher.matches(query, &doc.source)?,
                None => true,
            };
            if matched {
                count += 1;
            }
        }

        Ok(json!({
            "count": count,
            "_shards": {"total": 1, "successful": 1, "failed": 0},
        }))
    }

    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Json> {
        self.record("get")?;
        let state = self
            .indices
            .get(index)
            .ok_or_else(|| Self::missing_index(index))?;
        let doc = state
            .docs
            .get(doc_type)
            .and_then(|docs| docs.get(id))
            .ok_or_else(|| EsError::NotFound(format!("{}/{}/{} not found", index, doc_type, id)))?;

        Ok(json!({
            "_index": index,
            "_type": doc_type,
            "_id": id,
            "_version": doc.version,
            "found": true,
            "_source": doc.source,
        }))
    }

    async fn index(&self, index: &str, doc_type: &str, id: &str, body: &Json) -> Result<Json> {
        self.record("index")?;
        let (version, created) = self.store(index, doc_type, id, body);
        Ok(json!({
            "_index": index,
            "_type": doc_type,
            "_id": id,
            "_version": version,
            "created": created,
        }))
    }

    async fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<Json> {
        self.record("delete")?;
        let removed = self
            .indices
            .get_mut(index)
            .and_then(|mut state| state.docs.get_mut(doc_type).and_then(|docs| docs.remove(id)));

        match removed {
            Some(doc) => Ok(json!({
                "found": true,
                "_index": index,
                "_type": doc_type,
                "_id": id,
                "_version": doc.version + 1,
            })),
            None => Err(EsError::NotFound(format!("{}/{}/{} not found", index, doc_type, id))),
        }
    }

    async fn mlt(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Json,
        params: &RequestParams,
    ) -> Result<Json> {
        self.record("mlt")?;
        let state = self
            .indices
            .get(index)
            .ok_or_else(|| Self::missing_index(index))?;
        let properties = state.mappings.get(doc_type);
        let reference = state
            .docs
            .get(doc_type)
            .and_then(|docs| docs.get(id))
            .ok_or_else(|| EsError::NotFound(format!("{}/{}/{} not found", index, doc_type, id)))?;

        let fields = param_list(params, "mlt_fields");
        let terms_of = |source: &Json| -> BTreeSet<String> {
            let leaves = match &fields {
                Some(fields) => fields
                    .iter()
                    .flat_map(|f| values_at(source, f))
                    .collect::<Vec<_>>(),
                None => all_leaves(source)
                    .into_iter()
                    .filter(|v| v.is_string())
                    .collect(),
            };
            leaves.into_iter().flat_map(tokens_of).collect()
        };

        let reference_terms = terms_of(&reference.source);
        let matcher = Matcher::new(properties);
        let docs = state.corpus(doc_type);

        let mut hits = Vec::new();
        if !reference_terms.is_empty() {
            for (doc_id, doc) in &docs {
                if doc_id.as_str() == id {
                    continue;
                }
                let shared = terms_of(&doc.source).intersection(&reference_terms).count();
                if shared == 0 {
                    continue;
                }
                if let Some(query) = body.get("query") {
                    if !matcher.matches(query, &doc.source)? {
                        continue;
                    }
                }
                hits.push(Hit {
                    id: doc_id.as_str(),
                    seq: doc.seq,
                    score: shared as f64 / reference_terms.len() as f64,
                    source: &doc.source,
                });
            }
        }

        let corpus: Vec<&Json> = docs.iter().map(|(_, d)| &d.source).collect();
        let from = param_usize(params, &Json::Null, "search_from").unwrap_or(0);
        let size = param_usize(params, &Json::Null, "search_size").unwrap_or(DEFAULT_SIZE);

        Self::respond(index, doc_type, hits, &corpus, body, properties, from, size)
    }

    async fn suggest(&self, index: &str, body: &Json) -> Result<Json> {
        self.record("suggest")?;
        let state = self
            .indices
            .get(index)
            .ok_or_else(|| Self::missing_index(index))?;

        let corpus: Vec<&Json> = state
            .docs
            .values()
            .flat_map(|docs| docs.values().map(|d| &d.source))
            .collect();

        let mut response = json!({"_shards": {"total": 1, "successful": 1, "failed": 0}});
        if let Json::Object(entries) = body {
            for (name, spec) in entries {
                let result = if spec.get("completion").is_some() {
                    completion_suggest(spec, &corpus)?
                } else {
                    term_suggest(spec, &corpus, None)?
                };
                response[name] = result;
            }
        }
        Ok(response)
    }

    async fn bulk_index(&self, index: &str, doc_type: &str, items: &[BulkItem]) -> Result<Json> {
        self.record("bulk")?;
        let results: Vec<Json> = items
            .iter()
            .map(|(id, source)| {
                let (version, created) = self.store(index, doc_type, id, source);
                json!({"index": {
                    "_index": index,
                    "_type": doc_type,
                    "_id": id,
                    "_version": version,
                    "status": if created { 201 } else { 200 },
                }})
            })
            .collect();

        Ok(json!({"took": 1, "errors": false, "items": results}))
    }

    async fn create_index(&self, index: &str, body: &Json) -> Result<Json> {
        self.record("create_index")?;
        if self.indices.contains_key(index) {
            return Err(EsError::Transport {
                status: 400,
                message: format!("IndexAlreadyExistsException[[{}] already exists]", index),
            });
        }

        let mut state = IndexState {
            settings: body.get("settings").cloned().unwrap_or_else(|| json!({})),
            ..IndexState::default()
        };
        if let Some(Json::Object(mappings)) = body.get("mappings") {
            for (doc_type, mapping) in mappings {
                if let Some(Json::Object(properties)) = mapping.get("properties") {
                    state.merge_properties(doc_type, properties);
                }
            }
        }
        self.indices.insert(index.to_string(), state);

        Ok(json!({"acknowledged": true}))
    }

    async fn delete_index(&self, index: &str) -> Result<Json> {
        self.record("delete_index")?;
        self.indices
            .remove(index)
            .map(|_| json!({"acknowledged": true}))
            .ok_or_else(|| Self::missing_index(index))
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, body: &Json) -> Result<Json> {
        self.record("put_mapping")?;
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| Self::missing_index(index))?;

        let properties = body
            .get(doc_type)
            .unwrap_or(body)
            .get("properties")
            .and_then(Json::as_object)
            .cloned()
            .unwrap_or_default();
        state.merge_properties(doc_type, &properties);

        Ok(json!({"acknowledged": true}))
    }

    async fn delete_mapping(&self, index: &str, doc_type: &str) -> Result<Json> {
        self.record("delete_mapping")?;
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| Self::missing_index(index))?;

        let had_mapping = state.mappings.remove(doc_type).is_some();
        let had_docs = state.docs.remove(doc_type).is_some();
        if had_mapping || had_docs {
            Ok(json!({"acknowledged": true}))
        } else {
            Err(EsError::NotFound(format!(
                "TypeMissingException[[{}] type[{}] missing]",
                index, doc_type
            )))
        }
    }

    async fn get_mapping(&self, index: &str, doc_type: &str) -> Result<Json> {
        self.record("get_mapping")?;
        let state = self
            .indices
            .get(index)
            .ok_or_else(|| Self::missing_index(index))?;
        let properties = state.mappings.get(doc_type).ok_or_else(|| {
            EsError::NotFound(format!("TypeMissingException[[{}] type[{}] missing]", index, doc_type))
        })?;

        Ok(json!({ index: { "mappings": { doc_type: { "properties": properties } } } }))
    }

    async fn get_settings(&self, index: &str) -> Result<Json> {
        self.record("get_settings")?;
        let state = self
            .indices
            .get(index)
            .ok_or_else(|| Self::missing_index(index))?;
        Ok(json!({ index: { "settings": { "index": state.settings } } }))
    }

    async fn refresh(&self, index: &str) -> Result<Json> {
        self.record("refresh")?;
        if !self.indices.contains_key(index) {
            return Err(Self::missing_index(index));
        }
        Ok(json!({"_shards": {"total": 1, "successful": 1, "failed": 0}}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .create_index("test", &json!({"mappings": {"person": {"properties": {
                "code": {"type": "string", "index": "not_analyzed"}
            }}}}))
            .await
            .unwrap();
        let people = [
            ("1", json!({"id": 1, "name": "John Smith", "code": "A"})),
            ("2", json!({"id": 2, "name": "Jane Smith", "code": "B"})),
            ("3", json!({"id": 3, "name": "Foo Bar", "code": "A"})),
        ];
        for (id, doc) in people.iter() {
            backend.index("test", "person", id, doc).await.unwrap();
        }
        backend
    }

    #[tokio::test]
    async fn test_search_sort_and_window() {
        let backend = seeded().await;
        let body = json!({"sort": [{"id": "desc"}, "_score"]});
        let mut params = RequestParams::new();
        params.insert("from".to_string(), json!(1));
        params.insert("size".to_string(), json!(1));

        let response = backend.search("test", "person", &body, &params).await.unwrap();

        assert_eq!(response["hits"]["total"], json!(3));
        let hits = response["hits"]["hits"].as_array().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["_id"], json!("2"));
    }

    #[tokio::test]
    async fn test_count_with_filter() {
        let backend = seeded().await;
        let body = json!({"query": {"filtered": {"filter": {"term": {"code": "A"}}}}});
        let response = backend.count("test", "person", Some(&body)).await.unwrap();
        assert_eq!(response["count"], json!(2));
        assert_eq!(backend.request_count("count"), 1);
    }

    #[tokio::test]
    async fn test_missing_document_and_index() {
        let backend = seeded().await;
        let err = backend.get("test", "person", "42").await.unwrap_err();
        assert!(err.is_not_found());
        let err = backend.get("nope", "person", "1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_existing_index_is_400() {
        let backend = seeded().await;
        let err = backend.create_index("test", &json!({})).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_mlt_excludes_reference() {
        let backend = seeded().await;
        let mut params = RequestParams::new();
        params.insert("mlt_fields".to_string(), json!(["name"]));

        let response = backend
            .mlt("test", "person", "1", &json!({}), &params)
            .await
            .unwrap();
        let ids: Vec<_> = response["hits"]["hits"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["_id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("2")]);
    }

    #[tokio::test]
    async fn test_offline_cluster() {
        let backend = seeded().await;
        backend.set_reachable(false);
        assert!(!backend.ping().await.unwrap());
        let err = backend
            .search("test", "person", &json!({}), &RequestParams::new())
            .await
            .unwrap_err();
        assert!(err.is_transport_failure());
    }
}
