//! Lazy, chainable search queryset

use crate::backend::RequestParams;
use crate::error::Result;
use crate::manager::Manager;
use crate::models::Record;
use crate::query::body::{self, FacetSpec, SuggestSpec};
use crate::query::lookup::{parse_lookup, FilterValue, Predicate};
use crate::query::params::{mlt_params, window_params};
use crate::query::response::{count_of, source_of, SearchOutcome};
use crate::serializer::Document;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Result mode: hits are returned as raw documents
#[derive(Debug, Clone, Copy)]
pub struct Raw;

/// Result mode: hits are turned into records by the model's serializer
#[derive(Debug, Clone, Copy)]
pub struct Deserialized;

#[derive(Debug, Clone, PartialEq)]
enum Mode {
    Search,
    MoreLikeThis { id: String, params: RequestParams },
}

/// `[start, stop)` pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Window {
    start: usize,
    stop: Option<usize>,
}

#[derive(Default)]
struct Evaluation {
    /// Window `outcome` was fetched with
    window: Option<Window>,
    outcome: Option<Arc<SearchOutcome>>,
    /// Known hit total; `Some(0)` is a real count
    total: Option<u64>,
    records: Option<(Arc<SearchOutcome>, Arc<Vec<Record>>)>,
}

/// A search against one model's index, built up by chaining and executed
/// on first read.
///
/// Chain methods return a new queryset and leave the receiver untouched;
/// the copy never shares the receiver's results. Readers execute at most
/// one request per window and cache the outcome. Transport failures are
/// returned as is, never retried.
pub struct Queryset<M = Raw> {
    manager: Manager,
    text: String,
    predicates: Vec<Predicate>,
    ordering: Option<Vec<String>>,
    window: Window,
    facets: Option<FacetSpec>,
    suggest: Option<SuggestSpec>,
    fuzziness: Option<f64>,
    mode: Mode,
    cache: Mutex<Evaluation>,
    _mode: PhantomData<fn() -> M>,
}

impl<M> Clone for Queryset<M> {
    fn clone(&self) -> Self {
        self.with_mode()
    }
}

impl<M> fmt::Debug for Queryset<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queryset")
            .field("model", &self.manager.meta().name)
            .field("text", &self.text)
            .field("predicates", &self.predicates)
            .field("ordering", &self.ordering)
            .field("window", &self.window)
            .field("mode", &self.mode)
            .field("evaluated", &self.is_evaluated())
            .finish()
    }
}

impl Queryset<Raw> {
    /// Unfiltered queryset over `manager`'s index, in the model's default ordering
    pub fn new(manager: Manager) -> Self {
        let ordering = manager.default_ordering();
        Self {
            manager,
            text: String::new(),
            predicates: Vec::new(),
            ordering,
            window: Window::default(),
            facets: None,
            suggest: None,
            fuzziness: None,
            mode: Mode::Search,
            cache: Mutex::new(Evaluation::default()),
            _mode: PhantomData,
        }
    }

    /// Hits of the current window as documents
    pub async fn fetch(&self) -> Result<Vec<Document>> {
        Ok(self.execute(self.window).await?.hits.clone())
    }

    /// Hits `[start, stop)` relative to this queryset's window
    pub async fn get_slice(&self, start: usize, stop: Option<usize>) -> Result<Vec<Document>> {
        let window = self.narrow(start, stop);
        Ok(self.execute(window).await?.hits.clone())
    }

    pub async fn nth(&self, index: usize) -> Result<Option<Document>> {
        Ok(self.get_slice(index, Some(index.saturating_add(1))).await?.into_iter().next())
    }

    pub async fn contains(&self, document: &Document) -> Result<bool> {
        Ok(self.execute(self.window).await?.hits.contains(document))
    }

    /// Direct lookup by primary key, bypassing the query
    pub async fn get(&self, pk: impl Into<Json>) -> Result<Document> {
        self.get_source(pk.into()).await
    }
}

impl Queryset<Deserialized> {
    /// Hits of the current window as records
    pub async fn fetch(&self) -> Result<Vec<Record>> {
        let outcome = self.execute(self.window).await?;
        Ok(self.materialize(outcome).await?.as_ref().clone())
    }

    pub async fn get_slice(&self, start: usize, stop: Option<usize>) -> Result<Vec<Record>> {
        let outcome = self.execute(self.narrow(start, stop)).await?;
        Ok(self.materialize(outcome).await?.as_ref().clone())
    }

    pub async fn nth(&self, index: usize) -> Result<Option<Record>> {
        Ok(self.get_slice(index, Some(index.saturating_add(1))).await?.into_iter().next())
    }

    pub async fn contains(&self, record: &Record) -> Result<bool> {
        let outcome = self.execute(self.window).await?;
        Ok(self.materialize(outcome).await?.contains(record))
    }

    pub async fn get(&self, pk: impl Into<Json>) -> Result<Record> {
        let source = self.get_source(pk.into()).await?;
        self.manager.serializer()?.deserialize(&source).await
    }

    async fn materialize(&self, outcome: Arc<SearchOutcome>) -> Result<Arc<Vec<Record>>> {
        let cached = self.cache.lock().records.clone();
        if let Some((cached_for, records)) = cached {
            if Arc::ptr_eq(&cached_for, &outcome) {
                return Ok(records);
            }
        }

        let records = Arc::new(
            self.manager
                .serializer()?
                .deserialize_many(&outcome.hits)
                .await?,
        );

        let mut cache = self.cache.lock();
        let current = cache
            .outcome
            .as_ref()
            .map(|o| Arc::ptr_eq(o, &outcome))
            .unwrap_or(false);
        if current {
            cache.records = Some((outcome, records.clone()));
        }
        Ok(records)
    }
}

impl<M> Queryset<M> {
    fn with_mode<N>(&self) -> Queryset<N> {
        Queryset {
            manager: self.manager.clone(),
            text: self.text.clone(),
            predicates: self.predicates.clone(),
            ordering: self.ordering.clone(),
            window: self.window,
            facets: self.facets.clone(),
            suggest: self.suggest.clone(),
            fuzziness: self.fuzziness,
            mode: self.mode.clone(),
            cache: Mutex::new(Evaluation::default()),
            _mode: PhantomData,
        }
    }

    fn chain(&self, change: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        change(&mut next);
        next
    }

    fn predicate(&self, lookup: &str, value: FilterValue) -> Predicate {
        let (field, op) = parse_lookup(lookup);
        let field = if field == "pk" {
            self.manager.meta().pk.clone()
        } else {
            field
        };
        Predicate::new(field, op, value)
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// Replace the free-text query; empty matches everything
    pub fn query(&self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.chain(|qs| qs.text = text)
    }

    pub fn search(&self, text: impl Into<String>) -> Self {
        self.query(text)
    }

    pub fn all(&self) -> Self {
        self.query("")
    }

    /// Add a `field`, `field__op` or `relation__field__op` predicate.
    ///
    /// Predicates accumulate and all must hold, whatever order they were
    /// added in.
    pub fn filter(&self, lookup: &str, value: impl Into<FilterValue>) -> Self {
        let predicate = self.predicate(lookup, value.into());
        self.chain(|qs| qs.predicates.push(predicate))
    }

    pub fn filter_many<I, K>(&self, lookups: I) -> Self
    where
        I: IntoIterator<Item = (K, FilterValue)>,
        K: AsRef<str>,
    {
        let predicates: Vec<Predicate> = lookups
            .into_iter()
            .map(|(lookup, value)| self.predicate(lookup.as_ref(), value))
            .collect();
        self.chain(|qs| qs.predicates.extend(predicates))
    }

    /// Add the inverse of a predicate.
    ///
    /// `range` and `contains` cannot be inverted and fail with
    /// [`EsError::UnsupportedLookup`](crate::EsError::UnsupportedLookup).
    pub fn exclude(&self, lookup: &str, value: impl Into<FilterValue>) -> Result<Self> {
        let predicate = self.predicate(lookup, value.into()).inverted()?;
        Ok(self.chain(|qs| qs.predicates.push(predicate)))
    }

    /// Sort by `fields` (`-field` for descending), then by relevance
    pub fn order_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ordering: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.chain(|qs| qs.ordering = Some(ordering))
    }

    /// Request term buckets for `fields`.
    ///
    /// With `use_globals` the buckets count the whole index regardless of
    /// the query and filters.
    pub fn facet<I, S>(&self, fields: I, limit: Option<usize>, use_globals: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = FacetSpec {
            fields: fields.into_iter().map(Into::into).collect(),
            limit,
            use_globals,
        };
        self.chain(|qs| qs.facets = Some(spec))
    }

    /// Request term suggestions for `fields`, seeded with the query text
    pub fn suggest<I, S>(&self, fields: I, limit: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = SuggestSpec {
            fields: fields.into_iter().map(Into::into).collect(),
            limit,
        };
        self.chain(|qs| qs.suggest = Some(spec))
    }

    /// Switch to documents similar to document `id`
    pub fn mlt(&self, id: impl Into<String>, params: RequestParams) -> Self {
        let mode = Mode::MoreLikeThis {
            id: id.into(),
            params,
        };
        self.chain(|qs| qs.mode = mode)
    }

    /// Override the process-wide fuzziness; `0.0` disables fuzzy matching
    pub fn fuzziness(&self, fuzziness: f64) -> Self {
        self.chain(|qs| qs.fuzziness = Some(fuzziness))
    }

    /// Restrict to hits `[start, stop)`
    pub fn slice(&self, start: usize, stop: Option<usize>) -> Self {
        let window = self.narrow(start, stop);
        self.chain(|qs| qs.window = window)
    }

    /// Same queryset, returning records instead of documents
    pub fn deserialize(&self) -> Queryset<Deserialized> {
        self.with_mode()
    }

    pub fn is_more_like_this(&self) -> bool {
        matches!(self.mode, Mode::MoreLikeThis { .. })
    }

    fn narrow(&self, start: usize, stop: Option<usize>) -> Window {
        let start = self.window.start.saturating_add(start);
        let stop = match (stop.map(|s| self.window.start.saturating_add(s)), self.window.stop) {
            (Some(stop), Some(limit)) => Some(stop.min(limit)),
            (Some(stop), None) => Some(stop),
            (None, limit) => limit,
        };
        Window {
            start,
            stop: stop.map(|s| s.max(start)),
        }
    }

    fn effective_fuzziness(&self) -> f64 {
        self.fuzziness.unwrap_or(self.manager.settings().fuzziness)
    }

    /// Query and filters only (what a count request sends)
    pub fn search_body(&self) -> Result<Json> {
        let mapping = self.manager.make_mapping();
        body::search_body(
            &self.text,
            self.effective_fuzziness(),
            &self.predicates,
            self.manager.properties_in(&mapping),
        )
    }

    /// Full request body: query, filters, facets, suggestions and sort
    pub fn request_body(&self) -> Result<Json> {
        let mut body = self.search_body()?;

        if let Some(facets) = &self.facets {
            body["aggs"] = body::facet_aggs(facets);
        }
        if let Some(suggest) = &self.suggest {
            body["suggest"] = body::suggest_clause(suggest, &self.text);
        }
        if let Some(ordering) = self.ordering.as_deref().filter(|o| !o.is_empty()) {
            body["sort"] = body::sort_clause(ordering);
        }

        Ok(body)
    }

    fn cached(&self, window: Window) -> Option<Arc<SearchOutcome>> {
        let cache = self.cache.lock();
        match (&cache.outcome, cache.window) {
            (Some(outcome), Some(cached)) if cached == window => Some(outcome.clone()),
            _ => None,
        }
    }

    async fn execute(&self, window: Window) -> Result<Arc<SearchOutcome>> {
        if let Some(outcome) = self.cached(window) {
            return Ok(outcome);
        }

        let body = self.request_body()?;
        let params = window_params(window.start, window.stop);
        let index = self.manager.index_name();
        let doc_type = self.manager.doc_type();
        let backend = self.manager.backend();

        let response = match &self.mode {
            Mode::Search => backend.search(&index, &doc_type, &body, &params).await?,
            Mode::MoreLikeThis { id, params: mlt } => {
                let params = mlt_params(params, mlt);
                backend.mlt(&index, &doc_type, id, &body, &params).await?
            }
        };

        let global_facets = self.facets.as_ref().map(|f| f.use_globals).unwrap_or(false);
        let outcome = Arc::new(SearchOutcome::parse(
            response,
            self.facets.is_some(),
            global_facets,
        )?);

        debug!(
            index = %index,
            doc_type = %doc_type,
            hits = outcome.hits.len(),
            total = outcome.total,
            mlt = self.is_more_like_this(),
            "Queryset evaluated"
        );

        let mut cache = self.cache.lock();
        cache.window = Some(window);
        cache.outcome = Some(outcome.clone());
        cache.total = Some(outcome.total);
        cache.records = None;
        Ok(outcome)
    }

    async fn get_source(&self, pk: Json) -> Result<Document> {
        let id = match pk {
            Json::String(s) => s,
            other => other.to_string(),
        };
        let response = self
            .manager
            .backend()
            .get(&self.manager.index_name(), &self.manager.doc_type(), &id)
            .await?;
        source_of(&response)
    }

    /// Number of matching documents.
    ///
    /// Uses a count request unless the total is already known. More-like-this
    /// querysets have no count endpoint and are executed instead.
    pub async fn count(&self) -> Result<u64> {
        let known = self.cache.lock().total;
        if let Some(total) = known {
            return Ok(total);
        }

        if self.is_more_like_this() {
            return Ok(self.execute(self.window).await?.total);
        }

        let body = self.search_body()?;
        let body = body.as_object().filter(|b| !b.is_empty()).map(|_| &body);
        let response = self
            .manager
            .backend()
            .count(&self.manager.index_name(), &self.manager.doc_type(), body)
            .await?;
        let total = count_of(&response)?;

        self.cache.lock().total = Some(total);
        Ok(total)
    }

    pub async fn len(&self) -> Result<u64> {
        self.count().await
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.count().await? != 0)
    }

    /// Facet buckets (executes the queryset)
    pub async fn facets(&self) -> Result<Option<Json>> {
        Ok(self.execute(self.window).await?.facets.clone())
    }

    /// Term suggestions (executes the queryset)
    pub async fn suggestions(&self) -> Result<Option<Json>> {
        Ok(self.execute(self.window).await?.suggestions.clone())
    }

    pub async fn max_score(&self) -> Result<Option<f64>> {
        Ok(self.execute(self.window).await?.max_score)
    }

    /// Raw engine response; `None` until the queryset has been evaluated
    pub fn response(&self) -> Option<Arc<Json>> {
        self.cache.lock().outcome.as_ref().map(|o| o.raw.clone())
    }

    pub fn is_evaluated(&self) -> bool {
        self.cache.lock().outcome.is_some()
    }
}
