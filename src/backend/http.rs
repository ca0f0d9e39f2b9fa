use crate::backend::{BulkItem, RequestParams, SearchBackend};
use crate::config::Settings;
use crate::error::{EsError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::Value as Json;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Elasticsearch REST client.
///
/// Build one per process and share it; the underlying `reqwest` client pools
/// connections.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    base: Url,
}

impl HttpBackend {
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::with_url(&settings.url, settings.request_timeout_secs)
    }

    pub fn with_url(url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("es-indexable/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EsError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| EsError::Configuration(format!("Invalid cluster url {}: {}", url, e)))?;
        if base.cannot_be_a_base() {
            return Err(EsError::Configuration(format!("Invalid cluster url {}", url)));
        }

        Ok(Self {
            client,
            base_url,
            base,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint under the base url; each segment is percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Json>,
        params: &RequestParams,
    ) -> Result<Json> {
        let url = self.url(segments);
        let mut request = self.client.request(method.clone(), url.clone());

        let query = query_pairs(params);
        if !query.is_empty() {
            request = request.query(&query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        self.execute(method, url, request).await
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        request: reqwest::RequestBuilder,
    ) -> Result<Json> {
        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            took_ms = started.elapsed().as_millis() as u64,
            "Search engine request"
        );

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EsError::NotFound(format!("{} {}: {}", method, url, text)));
        }
        if !status.is_success() {
            return Err(EsError::Transport {
                status: status.as_u16(),
                message: if text.is_empty() {
                    "No response body".to_string()
                } else {
                    text
                },
            });
        }
        if text.trim().is_empty() {
            return Ok(Json::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| EsError::InvalidResponse(format!("{} {}: {}", method, url, e)))
    }
}

/// Flatten parameters to query-string pairs; arrays become comma lists
fn query_pairs(params: &RequestParams) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Json::String(s) => s.clone(),
                Json::Array(items) => items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn ping(&self) -> Result<bool> {
        match self.send(Method::HEAD, &[], None, &RequestParams::new()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_transport_failure() || e.is_not_found() => {
                warn!(url = %self.base_url, error = %e, "Cluster ping failed");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn search(&self, index: &str, doc_type: &str, body: &Json, params: &RequestParams) -> Result<Json> {
        self.send(Method::POST, &[index, doc_type, "_search"], Some(body), params)
            .await
    }

    async fn count(&self, index: &str, doc_type: &str, body: Option<&Json>) -> Result<Json> {
        let method = if body.is_some() { Method::POST } else { Method::GET };
        self.send(method, &[index, doc_type, "_count"], body, &RequestParams::new())
            .await
    }

    async fn get(&self, index: &str, doc_type: &str, id: &str) -> Result<Json> {
        self.send(Method::GET, &[index, doc_type, id], None, &RequestParams::new())
            .await
    }

    async fn index(&self, index: &str, doc_type: &str, id: &str, body: &Json) -> Result<Json> {
        self.send(Method::PUT, &[index, doc_type, id], Some(body), &RequestParams::new())
            .await
    }

    async fn delete(&self, index: &str, doc_type: &str, id: &str) -> Result<Json> {
        self.send(Method::DELETE, &[index, doc_type, id], None, &RequestParams::new())
            .await
    }

    async fn mlt(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Json,
        params: &RequestParams,
    ) -> Result<Json> {
        let body = if body.as_object().map(|b| b.is_empty()).unwrap_or(true) {
            None
        } else {
            Some(body)
        };
        self.send(Method::POST, &[index, doc_type, id, "_mlt"], body, params)
            .await
    }

    async fn suggest(&self, index: &str, body: &Json) -> Result<Json> {
        self.send(Method::POST, &[index, "_suggest"], Some(body), &RequestParams::new())
            .await
    }

    async fn bulk_index(&self, index: &str, doc_type: &str, items: &[BulkItem]) -> Result<Json> {
        let mut payload = String::new();
        for (id, document) in items {
            let action = serde_json::json!({
                "index": {"_index": index, "_type": doc_type, "_id": id}
            });
            payload.push_str(&action.to_string());
            payload.push('\n');
            payload.push_str(&document.to_string());
            payload.push('\n');
        }

        let url = self.url(&["_bulk"]);
        let request = self
            .client
            .post(url.clone())
            .header("Content-Type", "application/x-ndjson")
            .body(payload);
        self.execute(Method::POST, url, request).await
    }

    async fn create_index(&self, index: &str, body: &Json) -> Result<Json> {
        self.send(Method::PUT, &[index], Some(body), &RequestParams::new())
            .await
    }

    async fn delete_index(&self, index: &str) -> Result<Json> {
        self.send(Method::DELETE, &[index], None, &RequestParams::new())
            .await
    }

    async fn put_mapping(&self, index: &str, doc_type: &str, body: &Json) -> Result<Json> {
        self.send(Method::PUT, &[index, "_mapping", doc_type], Some(body), &RequestParams::new())
            .await
    }

    async fn delete_mapping(&self, index: &str, doc_type: &str) -> Result<Json> {
        self.send(Method::DELETE, &[index, "_mapping", doc_type], None, &RequestParams::new())
            .await
    }

    async fn get_mapping(&self, index: &str, doc_type: &str) -> Result<Json> {
        self.send(Method::GET, &[index, "_mapping", doc_type], None, &RequestParams::new())
            .await
    }

    async fn get_settings(&self, index: &str) -> Result<Json> {
        self.send(Method::GET, &[index, "_settings"], None, &RequestParams::new())
            .await
    }

    async fn refresh(&self, index: &str) -> Result<Json> {
        self.send(Method::POST, &[index, "_refresh"], None, &RequestParams::new())
            .await
    }
}
