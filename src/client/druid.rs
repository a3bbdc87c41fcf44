//! Druid broker HTTP client

use crate::cache::{query_fingerprint, ResultCache};
use crate::client::error::{ClientError, ClientResult};
use crate::client::refresh::{needs_refresh, UrlRefresher};
use crate::client::{QueryExecutor, QueryResponse};
use crate::config::DruidConfig;
use crate::query::GroupByQuery;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{Client, StatusCode};
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Responses shorter than this are neither served from nor written to the
/// result cache
pub const CACHE_THRESHOLD_BYTES: usize = 3;

/// HTTP executor for groupBy queries
pub struct DruidClient {
    client: Client,
    base_url: RwLock<String>,
    endpoint: String,
    data_source: Option<String>,
    auth_token: Option<String>,
    auth_cookie: String,
    debug: bool,
    refresher: Option<Arc<dyn UrlRefresher>>,
    result_cache: Option<Arc<dyn ResultCache>>,
    result_cache_ttl: Option<Duration>,
}

impl DruidClient {
    /// Create a client from the `[druid]` configuration section
    pub fn new(config: &DruidConfig) -> ClientResult<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        let endpoint = if config.endpoint.is_empty() {
            "/druid/v2".to_string()
        } else {
            config.endpoint.clone()
        };

        Ok(Self {
            client,
            base_url: RwLock::new(config.base_url.trim_end_matches('/').to_string()),
            endpoint,
            data_source: config.data_source.clone().filter(|ds| !ds.is_empty()),
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
            auth_cookie: config.auth_cookie.clone(),
            debug: config.debug,
            refresher: None,
            result_cache: None,
            result_cache_ttl: None,
        })
    }

    /// Refresh the base URL through `refresher` when the broker refuses
    /// connections, or before the first request when no URL is configured
    pub fn with_refresher(mut self, refresher: Arc<dyn UrlRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Serve finished queries from `cache`
    pub fn with_result_cache(mut self, cache: Arc<dyn ResultCache>, ttl: Option<Duration>) -> Self {
        self.result_cache = Some(cache);
        self.result_cache_ttl = ttl;
        self
    }

    pub async fn base_url(&self) -> String {
        self.base_url.read().await.clone()
    }

    fn query_url(&self, base_url: &str) -> String {
        let mut url = format!("{}{}", base_url, self.endpoint);
        if self.debug {
            url.push_str("?pretty");
        }
        url
    }

    /// The query as it goes over the wire
    fn prepare(&self, query: &GroupByQuery) -> GroupByQuery {
        let mut prepared = query.with_intervals(query.intervals.clone());
        if let Some(data_source) = &self.data_source {
            prepared.data_source = data_source.clone();
        }
        prepared
    }

    fn encode(&self, query: &GroupByQuery) -> ClientResult<Vec<u8>> {
        let body = if self.debug {
            serde_json::to_vec_pretty(query)?
        } else {
            serde_json::to_vec(query)?
        };
        Ok(body)
    }

    /// Execute the query, consulting the result cache for finished intervals
    async fn query(&self, query: &GroupByQuery) -> ClientResult<Vec<u8>> {
        let prepared = self.prepare(query);
        let body = self.encode(&prepared)?;

        let cache = match &self.result_cache {
            Some(cache) if prepared.should_cache() => cache,
            _ => return self.query_raw(body).await,
        };

        let key = query_fingerprint(&prepared)?;
        match cache.get(&key).await {
            Ok(Some(cached)) if cached.len() >= CACHE_THRESHOLD_BYTES => {
                debug!(key = %key, "Result cache hit");
                return Ok(cached);
            }
            Ok(_) => debug!(key = %key, "Result cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Result cache lookup failed"),
        }

        let raw = self.query_raw(body).await?;
        if raw.len() >= CACHE_THRESHOLD_BYTES {
            if let Err(e) = cache.set(&key, raw.clone(), self.result_cache_ttl).await {
                warn!(key = %key, error = %e, "Failed to store query result");
            }
        }
        Ok(raw)
    }

    /// POST an encoded query, refreshing the base URL at most once
    pub async fn query_raw(&self, body: Vec<u8>) -> ClientResult<Vec<u8>> {
        let mut refreshed = false;
        let mut base_url = self.base_url().await;
        if base_url.is_empty() {
            base_url = self.refresh_base_url().await?;
            refreshed = true;
        }

        match self.post(&base_url, body.clone()).await {
            Err(ClientError::Unavailable(reason)) if !refreshed && self.refresher.is_some() => {
                warn!(base_url = %base_url, reason = %reason, "Broker refused connection, refreshing URL");
                let base_url = self.refresh_base_url().await?;
                self.post(&base_url, body).await
            }
            other => other,
        }
    }

    async fn refresh_base_url(&self) -> ClientResult<String> {
        let refresher = self
            .refresher
            .as_ref()
            .ok_or_else(|| ClientError::Config("no base URL and no URL refresher".to_string()))?;

        let url = refresher.refresh().await?;
        let url = url.trim_end_matches('/').to_string();
        if url.is_empty() {
            return Err(ClientError::UrlRefresh("refresher returned an empty URL".to_string()));
        }

        debug!(base_url = %url, "Refreshed broker URL");
        *self.base_url.write().await = url.clone();
        Ok(url)
    }

    async fn post(&self, base_url: &str, body: Vec<u8>) -> ClientResult<Vec<u8>> {
        let url = self.query_url(base_url);
        debug!(url = %url, bytes = body.len(), "Posting query");

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.auth_token {
            request = request.header(COOKIE, format!("{}={}", self.auth_cookie, token));
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(classify)?;

        if status != StatusCode::OK {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        Ok(bytes.to_vec())
    }
}

/// Full message of an error and its sources
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn classify(error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        return ClientError::Timeout;
    }
    let message = error_chain(&error);
    if error.is_connect() || needs_refresh(&message) {
        ClientError::Unavailable(message)
    } else {
        ClientError::Request(error)
    }
}

#[async_trait]
impl QueryExecutor for DruidClient {
    async fn execute(&self, query: &GroupByQuery) -> ClientResult<QueryResponse> {
        let raw = self.query(query).await?;
        QueryResponse::from_raw(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryResultCache;
    use crate::merge::Value;
    use crate::query::Aggregation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Nothing listens on the discard port locally
    const REFUSING_URL: &str = "http://127.0.0.1:9";

    fn config(base_url: &str) -> DruidConfig {
        DruidConfig {
            base_url: base_url.to_string(),
            timeout_secs: 2,
            ..DruidConfig::default()
        }
    }

    fn finished_query() -> GroupByQuery {
        GroupByQuery::builder("events")
            .dimension("os")
            .aggregation(Aggregation::long_sum("sum", "value"))
            .interval("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z")
            .build()
    }

    #[test]
    fn test_query_url() {
        let client = DruidClient::new(&config("http://broker:8082/")).unwrap();
        assert_eq!(client.query_url("http://broker:8082"), "http://broker:8082/druid/v2");

        let debug = DruidClient::new(&DruidConfig {
            debug: true,
            ..config("http://broker:8082")
        })
        .unwrap();
        assert_eq!(debug.query_url("http://b"), "http://b/druid/v2?pretty");
    }

    #[test]
    fn test_data_source_override() {
        let client = DruidClient::new(&DruidConfig {
            data_source: Some("clicks".to_string()),
            ..config("http://broker:8082")
        })
        .unwrap();
        let prepared = client.prepare(&finished_query());
        assert_eq!(prepared.data_source, "clicks");
        assert_eq!(prepared.intervals, finished_query().intervals);
    }

    #[tokio::test]
    async fn test_empty_base_url_needs_refresher() {
        let client = DruidClient::new(&config("")).unwrap();
        let result = client.query_raw(b"{}".to_vec()).await;
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_refused_connection_refreshes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let refresher = move || -> ClientResult<String> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(REFUSING_URL.to_string())
        };

        let client = DruidClient::new(&config(REFUSING_URL))
            .unwrap()
            .with_refresher(Arc::new(refresher));
        let result = client.query_raw(b"{}".to_vec()).await;

        assert!(matches!(result, Err(ClientError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_result_cache_serves_finished_query() {
        let cache = Arc::new(MemoryResultCache::new());
        let query = finished_query();
        let raw = br#"[{"version":"v1","timestamp":"2024-01-01T00:00:00.000Z","event":{"os":"ios","sum":10}}]"#;
        cache
            .set(&query_fingerprint(&query).unwrap(), raw.to_vec(), None)
            .await
            .unwrap();

        let client = DruidClient::new(&config(REFUSING_URL))
            .unwrap()
            .with_result_cache(cache, None);
        let response = client.execute(&query).await.unwrap();

        assert_eq!(response.rows.len(), 1);
        assert_eq!(response.rows[0].event["sum"], Value::Int64(10));
    }

    #[tokio::test]
    async fn test_short_cached_result_not_trusted() {
        let cache = Arc::new(MemoryResultCache::new());
        let query = finished_query();
        cache
            .set(&query_fingerprint(&query).unwrap(), b"[]".to_vec(), None)
            .await
            .unwrap();

        let client = DruidClient::new(&config(REFUSING_URL))
            .unwrap()
            .with_result_cache(cache, None);
        assert!(matches!(
            client.execute(&query).await,
            Err(ClientError::Unavailable(_))
        ));
    }
}
