//! Broker URL refresh
//!
//! Clustered deployments move brokers around. A refresher hands out the
//! current base URL whenever the configured one stops answering.

use crate::client::error::{ClientError, ClientResult};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;

/// Error text that marks a request as worth retrying against a fresh URL
pub const URL_REFRESH_PATTERN: &str = r"connection\s+refused";

static URL_REFRESH_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    RegexBuilder::new(URL_REFRESH_PATTERN)
        .case_insensitive(true)
        .build()
        .ok()
});

/// Source of the current broker base URL
#[async_trait]
pub trait UrlRefresher: Send + Sync {
    async fn refresh(&self) -> ClientResult<String>;
}

#[async_trait]
impl<F> UrlRefresher for F
where
    F: Fn() -> ClientResult<String> + Send + Sync,
{
    async fn refresh(&self) -> ClientResult<String> {
        self()
    }
}

/// Cycles through a fixed list of brokers
#[derive(Debug)]
pub struct RoundRobinUrls {
    urls: Vec<String>,
    next: AtomicUsize,
}

impl RoundRobinUrls {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UrlRefresher for RoundRobinUrls {
    async fn refresh(&self) -> ClientResult<String> {
        if self.urls.is_empty() {
            return Err(ClientError::UrlRefresh("no broker URLs configured".to_string()));
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.urls.len();
        Ok(self.urls[i].clone())
    }
}

/// Whether a failure message says the broker refused the connection
pub fn needs_refresh(message: &str) -> bool {
    match &*URL_REFRESH_RE {
        Some(re) => re.is_match(message),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_refresh() {
        assert!(needs_refresh("dial tcp 10.0.0.1:8082: connect: connection refused"));
        assert!(needs_refresh("Connection   refused (os error 111)"));
        assert!(!needs_refresh("connection reset by peer"));
        assert!(!needs_refresh("timed out"));
    }

    #[test]
    fn test_refresh_pattern_compiles_once() {
        let first: &Option<Regex> = &URL_REFRESH_RE;
        let second: &Option<Regex> = &URL_REFRESH_RE;
        assert!(first.is_some());
        assert!(std::ptr::eq(first, second));
    }

    #[tokio::test]
    async fn test_round_robin() {
        let urls = RoundRobinUrls::new(vec!["http://a".to_string(), "http://b".to_string()]);
        assert_eq!(urls.refresh().await.unwrap(), "http://a");
        assert_eq!(urls.refresh().await.unwrap(), "http://b");
        assert_eq!(urls.refresh().await.unwrap(), "http://a");

        let empty = RoundRobinUrls::new(Vec::new());
        assert!(matches!(empty.refresh().await, Err(ClientError::UrlRefresh(_))));
    }

    #[tokio::test]
    async fn test_closure_refresher() {
        let refresher = || -> ClientResult<String> { Ok("http://broker:8082".to_string()) };
        assert_eq!(refresher.refresh().await.unwrap(), "http://broker:8082");
    }
}
