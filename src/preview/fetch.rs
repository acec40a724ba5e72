use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use super::cache::{CacheEntry, ContentCache};
use super::error::{PreviewError, Result};
use super::url::resolve_file_url;

/// Point-in-time view of one fetch: the latest snapshot always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSnapshot {
    pub data: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

impl FetchSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    pub fn ready(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn from_result(result: Result<String>) -> Self {
        match result {
            Ok(data) => Self::ready(data),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Credentials of the signed-in user.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    pub access_token: Option<String>,
}

impl AuthSession {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Source of file bytes inside a sandbox.
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Text content of `path`.
    async fn fetch_file_content(&self, sandbox_id: &str, path: &str) -> FetchSnapshot;

    /// Image at `path` as a `data:` URL.
    async fn fetch_image_content(&self, sandbox_id: &str, path: &str) -> FetchSnapshot;
}

pub struct HttpFileFetcher {
    client: Client,
    backend_url: String,
    auth: AuthSession,
}

impl HttpFileFetcher {
    pub fn new(backend_url: &str, auth: AuthSession, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    async fn fetch_bytes(&self, sandbox_id: &str, path: &str) -> Result<(Vec<u8>, String)> {
        let url = resolve_file_url(&self.backend_url, Some(sandbox_id), path);
        debug!("Fetching file content from: {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = self.auth.access_token.as_ref() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::OK => {
                let content_type = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = response.bytes().await?;
                debug!("Fetched {} bytes ({}) for {}", bytes.len(), content_type, path);
                Ok((bytes.to_vec(), content_type))
            }
            StatusCode::UNAUTHORIZED => Err(PreviewError::Fetch(
                "Unauthorized - check access token".to_string(),
            )),
            StatusCode::NOT_FOUND => Err(PreviewError::Fetch(format!("File {} not found", path))),
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(PreviewError::Fetch(format!(
                    "Failed to fetch file ({}): {}",
                    status, error_text
                )))
            }
        }
    }
}

#[async_trait]
impl FileFetcher for HttpFileFetcher {
    async fn fetch_file_content(&self, sandbox_id: &str, path: &str) -> FetchSnapshot {
        let result = self
            .fetch_bytes(sandbox_id, path)
            .await
            .map(|(bytes, _)| String::from_utf8_lossy(&bytes).into_owned());
        if let Err(e) = &result {
            warn!("Content fetch failed for {}: {}", path, e);
        }
        FetchSnapshot::from_result(result)
    }

    async fn fetch_image_content(&self, sandbox_id: &str, path: &str) -> FetchSnapshot {
        let result = self
            .fetch_bytes(sandbox_id, path)
            .await
            .map(|(bytes, content_type)| to_data_url(&content_type, &bytes));
        if let Err(e) = &result {
            warn!("Image fetch failed for {}: {}", path, e);
        }
        FetchSnapshot::from_result(result)
    }
}

pub fn to_data_url(content_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        content_type,
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Puts a [`ContentCache`] in front of another fetcher. Both successes and
/// failures are remembered, so a URL is fetched at most once while it stays
/// cached.
pub struct CachingFetcher<F> {
    inner: F,
    cache: Arc<ContentCache>,
    backend_url: String,
}

impl<F: FileFetcher> CachingFetcher<F> {
    pub fn new(inner: F, cache: Arc<ContentCache>, backend_url: &str) -> Self {
        Self {
            inner,
            cache,
            backend_url: backend_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    fn cached(&self, url: &str) -> Option<FetchSnapshot> {
        match self.cache.entry(url)? {
            CacheEntry::Content(content) => Some(FetchSnapshot::ready(content)),
            CacheEntry::Failed(reason) => Some(FetchSnapshot::failed(reason)),
        }
    }

    fn remember(&self, url: &str, snapshot: &FetchSnapshot) {
        if let Some(error) = snapshot.error.as_ref() {
            self.cache.mark_error(url, error.clone());
        } else if let Some(data) = snapshot.data.as_ref() {
            self.cache.put(url, data.clone());
        }
    }
}

#[async_trait]
impl<F: FileFetcher> FileFetcher for CachingFetcher<F> {
    async fn fetch_file_content(&self, sandbox_id: &str, path: &str) -> FetchSnapshot {
        let url = resolve_file_url(&self.backend_url, Some(sandbox_id), path);
        if let Some(hit) = self.cached(&url) {
            debug!("Content cache hit for {}", url);
            return hit;
        }
        let snapshot = self.inner.fetch_file_content(sandbox_id, path).await;
        self.remember(&url, &snapshot);
        snapshot
    }

    async fn fetch_image_content(&self, sandbox_id: &str, path: &str) -> FetchSnapshot {
        let url = resolve_file_url(&self.backend_url, Some(sandbox_id), path);
        if let Some(hit) = self.cached(&url) {
            debug!("Image cache hit for {}", url);
            return hit;
        }
        let snapshot = self.inner.fetch_image_content(sandbox_id, path).await;
        self.remember(&url, &snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SpyFetcher {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl FileFetcher for SpyFetcher {
        async fn fetch_file_content(&self, _sandbox_id: &str, path: &str) -> FetchSnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                FetchSnapshot::failed("boom")
            } else {
                FetchSnapshot::ready(format!("content of {}", path))
            }
        }

        async fn fetch_image_content(&self, _sandbox_id: &str, _path: &str) -> FetchSnapshot {
            self.calls.fetch_add(1, Ordering::SeqCst);
            FetchSnapshot::ready(to_data_url("image/png", &[1, 2, 3]))
        }
    }

    fn caching(fail: bool) -> (CachingFetcher<SpyFetcher>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let spy = SpyFetcher {
            calls: calls.clone(),
            fail,
        };
        let fetcher = CachingFetcher::new(
            spy,
            Arc::new(ContentCache::unbounded()),
            "http://localhost:9000/api/v0",
        );
        (fetcher, calls)
    }

    #[tokio::test]
    async fn test_second_fetch_served_from_cache() {
        let (fetcher, calls) = caching(false);

        let first = fetcher.fetch_file_content("sb", "docs/a.md").await;
        let second = fetcher.fetch_file_content("sb", "docs/a.md").await;

        assert_eq!(first, FetchSnapshot::ready("content of docs/a.md"));
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_equivalent_paths_share_an_entry() {
        let (fetcher, calls) = caching(false);

        fetcher.fetch_file_content("sb", "docs/a.md").await;
        fetcher.fetch_file_content("sb", "/workspace/docs/a.md").await;
        fetcher.fetch_file_content("other", "docs/a.md").await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_remembered() {
        let (fetcher, calls) = caching(true);

        let first = fetcher.fetch_file_content("sb", "a.csv").await;
        let second = fetcher.fetch_file_content("sb", "a.csv").await;

        assert_eq!(first.error.as_deref(), Some("boom"));
        assert_eq!(second.error.as_deref(), Some("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let url = resolve_file_url("http://localhost:9000/api/v0", Some("sb"), "a.csv");
        assert!(fetcher.cache().has_error(&url));
    }

    #[tokio::test]
    async fn test_image_fetch_cached() {
        let (fetcher, calls) = caching(false);

        let image = fetcher.fetch_image_content("sb", "pic.png").await;
        fetcher.fetch_image_content("sb", "pic.png").await;

        assert_eq!(image.data.as_deref(), Some("data:image/png;base64,AQID"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_snapshot_constructors() {
        assert!(FetchSnapshot::loading().loading);
        assert_eq!(FetchSnapshot::idle().data, None);
        let failed = FetchSnapshot::from_result(Err(PreviewError::Fetch("nope".to_string())));
        assert_eq!(failed.error.as_deref(), Some("Fetch error: nope"));
    }

    #[test]
    fn test_auth_session_ignores_blank_token() {
        assert!(!AuthSession::new(Some("  ".to_string())).is_authenticated());
        assert!(AuthSession::new(Some("tok".to_string())).is_authenticated());
    }
}
