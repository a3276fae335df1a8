//! Content resolution: turns a [`ConfigSource`] into bytes.
//!
//! [`ContentResolver`] dispatches on the source protocol:
//!
//! - `file` reads the path to the end; open and read failures are reported
//!   separately.
//! - `http`/`https` issue a GET with the caller's headers and return the body.
//!   Transport failures and non-2xx statuses are errors.
//! - `ftp` is a placeholder that yields empty content without an error.
//!
//! The [`Fetch`] trait is the seam the config resolver fans out through, so
//! tests and alternative transports can stand in for the real resolver.

use std::path::{Path, PathBuf};

use arcs_config::FetchConfig;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::BoxFuture;
use crate::source::{ConfigSource, Protocol};

/// Errors from fetching source content.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("failed to open {}: {source}", path.display())]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read response body from {url}: {source}")]
    Body { url: String, source: reqwest::Error },

    #[error("content fetch cancelled")]
    Cancelled,
}

/// Errors from building a resolver out of [`FetchConfig`].
#[derive(Debug, thiserror::Error)]
pub enum FetchSetupError {
    #[error("invalid header name {name:?}: {source}")]
    HeaderName {
        name: String,
        source: reqwest::header::InvalidHeaderName,
    },

    #[error("invalid value for header {name:?}: {source}")]
    HeaderValue {
        name: String,
        source: reqwest::header::InvalidHeaderValue,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fetches the raw bytes behind a source.
///
/// Uses `BoxFuture` so resolvers can be shared as `Arc<dyn Fetch>`.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(
        &'a self,
        source: &'a ConfigSource,
        headers: &'a HeaderMap,
    ) -> BoxFuture<'a, Result<Vec<u8>, ContentError>>;

    /// [`fetch`](Self::fetch), abandoned with [`ContentError::Cancelled`] once
    /// `cancel` fires.
    fn fetch_with_cancel<'a>(
        &'a self,
        source: &'a ConfigSource,
        headers: &'a HeaderMap,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Vec<u8>, ContentError>> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ContentError::Cancelled),
                result = self.fetch(source, headers) => result,
            }
        })
    }
}

/// Protocol-dispatching content fetcher.
#[derive(Debug, Clone)]
pub struct ContentResolver {
    client: Client,
}

impl ContentResolver {
    /// Create a resolver with a default HTTP client.
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a resolver around an existing HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Build a resolver whose HTTP client carries the configured user agent.
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchSetupError> {
        let agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("arcs/{}", env!("CARGO_PKG_VERSION")));
        let client = Client::builder().user_agent(agent).build()?;
        Ok(Self::with_client(client))
    }

    /// Fetch `source`, giving up as soon as `cancel` fires.
    pub async fn resolve(
        &self,
        source: &ConfigSource,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ContentError> {
        self.fetch_with_cancel(source, headers, cancel).await
    }

    async fn fetch_http(&self, url: String, headers: &HeaderMap) -> Result<Vec<u8>, ContentError> {
        debug!(%url, "fetching config content");
        let response = match self.client.get(&url).headers(headers.clone()).send().await {
            Ok(response) => response,
            Err(source) => return Err(ContentError::Request { url, source }),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Status {
                url,
                status: status.as_u16(),
            });
        }

        match response.bytes().await {
            Ok(body) => Ok(body.to_vec()),
            Err(source) => Err(ContentError::Body { url, source }),
        }
    }
}

impl Default for ContentResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for ContentResolver {
    fn fetch<'a>(
        &'a self,
        source: &'a ConfigSource,
        headers: &'a HeaderMap,
    ) -> BoxFuture<'a, Result<Vec<u8>, ContentError>> {
        Box::pin(async move {
            match source.protocol() {
                Protocol::File => read_file(Path::new(source.path())).await,
                Protocol::Http | Protocol::Https => {
                    self.fetch_http(source.source(), headers).await
                }
                Protocol::Ftp => {
                    warn!(source = %source.source(), "ftp sources are not fetched, serving empty content");
                    Ok(Vec::new())
                }
            }
        })
    }
}

/// Read a local file to the end.
pub async fn read_file(path: &Path) -> Result<Vec<u8>, ContentError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| ContentError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;

    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .await
        .map_err(|source| ContentError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(content)
}

/// Turn the configured static headers into a [`HeaderMap`].
pub fn header_map(config: &FetchConfig) -> Result<HeaderMap, FetchSetupError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|source| FetchSetupError::HeaderName {
                name: name.clone(),
                source,
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|source| FetchSetupError::HeaderValue {
                name: name.clone(),
                source,
            })?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Attributes;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::get;
    use pretty_assertions::assert_eq;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn spawn_origin() -> SocketAddr {
        let app = axum::Router::new()
            .route("/ok", get(|| async { "logging { level = \"info\" }" }))
            .route(
                "/header",
                get(|headers: AxumHeaders| async move {
                    headers
                        .get("x-scope")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("none")
                        .to_string()
                }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "late"
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn source(s: &str) -> ConfigSource {
        ConfigSource::new(s, Attributes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_file_source() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("base.alloy");
        tokio::fs::write(&path, b"prometheus.scrape \"default\" {}")
            .await
            .unwrap();

        let resolver = ContentResolver::new();
        let content = resolver
            .resolve(
                &source(&format!("file://{}", path.display())),
                &HeaderMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(content, b"prometheus.scrape \"default\" {}");
    }

    #[tokio::test]
    async fn test_file_open_error() {
        let resolver = ContentResolver::new();
        let err = resolver
            .resolve(
                &source("file:///nonexistent/arcs/config.alloy"),
                &HeaderMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::FileOpen { .. }));
    }

    #[tokio::test]
    async fn test_file_read_error_on_directory() {
        let tmp = TempDir::new().unwrap();
        let err = read_file(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ContentError::FileRead { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_http_source() {
        let addr = spawn_origin().await;
        let resolver = ContentResolver::new();
        let content = resolver
            .resolve(
                &source(&format!("http://{addr}/ok")),
                &HeaderMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(String::from_utf8(content).unwrap(), "logging { level = \"info\" }");
    }

    #[tokio::test]
    async fn test_http_forwards_headers() {
        let addr = spawn_origin().await;
        let mut headers = HeaderMap::new();
        headers.insert("x-scope", HeaderValue::from_static("homelab"));

        let content = ContentResolver::new()
            .resolve(
                &source(&format!("http://{addr}/header")),
                &headers,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(content, b"homelab");
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let addr = spawn_origin().await;
        let err = ContentResolver::new()
            .resolve(
                &source(&format!("http://{addr}/missing")),
                &HeaderMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_http_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ContentResolver::new()
            .resolve(
                &source(&format!("http://{addr}/ok")),
                &HeaderMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Request { .. }));
    }

    #[tokio::test]
    async fn test_ftp_is_empty() {
        let content = ContentResolver::new()
            .resolve(
                &source("ftp://host/cfg"),
                &HeaderMap::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let err = ContentResolver::new()
            .resolve(&source("ftp://host/cfg"), &HeaderMap::new(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_slow_fetch() {
        let addr = spawn_origin().await;
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            ContentResolver::new().resolve(
                &source(&format!("http://{addr}/slow")),
                &HeaderMap::new(),
                &token,
            ),
        )
        .await
        .expect("cancellation did not interrupt the fetch");
        assert!(matches!(result, Err(ContentError::Cancelled)));
    }

    #[test]
    fn test_header_map_from_config() {
        let mut config = FetchConfig::default();
        config
            .headers
            .insert("X-Scope".to_string(), "homelab".to_string());
        let headers = header_map(&config).unwrap();
        assert_eq!(headers["x-scope"], "homelab");
    }

    #[test]
    fn test_header_map_rejects_bad_name() {
        let mut config = FetchConfig::default();
        config
            .headers
            .insert("bad header".to_string(), "v".to_string());
        assert!(matches!(
            header_map(&config),
            Err(FetchSetupError::HeaderName { .. })
        ));
    }

    #[test]
    fn test_from_config_custom_agent() {
        let config = FetchConfig {
            user_agent: Some("arcs-test".to_string()),
            ..FetchConfig::default()
        };
        assert!(ContentResolver::from_config(&config).is_ok());
    }
}
