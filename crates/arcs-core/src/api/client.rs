//! Typed API client over reqwest.

use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::*;
use crate::store::Attributes;

/// Errors from the API client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

impl ClientError {
    /// HTTP status returned by the server, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client for an arcs server.
#[derive(Debug, Clone)]
pub struct ArcsClient {
    base: Url,
    http: Client,
}

impl ArcsClient {
    /// Create a client targeting `base` (for example `http://127.0.0.1:8080`).
    pub fn new(base: &str) -> Result<Self, ClientError> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: base.to_string(),
            reason,
        };
        let url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        Ok(Self {
            base: url,
            http: Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `base` joined with percent-encoded path `segments`.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.url(segments);
        debug!(%method, %url, "API request");
        self.http.request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.bytes().await?;
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .map(|err| err.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    // ── Typed API methods ──────────────────────────────────────────────

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.send(self.request(Method::GET, &["health"])).await
    }

    /// Config sources sharing an attribute pair with `attributes`, or all of
    /// them if `attributes` is empty.
    pub async fn list_configs(&self, attributes: &Attributes) -> Result<Vec<ConfigInfo>, ClientError> {
        self.send(self.request(Method::GET, &["configs"]).query(attributes))
            .await
    }

    /// Add (or replace) a config source. Returns its id.
    pub async fn add_config(
        &self,
        source: &str,
        attributes: Attributes,
    ) -> Result<String, ClientError> {
        let body = AddConfigRequest {
            source: source.to_string(),
            attributes,
        };
        let resp: AddConfigResponse = self
            .send(self.request(Method::POST, &["configs"]).json(&body))
            .await?;
        Ok(resp.id)
    }

    pub async fn remove_config(&self, id: &str) -> Result<bool, ClientError> {
        let resp: RemoveResponse = self
            .send(self.request(Method::DELETE, &["configs", id]))
            .await?;
        Ok(resp.removed)
    }

    /// Resolve the configuration for a registered collector.
    pub async fn get_config(
        &self,
        collector_id: &str,
        attributes: Attributes,
        hash: Option<String>,
    ) -> Result<ResolvedConfig, ClientError> {
        let body = GetConfigRequest { attributes, hash };
        self.send(
            self.request(Method::POST, &["collectors", collector_id, "config"])
                .json(&body),
        )
        .await
    }

    pub async fn list_collectors(
        &self,
        attributes: &Attributes,
    ) -> Result<Vec<CollectorInfo>, ClientError> {
        self.send(self.request(Method::GET, &["collectors"]).query(attributes))
            .await
    }

    pub async fn get_collector(&self, id: &str) -> Result<CollectorInfo, ClientError> {
        self.send(self.request(Method::GET, &["collectors", id]))
            .await
    }

    pub async fn register_collector(
        &self,
        id: &str,
        name: &str,
        attributes: Attributes,
    ) -> Result<RegisterCollectorResponse, ClientError> {
        let body = RegisterCollectorRequest {
            id: id.to_string(),
            name: name.to_string(),
            attributes,
        };
        self.send(self.request(Method::POST, &["collectors"]).json(&body))
            .await
    }

    pub async fn unregister_collector(&self, id: &str) -> Result<bool, ClientError> {
        let resp: RemoveResponse = self
            .send(self.request(Method::DELETE, &["collectors", id]))
            .await?;
        Ok(resp.removed)
    }
}
