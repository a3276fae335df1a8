//! Request/response types shared by the api server and [`ArcsClient`].
//!
//! [`ArcsClient`]: super::ArcsClient

use serde::{Deserialize, Serialize};

use crate::collector::Collector;
use crate::source::ConfigSource;
use crate::store::{Attributes, Object};

pub use crate::resolver::ResolvedConfig;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub configs: usize,
    pub collectors: usize,
}

/// A config source as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    pub id: String,
    pub source: String,
    pub attributes: Attributes,
}

impl From<&ConfigSource> for ConfigInfo {
    fn from(source: &ConfigSource) -> Self {
        Self {
            id: source.identity().to_string(),
            source: source.source(),
            attributes: source.attributes().clone(),
        }
    }
}

/// Body of `POST /configs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddConfigRequest {
    pub source: String,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddConfigResponse {
    pub id: String,
}

/// Response of the `DELETE` routes. Removing something absent is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub removed: bool,
}

/// Body of `POST /collectors/{id}/config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetConfigRequest {
    #[serde(default)]
    pub attributes: Attributes,
    /// Hash the collector already holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// A registered collector as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorInfo {
    pub id: String,
    pub name: String,
    pub attributes: Attributes,
    pub last_known_hash: String,
}

impl From<&Collector> for CollectorInfo {
    fn from(collector: &Collector) -> Self {
        Self {
            id: collector.id().to_string(),
            name: collector.name().to_string(),
            attributes: collector.attributes().clone(),
            last_known_hash: collector.last_known_hash().to_string(),
        }
    }
}

/// Body of `POST /collectors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterCollectorRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCollectorResponse {
    pub id: String,
    /// `false` when an identical registration already existed.
    pub created: bool,
}

/// Generic error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
