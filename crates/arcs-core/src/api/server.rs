//! API server: axum router over TCP.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::*;
use crate::collector::{CollectorRegistry, Registration, RegistryError, Unregistration};
use crate::fanout::FanOutError;
use crate::resolver::{ConfigRequest, ConfigResolver, ConfigStore, ResolveError};
use crate::source::{ConfigSource, SourceError};
use crate::store::{Attributes, Object};

/// Shared state accessible to all route handlers.
pub struct AppState {
    pub configs: Arc<ConfigStore>,
    pub collectors: Arc<CollectorRegistry>,
    pub resolver: Arc<ConfigResolver>,
    /// Fires when the server shuts down; in-flight fetches are abandoned.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(resolver: Arc<ConfigResolver>, shutdown: CancellationToken) -> Self {
        Self {
            configs: Arc::clone(resolver.configs()),
            collectors: Arc::clone(resolver.collectors()),
            resolver,
            shutdown,
        }
    }
}

/// Errors surfaced to API callers, each mapped onto an HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("collector {0:?} is not registered")]
    CollectorNotFound(String),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Resolve(ResolveError::NotRegistered(_))
            | ServiceError::CollectorNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Resolve(ResolveError::Fetch(FanOutError::Task(_))) => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::Resolve(ResolveError::Fetch(FanOutError::Cancelled)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Resolve(ResolveError::Fetch(FanOutError::Aborted(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Registry(RegistryError::Conflict { .. }) => StatusCode::CONFLICT,
            ServiceError::Source(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

/// Build the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(handle_health))
        .route("/configs", get(handle_list_configs).post(handle_add_config))
        .route("/configs/{id}", delete(handle_remove_config))
        .route(
            "/collectors",
            get(handle_list_collectors).post(handle_register_collector),
        )
        .route(
            "/collectors/{id}",
            get(handle_get_collector).delete(handle_unregister_collector),
        )
        .route("/collectors/{id}/config", post(handle_get_config))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` fires, then drain in-flight
/// requests.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    info!(addr = %listener.local_addr()?, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("API server shutting down");
        })
        .await
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        configs: state.configs.len(),
        collectors: state.collectors.len(),
    })
}

async fn handle_list_configs(
    State(state): State<Arc<AppState>>,
    Query(attributes): Query<Attributes>,
) -> Json<Vec<ConfigInfo>> {
    let sources = if attributes.is_empty() {
        state.configs.list()
    } else {
        state.configs.get_by_attributes(&attributes)
    };
    let mut configs: Vec<ConfigInfo> = sources.iter().map(ConfigInfo::from).collect();
    configs.sort_by(|a, b| a.source.cmp(&b.source));
    Json(configs)
}

async fn handle_add_config(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddConfigRequest>,
) -> Result<Json<AddConfigResponse>, ServiceError> {
    let source = ConfigSource::new(&req.source, req.attributes)?;
    let id = source.identity().to_string();

    let replaced = state.configs.replace(source).is_some();
    info!(%id, source = %req.source, replaced, "config source added");

    Ok(Json(AddConfigResponse { id }))
}

async fn handle_remove_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<RemoveResponse> {
    let removed = state.configs.remove(&id);
    if removed {
        info!(%id, "config source removed");
    }
    Json(RemoveResponse { removed })
}

async fn handle_get_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<GetConfigRequest>,
) -> Result<Json<ResolvedConfig>, ServiceError> {
    let request = ConfigRequest {
        collector_id: id,
        attributes: req.attributes,
        hash: req.hash,
    };
    let resolved = state
        .resolver
        .resolve_with_cancel(request, &state.shutdown)
        .await?;
    debug!(hash = %resolved.hash, not_modified = resolved.not_modified, "config served");
    Ok(Json(resolved))
}

async fn handle_list_collectors(
    State(state): State<Arc<AppState>>,
    Query(attributes): Query<Attributes>,
) -> Json<Vec<CollectorInfo>> {
    let collectors = if attributes.is_empty() {
        state.collectors.list()
    } else {
        state.collectors.get_by_attributes(&attributes)
    };
    let mut collectors: Vec<CollectorInfo> = collectors.iter().map(CollectorInfo::from).collect();
    collectors.sort_by(|a, b| a.id.cmp(&b.id));
    Json(collectors)
}

async fn handle_get_collector(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CollectorInfo>, ServiceError> {
    state
        .collectors
        .get(&id)
        .map(|collector| Json(CollectorInfo::from(&collector)))
        .ok_or(ServiceError::CollectorNotFound(id))
}

async fn handle_register_collector(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterCollectorRequest>,
) -> Result<Json<RegisterCollectorResponse>, ServiceError> {
    let outcome = state
        .collectors
        .register(&req.id, &req.name, req.attributes)?;
    Ok(Json(RegisterCollectorResponse {
        id: req.id,
        created: outcome == Registration::Created,
    }))
}

async fn handle_unregister_collector(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<RemoveResponse> {
    let removed = state.collectors.unregister(&id) == Unregistration::Removed;
    Json(RemoveResponse { removed })
}
