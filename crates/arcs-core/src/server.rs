//! Server process: startup, manifest bootstrap, serving, and shutdown.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use arcs_config::AppConfig;

use crate::api::{self, AppState};
use crate::collector::CollectorRegistry;
use crate::content::{ContentResolver, FetchSetupError, header_map};
use crate::manifest::{self, ManifestError};
use crate::resolver::{ConfigResolver, ConfigStore};
use crate::store::Object;

/// Errors from the server runtime.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid fetch configuration: {0}")]
    Fetch(#[from] FetchSetupError),

    #[error("failed to load manifests: {0}")]
    Manifest(#[from] ManifestError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The arcs server.
pub struct Server {
    config: AppConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
}

impl Server {
    /// Build the stores, the content resolver and the config resolver.
    ///
    /// Fails if the configured fetch headers or user agent are unusable.
    pub fn new(config: AppConfig) -> Result<Self, ServerError> {
        let headers = header_map(&config.fetch)?;
        let fetcher = ContentResolver::from_config(&config.fetch)?;
        let resolver = ConfigResolver::new(
            Arc::new(ConfigStore::new()),
            Arc::new(CollectorRegistry::new()),
            Arc::new(fetcher),
        )
        .with_headers(headers);

        let shutdown = CancellationToken::new();
        let state = Arc::new(AppState::new(Arc::new(resolver), shutdown.clone()));

        Ok(Self {
            config,
            state,
            shutdown,
        })
    }

    /// Load the configured manifests into the config store.
    ///
    /// In strict mode any rejected record fails the bootstrap and nothing is
    /// stored. Otherwise rejected records are logged and skipped. Records
    /// naming the same source are merged, the later one winning. Returns the
    /// number of distinct sources stored.
    pub async fn bootstrap(&self) -> Result<usize, ServerError> {
        let path = Path::new(&self.config.manifests.path);
        let loaded = manifest::load_with_cancel(path, &self.shutdown).await?;

        let sources = if self.config.manifests.strict {
            loaded.into_strict()?
        } else {
            let (sources, rejected) = loaded.into_parts();
            for record in rejected.iter().flat_map(|err| &err.records) {
                warn!(error = %record, "skipping manifest record");
            }
            sources
        };

        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.identity().to_string()) {
                warn!(
                    source = %source.source(),
                    "duplicate config source, later record replaces earlier"
                );
            }
        }

        self.state.configs.put_all(sources);
        let stored = seen.len();
        info!(sources = stored, "config store populated");
        Ok(stored)
    }

    /// Bind the configured listen socket and serve until shut down.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.config.listen_socket();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until [`shutdown`](Self::shutdown)
    /// is called or Ctrl-C is received.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        info!(
            configs = self.state.configs.len(),
            manifests = %self.config.manifests.path,
            "arcs server starting"
        );

        let shutdown = self.shutdown.clone();
        let signal = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        warn!("Ctrl-C received, initiating graceful shutdown");
                        shutdown.cancel();
                    }
                    Err(err) => warn!(error = %err, "unable to listen for Ctrl-C"),
                },
            }
        });

        let served = api::serve(listener, Arc::clone(&self.state), self.shutdown.clone()).await;
        signal.abort();
        served?;

        info!("arcs server stopped");
        Ok(())
    }

    /// Request a graceful shutdown. In-flight config fetches are cancelled.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
