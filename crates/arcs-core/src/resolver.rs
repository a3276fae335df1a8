//! Per-collector config resolution.
//!
//! [`ConfigResolver`] is the only component that touches both the config
//! catalogue and the collector registry. One [`ConfigResolver::resolve`] call:
//!
//! 1. looks the collector up and fails fast if it is not registered,
//! 2. picks the prior hash (caller-supplied, else the stored one),
//! 3. selects sources by attribute (union match; no attributes means all),
//! 4. fetches every source concurrently, failing whole on the first error,
//! 5. joins the contents with a single space in selection order,
//! 6. fingerprints the result and records it on the collector if it changed.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collector::CollectorRegistry;
use crate::content::{ContentError, Fetch};
use crate::fanout::{FanOut, FanOutError};
use crate::fingerprint::fingerprint;
use crate::source::ConfigSource;
use crate::store::{AttributeStore, Attributes};

/// The config catalogue.
pub type ConfigStore = AttributeStore<ConfigSource>;

/// A collector's request for its configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigRequest {
    pub collector_id: String,
    /// Attributes to select sources by. Empty selects every source.
    pub attributes: Attributes,
    /// Hash the collector already holds. Empty counts as absent.
    pub hash: Option<String>,
}

/// Resolved content plus change-detection metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub content: String,
    pub hash: String,
    pub not_modified: bool,
}

/// Errors from resolving a collector's configuration.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("collector {0:?} is not registered")]
    NotRegistered(String),

    #[error("failed to resolve config content: {0}")]
    Fetch(#[from] FanOutError<ContentError>),
}

/// Resolves configuration for registered collectors.
pub struct ConfigResolver {
    configs: Arc<ConfigStore>,
    collectors: Arc<CollectorRegistry>,
    fetcher: Arc<dyn Fetch>,
    headers: Arc<HeaderMap>,
}

impl ConfigResolver {
    pub fn new(
        configs: Arc<ConfigStore>,
        collectors: Arc<CollectorRegistry>,
        fetcher: Arc<dyn Fetch>,
    ) -> Self {
        Self {
            configs,
            collectors,
            fetcher,
            headers: Arc::new(HeaderMap::new()),
        }
    }

    /// Headers sent with every http(s) fetch.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Arc::new(headers);
        self
    }

    pub fn configs(&self) -> &Arc<ConfigStore> {
        &self.configs
    }

    pub fn collectors(&self) -> &Arc<CollectorRegistry> {
        &self.collectors
    }

    /// Resolve `request` with no external cancellation.
    pub async fn resolve(&self, request: ConfigRequest) -> Result<ResolvedConfig, ResolveError> {
        self.resolve_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Resolve `request`, abandoning every fetch once `cancel` fires.
    pub async fn resolve_with_cancel(
        &self,
        request: ConfigRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolvedConfig, ResolveError> {
        let id = request.collector_id;
        let collector = self
            .collectors
            .get(&id)
            .ok_or_else(|| ResolveError::NotRegistered(id.clone()))?;

        let prior_hash = request
            .hash
            .filter(|hash| !hash.is_empty())
            .unwrap_or_else(|| collector.last_known_hash().to_string());

        let sources = if request.attributes.is_empty() {
            self.configs.list()
        } else {
            self.configs.get_by_attributes(&request.attributes)
        };
        debug!(collector = %id, sources = sources.len(), "resolving config");

        let mut group = FanOut::with_parent(cancel);
        for source in sources {
            let fetcher = Arc::clone(&self.fetcher);
            let headers = Arc::clone(&self.headers);
            group.spawn(move |token| async move {
                fetcher.fetch_with_cancel(&source, &headers, &token).await
            });
        }
        let parts = group.join().await.inspect_err(|err| {
            warn!(collector = %id, error = %err, "config resolution failed");
        })?;

        let content = parts
            .iter()
            .map(|part| String::from_utf8_lossy(part))
            .collect::<Vec<_>>()
            .join(" ");
        let hash = fingerprint(&content);
        let not_modified = hash == prior_hash;

        if hash != collector.last_known_hash() && !self.collectors.set_last_known_hash(&id, &hash)
        {
            debug!(collector = %id, "collector unregistered during resolution");
        }

        Ok(ResolvedConfig {
            content,
            hash,
            not_modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::content::ContentResolver;
    use crate::store::Object;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves each source's path as its content. Paths starting with `fail`
    /// error out, paths starting with `slow` hang.
    #[derive(Default)]
    struct FakeFetch {
        calls: AtomicUsize,
        completed: AtomicUsize,
    }

    impl Fetch for FakeFetch {
        fn fetch<'a>(
            &'a self,
            source: &'a ConfigSource,
            _headers: &'a HeaderMap,
        ) -> BoxFuture<'a, Result<Vec<u8>, ContentError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if source.path().starts_with("fail") {
                    return Err(ContentError::Status {
                        url: source.source(),
                        status: 500,
                    });
                }
                if source.path().starts_with("slow") {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                self.completed.fetch_add(1, Ordering::SeqCst);
                Ok(source.path().as_bytes().to_vec())
            })
        }
    }

    /// Keeps every token it is handed. Paths starting with `fail` error out.
    #[derive(Default)]
    struct TokenRecorder {
        tokens: parking_lot::Mutex<Vec<CancellationToken>>,
    }

    impl Fetch for TokenRecorder {
        fn fetch<'a>(
            &'a self,
            _source: &'a ConfigSource,
            _headers: &'a HeaderMap,
        ) -> BoxFuture<'a, Result<Vec<u8>, ContentError>> {
            unreachable!("resolver bypassed the cancellable fetch")
        }

        fn fetch_with_cancel<'a>(
            &'a self,
            source: &'a ConfigSource,
            _headers: &'a HeaderMap,
            cancel: &'a CancellationToken,
        ) -> BoxFuture<'a, Result<Vec<u8>, ContentError>> {
            self.tokens.lock().push(cancel.clone());
            Box::pin(async move {
                if source.path().starts_with("fail") {
                    return Err(ContentError::Status {
                        url: source.source(),
                        status: 500,
                    });
                }
                Ok(Vec::new())
            })
        }
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn setup(fetcher: Arc<dyn Fetch>, sources: &[(&str, &[(&str, &str)])]) -> ConfigResolver {
        let configs = Arc::new(ConfigStore::new());
        for (source, pairs) in sources {
            configs.put(ConfigSource::new(source, attrs(pairs)).unwrap());
        }
        let collectors = Arc::new(CollectorRegistry::new());
        collectors
            .register("c1", "collector", attrs(&[("env", "prod")]))
            .unwrap();
        ConfigResolver::new(configs, collectors, fetcher)
    }

    fn request(attributes: &[(&str, &str)], hash: Option<&str>) -> ConfigRequest {
        ConfigRequest {
            collector_id: "c1".to_string(),
            attributes: attrs(attributes),
            hash: hash.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_unregistered_collector_fails_fast() {
        let fake = Arc::new(FakeFetch::default());
        let resolver = setup(fake.clone(), &[("http://a", &[("env", "prod")])]);

        let err = resolver
            .resolve(ConfigRequest {
                collector_id: "ghost".to_string(),
                ..request(&[("env", "prod")], None)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::NotRegistered(ref id) if id == "ghost"));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_source() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[("http://alpha", &[("env", "prod")])],
        );

        let resolved = resolver.resolve(request(&[("env", "prod")], None)).await.unwrap();
        assert_eq!(resolved.content, "alpha");
        assert_eq!(resolved.hash, fingerprint("alpha"));
        assert!(!resolved.not_modified);
    }

    #[tokio::test]
    async fn test_joined_with_single_space() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[
                ("http://alpha", &[("env", "prod")]),
                ("http://beta", &[("role", "edge")]),
                ("http://gamma", &[("env", "dev")]),
            ],
        );

        let resolved = resolver
            .resolve(request(&[("env", "prod"), ("role", "edge")], None))
            .await
            .unwrap();
        assert!(
            resolved.content == "alpha beta" || resolved.content == "beta alpha",
            "unexpected content {:?}",
            resolved.content
        );
        assert_eq!(resolved.hash, fingerprint(&resolved.content));
    }

    #[tokio::test]
    async fn test_no_attributes_selects_everything() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[("http://alpha", &[("env", "prod")]), ("http://beta", &[])],
        );

        let resolved = resolver.resolve(request(&[], None)).await.unwrap();
        let mut words: Vec<&str> = resolved.content.split(' ').collect();
        words.sort();
        assert_eq!(words, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_no_matches_yields_empty_content() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[("http://alpha", &[("env", "prod")])],
        );

        let resolved = resolver.resolve(request(&[("env", "qa")], None)).await.unwrap();
        assert_eq!(resolved.content, "");
        assert_eq!(resolved.hash, "811c9dc5");
    }

    #[tokio::test]
    async fn test_not_modified_round_trip() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[("http://alpha", &[("env", "prod")])],
        );

        let first = resolver.resolve(request(&[("env", "prod")], None)).await.unwrap();
        assert!(!first.not_modified);
        assert_eq!(
            resolver.collectors().get("c1").unwrap().last_known_hash(),
            first.hash
        );

        let second = resolver
            .resolve(request(&[("env", "prod")], Some(&first.hash)))
            .await
            .unwrap();
        assert!(second.not_modified);
        assert_eq!(second.hash, first.hash);
        assert_eq!(
            resolver.collectors().get("c1").unwrap().last_known_hash(),
            first.hash
        );
    }

    #[tokio::test]
    async fn test_stored_hash_used_without_caller_hash() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[("http://alpha", &[("env", "prod")])],
        );

        resolver.resolve(request(&[("env", "prod")], None)).await.unwrap();
        let again = resolver
            .resolve(request(&[("env", "prod")], Some("")))
            .await
            .unwrap();
        assert!(again.not_modified);
    }

    #[tokio::test]
    async fn test_caller_hash_takes_precedence() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[("http://alpha", &[("env", "prod")])],
        );
        resolver.resolve(request(&[("env", "prod")], None)).await.unwrap();

        let stale = resolver
            .resolve(request(&[("env", "prod")], Some("00000000")))
            .await
            .unwrap();
        assert!(!stale.not_modified);
    }

    #[tokio::test]
    async fn test_changed_content_updates_stored_hash() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[("http://alpha", &[("env", "prod")])],
        );
        let first = resolver.resolve(request(&[("env", "prod")], None)).await.unwrap();

        resolver
            .configs()
            .put(ConfigSource::new("http://beta", attrs(&[("env", "prod")])).unwrap());
        let second = resolver
            .resolve(request(&[("env", "prod")], Some(&first.hash)))
            .await
            .unwrap();

        assert!(!second.not_modified);
        assert_ne!(second.hash, first.hash);
        assert_eq!(
            resolver.collectors().get("c1").unwrap().last_known_hash(),
            second.hash
        );
    }

    #[tokio::test]
    async fn test_fail_fast_returns_no_content() {
        let fake = Arc::new(FakeFetch::default());
        let resolver = setup(
            fake.clone(),
            &[
                ("http://fail-here", &[("env", "prod")]),
                ("http://slow-one", &[("env", "prod")]),
                ("http://slow-two", &[("env", "prod")]),
            ],
        );

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.resolve(request(&[("env", "prod")], None)),
        )
        .await
        .expect("siblings were not cancelled")
        .unwrap_err();

        assert!(matches!(
            err,
            ResolveError::Fetch(FanOutError::Task(ContentError::Status { status: 500, .. }))
        ));
        assert_eq!(fake.completed.load(Ordering::SeqCst), 0);
        assert_eq!(resolver.configs().len(), 3);
        assert_eq!(resolver.collectors().get("c1").unwrap().last_known_hash(), "");
    }

    #[tokio::test]
    async fn test_external_cancellation() {
        let resolver = setup(
            Arc::new(FakeFetch::default()),
            &[("http://slow", &[("env", "prod")])],
        );
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = resolver
            .resolve_with_cancel(request(&[("env", "prod")], None), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Fetch(FanOutError::Cancelled)));
    }

    #[tokio::test]
    async fn test_fetches_share_the_group_token() {
        let recorder = Arc::new(TokenRecorder::default());
        let resolver = setup(
            recorder.clone(),
            &[
                ("http://ok", &[("env", "prod")]),
                ("http://fail", &[("env", "prod")]),
            ],
        );
        let caller = CancellationToken::new();

        let err = resolver
            .resolve_with_cancel(request(&[("env", "prod")], None), &caller)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Fetch(FanOutError::Task(_))));

        let tokens = recorder.tokens.lock();
        // The sibling may be cancelled before it ever starts.
        assert!(!tokens.is_empty());
        assert!(tokens.iter().all(CancellationToken::is_cancelled));
        assert!(!caller.is_cancelled(), "failure leaked into the caller's token");
    }

    #[tokio::test]
    async fn test_with_real_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("base.alloy");
        tokio::fs::write(&path, "logging {}").await.unwrap();
        let present = format!("file://{}", path.display());
        let missing = format!("file://{}", tmp.path().join("missing.alloy").display());

        let resolver = setup(
            Arc::new(ContentResolver::new()),
            &[
                (present.as_str(), &[("env", "prod")]),
                (missing.as_str(), &[("env", "dev")]),
            ],
        );

        let resolved = resolver.resolve(request(&[("env", "prod")], None)).await.unwrap();
        assert_eq!(resolved.content, "logging {}");

        let err = resolver.resolve(request(&[("env", "dev")], None)).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Fetch(FanOutError::Task(ContentError::FileOpen { .. }))
        ));
    }

    #[tokio::test]
    async fn test_identity_is_source_fingerprint() {
        let resolver = setup(Arc::new(FakeFetch::default()), &[("http://alpha", &[])]);
        let stored = resolver.configs().list();
        assert_eq!(stored[0].identity(), fingerprint("http://alpha"));
    }
}
