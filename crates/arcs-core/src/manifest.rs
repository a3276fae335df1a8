//! Manifest loading.
//!
//! A manifest is a YAML list of `{source, attributes}` records:
//!
//! ```yaml
//! - source: 'file:///etc/arcs/base.alloy'
//!   attributes:
//!     env: prod
//! - source: 'https://configs.example.com/node.alloy'
//!   attributes:
//!     role: node
//! ```
//!
//! [`load`] accepts a single file or a flat directory (subdirectories are
//! skipped, never descended into) and loads every file concurrently. A record
//! that fails to parse is rejected on its own and the rest of its file still
//! loads; the rejects are returned next to the sources in [`LoadedManifest`].
//! A file that cannot be read or is not a YAML list fails the whole load and
//! cancels the remaining files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::content::{ContentError, read_file};
use crate::fanout::{FanOut, FanOutError};
use crate::source::{ConfigSource, SourceError};
use crate::store::Attributes;

/// One manifest entry as written on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// `protocol://path` of the config content.
    pub source: String,
    /// Attributes the source is served for.
    #[serde(default)]
    pub attributes: Attributes,
}

/// Why a single record was rejected.
#[derive(Debug, thiserror::Error)]
pub enum RecordErrorKind {
    #[error("record does not have the expected 'source' and 'attributes' fields: {0}")]
    Fields(serde_yaml::Error),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// A rejected record and where it came from.
#[derive(Debug, thiserror::Error)]
#[error("{}: record {index}: {kind}", file.display())]
pub struct RecordError {
    pub file: PathBuf,
    /// Zero-based position of the record in its file.
    pub index: usize,
    pub kind: RecordErrorKind,
}

/// Every record rejected during a load.
#[derive(Debug, thiserror::Error)]
#[error("{} manifest record(s) rejected", records.len())]
pub struct ManifestParseError {
    pub records: Vec<RecordError>,
}

/// Errors that abort a manifest load.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to inspect manifest path {}: {source}", path.display())]
    Discover {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to load manifest: {source}")]
    Fetch { path: PathBuf, source: ContentError },

    #[error("failed to decode manifest {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Parse(#[from] ManifestParseError),

    #[error("manifest load cancelled")]
    Cancelled,

    #[error("manifest load task aborted: {0}")]
    Aborted(JoinError),
}

impl From<FanOutError<ManifestError>> for ManifestError {
    fn from(err: FanOutError<ManifestError>) -> Self {
        match err {
            FanOutError::Task(err) => err,
            FanOutError::Cancelled => ManifestError::Cancelled,
            FanOutError::Aborted(err) => ManifestError::Aborted(err),
        }
    }
}

/// Sources parsed from one or more manifests plus the records that were
/// rejected along the way.
#[derive(Debug, Default)]
pub struct LoadedManifest {
    pub sources: Vec<ConfigSource>,
    pub rejected: Vec<RecordError>,
}

impl LoadedManifest {
    /// Whether every record parsed.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Split into the parsed sources and the aggregate error, if any record
    /// was rejected.
    pub fn into_parts(self) -> (Vec<ConfigSource>, Option<ManifestParseError>) {
        let err = (!self.rejected.is_empty()).then_some(ManifestParseError {
            records: self.rejected,
        });
        (self.sources, err)
    }

    /// The parsed sources, or the aggregate error if any record was rejected.
    pub fn into_strict(self) -> Result<Vec<ConfigSource>, ManifestError> {
        match self.into_parts() {
            (sources, None) => Ok(sources),
            (_, Some(err)) => Err(err.into()),
        }
    }

    fn extend(&mut self, other: LoadedManifest) {
        self.sources.extend(other.sources);
        self.rejected.extend(other.rejected);
    }
}

/// Parse one manifest file's bytes.
///
/// Only a document that is not a YAML list is an error here; bad records are
/// collected in [`LoadedManifest::rejected`].
pub fn parse_manifest(file: &Path, content: &[u8]) -> Result<LoadedManifest, ManifestError> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(LoadedManifest::default());
    }

    let values: Option<Vec<serde_yaml::Value>> =
        serde_yaml::from_slice(content).map_err(|source| ManifestError::Decode {
            path: file.to_path_buf(),
            source,
        })?;

    let mut loaded = LoadedManifest::default();
    for (index, value) in values.unwrap_or_default().into_iter().enumerate() {
        match parse_record(value) {
            Ok(source) => loaded.sources.push(source),
            Err(kind) => loaded.rejected.push(RecordError {
                file: file.to_path_buf(),
                index,
                kind,
            }),
        }
    }
    Ok(loaded)
}

fn parse_record(value: serde_yaml::Value) -> Result<ConfigSource, RecordErrorKind> {
    let record: ManifestRecord = serde_yaml::from_value(value).map_err(RecordErrorKind::Fields)?;
    Ok(ConfigSource::new(&record.source, record.attributes)?)
}

/// Resolve `path` to the manifest files it names.
///
/// A file names itself. A directory names its direct entries that are not
/// directories, sorted by path.
pub async fn discover(path: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    let discover_err = |source| ManifestError::Discover {
        path: path.to_path_buf(),
        source,
    };

    let metadata = tokio::fs::metadata(path).await.map_err(discover_err)?;
    if !metadata.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut entries = tokio::fs::read_dir(path).await.map_err(discover_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(discover_err)? {
        let entry_path = entry.path();
        // Follow symlinks; a dangling link is kept and fails at read time.
        if let Ok(meta) = tokio::fs::metadata(&entry_path).await
            && meta.is_dir()
        {
            debug!(path = %entry_path.display(), "skipping manifest subdirectory");
            continue;
        }
        files.push(entry_path);
    }
    files.sort();
    Ok(files)
}

/// Load every manifest under `path`.
pub async fn load(path: &Path) -> Result<LoadedManifest, ManifestError> {
    load_with_cancel(path, &CancellationToken::new()).await
}

/// Load every manifest under `path`, stopping early once `cancel` fires.
pub async fn load_with_cancel(
    path: &Path,
    cancel: &CancellationToken,
) -> Result<LoadedManifest, ManifestError> {
    let files = discover(path).await?;
    let file_count = files.len();

    let mut group: FanOut<LoadedManifest, ManifestError> = FanOut::with_parent(cancel);
    for file in files {
        group.spawn(move |_| async move {
            let content = read_file(&file)
                .await
                .map_err(|source| ManifestError::Fetch {
                    path: file.clone(),
                    source,
                })?;
            let parsed = parse_manifest(&file, &content)?;
            debug!(
                path = %file.display(),
                sources = parsed.sources.len(),
                rejected = parsed.rejected.len(),
                "manifest parsed"
            );
            Ok(parsed)
        });
    }

    let mut loaded = LoadedManifest::default();
    for parsed in group.join().await? {
        loaded.extend(parsed);
    }

    info!(
        path = %path.display(),
        files = file_count,
        sources = loaded.sources.len(),
        rejected = loaded.rejected.len(),
        "manifests loaded"
    );
    Ok(loaded)
}
