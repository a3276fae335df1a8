//! On-disk manifest fixtures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

/// A temporary manifest directory, removed on drop.
///
/// Holds both manifests and the local content files they point at.
pub struct ManifestDir {
    dir: TempDir,
}

impl ManifestDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create manifest dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `records` as a YAML manifest named `name`. Returns its path.
    pub fn write_manifest(&self, name: &str, records: &[(&str, &[(&str, &str)])]) -> PathBuf {
        let yaml = render_manifest(records);
        self.write_raw(name, &yaml)
    }

    /// Write `content` verbatim under `name`. Returns its path.
    pub fn write_raw(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create fixture parent");
        }
        fs::write(&path, content).expect("write fixture");
        path
    }

    /// Write a content file outside the manifest directory's top level and
    /// return its `file://` source string.
    ///
    /// Content files live in a `content/` subdirectory, which manifest
    /// loading skips.
    pub fn write_content(&self, name: &str, content: &str) -> String {
        let path = self.write_raw(&format!("content/{name}"), content);
        format!("file://{}", path.display())
    }
}

impl Default for ManifestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// One manifest entry as it appears on disk.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub source: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// Render `(source, attributes)` records as a YAML manifest list.
pub fn render_manifest(records: &[(&str, &[(&str, &str)])]) -> String {
    let records: Vec<ManifestRecord> = records
        .iter()
        .map(|(source, attributes)| ManifestRecord {
            source: source.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
        .collect();
    serde_yaml::to_string(&records).expect("serialize manifest fixture")
}
