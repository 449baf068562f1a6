//! # Manifest
//!
//! Asset descriptors fed to the bundle writer.
//!
//! A manifest is a JSON document listing the assets that live next to it on
//! disk. Every file path inside a manifest is relative to the directory the
//! manifest file sits in, so manifests from different directories can be
//! merged into one bundle without rewriting their paths.
//!
//! ```json
//! {
//!   "Assets": [
//!     {
//!       "Id": "shaders/default_vs",
//!       "Type": "Shader",
//!       "Files": ["default.vs.bin"],
//!       "Dependencies": [{ "Id": "shaders/common", "Name": "common" }],
//!       "Static": true,
//!       "Preload": false
//!     }
//!   ]
//! }
//! ```
//!
//! Keys are PascalCase. Every field except `Id` may be omitted or `null`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest path {0} has no parent directory")]
    NoParent(PathBuf),
}

/// A dependency of an asset on another asset, by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DependencyDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

/// One asset: an identifier, the raw files backing it and the assets it
/// depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssetDescriptor {
    pub id: String,
    #[serde(rename = "Type", default)]
    pub asset_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dependencies: Vec<DependencyDescriptor>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: Vec<MetadataEntry>,
    #[serde(default)]
    pub r#static: bool,
    #[serde(default)]
    pub preload: bool,
}

impl AssetDescriptor {
    /// Creates a descriptor with no files, dependencies or flags.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.files.push(file.into());
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.dependencies.push(DependencyDescriptor {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_static(mut self, value: bool) -> Self {
        self.r#static = value;
        self
    }

    pub fn with_preload(mut self, value: bool) -> Self {
        self.preload = value;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub assets: Vec<AssetDescriptor>,
}

impl Manifest {
    /// Parses a manifest document from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Reads and parses the manifest at `path`, remembering its directory so
    /// file paths can be resolved later.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ManifestSource, ManifestError> {
        let path = path.as_ref();
        let base_dir = path
            .parent()
            .ok_or_else(|| ManifestError::NoParent(path.to_path_buf()))?
            .to_path_buf();

        let bytes = fs::read(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_slice(&bytes).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(
            manifest = %path.display(),
            assets = manifest.assets.len(),
            "loaded manifest"
        );

        Ok(ManifestSource { base_dir, manifest })
    }
}

/// A parsed manifest together with the directory its file paths are
/// relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    pub base_dir: PathBuf,
    pub manifest: Manifest,
}

impl ManifestSource {
    pub fn new(base_dir: impl Into<PathBuf>, manifest: Manifest) -> Self {
        Self {
            base_dir: base_dir.into(),
            manifest,
        }
    }

    pub fn assets(&self) -> &[AssetDescriptor] {
        &self.manifest.assets
    }

    /// Resolves a file path from this manifest against its base directory.
    pub fn resolve(&self, file: &str) -> PathBuf {
        self.base_dir.join(file)
    }
}

// The source tool writes `null` for empty lists.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
