use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{BundleError, Result};
use crate::file_ref::{FileRef, HandleSlot};
use crate::format::AssetFlags;

/// A dependency edge declared by an asset: the target's identifier and a
/// display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub id: String,
    pub name: String,
}

/// One asset as read back from a bundle.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: String,
    pub flags: AssetFlags,
    pub dependencies: Vec<Dependency>,
    pub files: Vec<FileRef>,
}

/// The single resource a [`Bundle`] owns.
#[derive(Debug)]
pub(crate) enum Resource {
    /// Preloaded raw file bytes.
    Memory(Bytes),
    /// Open handle used by on-disk refs.
    Disk(Arc<HandleSlot>),
}

/// An opened bundle: an index from asset identifier to its dependencies and
/// file refs.
///
/// The index is built once by [`BundleReader::open`](crate::BundleReader::open)
/// and never changes. Dropping or [`close`](Bundle::close)-ing the bundle
/// releases its resource; see [`file_ref`](crate::file_ref) for what that
/// means for refs cloned out of it.
#[derive(Debug)]
pub struct Bundle {
    path: PathBuf,
    assets: HashMap<String, Asset>,
    resource: Resource,
}

impl Bundle {
    pub(crate) fn new(path: PathBuf, assets: HashMap<String, Asset>, resource: Resource) -> Self {
        Self {
            path,
            assets,
            resource,
        }
    }

    /// `true` if every file was loaded into memory at open time.
    pub fn is_cached(&self) -> bool {
        matches!(self.resource, Resource::Memory(_))
    }

    /// Path the bundle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file refs of `id` in pack order.
    ///
    /// # Errors
    ///
    /// [`BundleError::NotFound`] if no asset has that identifier.
    pub fn get_files(&self, id: &str) -> Result<&[FileRef]> {
        Ok(&self.asset(id)?.files)
    }

    /// Returns the dependencies of `id` in pack order.
    ///
    /// # Errors
    ///
    /// [`BundleError::NotFound`] if no asset has that identifier.
    pub fn dependencies(&self, id: &str) -> Result<&[Dependency]> {
        Ok(&self.asset(id)?.dependencies)
    }

    /// Returns the whole record of `id`: flags, dependencies and files.
    ///
    /// # Errors
    ///
    /// [`BundleError::NotFound`] if no asset has that identifier.
    pub fn asset(&self, id: &str) -> Result<&Asset> {
        self.assets
            .get(id)
            .ok_or_else(|| BundleError::NotFound(id.to_owned()))
    }

    /// Iterates over every asset identifier, in no particular order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    /// Iterates over every asset, in no particular order.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    /// Number of assets in the bundle.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// `true` if the bundle holds no assets.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Releases the bundle's resource and discards its index.
    ///
    /// Equivalent to dropping the bundle.
    pub fn close(self) {
        drop(self)
    }
}

impl Drop for Bundle {
    fn drop(&mut self) {
        match &self.resource {
            Resource::Disk(slot) => {
                if slot.close() {
                    debug!(path = %self.path.display(), "closed bundle handle");
                }
            }
            Resource::Memory(bytes) => {
                debug!(
                    path = %self.path.display(),
                    bytes = bytes.len(),
                    "released preloaded bundle bytes"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_ref::InMemoryFile;

    fn memory_bundle() -> Bundle {
        let data = Bytes::from_static(b"void main(){}");
        let mut assets = HashMap::new();
        assets.insert(
            "shaders/default_vs".to_string(),
            Asset {
                id: "shaders/default_vs".into(),
                flags: AssetFlags::STATIC,
                dependencies: vec![Dependency {
                    id: "shaders/common".into(),
                    name: "common".into(),
                }],
                files: vec![FileRef::InMemory(InMemoryFile::new(
                    "default.vs.bin".into(),
                    data.clone(),
                ))],
            },
        );
        Bundle::new("mem.aita".into(), assets, Resource::Memory(data))
    }

    #[test]
    fn lookup_known_asset() {
        let bundle = memory_bundle();
        assert!(bundle.is_cached());
        assert_eq!(bundle.len(), 1);

        let files = bundle.get_files("shaders/default_vs").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "default.vs.bin");

        let deps = bundle.dependencies("shaders/default_vs").unwrap();
        assert_eq!(deps[0].id, "shaders/common");
        assert!(bundle.asset("shaders/default_vs").unwrap().flags.is_static());
    }

    #[test]
    fn unknown_asset_is_not_found() {
        let bundle = memory_bundle();
        match bundle.get_files("nonexistent/id") {
            Err(BundleError::NotFound(id)) => assert_eq!(id, "nonexistent/id"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn memory_refs_outlive_close() {
        let bundle = memory_bundle();
        let file = bundle.get_files("shaders/default_vs").unwrap()[0].clone();
        bundle.close();

        assert_eq!(&file.read_all().unwrap()[..], b"void main(){}");
    }
}
