use manifest::{AssetDescriptor, Manifest, ManifestSource};
use std::collections::HashSet;
use std::fs::{self, rename, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{BundleError, Result};
use crate::format::{
    AssetEntry, AssetFlags, DependencyEntry, FileEntry, Header, BUNDLE_MAGIC, BUNDLE_VERSION,
};
use crate::interner::StringInterner;

/// Totals reported after a successful [`BundleWriter::write`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub assets: usize,
    pub dependencies: usize,
    pub files: usize,
    pub string_bytes: u64,
    pub file_bytes: u64,
    pub total_bytes: u64,
}

/// Packs the assets of one or more manifests into a single bundle file.
///
/// The write is crash-safe: the bundle is written to `<output>.tmp`,
/// optionally fsynced, then renamed over `output`. On any failure the
/// temporary file is removed and `output` is left as it was.
#[derive(Debug, Clone)]
pub struct BundleWriter {
    sync: bool,
}

impl Default for BundleWriter {
    fn default() -> Self {
        Self { sync: true }
    }
}

impl BundleWriter {
    /// A writer that fsyncs before committing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether to `fsync` the temporary file before the rename.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Loads every manifest in `manifests` and packs them, in order, into
    /// `output`.
    pub fn write<P: AsRef<Path>>(&self, output: &Path, manifests: &[P]) -> Result<WriteSummary> {
        let sources = manifests
            .iter()
            .map(|m| Manifest::load(m))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.write_sources(output, &sources)
    }

    /// Packs already-loaded manifests into `output`.
    ///
    /// # Errors
    ///
    /// Fails on any unreadable source file, an asset identifier declared
    /// twice, counts or sizes over the format limits, or an I/O error while
    /// writing.
    pub fn write_sources(&self, output: &Path, sources: &[ManifestSource]) -> Result<WriteSummary> {
        let mut tables = Tables::default();
        for source in sources {
            debug!(
                base_dir = %source.base_dir.display(),
                assets = source.assets().len(),
                "packing manifest"
            );
            for asset in source.assets() {
                tables.add_asset(source, asset)?;
            }
        }

        let header = tables.header()?;
        let tmp_path = tmp_path(output);
        if let Err(e) = self.emit(&tmp_path, output, &header, &tables) {
            if tmp_path.exists() {
                if let Err(rm) = fs::remove_file(&tmp_path) {
                    warn!(path = %tmp_path.display(), error = %rm, "failed to remove temporary bundle");
                }
            }
            return Err(e);
        }

        let summary = WriteSummary {
            assets: tables.assets.len(),
            dependencies: tables.dependencies.len(),
            files: tables.files.len(),
            string_bytes: tables.strings.len() as u64,
            file_bytes: tables.file_bytes.len() as u64,
            total_bytes: header.total_len(),
        };
        info!(
            path = %output.display(),
            assets = summary.assets,
            files = summary.files,
            bytes = summary.total_bytes,
            "wrote bundle"
        );
        Ok(summary)
    }

    fn emit(&self, tmp_path: &Path, output: &Path, header: &Header, tables: &Tables) -> Result<()> {
        let total = header.total_len();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_path)?;
        file.set_len(total)?;

        let mut w = BufWriter::new(file);
        header.write_to(&mut w)?;
        w.write_all(tables.strings.as_bytes())?;
        for entry in &tables.assets {
            entry.write_to(&mut w)?;
        }
        for entry in &tables.dependencies {
            entry.write_to(&mut w)?;
        }
        for entry in &tables.files {
            entry.write_to(&mut w)?;
        }
        w.write_all(&tables.file_bytes)?;

        let mut file = w.into_inner().map_err(|e| e.into_error())?;
        debug_assert_eq!(file.stream_position()?, total);

        file.flush()?;
        if self.sync {
            file.sync_all()?;
        }
        drop(file);

        rename(tmp_path, output)?;
        Ok(())
    }
}

/// Everything collected from the manifests before the file is written.
#[derive(Default)]
struct Tables {
    strings: StringInterner,
    assets: Vec<AssetEntry>,
    dependencies: Vec<DependencyEntry>,
    files: Vec<FileEntry>,
    file_bytes: Vec<u8>,
    seen: HashSet<String>,
}

impl Tables {
    fn add_asset(&mut self, source: &ManifestSource, asset: &AssetDescriptor) -> Result<()> {
        if !self.seen.insert(asset.id.clone()) {
            return Err(BundleError::DuplicateAsset(asset.id.clone()));
        }
        let dependencies_count = count_u8("dependencies per asset", asset.dependencies.len())?;
        let files_count = count_u8("files per asset", asset.files.len())?;

        let mut flags = AssetFlags::NONE;
        if asset.preload {
            flags |= AssetFlags::PRELOAD;
        }
        if asset.r#static {
            flags |= AssetFlags::STATIC;
        }

        self.assets.push(AssetEntry {
            id: self.strings.intern(&asset.id)?,
            dependencies_count,
            files_count,
            flags,
        });

        for dependency in &asset.dependencies {
            self.dependencies.push(DependencyEntry {
                id: self.strings.intern(&dependency.id)?,
                name: self.strings.intern(&dependency.name)?,
            });
        }

        for file in &asset.files {
            let path = source.resolve(file);
            let bytes = fs::read(&path).map_err(|source| BundleError::ReadSource {
                path: path.clone(),
                source,
            })?;

            let offset = self.file_bytes.len();
            let end = offset as u64 + bytes.len() as u64;
            if end > i32::MAX as u64 {
                return Err(BundleError::Limit {
                    what: "file bytes size",
                    value: end,
                    max: i32::MAX as u64,
                });
            }

            self.files.push(FileEntry {
                name: self.strings.intern(file)?,
                offset: offset as i32,
                length: bytes.len() as i32,
            });
            self.file_bytes.extend_from_slice(&bytes);
        }

        debug!(
            id = %asset.id,
            dependencies = dependencies_count,
            files = files_count,
            "packed asset"
        );
        Ok(())
    }

    fn header(&self) -> Result<Header> {
        let header = Header {
            magic: BUNDLE_MAGIC,
            version: BUNDLE_VERSION,
            string_size: count_i32("string blob size", self.strings.len())?,
            asset_count: count_i32("asset count", self.assets.len())?,
            dependencies_count: count_i32("dependency count", self.dependencies.len())?,
            file_entries_count: count_i32("file entry count", self.files.len())?,
            file_size: count_i32("file bytes size", self.file_bytes.len())?,
        };
        Ok(header)
    }
}

fn count_u8(what: &'static str, value: usize) -> Result<u8> {
    u8::try_from(value).map_err(|_| BundleError::Limit {
        what,
        value: value as u64,
        max: u8::MAX as u64,
    })
}

fn count_i32(what: &'static str, value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| BundleError::Limit {
        what,
        value: value as u64,
        max: i32::MAX as u64,
    })
}

/// `<output>.tmp`, next to `output` so the final rename stays on one
/// filesystem.
fn tmp_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{HEADER_BYTES, STRING_REF_BYTES};
    use anyhow::Result;
    use byteorder::{LittleEndian, ReadBytesExt};
    use manifest::AssetDescriptor;
    use tempfile::tempdir;

    fn source(dir: &Path, assets: Vec<AssetDescriptor>) -> ManifestSource {
        ManifestSource::new(dir, Manifest { assets })
    }

    #[test]
    fn write_and_inspect_header() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.bin"), b"hello")?;
        let path = dir.path().join("out.aita");

        let src = source(
            dir.path(),
            vec![AssetDescriptor::new("a")
                .with_file("a.bin")
                .with_dependency("b", "bee")],
        );
        let summary = BundleWriter::new().write_sources(&path, &[src])?;

        let bytes = fs::read(&path)?;
        assert_eq!(bytes.len() as u64, summary.total_bytes);

        let header = Header::read_from(&mut &bytes[..])?;
        assert_eq!(header.magic, BUNDLE_MAGIC);
        assert_eq!(header.version, BUNDLE_VERSION);
        assert_eq!(header.asset_count, 1);
        assert_eq!(header.dependencies_count, 1);
        assert_eq!(header.file_entries_count, 1);
        assert_eq!(header.file_size, 5);
        // "a" + "b" + "bee" + "a.bin"
        assert_eq!(header.string_size, 10);

        // raw bytes are the tail of the file
        assert_eq!(&bytes[bytes.len() - 5..], b"hello");
        Ok(())
    }

    #[test]
    fn shared_strings_are_stored_once() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.aita");

        let src = source(
            dir.path(),
            vec![
                AssetDescriptor::new("x").with_dependency("common", "common"),
                AssetDescriptor::new("y").with_dependency("common", "common"),
            ],
        );
        BundleWriter::new().write_sources(&path, &[src])?;

        let bytes = fs::read(&path)?;
        let header = Header::read_from(&mut &bytes[..])?;
        // "x" + "common" + "y"
        assert_eq!(header.string_size, 8);

        let strings = &bytes[HEADER_BYTES as usize..][..8];
        assert_eq!(strings, b"xcommony");
        Ok(())
    }

    #[test]
    fn file_offsets_are_cumulative() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("one.bin"), b"111")?;
        fs::write(dir.path().join("two.bin"), b"22222")?;
        let path = dir.path().join("out.aita");

        let src = source(
            dir.path(),
            vec![
                AssetDescriptor::new("first").with_file("one.bin"),
                AssetDescriptor::new("second").with_file("two.bin"),
            ],
        );
        let summary = BundleWriter::new().write_sources(&path, &[src])?;
        assert_eq!(summary.file_bytes, 8);

        let bytes = fs::read(&path)?;
        let header = Header::read_from(&mut &bytes[..])?;
        let entries_start = (header.files_start()
            - header.file_entries_count as u64 * crate::format::FILE_ENTRY_BYTES)
            as usize;

        let mut r = &bytes[entries_start..];
        let mut offsets = Vec::new();
        for _ in 0..2 {
            r = &r[STRING_REF_BYTES as usize..];
            let offset = r.read_i32::<LittleEndian>()?;
            let length = r.read_i32::<LittleEndian>()?;
            offsets.push((offset, length));
        }
        assert_eq!(offsets, vec![(0, 3), (3, 5)]);
        Ok(())
    }

    #[test]
    fn missing_source_file_aborts_and_leaves_no_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.aita");

        let src = source(
            dir.path(),
            vec![AssetDescriptor::new("a").with_file("missing.bin")],
        );
        let result = BundleWriter::new().write_sources(&path, &[src]);

        assert!(matches!(result, Err(BundleError::ReadSource { .. })));
        assert!(!path.exists());
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn failed_write_keeps_previous_bundle() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.aita");
        fs::write(&path, b"previous")?;

        let src = source(
            dir.path(),
            vec![AssetDescriptor::new("a").with_file("missing.bin")],
        );
        assert!(BundleWriter::new().write_sources(&path, &[src]).is_err());
        assert_eq!(fs::read(&path)?, b"previous");
        Ok(())
    }

    #[test]
    fn duplicate_asset_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.aita");

        let a = source(dir.path(), vec![AssetDescriptor::new("dup")]);
        let b = source(dir.path(), vec![AssetDescriptor::new("dup")]);
        let result = BundleWriter::new().write_sources(&path, &[a, b]);

        assert!(matches!(result, Err(BundleError::DuplicateAsset(id)) if id == "dup"));
    }

    #[test]
    fn too_many_dependencies_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.aita");

        let mut asset = AssetDescriptor::new("big");
        for i in 0..256 {
            asset = asset.with_dependency(format!("dep{}", i), "");
        }
        let result = BundleWriter::new().write_sources(&path, &[source(dir.path(), vec![asset])]);

        assert!(matches!(
            result,
            Err(BundleError::Limit {
                value: 256,
                max: 255,
                ..
            })
        ));
    }

    #[test]
    fn too_many_files_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("e.bin"), b"").unwrap();
        let path = dir.path().join("out.aita");

        let mut asset = AssetDescriptor::new("wide");
        for _ in 0..256 {
            asset = asset.with_file("e.bin");
        }
        let result = BundleWriter::new().write_sources(&path, &[source(dir.path(), vec![asset])]);

        assert!(matches!(
            result,
            Err(BundleError::Limit {
                what: "files per asset",
                value: 256,
                max: 255,
            })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn max_files_per_asset_round_trips() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("e.bin"), b"")?;
        fs::write(dir.path().join("last.bin"), b"z")?;
        let path = dir.path().join("out.aita");

        let mut asset = AssetDescriptor::new("wide");
        for _ in 0..254 {
            asset = asset.with_file("e.bin");
        }
        asset = asset.with_file("last.bin");
        let summary = BundleWriter::new()
            .sync(false)
            .write_sources(&path, &[source(dir.path(), vec![asset])])?;
        assert_eq!(summary.files, 255);

        for preload in [false, true] {
            let bundle = crate::BundleReader::open(&path, preload)?;
            let files = bundle.get_files("wide")?;
            assert_eq!(files.len(), 255);
            assert!(files[..254].iter().all(|f| f.is_empty()));
            assert_eq!(&files[254].read_all()?[..], b"z");
        }
        Ok(())
    }

    #[test]
    fn write_loads_manifests_from_disk() -> Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("builtin");
        fs::create_dir_all(&nested)?;
        fs::write(nested.join("a.bin"), b"nested")?;
        let manifest = nested.join("manifest.json");
        fs::write(
            &manifest,
            br#"{ "Assets": [{ "Id": "a", "Files": ["a.bin"], "Preload": true }] }"#,
        )?;

        let path = dir.path().join("out.aita");
        let summary = BundleWriter::new().sync(false).write(&path, &[&manifest])?;
        assert_eq!(summary.assets, 1);
        assert_eq!(summary.file_bytes, 6);
        Ok(())
    }

    #[test]
    fn missing_manifest_is_a_manifest_error() {
        let dir = tempdir().unwrap();
        let result = BundleWriter::new().write(
            &dir.path().join("out.aita"),
            &[dir.path().join("nope.json")],
        );
        assert!(matches!(result, Err(BundleError::Manifest(_))));
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/a/b/out.aita")),
            PathBuf::from("/a/b/out.aita.tmp")
        );
    }
}
