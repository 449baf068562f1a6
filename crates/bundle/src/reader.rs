use bytes::Bytes;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::container::{Asset, Bundle, Dependency, Resource};
use crate::error::{format_err, BundleError, Result};
use crate::file_ref::{read_exact_at, DiskFile, FileRef, HandleSlot, InMemoryFile};
use crate::format::{AssetEntry, AssetFlags, DependencyEntry, FileEntry, Header, HEADER_BYTES};

/// Opens bundle files.
///
/// On [`open`](BundleReader::open) the header and the manifest region
/// (strings plus the three entry tables) are read and turned into an owned
/// index. File bytes are either loaded in one pass (`preload = true`) or read
/// on demand through the open handle.
pub struct BundleReader;

impl BundleReader {
    /// Opens the bundle at `path`.
    ///
    /// # Validation
    ///
    /// - The header must be complete and carry the expected magic and version.
    /// - The header, the manifest region and the file bytes it declares must
    ///   add up to exactly the file length.
    /// - Every asset's dependency and file counts must exactly cover the
    ///   shared tables, and every record must point inside its section.
    ///
    /// # Errors
    ///
    /// [`BundleError::Format`] or [`BundleError::SizeMismatch`] for a
    /// malformed file, [`BundleError::Io`] on any read failure. No bundle is
    /// returned unless every step succeeds.
    pub fn open<P: AsRef<Path>>(path: P, preload: bool) -> Result<Bundle> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let header = read_header(&file)?;
        header.validate()?;

        let expected = header.total_len();
        if file_len != expected {
            return Err(BundleError::SizeMismatch {
                expected,
                actual: file_len,
            });
        }

        let region = read_section(&file, HEADER_BYTES, header.manifest_len(), "manifest region")?;
        let parsed = parse_manifest(&header, &region)?;
        drop(region);

        let files_start = header.files_start();
        let (assets, resource) = if preload {
            let data = Bytes::from(read_section(
                &file,
                files_start,
                header.file_size as u64,
                "file bytes",
            )?);
            drop(file);
            let assets = bind(parsed, |name, entry| {
                let start = entry.offset as usize;
                let end = start + entry.length as usize;
                FileRef::InMemory(InMemoryFile::new(name, data.slice(start..end)))
            })?;
            (assets, Resource::Memory(data))
        } else {
            let slot = Arc::new(HandleSlot::new(file));
            let assets = bind(parsed, |name, entry| {
                FileRef::OnDisk(DiskFile::new(
                    name,
                    slot.clone(),
                    files_start + entry.offset as u64,
                    entry.length as usize,
                ))
            })?;
            (assets, Resource::Disk(slot))
        };

        info!(
            path = %path.display(),
            assets = assets.len(),
            preload,
            "opened bundle"
        );
        Ok(Bundle::new(path.to_path_buf(), assets, resource))
    }
}

fn read_header(file: &File) -> Result<Header> {
    let mut buf = [0u8; HEADER_BYTES as usize];
    read_exact_at(file, &mut buf, 0).map_err(|e| truncated(e, "header"))?;
    Ok(Header::read_from(&mut &buf[..])?)
}

fn read_section(file: &File, offset: u64, len: u64, what: &str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    read_exact_at(file, &mut buf, offset).map_err(|e| truncated(e, what))?;
    Ok(buf)
}

/// A short read is a format problem, anything else stays an I/O error.
fn truncated(e: io::Error, what: &str) -> BundleError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        format_err(format!("truncated {}", what))
    } else {
        BundleError::Io(e)
    }
}

/// An asset whose file entries are not yet bound to bytes.
#[derive(Debug)]
struct ParsedAsset {
    id: String,
    flags: AssetFlags,
    dependencies: Vec<Dependency>,
    files: Vec<(String, FileEntry)>,
}

/// Walks the asset table, carving each asset's dependencies and files out of
/// the shared tables with two forward-only cursors.
fn parse_manifest(header: &Header, region: &[u8]) -> Result<Vec<ParsedAsset>> {
    let (strings, mut assets_table) = region.split_at(header.string_size as usize);

    let asset_entries = (0..header.asset_count)
        .map(|_| AssetEntry::read_from(&mut assets_table))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| truncated(e, "asset table"))?;
    let mut dependency_table = assets_table;
    let dependency_entries = (0..header.dependencies_count)
        .map(|_| DependencyEntry::read_from(&mut dependency_table))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| truncated(e, "dependency table"))?;
    let mut file_table = dependency_table;
    let file_entries = (0..header.file_entries_count)
        .map(|_| FileEntry::read_from(&mut file_table))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| truncated(e, "file table"))?;

    let mut dependency_cursor = 0usize;
    let mut file_cursor = 0usize;
    let mut parsed = Vec::with_capacity(asset_entries.len());

    for entry in &asset_entries {
        let id = entry.id.resolve(strings)?;

        let deps = take(
            &dependency_entries,
            &mut dependency_cursor,
            entry.dependencies_count,
            &id,
            "dependency",
        )?;
        let dependencies = deps
            .iter()
            .map(|d| {
                Ok(Dependency {
                    id: d.id.resolve(strings)?,
                    name: d.name.resolve(strings)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let entries = take(&file_entries, &mut file_cursor, entry.files_count, &id, "file")?;
        let files = entries
            .iter()
            .map(|f| {
                f.check_bounds(header.file_size)?;
                Ok((f.name.resolve(strings)?, *f))
            })
            .collect::<Result<Vec<_>>>()?;

        parsed.push(ParsedAsset {
            id,
            flags: entry.flags,
            dependencies,
            files,
        });
    }

    if dependency_cursor != dependency_entries.len() || file_cursor != file_entries.len() {
        return Err(format_err(format!(
            "assets consume {} of {} dependencies and {} of {} file entries",
            dependency_cursor,
            dependency_entries.len(),
            file_cursor,
            file_entries.len()
        )));
    }

    debug!(
        assets = parsed.len(),
        dependencies = dependency_cursor,
        files = file_cursor,
        "parsed bundle manifest"
    );
    Ok(parsed)
}

/// Takes the next `count` records at `cursor` and advances it.
fn take<'a, T>(
    table: &'a [T],
    cursor: &mut usize,
    count: u8,
    asset: &str,
    what: &str,
) -> Result<&'a [T]> {
    let start = *cursor;
    let end = start + count as usize;
    let slice = table.get(start..end).ok_or_else(|| {
        format_err(format!(
            "asset {:?} claims {} {} entries at {}, table holds {}",
            asset,
            count,
            what,
            start,
            table.len()
        ))
    })?;
    *cursor = end;
    Ok(slice)
}

/// Turns parsed assets into the bundle index, binding each file entry with
/// `make_ref`.
fn bind<F>(parsed: Vec<ParsedAsset>, mut make_ref: F) -> Result<HashMap<String, Asset>>
where
    F: FnMut(String, &FileEntry) -> FileRef,
{
    let mut assets = HashMap::with_capacity(parsed.len());
    for p in parsed {
        let files = p
            .files
            .into_iter()
            .map(|(name, entry)| make_ref(name, &entry))
            .collect();
        if assets.contains_key(&p.id) {
            return Err(format_err(format!("duplicate asset identifier {:?}", p.id)));
        }
        assets.insert(
            p.id.clone(),
            Asset {
                id: p.id,
                flags: p.flags,
                dependencies: p.dependencies,
                files,
            },
        );
    }
    Ok(assets)
}
