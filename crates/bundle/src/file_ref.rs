//! Handles to the bytes of one packed file.
//!
//! A [`FileRef`] is either backed by the preloaded raw-bytes buffer or by the
//! bundle's open file handle. Both variants are cheap to clone and can be
//! shared across threads.
//!
//! # Ownership after close
//!
//! - In-memory refs hold a reference-counted view of the preloaded buffer.
//!   The buffer is freed once the bundle *and* every ref or returned
//!   [`Bytes`] have been dropped, so reads keep working after the bundle is
//!   closed.
//! - On-disk refs hold the bundle's [`HandleSlot`], not the file itself.
//!   Closing the bundle takes the file out of the slot, and every read after
//!   that fails with [`BundleError::HandleClosed`].

use bytes::Bytes;
use parking_lot::RwLock;
use std::fs::File;
use std::io;
use std::sync::Arc;

use crate::error::{BundleError, Result};

/// Reads exactly `buf.len()` bytes at `offset` without touching a shared
/// file cursor.
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
compile_error!("positioned file reads are only implemented for unix and windows targets");

/// The bundle's open file handle, shared with its on-disk refs.
///
/// Reads take the lock shared, so they run in parallel; [`close`] takes it
/// exclusively and waits for in-flight reads before dropping the file.
///
/// [`close`]: HandleSlot::close
#[derive(Debug)]
pub struct HandleSlot {
    file: RwLock<Option<File>>,
}

impl HandleSlot {
    pub(crate) fn new(file: File) -> Self {
        Self {
            file: RwLock::new(Some(file)),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.file.read().is_some()
    }

    pub(crate) fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let guard = self.file.read();
        let file = guard.as_ref().ok_or(BundleError::HandleClosed)?;
        read_exact_at(file, buf, offset)?;
        Ok(())
    }

    /// Drops the file. Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        self.file.write().take().is_some()
    }
}

/// A file whose bytes live in the preloaded raw-bytes buffer.
#[derive(Debug, Clone)]
pub struct InMemoryFile {
    name: String,
    data: Bytes,
}

impl InMemoryFile {
    pub(crate) fn new(name: String, data: Bytes) -> Self {
        Self { name, data }
    }
}

/// A file read on demand from the bundle's open handle.
#[derive(Debug, Clone)]
pub struct DiskFile {
    name: String,
    handle: Arc<HandleSlot>,
    /// Absolute position in the bundle file.
    offset: u64,
    length: usize,
}

impl DiskFile {
    pub(crate) fn new(name: String, handle: Arc<HandleSlot>, offset: u64, length: usize) -> Self {
        Self {
            name,
            handle,
            offset,
            length,
        }
    }
}

/// One packed file, readable through either backing.
#[derive(Debug, Clone)]
pub enum FileRef {
    InMemory(InMemoryFile),
    OnDisk(DiskFile),
}

impl FileRef {
    /// The file name recorded at pack time, for diagnostics.
    pub fn name(&self) -> &str {
        match self {
            FileRef::InMemory(f) => &f.name,
            FileRef::OnDisk(f) => &f.name,
        }
    }

    /// Length of the file in bytes.
    pub fn len(&self) -> usize {
        match self {
            FileRef::InMemory(f) => f.data.len(),
            FileRef::OnDisk(f) => f.length,
        }
    }

    /// `true` for a zero-length file.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` when the bytes are already in memory.
    pub fn is_cached(&self) -> bool {
        matches!(self, FileRef::InMemory(_))
    }

    /// Copies the file into the front of `buf`, returning the bytes copied.
    ///
    /// # Errors
    ///
    /// [`BundleError::BufferTooSmall`] if `buf` is shorter than
    /// [`len`](FileRef::len), [`BundleError::HandleClosed`] if the owning
    /// bundle of an on-disk ref has been closed, or any I/O error from the
    /// positioned read.
    pub fn read_into(&self, buf: &mut [u8]) -> Result<usize> {
        let needed = self.len();
        if buf.len() < needed {
            return Err(BundleError::BufferTooSmall {
                needed,
                provided: buf.len(),
            });
        }

        match self {
            FileRef::InMemory(f) => buf[..needed].copy_from_slice(&f.data),
            FileRef::OnDisk(f) => f.handle.read_exact_at(&mut buf[..needed], f.offset)?,
        }
        Ok(needed)
    }

    /// Returns the whole file.
    ///
    /// In-memory refs return a view of the preloaded buffer without copying;
    /// on-disk refs allocate and perform a single positioned read.
    pub fn read_all(&self) -> Result<Bytes> {
        match self {
            FileRef::InMemory(f) => Ok(f.data.clone()),
            FileRef::OnDisk(f) => {
                let mut buf = vec![0u8; f.length];
                f.handle.read_exact_at(&mut buf, f.offset)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn disk_ref(contents: &[u8], offset: u64, length: usize) -> (tempfile::TempDir, Arc<HandleSlot>, FileRef) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        drop(f);

        let slot = Arc::new(HandleSlot::new(File::open(&path).unwrap()));
        let file = FileRef::OnDisk(DiskFile::new("blob".into(), slot.clone(), offset, length));
        (dir, slot, file)
    }

    #[test]
    fn in_memory_read_all_is_zero_copy() {
        let backing = Bytes::from_static(b"headerPAYLOADtrailer");
        let file = FileRef::InMemory(InMemoryFile::new("p".into(), backing.slice(6..13)));

        let data = file.read_all().unwrap();
        assert_eq!(&data[..], b"PAYLOAD");
        assert_eq!(data.as_ptr(), backing[6..].as_ptr());
        assert!(file.is_cached());
    }

    #[test]
    fn in_memory_read_into_copies_prefix() {
        let file = FileRef::InMemory(InMemoryFile::new("p".into(), Bytes::from_static(b"abc")));
        let mut buf = [0xAAu8; 5];

        assert_eq!(file.read_into(&mut buf).unwrap(), 3);
        assert_eq!(&buf, &[b'a', b'b', b'c', 0xAA, 0xAA]);
    }

    #[test]
    fn read_into_rejects_short_buffer() {
        let file = FileRef::InMemory(InMemoryFile::new("p".into(), Bytes::from_static(b"abcdef")));
        let mut buf = [0u8; 4];

        let err = file.read_into(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            BundleError::BufferTooSmall {
                needed: 6,
                provided: 4
            }
        ));
    }

    #[test]
    fn disk_ref_reads_at_offset() {
        let (_dir, _slot, file) = disk_ref(b"0123456789", 3, 4);

        assert!(!file.is_cached());
        assert_eq!(file.len(), 4);
        assert_eq!(&file.read_all().unwrap()[..], b"3456");

        let mut buf = [0u8; 8];
        assert_eq!(file.read_into(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"3456");
    }

    #[test]
    fn disk_ref_fails_after_close() {
        let (_dir, slot, file) = disk_ref(b"0123456789", 0, 10);

        assert!(slot.close());
        assert!(!slot.close());
        assert!(!slot.is_open());

        assert!(matches!(file.read_all(), Err(BundleError::HandleClosed)));
        let mut buf = [0u8; 10];
        assert!(matches!(
            file.read_into(&mut buf),
            Err(BundleError::HandleClosed)
        ));
    }

    #[test]
    fn disk_ref_past_end_is_io_error() {
        let (_dir, _slot, file) = disk_ref(b"0123", 2, 8);
        assert!(matches!(file.read_all(), Err(BundleError::Io(_))));
    }
}
