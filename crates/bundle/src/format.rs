//! Bundle binary layout: constants, record shapes and their byte encoding.
//!
//! Every integer is little-endian and every record has a fixed size, so a
//! reader can find each section by summing the sizes declared in the header:
//!
//! ```text
//! Header           28 bytes
//! Strings          string_size bytes of UTF-8
//! AssetEntry       12 bytes * asset_count
//! DependencyEntry  16 bytes * dependencies_count
//! FileEntry        16 bytes * file_entries_count
//! File bytes       file_size bytes
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result as IoResult, Write};

use crate::error::{format_err, BundleError, Result};

/// `'a' 'i' 't' 'a'` packed most significant byte first.
pub const BUNDLE_MAGIC: i32 =
    ((b'a' as i32) << 24) | ((b'i' as i32) << 16) | ((b't' as i32) << 8) | (b'a' as i32);

/// Layout version written by this crate. Any other value is rejected on open.
pub const BUNDLE_VERSION: i32 = 1;

/// Seven `i32` fields: magic, version, then five section sizes and counts.
pub const HEADER_BYTES: u64 = 7 * 4;
/// `i32` offset + `i32` byte length into the strings blob.
pub const STRING_REF_BYTES: u64 = 4 + 4;
/// StringRef + three u8 fields + one reserved byte.
pub const ASSET_ENTRY_BYTES: u64 = STRING_REF_BYTES + 4;
/// Identifier ref + display name ref.
pub const DEPENDENCY_ENTRY_BYTES: u64 = 2 * STRING_REF_BYTES;
/// Name ref + `i32` offset into the file bytes + `i32` length.
pub const FILE_ENTRY_BYTES: u64 = STRING_REF_BYTES + 4 + 4;

/// Per-asset bit flags stored in [`AssetEntry::flags`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AssetFlags(u8);

impl AssetFlags {
    pub const NONE: AssetFlags = AssetFlags(0);
    pub const PRELOAD: AssetFlags = AssetFlags(0x01);
    pub const STATIC: AssetFlags = AssetFlags(0x02);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: AssetFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_preload(self) -> bool {
        self.contains(Self::PRELOAD)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }
}

impl std::ops::BitOr for AssetFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for AssetFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// `(offset, length)` of a UTF-8 string inside the strings blob.
///
/// `length` counts bytes. The all-zero ref is the empty string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StringRef {
    pub offset: i32,
    pub length: i32,
}

impl StringRef {
    pub const NULL: StringRef = StringRef {
        offset: 0,
        length: 0,
    };

    pub fn is_null(&self) -> bool {
        self.length == 0
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        w.write_i32::<LittleEndian>(self.offset)?;
        w.write_i32::<LittleEndian>(self.length)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> IoResult<Self> {
        let offset = r.read_i32::<LittleEndian>()?;
        let length = r.read_i32::<LittleEndian>()?;
        Ok(Self { offset, length })
    }

    /// Resolves this ref against `strings` into an owned value.
    ///
    /// Zero-length refs resolve to `""` without looking at the blob.
    pub fn resolve(&self, strings: &[u8]) -> Result<String> {
        if self.length == 0 {
            return Ok(String::new());
        }
        if self.offset < 0 || self.length < 0 {
            return Err(format_err(format!("negative string ref {:?}", self)));
        }
        let start = self.offset as usize;
        let end = start + self.length as usize;
        let bytes = strings.get(start..end).ok_or_else(|| {
            format_err(format!(
                "string ref {}..{} outside strings blob of {} bytes",
                start,
                end,
                strings.len()
            ))
        })?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| format_err(format!("string ref {}..{} is not valid UTF-8", start, end)))
    }
}

/// Fixed-size file header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub magic: i32,
    pub version: i32,
    pub string_size: i32,
    pub asset_count: i32,
    pub dependencies_count: i32,
    pub file_entries_count: i32,
    pub file_size: i32,
}

impl Header {
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        w.write_i32::<LittleEndian>(self.magic)?;
        w.write_i32::<LittleEndian>(self.version)?;
        w.write_i32::<LittleEndian>(self.string_size)?;
        w.write_i32::<LittleEndian>(self.asset_count)?;
        w.write_i32::<LittleEndian>(self.dependencies_count)?;
        w.write_i32::<LittleEndian>(self.file_entries_count)?;
        w.write_i32::<LittleEndian>(self.file_size)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> IoResult<Self> {
        Ok(Self {
            magic: r.read_i32::<LittleEndian>()?,
            version: r.read_i32::<LittleEndian>()?,
            string_size: r.read_i32::<LittleEndian>()?,
            asset_count: r.read_i32::<LittleEndian>()?,
            dependencies_count: r.read_i32::<LittleEndian>()?,
            file_entries_count: r.read_i32::<LittleEndian>()?,
            file_size: r.read_i32::<LittleEndian>()?,
        })
    }

    /// Checks magic and version, then that no size or count is negative.
    pub fn validate(&self) -> Result<()> {
        if self.magic != BUNDLE_MAGIC || self.version != BUNDLE_VERSION {
            return Err(format_err(format!(
                "not a bundle file: expected version {} got {}, expected magic {:#010x} got {:#010x}",
                BUNDLE_VERSION, self.version, BUNDLE_MAGIC, self.magic
            )));
        }

        let fields = [
            ("string size", self.string_size),
            ("asset count", self.asset_count),
            ("dependency count", self.dependencies_count),
            ("file entry count", self.file_entries_count),
            ("file size", self.file_size),
        ];
        for (what, value) in fields {
            if value < 0 {
                return Err(format_err(format!("negative {} in header: {}", what, value)));
            }
        }
        Ok(())
    }

    /// Size of the strings blob plus the three entry tables.
    ///
    /// Only meaningful after [`validate`](Header::validate) succeeded.
    pub fn manifest_len(&self) -> u64 {
        self.string_size as u64
            + self.asset_count as u64 * ASSET_ENTRY_BYTES
            + self.dependencies_count as u64 * DEPENDENCY_ENTRY_BYTES
            + self.file_entries_count as u64 * FILE_ENTRY_BYTES
    }

    /// Byte offset where the raw file bytes start.
    pub fn files_start(&self) -> u64 {
        HEADER_BYTES + self.manifest_len()
    }

    /// Exact length of a bundle file carrying this header.
    pub fn total_len(&self) -> u64 {
        self.files_start() + self.file_size as u64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetEntry {
    pub id: StringRef,
    pub dependencies_count: u8,
    pub files_count: u8,
    pub flags: AssetFlags,
}

impl AssetEntry {
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        self.id.write_to(w)?;
        w.write_u8(self.dependencies_count)?;
        w.write_u8(self.files_count)?;
        w.write_u8(self.flags.bits())?;
        w.write_u8(0)?; // reserved
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> IoResult<Self> {
        let id = StringRef::read_from(r)?;
        let dependencies_count = r.read_u8()?;
        let files_count = r.read_u8()?;
        let flags = AssetFlags::from_bits(r.read_u8()?);
        let _reserved = r.read_u8()?;
        Ok(Self {
            id,
            dependencies_count,
            files_count,
            flags,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyEntry {
    pub id: StringRef,
    pub name: StringRef,
}

impl DependencyEntry {
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        self.id.write_to(w)?;
        self.name.write_to(w)
    }

    pub fn read_from<R: Read>(r: &mut R) -> IoResult<Self> {
        let id = StringRef::read_from(r)?;
        let name = StringRef::read_from(r)?;
        Ok(Self { id, name })
    }
}

/// Location of one file inside the raw file bytes section.
///
/// `offset` is relative to the start of that section, not to the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileEntry {
    pub name: StringRef,
    pub offset: i32,
    pub length: i32,
}

impl FileEntry {
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        self.name.write_to(w)?;
        w.write_i32::<LittleEndian>(self.offset)?;
        w.write_i32::<LittleEndian>(self.length)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> IoResult<Self> {
        let name = StringRef::read_from(r)?;
        let offset = r.read_i32::<LittleEndian>()?;
        let length = r.read_i32::<LittleEndian>()?;
        Ok(Self {
            name,
            offset,
            length,
        })
    }

    /// Checks that the entry lies inside a file section of `file_size` bytes.
    pub fn check_bounds(&self, file_size: i32) -> Result<()> {
        let end = self.offset as i64 + self.length as i64;
        if self.offset < 0 || self.length < 0 || end > file_size as i64 {
            return Err(BundleError::Format(format!(
                "file entry {}..{} outside file section of {} bytes",
                self.offset, end, file_size
            )));
        }
        Ok(())
    }
}
