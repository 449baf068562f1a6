//! # Bundle — packed asset archives
//!
//! Packs the assets of one or more [`manifest`] files into a single binary
//! bundle, and opens that bundle again to read each asset's files.
//!
//! ## File layout (v1)
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ HEADER (28 bytes)                                          │
//! │ magic "aita" | version | string_size | asset_count |       │
//! │ dependencies_count | file_entries_count | file_size  (i32) │
//! ├────────────────────────────────────────────────────────────┤
//! │ STRINGS (string_size bytes of UTF-8, deduplicated)         │
//! ├────────────────────────────────────────────────────────────┤
//! │ ASSET ENTRIES      id | deps (u8) | files (u8) | flags (u8)│
//! ├────────────────────────────────────────────────────────────┤
//! │ DEPENDENCY ENTRIES id | name                               │
//! ├────────────────────────────────────────────────────────────┤
//! │ FILE ENTRIES       name | offset (i32) | length (i32)      │
//! ├────────────────────────────────────────────────────────────┤
//! │ FILE BYTES (file_size bytes)                               │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Strings are referenced by `(offset, length)` pairs. No section offsets are
//! stored: each section starts where the previous one ends. An asset owns
//! the next `deps` dependency entries and the next `files` file entries, so
//! the tables are consumed front to back in asset order.
//!
//! All integers are little-endian; see [`format`] for the exact records.
//!
//! ## Reading
//!
//! [`BundleReader::open`] either preloads every file into one shared buffer
//! or keeps the bundle file open and reads each file on demand. Both hand
//! out [`FileRef`]s with the same read API.

pub mod container;
mod error;
pub mod file_ref;
pub mod format;
mod interner;
mod reader;
mod writer;

pub use container::{Asset, Bundle, Dependency};
pub use error::{BundleError, Result};
pub use file_ref::FileRef;
pub use format::{AssetFlags, BUNDLE_MAGIC, BUNDLE_VERSION};
pub use interner::StringInterner;
pub use reader::BundleReader;
pub use writer::{BundleWriter, WriteSummary};
