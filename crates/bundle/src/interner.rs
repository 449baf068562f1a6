use std::collections::HashMap;

use crate::error::{BundleError, Result};
use crate::format::StringRef;

/// Write-side string table.
///
/// Each distinct value is appended to the blob once; repeated values get the
/// cached [`StringRef`] back.
#[derive(Debug, Default)]
pub struct StringInterner {
    blob: Vec<u8>,
    refs: HashMap<String, StringRef>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ref for `value`, appending it to the blob on first use.
    ///
    /// The empty string maps to [`StringRef::NULL`] and is never stored.
    /// Manifest fields that are absent deserialize to the empty string, so
    /// they take the same path.
    pub fn intern(&mut self, value: &str) -> Result<StringRef> {
        if value.is_empty() {
            return Ok(StringRef::NULL);
        }
        if let Some(r) = self.refs.get(value) {
            return Ok(*r);
        }

        let end = self.blob.len() as u64 + value.len() as u64;
        if end > i32::MAX as u64 {
            return Err(BundleError::Limit {
                what: "string blob size",
                value: end,
                max: i32::MAX as u64,
            });
        }

        let r = StringRef {
            offset: self.blob.len() as i32,
            length: value.len() as i32,
        };
        self.blob.extend_from_slice(value.as_bytes());
        self.refs.insert(value.to_owned(), r);
        Ok(r)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    /// Size of the blob in bytes.
    pub fn len(&self) -> usize {
        self.blob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }
}
