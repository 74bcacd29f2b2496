//! The serialized hash table shared by several PDB streams.
//!
//! The on-disk layout is:
//!
//! ```text
//! size: u32                      number of live entries
//! capacity: u32
//! present_words: u32             followed by that many bitset words
//! deleted_words: u32             followed by that many bitset words
//! entries: [(key: u32, value: [u8; V]); size]
//! ```
//!
//! Only the live entries are serialized, so the bitsets are consumed but not needed to decode
//! the mapping.

use std::collections::HashMap;

use scroll::{Pread, LE};

use crashline_common::Source;

use crate::error::{FormatError, FormatErrorKind, PdbError};
use crate::streams::Stream;

const HEADER_SIZE: u32 = 12;

/// A decoded hash table, mapping `u32` keys to fixed-width values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashTable {
    entries: HashMap<u32, Vec<u8>>,
}

fn truncated(e: scroll::Error) -> FormatError {
    FormatError::new(FormatErrorKind::Truncated, e)
}

impl HashTable {
    /// Decodes a hash table with `value_size` byte values from `stream` at `offset`.
    ///
    /// Returns the table and the stream offset right after it.
    pub fn parse<S: Source>(
        stream: &Stream<'_, S>,
        offset: u32,
        value_size: u32,
    ) -> Result<(Self, u32), PdbError> {
        let kind = FormatErrorKind::Truncated;

        let header = stream.read_checked(offset, HEADER_SIZE.into(), kind)?;
        let size: u32 = header.pread_with(0, LE).map_err(truncated)?;
        let present_words: u32 = header.pread_with(8, LE).map_err(truncated)?;
        let mut cursor = u64::from(offset) + u64::from(HEADER_SIZE);

        // The present words are followed by the deleted word count.
        let present_len = u64::from(present_words) * 4;
        let present = stream.read_checked(to_offset(cursor)?, present_len + 4, kind)?;
        let deleted_words: u32 = present
            .pread_with(present_len as usize, LE)
            .map_err(truncated)?;
        cursor += present_len + 4;

        let deleted_len = u64::from(deleted_words) * 4;
        stream.read_checked(to_offset(cursor)?, deleted_len, kind)?;
        cursor += deleted_len;

        let entry_size = u64::from(value_size) + 4;
        let entries_len = u64::from(size) * entry_size;
        let data = stream.read_checked(to_offset(cursor)?, entries_len, kind)?;
        cursor += entries_len;

        let entries = data
            .chunks_exact(entry_size as usize)
            .map(|entry| {
                let key: u32 = entry.pread_with(0, LE)?;
                Ok((key, entry[4..].to_vec()))
            })
            .collect::<Result<HashMap<_, _>, scroll::Error>>()
            .map_err(truncated)?;

        Ok((Self { entries }, to_offset(cursor)?))
    }

    /// Returns the raw value stored for `key`.
    pub fn get(&self, key: u32) -> Option<&[u8]> {
        self.entries.get(&key).map(Vec::as_slice)
    }

    /// Iterates over all entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.entries.iter().map(|(key, value)| (*key, value.as_slice()))
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn to_offset(cursor: u64) -> Result<u32, FormatError> {
    u32::try_from(cursor).map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))
}
