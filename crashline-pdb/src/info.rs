//! The PDB info stream: named stream directory and feature flags.

use std::collections::HashMap;

use scroll::{Pread, LE};

use crashline_common::Source;

use crate::error::{FormatError, FormatErrorKind, PdbError};
use crate::hash_table::HashTable;
use crate::raw::{self, cstr_at};
use crate::streams::StreamTable;

/// The decoded PDB info stream.
#[derive(Clone, Debug, Default)]
pub struct InfoStream {
    named_streams: HashMap<String, u32>,
    minimal_debug_info: bool,
}

impl InfoStream {
    /// Decodes the info stream of `streams`.
    pub fn parse<S: Source>(streams: &StreamTable<S>) -> Result<Self, PdbError> {
        let stream = streams.stream(raw::INFO_STREAM)?;

        let header = stream.read_checked(0, 12, FormatErrorKind::Truncated)?;
        let version: u32 = header
            .pread_with(0, LE)
            .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;
        if version != raw::PDB_INFO_VERSION {
            return Err(FormatErrorKind::UnsupportedVersion.into());
        }

        let mut cursor = raw::PDB_INFO_NAMES_OFFSET;
        let pool_len: u32 = stream
            .read_checked(cursor, 4, FormatErrorKind::Truncated)?
            .pread_with(0, LE)
            .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;
        cursor += 4;
        let pool = stream.read_checked(cursor, pool_len.into(), FormatErrorKind::Truncated)?;
        cursor += pool_len;

        let (table, cursor) = HashTable::parse(&stream, cursor, 4)?;
        let mut named_streams = HashMap::with_capacity(table.len());
        for (name_offset, value) in table.iter() {
            let name = cstr_at(&pool, name_offset as usize)
                .ok_or(FormatErrorKind::StringOutOfRange)?;
            let index: u32 = value
                .pread_with(0, LE)
                .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;
            named_streams.insert(String::from_utf8_lossy(name).into_owned(), index);
        }

        // Skip the `niMac` field, the remainder is a list of feature codes.
        let features_start = cursor
            .checked_add(4)
            .ok_or(FormatErrorKind::Truncated)?;
        let features = stream.read(features_start, stream.size())?;
        if features.len() % 4 != 0 {
            return Err(FormatErrorKind::UnsupportedFeatureLayout.into());
        }
        let minimal_debug_info = features
            .chunks_exact(4)
            .any(|code| code == raw::FEATURE_MINIMAL_DEBUG_INFO.to_le_bytes());

        tracing::trace!(
            named_streams = named_streams.len(),
            minimal_debug_info,
            "read pdb info stream"
        );

        Ok(Self {
            named_streams,
            minimal_debug_info,
        })
    }

    /// Returns the stream index registered under `name`.
    pub fn named_stream(&self, name: &str) -> Option<u32> {
        self.named_streams.get(name).copied()
    }

    /// Iterates over all named streams.
    pub fn named_streams(&self) -> impl Iterator<Item = (&str, u32)> {
        self.named_streams
            .iter()
            .map(|(name, index)| (name.as_str(), *index))
    }

    /// Whether the PDB was linked with minimal debug info (`/DEBUG:FASTLINK`).
    ///
    /// This changes the number of buckets in the symbol indices.
    pub fn minimal_debug_info(&self) -> bool {
        self.minimal_debug_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crashline_testutils::{info_stream, MsfBuilder};
    use similar_asserts::assert_eq;

    use crate::msf::BlockStore;

    fn parse(info: Vec<u8>) -> Result<InfoStream, PdbError> {
        let mut builder = MsfBuilder::new(64);
        builder.add_stream(Vec::new());
        builder.add_stream(info);
        let streams = StreamTable::open(BlockStore::open(builder.build()).unwrap()).unwrap();
        InfoStream::parse(&streams)
    }

    #[test]
    fn test_named_streams() {
        let info = parse(info_stream(&[("/names", 5), ("/LinkInfo", 4)], &[])).unwrap();
        assert_eq!(info.named_stream("/names"), Some(5));
        assert_eq!(info.named_stream("/LinkInfo"), Some(4));
        assert_eq!(info.named_stream("/src/headerblock"), None);
        assert!(!info.minimal_debug_info());
    }

    #[test]
    fn test_minimal_debug_info() {
        let info = parse(info_stream(&[("/names", 5)], &[20140508, 0x494E_494D])).unwrap();
        assert!(info.minimal_debug_info());
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = info_stream(&[], &[]);
        data[0..4].copy_from_slice(&20000403u32.to_le_bytes());
        let err = parse(data).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::UnsupportedVersion));
    }

    #[test]
    fn test_feature_layout() {
        let mut data = info_stream(&[("/names", 5)], &[20140508]);
        data.push(0);
        let err = parse(data).unwrap_err();
        assert_eq!(
            err.format_kind(),
            Some(FormatErrorKind::UnsupportedFeatureLayout)
        );
    }
}
