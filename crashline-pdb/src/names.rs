//! The `/names` string table of source file paths.

use std::borrow::Cow;

use crashline_common::Source;

use crate::error::{FormatErrorKind, PdbError};
use crate::info::InfoStream;
use crate::raw::cstr_at;
use crate::streams::StreamTable;

/// Name of the string table stream.
pub const NAMES_STREAM_NAME: &str = "/names";

/// Size of the `/names` header that offsets are relative to.
const NAMES_HEADER_SIZE: usize = 12;

/// The global string table, holding source file names referenced by line programs.
#[derive(Clone, Debug)]
pub struct NameTable {
    data: Vec<u8>,
}

impl NameTable {
    /// Reads the `/names` stream registered in `info`.
    pub fn parse<S: Source>(streams: &StreamTable<S>, info: &InfoStream) -> Result<Self, PdbError> {
        let index = info
            .named_stream(NAMES_STREAM_NAME)
            .ok_or(FormatErrorKind::MissingNamesStream)?;
        let data = streams.stream(index)?.read_all()?;
        Ok(Self { data })
    }

    /// Resolves the string at `offset`, relative to the end of the string table header.
    pub fn resolve(&self, offset: u32) -> Result<Cow<'_, str>, PdbError> {
        let start = NAMES_HEADER_SIZE + offset as usize;
        let name = cstr_at(&self.data, start).ok_or(FormatErrorKind::StringOutOfRange)?;
        Ok(String::from_utf8_lossy(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crashline_testutils::{info_stream, names_stream, MsfBuilder};
    use similar_asserts::assert_eq;

    use crate::msf::BlockStore;

    fn parse(names: &[(&str, u32)], strings: Vec<u8>) -> Result<NameTable, PdbError> {
        let mut builder = MsfBuilder::new(64);
        builder.add_stream(Vec::new());
        builder.add_stream(info_stream(names, &[]));
        builder.add_stream(strings);
        let streams = StreamTable::open(BlockStore::open(builder.build()).unwrap()).unwrap();
        let info = InfoStream::parse(&streams)?;
        NameTable::parse(&streams, &info)
    }

    #[test]
    fn test_resolve() {
        let (data, offsets) = names_stream(&["", "src\\main.cpp", "a.c"]);
        let table = parse(&[("/names", 2)], data).unwrap();
        assert_eq!(table.resolve(offsets[1]).unwrap(), "src\\main.cpp");
        assert_eq!(table.resolve(offsets[2]).unwrap(), "a.c");
        assert_eq!(table.resolve(offsets[0]).unwrap(), "");
    }

    #[test]
    fn test_missing_names() {
        let err = parse(&[("/LinkInfo", 2)], Vec::new()).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::MissingNamesStream));
    }

    #[test]
    fn test_unterminated() {
        let (mut data, offsets) = names_stream(&["a.c"]);
        let len = data.len();
        data.truncate(len - 1);
        let table = parse(&[("/names", 2)], data).unwrap();
        let err = table.resolve(offsets[0]).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::StringOutOfRange));
        let err = table.resolve(1000).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::StringOutOfRange));
    }
}
