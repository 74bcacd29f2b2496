//! The debug info (DBI) stream: compilation units and their code ranges.

use scroll::{Pread, LE};

use crashline_common::Source;

use crate::error::{FormatError, FormatErrorKind, PdbError};
use crate::index::{Duplicates, Fragment, IntervalIndex};
use crate::raw::{self, cstr_at, DbiHeader, ModuleHeader, SectionContribution};
use crate::streams::StreamTable;

/// A compilation unit contributing to the linked binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    /// The stream holding the module's symbols and line program, if any.
    pub symbol_stream: Option<u32>,
    /// Byte size of the symbol records at the start of the symbol stream.
    pub symbols_size: u32,
    /// Byte size of the C13 line program following the symbol records.
    pub c13_size: u32,
    /// The module name, usually the object file path.
    pub name: String,
    /// The name of the object file or library the module was linked from.
    pub object_file_name: String,
}

/// A range of the code section attributed to one module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModuleRange {
    /// The start of the range, relative to the code section.
    pub offset: u32,
    /// The length of the range.
    pub size: u32,
    /// The module this range belongs to.
    pub module_index: usize,
}

impl Fragment for ModuleRange {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn size(&self) -> u32 {
        self.size
    }
}

/// The decoded DBI stream.
#[derive(Clone, Debug)]
pub struct DebugInfo {
    global_symbols: u32,
    public_symbols: u32,
    symbol_records: u32,
    modules: Vec<ModuleInfo>,
    ranges: IntervalIndex<ModuleRange>,
}

fn non_negative(value: i32) -> Result<u32, FormatError> {
    u32::try_from(value).map_err(|e| FormatError::new(FormatErrorKind::InvalidSize, e))
}

impl DebugInfo {
    /// Decodes the DBI stream of `streams`.
    pub fn parse<S: Source>(streams: &StreamTable<S>) -> Result<Self, PdbError> {
        let stream = streams.stream(raw::DBI_STREAM)?;

        let header_data =
            stream.read_checked(0, raw::DBI_HEADER_SIZE.into(), FormatErrorKind::Truncated)?;
        let header: DbiHeader = header_data
            .pread_with(0, LE)
            .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;

        if header.version != raw::DBI_VERSION
            || header.build_number & raw::DBI_NEW_VERSION_FORMAT == 0
        {
            return Err(FormatErrorKind::UnsupportedVersion.into());
        }

        let modules_size = non_negative(header.module_info_size)?;
        let contributions_size = non_negative(header.section_contribution_size)?;

        let data = stream.read_checked(
            raw::DBI_HEADER_SIZE,
            u64::from(modules_size) + u64::from(contributions_size),
            FormatErrorKind::Truncated,
        )?;
        let (module_data, contribution_data) = data.split_at(modules_size as usize);

        let modules = parse_modules(module_data)?;
        let ranges = parse_section_contributions(contribution_data)?;

        tracing::debug!(
            modules = modules.len(),
            ranges = ranges.len(),
            "read debug info stream"
        );

        Ok(Self {
            global_symbols: header.global_stream.into(),
            public_symbols: header.public_stream.into(),
            symbol_records: header.symrec_stream.into(),
            modules,
            ranges,
        })
    }

    /// The stream index of the global symbol index.
    pub fn global_symbols_stream(&self) -> u32 {
        self.global_symbols
    }

    /// The stream index of the public symbol index.
    pub fn public_symbols_stream(&self) -> u32 {
        self.public_symbols
    }

    /// The stream index of the symbol records referenced by both symbol indices.
    pub fn symbol_records_stream(&self) -> u32 {
        self.symbol_records
    }

    /// All modules, indexed by module index.
    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    /// Returns the module with the given index.
    pub fn module(&self, index: usize) -> Result<&ModuleInfo, FormatError> {
        self.modules
            .get(index)
            .ok_or_else(|| FormatErrorKind::ModuleOutOfRange.into())
    }

    /// Returns the index of the module whose code contains the code section offset `addr`.
    pub fn module_index_for(&self, addr: u32) -> Option<usize> {
        self.ranges.query(addr).map(|range| range.module_index)
    }

    /// The code ranges of all modules in ascending order.
    pub fn module_ranges(&self) -> &[ModuleRange] {
        self.ranges.fragments()
    }
}

fn parse_modules(data: &[u8]) -> Result<Vec<ModuleInfo>, FormatError> {
    let mut modules = Vec::new();
    let mut cursor = 0;

    while cursor < data.len() {
        if cursor + raw::MODULE_HEADER_SIZE > data.len() {
            return Err(FormatErrorKind::Truncated.into());
        }
        let header: ModuleHeader = data
            .pread_with(cursor, LE)
            .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;
        if header.c11_size != 0 {
            return Err(FormatErrorKind::UnsupportedC11LineInfo.into());
        }
        cursor += raw::MODULE_HEADER_SIZE;

        let name = cstr_at(data, cursor).ok_or(FormatErrorKind::StringOutOfRange)?;
        cursor += name.len() + 1;
        let object_file_name = cstr_at(data, cursor).ok_or(FormatErrorKind::StringOutOfRange)?;
        cursor += object_file_name.len() + 1;

        // records are aligned to 4 bytes
        cursor = (cursor + 3) & !3;

        modules.push(ModuleInfo {
            symbol_stream: (header.stream != raw::NO_STREAM).then_some(header.stream.into()),
            symbols_size: header.symbols_size,
            c13_size: header.c13_size,
            name: String::from_utf8_lossy(name).into_owned(),
            object_file_name: String::from_utf8_lossy(object_file_name).into_owned(),
        });
    }

    Ok(modules)
}

fn parse_section_contributions(data: &[u8]) -> Result<IntervalIndex<ModuleRange>, FormatError> {
    let version: u32 = data
        .pread_with(0, LE)
        .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;
    if version != raw::SECTION_CONTRIB_VERSION {
        return Err(FormatErrorKind::UnsupportedVersion.into());
    }

    let mut ranges = Vec::new();
    let mut cursor = 4;
    while cursor < data.len() {
        if cursor + raw::SECTION_CONTRIB_SIZE > data.len() {
            return Err(FormatErrorKind::Truncated.into());
        }
        let contribution: SectionContribution = data
            .pread_with(cursor, LE)
            .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;
        cursor += raw::SECTION_CONTRIB_SIZE;

        if contribution.section != raw::TEXT_SECTION {
            continue;
        }
        ranges.push(ModuleRange {
            offset: non_negative(contribution.offset)?,
            size: non_negative(contribution.size)?,
            module_index: contribution.module.into(),
        });
    }

    IntervalIndex::build(ranges, Duplicates::Reject)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crashline_testutils::{dbi_stream, DbiModule, MsfBuilder, SectionContrib};
    use similar_asserts::assert_eq;

    use crate::msf::BlockStore;

    fn parse(dbi: Vec<u8>) -> Result<DebugInfo, PdbError> {
        let mut builder = MsfBuilder::new(64);
        for _ in 0..3 {
            builder.add_stream(Vec::new());
        }
        builder.add_stream(dbi);
        let streams = StreamTable::open(BlockStore::open(builder.build()).unwrap()).unwrap();
        DebugInfo::parse(&streams)
    }

    fn modules() -> Vec<DbiModule> {
        vec![
            DbiModule {
                stream: Some(10),
                symbols_size: 0x40,
                c13_size: 0x80,
                name: "main.obj".into(),
                object_file_name: "main.obj".into(),
            },
            DbiModule {
                stream: None,
                symbols_size: 0,
                c13_size: 0,
                name: "* Linker *".into(),
                object_file_name: String::new(),
            },
            DbiModule {
                stream: Some(11),
                symbols_size: 4,
                c13_size: 0,
                name: "lua.obj".into(),
                object_file_name: "lua.lib".into(),
            },
        ]
    }

    fn contrib(section: u16, offset: i32, size: i32, module: u16) -> SectionContrib {
        SectionContrib {
            section,
            offset,
            size,
            module,
        }
    }

    #[test]
    fn test_parse() {
        let dbi = dbi_stream(
            (4, 5, 6),
            &modules(),
            &[
                contrib(1, 0x100, 0x50, 2),
                contrib(2, 0x0, 0x1000, 1),
                contrib(1, 0x0, 0x100, 0),
            ],
        );
        let dbi = parse(dbi).unwrap();

        assert_eq!(dbi.global_symbols_stream(), 4);
        assert_eq!(dbi.public_symbols_stream(), 5);
        assert_eq!(dbi.symbol_records_stream(), 6);

        assert_eq!(dbi.modules().len(), 3);
        assert_eq!(dbi.modules()[0].symbol_stream, Some(10));
        assert_eq!(dbi.modules()[0].c13_size, 0x80);
        assert_eq!(dbi.modules()[1].symbol_stream, None);
        assert_eq!(dbi.modules()[1].name, "* Linker *");
        assert_eq!(dbi.modules()[2].object_file_name, "lua.lib");

        assert_eq!(dbi.module_index_for(0x0), Some(0));
        assert_eq!(dbi.module_index_for(0xff), Some(0));
        assert_eq!(dbi.module_index_for(0x100), Some(2));
        assert_eq!(dbi.module_index_for(0x150), None);
        assert_eq!(dbi.module_ranges().len(), 2);

        assert!(dbi.module(2).is_ok());
        assert_eq!(
            dbi.module(3).unwrap_err().kind(),
            FormatErrorKind::ModuleOutOfRange
        );
    }

    #[test]
    fn test_unsupported_version() {
        let mut data = dbi_stream((4, 5, 6), &modules(), &[]);
        data[4..8].copy_from_slice(&19970606u32.to_le_bytes());
        let err = parse(data).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::UnsupportedVersion));
    }

    #[test]
    fn test_old_version_format() {
        let mut data = dbi_stream((4, 5, 6), &modules(), &[]);
        data[14..16].copy_from_slice(&0x0e00u16.to_le_bytes());
        let err = parse(data).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::UnsupportedVersion));
    }

    #[test]
    fn test_c11_lines() {
        let mut data = dbi_stream((4, 5, 6), &modules(), &[]);
        // C11 byte size of the first module
        data[64 + 40..64 + 44].copy_from_slice(&8u32.to_le_bytes());
        let err = parse(data).unwrap_err();
        assert_eq!(
            err.format_kind(),
            Some(FormatErrorKind::UnsupportedC11LineInfo)
        );
    }

    #[test]
    fn test_overlapping_contributions() {
        let dbi = dbi_stream(
            (4, 5, 6),
            &modules(),
            &[contrib(1, 0x0, 0x100, 0), contrib(1, 0x80, 0x100, 2)],
        );
        let err = parse(dbi).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::OverlappingFragments));
    }

    #[test]
    fn test_negative_contribution() {
        let dbi = dbi_stream((4, 5, 6), &modules(), &[contrib(1, -4, 0x100, 0)]);
        let err = parse(dbi).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::InvalidSize));
    }

    #[test]
    fn test_truncated_module() {
        let mut data = dbi_stream((4, 5, 6), &[], &[]);
        // claim a module info block smaller than one record
        data[24..28].copy_from_slice(&32i32.to_le_bytes());
        data.splice(64..64, vec![0; 32]);
        let err = parse(data).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::Truncated));
    }
}
