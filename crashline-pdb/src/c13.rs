//! The C13 line program of a module.

use scroll::ctx::TryFromCtx;
use scroll::{Endian, Pread, LE};

use crashline_common::Source;

use crate::dbi::ModuleInfo;
use crate::error::{FormatError, FormatErrorKind, PdbError};
use crate::index::{Duplicates, Fragment, IntervalIndex};
use crate::raw::{self, LineBlockHeader, LineRecord, LinesHeader, SubsectionHeader};
use crate::streams::StreamTable;

/// A range of code attributed to a range of source lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineEntry {
    /// The start of the code range, relative to the code section.
    pub offset: u32,
    /// The length of the code range.
    pub size: u32,
    /// The first source line.
    pub start: u32,
    /// The exclusive last source line.
    pub end: u32,
}

impl Fragment for LineEntry {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn size(&self) -> u32 {
        self.size
    }
}

/// The line table of one function, all in a single source file.
#[derive(Clone, Debug)]
pub struct LineFragment {
    /// The start of the function, relative to the code section.
    pub offset: u32,
    /// The length of the function.
    pub size: u32,
    /// Offset of the file's entry in the module checksum table.
    pub name_index: u32,
    /// Offset of the file name in the `/names` string table.
    pub string_offset: u32,
    lines: IntervalIndex<LineEntry>,
}

impl LineFragment {
    /// Returns the line entry covering `addr`.
    pub fn line_at(&self, addr: u32) -> Option<&LineEntry> {
        self.lines.query(addr)
    }

    /// All line entries in ascending address order.
    pub fn lines(&self) -> &[LineEntry] {
        self.lines.fragments()
    }
}

impl Fragment for LineFragment {
    fn offset(&self) -> u32 {
        self.offset
    }

    fn size(&self) -> u32 {
        self.size
    }
}

/// The decoded line program of a module.
///
/// Modules without a symbol stream have no line program and never resolve any address.
#[derive(Clone, Debug, Default)]
pub struct ModuleLines {
    fragments: IntervalIndex<LineFragment>,
}

fn pread<'a, T>(data: &'a [u8], offset: usize) -> Result<T, FormatError>
where
    T: TryFromCtx<'a, Endian, Error = scroll::Error>,
{
    data.pread_with(offset, LE)
        .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))
}

impl ModuleLines {
    /// Reads the line program of `module` from its symbol stream.
    #[tracing::instrument(level = "trace", skip_all, fields(module = %module.name))]
    pub fn parse<S: Source>(
        streams: &StreamTable<S>,
        module: &ModuleInfo,
    ) -> Result<Self, PdbError> {
        let Some(index) = module.symbol_stream.filter(|_| module.c13_size > 0) else {
            return Ok(Self::default());
        };

        let start = module.symbols_size;
        let end = start
            .checked_add(module.c13_size)
            .ok_or(FormatErrorKind::InvalidRange)?;
        let data = streams.read_stream(index, start, end)?;

        let lines = Self::parse_c13(&data)?;
        tracing::debug!(fragments = lines.fragments.len(), "loaded module line program");
        Ok(lines)
    }

    /// Decodes a sequence of C13 subsections.
    pub fn parse_c13(data: &[u8]) -> Result<Self, FormatError> {
        let mut fragments = Vec::new();
        let mut checksums: Option<&[u8]> = None;
        let mut cursor = 0;

        while cursor < data.len() {
            if cursor + raw::SUBSECTION_HEADER_SIZE > data.len() {
                return Err(FormatErrorKind::Truncated.into());
            }
            let header: SubsectionHeader = pread(data, cursor)?;
            cursor += raw::SUBSECTION_HEADER_SIZE;

            let end = cursor
                .checked_add(header.len as usize)
                .filter(|&end| end <= data.len())
                .ok_or(FormatErrorKind::Truncated)?;
            let body = &data[cursor..end];

            match header.kind {
                raw::DEBUG_S_LINES => {
                    if let Some(fragment) = parse_lines(data, cursor)? {
                        fragments.push(fragment);
                    }
                }
                raw::DEBUG_S_FILECHKSMS => {
                    if checksums.replace(body).is_some() {
                        return Err(FormatErrorKind::CorruptLineProgram.into());
                    }
                }
                _ => {}
            }

            cursor = end;
        }

        let checksums = checksums.ok_or(FormatErrorKind::MissingChecksumTable)?;
        for fragment in &mut fragments {
            let name_index = fragment.name_index as usize;
            if name_index + 6 >= checksums.len() {
                return Err(FormatErrorKind::CorruptLineProgram.into());
            }
            fragment.string_offset = pread(checksums, name_index)?;
        }

        // Functions emitted into several sections (e.g. COMDAT folding) repeat the same range.
        let fragments = IntervalIndex::build(fragments, Duplicates::Collapse)?;
        Ok(Self { fragments })
    }

    /// Returns the function fragment and line entry covering `addr`.
    pub fn lookup(&self, addr: u32) -> Option<(&LineFragment, &LineEntry)> {
        let fragment = self.fragments.query(addr)?;
        let line = fragment.line_at(addr)?;
        Some((fragment, line))
    }

    /// All function fragments in ascending address order.
    pub fn fragments(&self) -> &[LineFragment] {
        self.fragments.fragments()
    }
}

/// Decodes the `DEBUG_S_LINES` subsection starting at `cursor`.
///
/// Returns `None` for line programs outside of the code section.
fn parse_lines(data: &[u8], cursor: usize) -> Result<Option<LineFragment>, FormatError> {
    let header: LinesHeader = pread(data, cursor)?;
    let block_start = cursor + raw::LINES_HEADER_SIZE;
    let block: LineBlockHeader = pread(data, block_start)?;

    let mut position = block_start + raw::LINE_BLOCK_HEADER_SIZE;
    let mut lines = Vec::with_capacity(block.num_lines.min(4096) as usize);
    for _ in 0..block.num_lines {
        let record: LineRecord = pread(data, position)?;
        position += raw::LINE_RECORD_SIZE;
        lines.push(LineEntry {
            offset: header
                .offset
                .checked_add(record.offset)
                .ok_or(FormatErrorKind::CorruptLineProgram)?,
            size: 0,
            start: record.line_start(),
            end: record.line_end(),
        });
    }

    if header.flags & raw::CV_LINES_HAVE_COLUMNS != 0 {
        position += block.num_lines as usize * raw::COLUMN_RECORD_SIZE;
    }
    if position as u64 != block_start as u64 + u64::from(block.block_size) {
        return Err(FormatErrorKind::CorruptLineProgram.into());
    }

    if header.segment != raw::TEXT_SECTION {
        return Ok(None);
    }

    // each line extends to the next one, the last one to the end of the function
    let function_end = u64::from(header.offset) + u64::from(header.size);
    let mut next_offset = function_end;
    for line in lines.iter_mut().rev() {
        let size = next_offset
            .checked_sub(u64::from(line.offset))
            .and_then(|size| u32::try_from(size).ok())
            .ok_or(FormatErrorKind::CorruptLineProgram)?;
        line.size = size;
        next_offset = u64::from(line.offset);
    }

    Ok(Some(LineFragment {
        offset: header.offset,
        size: header.size,
        name_index: block.name_index,
        string_offset: 0,
        lines: IntervalIndex::build(lines, Duplicates::Reject)?,
    }))
}
