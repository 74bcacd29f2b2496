use crate::streams::{push_u16, push_u32};

/// One line record of a [`LineBlock`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Line {
    /// The code offset relative to the start of the block.
    pub offset: u32,
    /// The first source line.
    pub line: u32,
    /// The distance to the last source line of the statement.
    pub delta: u8,
}

/// A `DEBUG_S_LINES` subsection with a single file block.
#[derive(Clone, Debug, Default)]
pub struct LineBlock {
    /// The start of the covered code.
    pub offset: u32,
    /// The length of the covered code.
    pub size: u32,
    /// The section of the covered code.
    pub segment: u16,
    /// The offset of the file entry in the checksum table.
    pub file: u32,
    /// Whether column records follow the line records.
    pub columns: bool,
    /// The line records.
    pub lines: Vec<Line>,
}

/// Size of one entry written by [`c13_lines`] into the checksum table.
pub const CHECKSUM_ENTRY_SIZE: u32 = 8;

/// Writes a C13 line program.
///
/// Each block becomes one lines subsection. If `file_names` is not empty, a checksum subsection
/// follows with one [`CHECKSUM_ENTRY_SIZE`] byte entry per string table offset.
pub fn c13_lines(blocks: &[LineBlock], file_names: &[u32]) -> Vec<u8> {
    let mut data = Vec::new();

    for block in blocks {
        let record_size = if block.columns { 12 } else { 8 };
        let block_size = 12 + block.lines.len() as u32 * record_size;

        push_u32(&mut data, 0xF2);
        push_u32(&mut data, 12 + block_size);

        push_u32(&mut data, block.offset);
        push_u16(&mut data, block.segment);
        push_u16(&mut data, u16::from(block.columns));
        push_u32(&mut data, block.size);

        push_u32(&mut data, block.file);
        push_u32(&mut data, block.lines.len() as u32);
        push_u32(&mut data, block_size);
        for line in &block.lines {
            push_u32(&mut data, line.offset);
            // statement flag, delta and line number
            push_u32(
                &mut data,
                0x8000_0000 | (u32::from(line.delta & 0x7F) << 24) | line.line,
            );
        }
        if block.columns {
            for _ in &block.lines {
                push_u32(&mut data, 0);
            }
        }
    }

    if !file_names.is_empty() {
        push_u32(&mut data, 0xF4);
        push_u32(&mut data, file_names.len() as u32 * CHECKSUM_ENTRY_SIZE);
        for offset in file_names {
            push_u32(&mut data, *offset);
            // no checksum bytes, checksum kind none, padding
            data.extend_from_slice(&[0, 0, 0, 0]);
        }
    }

    data
}
