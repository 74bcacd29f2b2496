//! Raw on-disk structures of the MSF container and the PDB streams inside it.
//!
//! All multi-byte values are little endian. Structures are decoded with [`scroll`] so that the
//! decoder is independent of the host byte order and never requires aligned input.

use scroll::ctx::TryFromCtx;
use scroll::{Endian, Pread};

/// The signature at the start of every MSF 7.00 ("big MSF") container.
pub const MSF_MAGIC: &[u8; 32] = b"Microsoft C/C++ MSF 7.00\r\n\x1a\x44\x53\x00\x00\x00";

/// The fixed stream index of the PDB info stream.
pub const INFO_STREAM: u32 = 1;
/// The fixed stream index of the debug info (DBI) stream.
pub const DBI_STREAM: u32 = 3;

/// The section holding executable code, the only one addresses are resolved in.
pub const TEXT_SECTION: u16 = 1;

/// `PdbStreamVersion::VC70`, the only supported PDB info stream version.
pub const PDB_INFO_VERSION: u32 = 20000404;
/// Offset of the length-prefixed name pool, after version, signature, age and GUID.
pub const PDB_INFO_NAMES_OFFSET: u32 = 28;
/// Feature code `"MINI"`, set by `/DEBUG:FASTLINK` builds.
pub const FEATURE_MINIMAL_DEBUG_INFO: u32 = 0x494E_494D;

/// `DbiStreamVersion::V70`, the only supported DBI stream version.
pub const DBI_VERSION: u32 = 19990903;
/// Build number flag marking the new DBI version format.
pub const DBI_NEW_VERSION_FORMAT: u16 = 0x8000;
/// Size of the DBI stream header.
pub const DBI_HEADER_SIZE: u32 = 64;
/// Size of the fixed part of a module info record.
pub const MODULE_HEADER_SIZE: usize = 64;
/// Stream index sentinel for modules without a symbol stream.
pub const NO_STREAM: u16 = 0xFFFF;

/// `SectionContrib` substream version 6.0.
pub const SECTION_CONTRIB_VERSION: u32 = 0xF12E_BA2D;
/// Size of one `SectionContrib` record.
pub const SECTION_CONTRIB_SIZE: usize = 28;

/// Signature of a GSI hash header.
pub const GSI_SIGNATURE: u32 = 0xFFFF_FFFF;
/// `GSIHashSCImpv70`, the only supported GSI hash version.
pub const GSI_VERSION: u32 = 0xF12F_091A;
/// Size of the GSI hash header.
pub const GSI_HEADER_SIZE: u32 = 16;
/// Size of the PSI header that precedes the GSI in the public symbol stream.
pub const PSI_HEADER_SIZE: u32 = 28;
/// Size of one serialized hash record.
pub const HASH_RECORD_SIZE: u32 = 8;
/// Size of one hash record in memory, which bucket offsets are expressed in.
pub const HASH_RECORD_MEMORY_SIZE: u32 = 12;
/// Number of hash buckets of a regular symbol index.
pub const NUM_BUCKETS: u32 = 4097;
/// Number of hash buckets of a symbol index with minimal debug info.
pub const NUM_BUCKETS_MINIMAL: u32 = 0x40000;

/// Reference to a global procedure in a module symbol stream.
pub const S_PROCREF: u16 = 0x1125;
/// Global procedure start.
pub const S_GPROC32: u16 = 0x1110;
/// Public symbol.
pub const S_PUB32: u16 = 0x110E;

/// C13 subsection with line numbers.
pub const DEBUG_S_LINES: u32 = 0xF2;
/// C13 subsection with file checksums.
pub const DEBUG_S_FILECHKSMS: u32 = 0xF4;
/// Line block flag indicating column records after the line records.
pub const CV_LINES_HAVE_COLUMNS: u16 = 0x0001;

/// The MSF superblock, following the magic.
#[derive(Clone, Copy, Debug)]
pub struct SuperBlock {
    pub block_size: u32,
    pub _free_block_map: u32,
    pub block_count: u32,
    pub directory_bytes: u32,
    pub _unknown: u32,
    pub directory_addr: u32,
}

/// Size of [`SuperBlock`].
pub const SUPERBLOCK_SIZE: usize = 24;

impl<'a> TryFromCtx<'a, Endian> for SuperBlock {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 0;
        let data = Self {
            block_size: this.gread_with(&mut offset, le)?,
            _free_block_map: this.gread_with(&mut offset, le)?,
            block_count: this.gread_with(&mut offset, le)?,
            directory_bytes: this.gread_with(&mut offset, le)?,
            _unknown: this.gread_with(&mut offset, le)?,
            directory_addr: this.gread_with(&mut offset, le)?,
        };
        Ok((data, offset))
    }
}

/// The leading fields of the DBI stream header.
#[derive(Clone, Copy, Debug)]
pub struct DbiHeader {
    pub _version_signature: i32,
    pub version: u32,
    pub _age: u32,
    pub global_stream: u16,
    pub build_number: u16,
    pub public_stream: u16,
    pub _pdb_dll_version: u16,
    pub symrec_stream: u16,
    pub _pdb_dll_rbld: u16,
    pub module_info_size: i32,
    pub section_contribution_size: i32,
}

impl<'a> TryFromCtx<'a, Endian> for DbiHeader {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 0;
        let data = Self {
            _version_signature: this.gread_with(&mut offset, le)?,
            version: this.gread_with(&mut offset, le)?,
            _age: this.gread_with(&mut offset, le)?,
            global_stream: this.gread_with(&mut offset, le)?,
            build_number: this.gread_with(&mut offset, le)?,
            public_stream: this.gread_with(&mut offset, le)?,
            _pdb_dll_version: this.gread_with(&mut offset, le)?,
            symrec_stream: this.gread_with(&mut offset, le)?,
            _pdb_dll_rbld: this.gread_with(&mut offset, le)?,
            module_info_size: this.gread_with(&mut offset, le)?,
            section_contribution_size: this.gread_with(&mut offset, le)?,
        };
        Ok((data, offset))
    }
}

/// The fields of a module info record this decoder needs.
///
/// The record is [`MODULE_HEADER_SIZE`] bytes, starting with an embedded section contribution.
#[derive(Clone, Copy, Debug)]
pub struct ModuleHeader {
    pub stream: u16,
    pub symbols_size: u32,
    pub c11_size: u32,
    pub c13_size: u32,
}

impl<'a> TryFromCtx<'a, Endian> for ModuleHeader {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 34;
        let data = Self {
            stream: this.gread_with(&mut offset, le)?,
            symbols_size: this.gread_with(&mut offset, le)?,
            c11_size: this.gread_with(&mut offset, le)?,
            c13_size: this.gread_with(&mut offset, le)?,
        };
        // The remaining fields (source file count, offsets) are not needed.
        if this.len() < MODULE_HEADER_SIZE {
            return Err(scroll::Error::TooBig {
                size: MODULE_HEADER_SIZE,
                len: this.len(),
            });
        }
        Ok((data, MODULE_HEADER_SIZE))
    }
}

/// A section contribution record, version 6.0.
#[derive(Clone, Copy, Debug)]
pub struct SectionContribution {
    pub section: u16,
    pub offset: i32,
    pub size: i32,
    pub _characteristics: u32,
    pub module: u16,
}

impl<'a> TryFromCtx<'a, Endian> for SectionContribution {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 0;
        let section = this.gread_with(&mut offset, le)?;
        offset += 2; // padding
        let offset_ = this.gread_with(&mut offset, le)?;
        let size = this.gread_with(&mut offset, le)?;
        let characteristics = this.gread_with(&mut offset, le)?;
        let module = this.gread_with(&mut offset, le)?;
        // padding, data crc, relocation crc
        if this.len() < SECTION_CONTRIB_SIZE {
            return Err(scroll::Error::TooBig {
                size: SECTION_CONTRIB_SIZE,
                len: this.len(),
            });
        }
        let data = Self {
            section,
            offset: offset_,
            size,
            _characteristics: characteristics,
            module,
        };
        Ok((data, SECTION_CONTRIB_SIZE))
    }
}

/// The GSI hash header.
#[derive(Clone, Copy, Debug)]
pub struct GsiHeader {
    pub signature: u32,
    pub version: u32,
    pub hash_records_size: i32,
    pub buckets_size: i32,
}

impl<'a> TryFromCtx<'a, Endian> for GsiHeader {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 0;
        let data = Self {
            signature: this.gread_with(&mut offset, le)?,
            version: this.gread_with(&mut offset, le)?,
            hash_records_size: this.gread_with(&mut offset, le)?,
            buckets_size: this.gread_with(&mut offset, le)?,
        };
        Ok((data, offset))
    }
}

/// Header of a C13 debug subsection.
#[derive(Clone, Copy, Debug)]
pub struct SubsectionHeader {
    pub kind: u32,
    pub len: u32,
}

/// Size of [`SubsectionHeader`].
pub const SUBSECTION_HEADER_SIZE: usize = 8;

impl<'a> TryFromCtx<'a, Endian> for SubsectionHeader {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 0;
        let data = Self {
            kind: this.gread_with(&mut offset, le)?,
            len: this.gread_with(&mut offset, le)?,
        };
        Ok((data, offset))
    }
}

/// Header of a `DEBUG_S_LINES` subsection: the code range it covers.
#[derive(Clone, Copy, Debug)]
pub struct LinesHeader {
    pub offset: u32,
    pub segment: u16,
    pub flags: u16,
    pub size: u32,
}

/// Size of [`LinesHeader`].
pub const LINES_HEADER_SIZE: usize = 12;

impl<'a> TryFromCtx<'a, Endian> for LinesHeader {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 0;
        let data = Self {
            offset: this.gread_with(&mut offset, le)?,
            segment: this.gread_with(&mut offset, le)?,
            flags: this.gread_with(&mut offset, le)?,
            size: this.gread_with(&mut offset, le)?,
        };
        Ok((data, offset))
    }
}

/// Header of a file block within a `DEBUG_S_LINES` subsection.
#[derive(Clone, Copy, Debug)]
pub struct LineBlockHeader {
    pub name_index: u32,
    pub num_lines: u32,
    pub block_size: u32,
}

/// Size of [`LineBlockHeader`].
pub const LINE_BLOCK_HEADER_SIZE: usize = 12;

impl<'a> TryFromCtx<'a, Endian> for LineBlockHeader {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 0;
        let data = Self {
            name_index: this.gread_with(&mut offset, le)?,
            num_lines: this.gread_with(&mut offset, le)?,
            block_size: this.gread_with(&mut offset, le)?,
        };
        Ok((data, offset))
    }
}

/// A packed line number record.
#[derive(Clone, Copy, Debug)]
pub struct LineRecord {
    pub offset: u32,
    pub flags: u32,
}

/// Size of [`LineRecord`].
pub const LINE_RECORD_SIZE: usize = 8;
/// Size of a column record, present when [`CV_LINES_HAVE_COLUMNS`] is set.
pub const COLUMN_RECORD_SIZE: usize = 4;

impl LineRecord {
    /// The first line number of this record.
    pub fn line_start(self) -> u32 {
        self.flags & 0x00FF_FFFF
    }

    /// The exclusive last line number of this record.
    pub fn line_end(self) -> u32 {
        let delta = (self.flags >> 24) & 0x7F;
        self.line_start() + delta + 1
    }
}

impl<'a> TryFromCtx<'a, Endian> for LineRecord {
    type Error = scroll::Error;

    fn try_from_ctx(this: &'a [u8], le: Endian) -> scroll::Result<(Self, usize)> {
        let mut offset = 0;
        let data = Self {
            offset: this.gread_with(&mut offset, le)?,
            flags: this.gread_with(&mut offset, le)?,
        };
        Ok((data, offset))
    }
}

/// Returns the bytes of the NUL-terminated string at `offset`, without the terminator.
///
/// Returns `None` if `offset` is out of bounds or the string is not terminated.
pub fn cstr_at(data: &[u8], offset: usize) -> Option<&[u8]> {
    let rest = data.get(offset..)?;
    let len = rest.iter().position(|&b| b == 0)?;
    Some(&rest[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    use scroll::LE;

    #[test]
    fn test_line_record_bits() {
        let record = LineRecord {
            offset: 0,
            flags: 0x8300_0005,
        };
        assert_eq!(record.line_start(), 5);
        // delta of 3, the statement bit is not part of it
        assert_eq!(record.line_end(), 9);
    }

    #[test]
    fn test_section_contribution() {
        let mut data = vec![0u8; SECTION_CONTRIB_SIZE];
        data[0..2].copy_from_slice(&1u16.to_le_bytes());
        data[4..8].copy_from_slice(&0x40i32.to_le_bytes());
        data[8..12].copy_from_slice(&0x20i32.to_le_bytes());
        data[16..18].copy_from_slice(&7u16.to_le_bytes());

        let contribution: SectionContribution = data.pread_with(0, LE).unwrap();
        assert_eq!(contribution.section, 1);
        assert_eq!(contribution.offset, 0x40);
        assert_eq!(contribution.size, 0x20);
        assert_eq!(contribution.module, 7);

        assert!(data[..20].pread_with::<SectionContribution>(0, LE).is_err());
    }

    #[test]
    fn test_cstr_at() {
        let data = b"a.c\0b.c\0tail";
        assert_eq!(cstr_at(data, 0), Some(&b"a.c"[..]));
        assert_eq!(cstr_at(data, 4), Some(&b"b.c"[..]));
        assert_eq!(cstr_at(data, 3), Some(&b""[..]));
        assert_eq!(cstr_at(data, 8), None);
        assert_eq!(cstr_at(data, 100), None);
    }
}
