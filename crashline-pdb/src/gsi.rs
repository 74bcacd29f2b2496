//! Global and public symbol indices (GSI/PSI).
//!
//! Both indices are hash tables from a symbol name to the offsets of its records in the symbol
//! record stream. The table is serialized as a flat array of hash records plus a bitmap of
//! non-empty buckets and, for each of them, the position of its first hash record.

use scroll::{Pread, LE};

use crashline_common::Source;

use crate::dbi::DebugInfo;
use crate::error::{FormatError, FormatErrorKind, PdbError};
use crate::raw::{self, cstr_at, GsiHeader};
use crate::streams::{Stream, StreamTable};

/// Computes the name hash used to pick the bucket of a symbol (`LHashPbCb`).
///
/// `modulus` is the number of hashed buckets, which is one less than the number of buckets in the
/// serialized table.
///
/// # Example
///
/// ```
/// use crashline_pdb::name_hash;
///
/// assert_eq!(name_hash(b"Main", 4096), 549);
/// // the hash folds case of ASCII letters
/// assert_eq!(name_hash(b"MAIN", 4096), name_hash(b"main", 4096));
/// ```
pub fn name_hash(name: &[u8], modulus: u32) -> u32 {
    let mut chunks = name.chunks_exact(4);
    let mut value = 0u32;

    for chunk in &mut chunks {
        value ^= u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let mut rest = chunks.remainder();
    if rest.len() & 2 != 0 {
        value ^= u32::from(u16::from_le_bytes([rest[0], rest[1]]));
        rest = &rest[2..];
    }
    if rest.len() & 1 != 0 {
        value ^= u32::from(rest[0]);
    }

    value |= 0x2020_2020;
    value ^= (value >> 11) & 0x001F_FFFF;
    value ^= (value >> 16) & 0xFFFF;

    value % modulus
}

/// Which of the two symbol indices a stream holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    /// The global symbol index, the GSI starts at the beginning of the stream.
    Global,
    /// The public symbol index, a GSI wrapped in a PSI header.
    Public,
}

/// A decoded symbol index.
#[derive(Clone, Debug, Default)]
pub struct SymbolIndex {
    buckets: Vec<Vec<u32>>,
}

fn corrupt(e: scroll::Error) -> FormatError {
    FormatError::new(FormatErrorKind::CorruptHashIndex, e)
}

fn truncated(e: scroll::Error) -> FormatError {
    FormatError::new(FormatErrorKind::Truncated, e)
}

impl SymbolIndex {
    /// Decodes the symbol index in stream `index`.
    ///
    /// With `minimal_debug_info`, the table has [`raw::NUM_BUCKETS_MINIMAL`] buckets instead of
    /// [`raw::NUM_BUCKETS`].
    pub fn parse<S: Source>(
        streams: &StreamTable<S>,
        index: u32,
        kind: IndexKind,
        minimal_debug_info: bool,
    ) -> Result<Self, PdbError> {
        let stream = streams.stream(index)?;

        let (mut cursor, gsi_size) = match kind {
            IndexKind::Global => (0, stream.size()),
            IndexKind::Public => {
                let header = stream.read_checked(
                    0,
                    raw::PSI_HEADER_SIZE.into(),
                    FormatErrorKind::Truncated,
                )?;
                let size: u32 = header.pread_with(0, LE).map_err(truncated)?;
                (raw::PSI_HEADER_SIZE, size)
            }
        };

        let header: GsiHeader = stream
            .read_checked(cursor, raw::GSI_HEADER_SIZE.into(), FormatErrorKind::Truncated)?
            .pread_with(0, LE)
            .map_err(truncated)?;
        cursor += raw::GSI_HEADER_SIZE;

        if header.signature != raw::GSI_SIGNATURE || header.version != raw::GSI_VERSION {
            return Err(FormatErrorKind::UnsupportedVersion.into());
        }

        let records_size = u32::try_from(header.hash_records_size).map_err(|e| {
            FormatError::new(FormatErrorKind::CorruptHashIndex, e)
        })?;
        if records_size % raw::HASH_RECORD_SIZE != 0 {
            return Err(FormatErrorKind::CorruptHashIndex.into());
        }
        let buckets_size = u32::try_from(header.buckets_size).map_err(|e| {
            FormatError::new(FormatErrorKind::CorruptHashIndex, e)
        })?;
        let declared_size =
            u64::from(raw::GSI_HEADER_SIZE) + u64::from(records_size) + u64::from(buckets_size);
        if u64::from(gsi_size) != declared_size {
            return Err(FormatErrorKind::Truncated.into());
        }

        let records = stream.read_checked(cursor, records_size.into(), FormatErrorKind::Truncated)?;
        cursor += records_size;

        if buckets_size == 0 {
            return Ok(Self::default());
        }

        let bucket_count = if minimal_debug_info {
            raw::NUM_BUCKETS_MINIMAL
        } else {
            raw::NUM_BUCKETS
        };

        let bitmap_size = bucket_count.div_ceil(32) * 4;
        let bitmap = stream.read_checked(cursor, bitmap_size.into(), FormatErrorKind::Truncated)?;
        cursor += bitmap_size;
        let present = |bucket: u32| (bitmap[(bucket / 8) as usize] >> (bucket % 8)) & 1 != 0;

        let present_count = (0..bucket_count).filter(|&bucket| present(bucket)).count() as u32;
        if bitmap_size + present_count * 4 != buckets_size {
            return Err(FormatErrorKind::CorruptHashIndex.into());
        }
        let starts = stream.read_checked(
            cursor,
            u64::from(present_count) * 4,
            FormatErrorKind::Truncated,
        )?;

        let mut buckets = vec![Vec::new(); bucket_count as usize];
        let mut record_cursor = records_size / raw::HASH_RECORD_SIZE;
        let mut start_cursor = starts.len();

        // Each bucket extends up to the start of the next non-empty bucket, so walk backwards.
        for bucket in (0..bucket_count).rev() {
            if !present(bucket) {
                continue;
            }

            start_cursor -= 4;
            let start: u32 = starts.pread_with(start_cursor, LE).map_err(corrupt)?;
            if start % raw::HASH_RECORD_MEMORY_SIZE != 0 {
                return Err(FormatErrorKind::CorruptHashIndex.into());
            }
            let first_record = start / raw::HASH_RECORD_MEMORY_SIZE;
            if u64::from(first_record) * u64::from(raw::HASH_RECORD_SIZE) >= u64::from(records_size)
            {
                return Err(FormatErrorKind::CorruptHashIndex.into());
            }

            let offsets = &mut buckets[bucket as usize];
            while record_cursor > first_record {
                record_cursor -= 1;
                let position = (record_cursor * raw::HASH_RECORD_SIZE) as usize;
                let offset: u32 = records.pread_with(position, LE).map_err(corrupt)?;
                // hash records store the symbol offset plus one
                offsets.push(offset.wrapping_sub(1));
            }
            offsets.reverse();
        }

        if start_cursor != 0 || record_cursor != 0 {
            return Err(FormatErrorKind::CorruptHashIndex.into());
        }

        Ok(Self { buckets })
    }

    /// The number of buckets in the table, zero if the index is empty.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// The offsets of all symbol records in the bucket `name` hashes to.
    ///
    /// The records still need to be checked for their name.
    pub fn symbol_offsets(&self, name: &str) -> &[u32] {
        let Some(modulus) = self.bucket_count().checked_sub(1).filter(|&m| m > 0) else {
            return &[];
        };
        let bucket = name_hash(name.as_bytes(), modulus as u32);
        &self.buckets[bucket as usize]
    }

    /// Resolves the code section offset of the global procedure `name`.
    ///
    /// The index holds `S_PROCREF` records, which point into the symbol stream of the defining
    /// module. Returns `None` if no procedure of that name is defined in the code section.
    pub fn find_procedure<S: Source>(
        &self,
        streams: &StreamTable<S>,
        debug_info: &DebugInfo,
        name: &str,
    ) -> Result<Option<u32>, PdbError> {
        let records = streams.stream(debug_info.symbol_records_stream())?;

        for &offset in self.symbol_offsets(name) {
            let reference = SymbolRecord::read(&records, offset)?;
            if reference.kind != raw::S_PROCREF || reference.name(14)? != name.as_bytes() {
                continue;
            }

            let symbol_offset: u32 = reference.data.pread_with(8, LE).map_err(truncated)?;
            let module: u16 = reference.data.pread_with(12, LE).map_err(truncated)?;
            // module references are one-based
            let Some(module_index) = usize::from(module).checked_sub(1) else {
                continue;
            };

            let module = debug_info.module(module_index)?;
            let stream = module
                .symbol_stream
                .ok_or(FormatErrorKind::StreamOutOfRange)?;
            let procedure = SymbolRecord::read(&streams.stream(stream)?, symbol_offset)?;
            if procedure.kind != raw::S_GPROC32 {
                continue;
            }

            let address: u32 = procedure.data.pread_with(32, LE).map_err(truncated)?;
            let section: u16 = procedure.data.pread_with(36, LE).map_err(truncated)?;
            if section == raw::TEXT_SECTION {
                return Ok(Some(address));
            }
        }

        Ok(None)
    }

    /// Resolves the code section offset of the public symbol `name`.
    ///
    /// The index holds `S_PUB32` records with the address inline.
    pub fn find_public<S: Source>(
        &self,
        streams: &StreamTable<S>,
        debug_info: &DebugInfo,
        name: &str,
    ) -> Result<Option<u32>, PdbError> {
        let records = streams.stream(debug_info.symbol_records_stream())?;

        for &offset in self.symbol_offsets(name) {
            let symbol = SymbolRecord::read(&records, offset)?;
            if symbol.kind != raw::S_PUB32 || symbol.name(14)? != name.as_bytes() {
                continue;
            }

            let address: u32 = symbol.data.pread_with(8, LE).map_err(truncated)?;
            let section: u16 = symbol.data.pread_with(12, LE).map_err(truncated)?;
            if section == raw::TEXT_SECTION {
                return Ok(Some(address));
            }
        }

        Ok(None)
    }
}

/// A length-prefixed CodeView symbol record.
struct SymbolRecord {
    kind: u16,
    /// The full record including the length prefix.
    data: Vec<u8>,
}

impl SymbolRecord {
    fn read<S: Source>(stream: &Stream<'_, S>, offset: u32) -> Result<Self, PdbError> {
        let len: u16 = stream
            .read_checked(offset, 2, FormatErrorKind::InvalidRange)?
            .pread_with(0, LE)
            .map_err(truncated)?;
        let data = stream.read_checked(offset, 2 + u64::from(len), FormatErrorKind::InvalidRange)?;
        let kind = data.pread_with(2, LE).map_err(truncated)?;
        Ok(Self { kind, data })
    }

    fn name(&self, offset: usize) -> Result<&[u8], FormatError> {
        cstr_at(&self.data, offset).ok_or_else(|| FormatErrorKind::StringOutOfRange.into())
    }
}
