//! The block store of the MSF container.
//!
//! An MSF file is a sequence of fixed-size blocks. Every logical resource inside it, including the
//! stream directory itself, is described by an ordered list of block indices and a byte size.
//! [`BlockStore::gather`] reassembles such a resource from its blocks.

use scroll::{Pread, LE};

use crashline_common::Source;

use crate::error::{FormatError, FormatErrorKind, PdbError};
use crate::raw::{self, SuperBlock};

/// Validated access to the blocks of an MSF container.
#[derive(Debug)]
pub struct BlockStore<S> {
    source: S,
    block_size: u32,
    block_count: u32,
    directory_bytes: u32,
    directory_addr: u32,
}

impl<S: Source> BlockStore<S> {
    /// Checks the magic and superblock of `source` and opens it for block reads.
    pub fn open(source: S) -> Result<Self, PdbError> {
        let magic_len = raw::MSF_MAGIC.len() as u64;
        let header_end = magic_len + raw::SUPERBLOCK_SIZE as u64;
        if source.size() < header_end {
            return Err(FormatErrorKind::Truncated.into());
        }

        if *source.read_range(0, magic_len)? != raw::MSF_MAGIC[..] {
            return Err(FormatErrorKind::BadMagic.into());
        }

        let header = source.read_range(magic_len, header_end)?;
        let superblock: SuperBlock = header
            .pread_with(0, LE)
            .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;

        if superblock.block_size == 0 || superblock.block_size % 4 != 0 {
            return Err(FormatErrorKind::InvalidBlockSize.into());
        }
        let capacity = u64::from(superblock.block_count) * u64::from(superblock.block_size);
        if capacity < source.size() {
            return Err(FormatErrorKind::InvalidBlockCount.into());
        }
        if superblock.directory_bytes % 4 != 0 {
            return Err(FormatErrorKind::InvalidDirectorySize.into());
        }

        Ok(Self {
            source,
            block_size: superblock.block_size,
            block_count: superblock.block_count,
            directory_bytes: superblock.directory_bytes,
            directory_addr: superblock.directory_addr,
        })
    }

    /// The size of a single block in bytes.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// The number of blocks in the container.
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// The byte size of the stream directory.
    pub fn directory_bytes(&self) -> u32 {
        self.directory_bytes
    }

    /// The index of the block that lists the blocks of the stream directory.
    pub fn directory_addr(&self) -> u32 {
        self.directory_addr
    }

    /// The number of blocks needed to hold `size` bytes.
    pub fn blocks_for(&self, size: u32) -> u32 {
        size.div_ceil(self.block_size)
    }

    /// Reads the byte range `start..end` relative to the beginning of block `index`.
    ///
    /// The range must lie within one block.
    pub fn read_block(&self, index: u32, start: u32, end: u32) -> Result<Vec<u8>, PdbError> {
        if index >= self.block_count {
            return Err(FormatErrorKind::BlockOutOfRange.into());
        }
        if start > end || end > self.block_size {
            return Err(FormatErrorKind::InvalidRange.into());
        }

        let base = u64::from(index) * u64::from(self.block_size);
        let data = self
            .source
            .read_range(base + u64::from(start), base + u64::from(end))?;
        Ok(data.into_owned())
    }

    /// Reconstructs the bytes `start..end` of a resource stored in `blocks`.
    ///
    /// `size` is the declared byte size of the resource. Each entry of `blocks` names one block,
    /// the resource continues seamlessly from one block into the next.
    pub fn gather(&self, blocks: &[u32], size: u32, start: u32, end: u32) -> Result<Vec<u8>, PdbError> {
        if start > end || end > size {
            return Err(FormatErrorKind::InvalidRange.into());
        }

        let mut data = Vec::with_capacity((end - start) as usize);
        let mut block_position = (start / self.block_size) as usize;
        let mut block_start = start % self.block_size;
        let mut remaining = end - start;

        while remaining > 0 {
            let take = remaining.min(self.block_size - block_start);
            let block = *blocks
                .get(block_position)
                .ok_or(FormatErrorKind::InvalidRange)?;

            data.extend_from_slice(&self.read_block(block, block_start, block_start + take)?);

            remaining -= take;
            block_position += 1;
            block_start = 0;
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crashline_testutils::msf_image;
    use similar_asserts::assert_eq;

    fn store(block_size: u32, blocks: &[Vec<u8>]) -> BlockStore<Vec<u8>> {
        BlockStore::open(msf_image(block_size, blocks)).unwrap()
    }

    fn numbered_blocks(block_size: u32, count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| (0..block_size).map(|j| (i * 31 + j as usize) as u8).collect())
            .collect()
    }

    #[test]
    fn test_bad_magic() {
        let mut image = msf_image(64, &[]);
        image[0] = b'm';
        let err = BlockStore::open(image).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::BadMagic));
    }

    #[test]
    fn test_truncated_superblock() {
        let image = msf_image(64, &[]);
        let err = BlockStore::open(image[..40].to_vec()).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::Truncated));
    }

    #[test]
    fn test_invalid_block_size() {
        let mut image = msf_image(64, &[]);
        image[32..36].copy_from_slice(&66u32.to_le_bytes());
        let err = BlockStore::open(image).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::InvalidBlockSize));
    }

    #[test]
    fn test_invalid_block_count() {
        let mut image = msf_image(64, &numbered_blocks(64, 3));
        image[40..44].copy_from_slice(&2u32.to_le_bytes());
        let err = BlockStore::open(image).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::InvalidBlockCount));
    }

    #[test]
    fn test_block_out_of_range() {
        let store = store(64, &numbered_blocks(64, 2));
        assert_eq!(store.block_count(), 3);
        let err = store.read_block(3, 0, 4).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::BlockOutOfRange));
    }

    #[test]
    fn test_gather_partial_block() {
        let blocks = numbered_blocks(64, 4);
        let store = store(64, &blocks);

        // block 0 is the superblock, the payload starts at block 1
        let data = store.gather(&[2], 40, 3, 17).unwrap();
        assert_eq!(data, blocks[1][3..17].to_vec());
    }

    #[test]
    fn test_gather_across_blocks() {
        let blocks = numbered_blocks(64, 5);
        let store = store(64, &blocks);

        // a resource laid out over blocks 4, 2, 5, 1 (in that order), 230 bytes long
        let layout = [4, 2, 5, 1];
        let reference: Vec<u8> = layout
            .iter()
            .flat_map(|&b| blocks[b as usize - 1].clone())
            .take(230)
            .collect();

        let data = store.gather(&layout, 230, 10, 230).unwrap();
        assert_eq!(data, reference[10..230].to_vec());

        let data = store.gather(&layout, 230, 63, 129).unwrap();
        assert_eq!(data, reference[63..129].to_vec());

        assert!(store.gather(&layout, 230, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_gather_invalid_range() {
        let store = store(64, &numbered_blocks(64, 2));

        let err = store.gather(&[1, 2], 100, 20, 10).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::InvalidRange));

        let err = store.gather(&[1, 2], 100, 20, 101).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::InvalidRange));
    }
}
