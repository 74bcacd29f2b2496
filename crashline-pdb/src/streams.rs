//! The stream directory of the MSF container.

use scroll::{Pread, LE};

use crashline_common::Source;

use crate::error::{FormatError, FormatErrorKind, PdbError};
use crate::msf::BlockStore;

/// Stream size of a nil stream, which has no blocks.
const NIL_STREAM_SIZE: u32 = 0xFFFF_FFFF;

/// Location of one logical stream within the container.
#[derive(Clone, Debug, Default)]
struct StreamInfo {
    size: u32,
    blocks: Vec<u32>,
}

fn read_u32s(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// A cursor over the stream directory, which is itself a block-addressed resource.
struct DirectoryReader<'a, S> {
    store: &'a BlockStore<S>,
    blocks: Vec<u32>,
    cursor: u32,
}

impl<S: Source> DirectoryReader<'_, S> {
    fn read(&mut self, len: u64) -> Result<Vec<u8>, PdbError> {
        let size = self.store.directory_bytes();
        let end = u64::from(self.cursor) + len;
        if end > u64::from(size) {
            return Err(FormatErrorKind::Truncated.into());
        }
        // `end` fits into u32 since it is bounded by the directory size
        let end = end as u32;
        let data = self.store.gather(&self.blocks, size, self.cursor, end)?;
        self.cursor = end;
        Ok(data)
    }
}

/// The decoded stream directory, giving access to every stream of the container.
#[derive(Debug)]
pub struct StreamTable<S> {
    store: BlockStore<S>,
    streams: Vec<StreamInfo>,
}

impl<S: Source> StreamTable<S> {
    /// Reads the stream directory of an opened block store.
    pub fn open(store: BlockStore<S>) -> Result<Self, PdbError> {
        let directory_blocks = store.blocks_for(store.directory_bytes());
        if directory_blocks > store.block_size() / 4 {
            return Err(FormatErrorKind::DirectoryTooLarge.into());
        }
        let block_list = store.read_block(store.directory_addr(), 0, directory_blocks * 4)?;

        let mut directory = DirectoryReader {
            store: &store,
            blocks: read_u32s(&block_list),
            cursor: 0,
        };

        let stream_count: u32 = directory
            .read(4)?
            .pread_with(0, LE)
            .map_err(|e| FormatError::new(FormatErrorKind::Truncated, e))?;

        let sizes: Vec<u32> = read_u32s(&directory.read(u64::from(stream_count) * 4)?)
            .into_iter()
            .map(|size| if size == NIL_STREAM_SIZE { 0 } else { size })
            .collect();

        let total_blocks: u64 = sizes
            .iter()
            .map(|&size| u64::from(store.blocks_for(size)))
            .sum();
        let mut block_indices = read_u32s(&directory.read(total_blocks * 4)?).into_iter();

        let streams = sizes
            .into_iter()
            .map(|size| StreamInfo {
                size,
                blocks: block_indices
                    .by_ref()
                    .take(store.blocks_for(size) as usize)
                    .collect(),
            })
            .collect::<Vec<_>>();

        tracing::trace!(streams = streams.len(), "read stream directory");
        Ok(Self { store, streams })
    }

    /// The underlying block store.
    pub fn store(&self) -> &BlockStore<S> {
        &self.store
    }

    /// The number of streams in the directory.
    pub fn stream_count(&self) -> u32 {
        self.streams.len() as u32
    }

    fn info(&self, index: u32) -> Result<&StreamInfo, FormatError> {
        self.streams
            .get(index as usize)
            .ok_or_else(|| FormatErrorKind::StreamOutOfRange.into())
    }

    /// The byte size of stream `index`.
    pub fn stream_size(&self, index: u32) -> Result<u32, FormatError> {
        Ok(self.info(index)?.size)
    }

    /// Reads the bytes `start..end` of stream `index`.
    pub fn read_stream(&self, index: u32, start: u32, end: u32) -> Result<Vec<u8>, PdbError> {
        let info = self.info(index)?;
        self.store.gather(&info.blocks, info.size, start, end)
    }

    /// Returns a handle for reading stream `index`.
    pub fn stream(&self, index: u32) -> Result<Stream<'_, S>, FormatError> {
        let size = self.stream_size(index)?;
        Ok(Stream {
            table: self,
            index,
            size,
        })
    }
}

/// A handle to one stream of a [`StreamTable`].
#[derive(Debug)]
pub struct Stream<'t, S> {
    table: &'t StreamTable<S>,
    index: u32,
    size: u32,
}

impl<S> Clone for Stream<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Stream<'_, S> {}

impl<S: Source> Stream<'_, S> {
    /// The index of this stream in the directory.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The byte size of this stream.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Reads the bytes `start..end` of this stream.
    pub fn read(&self, start: u32, end: u32) -> Result<Vec<u8>, PdbError> {
        self.table.read_stream(self.index, start, end)
    }

    /// Reads `len` bytes at `start`, failing with `kind` if they are not all within the stream.
    pub fn read_checked(&self, start: u32, len: u64, kind: FormatErrorKind) -> Result<Vec<u8>, PdbError> {
        let end = u64::from(start) + len;
        if end > u64::from(self.size) {
            return Err(kind.into());
        }
        self.read(start, end as u32)
    }

    /// Reads the entire stream.
    pub fn read_all(&self) -> Result<Vec<u8>, PdbError> {
        self.read(0, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crashline_testutils::MsfBuilder;
    use similar_asserts::assert_eq;

    #[test]
    fn test_streams() {
        let mut builder = MsfBuilder::new(64);
        builder.add_stream(b"first".to_vec());
        builder.add_stream(Vec::new());
        let long: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        builder.add_stream(long.clone());

        let table = StreamTable::open(BlockStore::open(builder.build()).unwrap()).unwrap();
        assert_eq!(table.stream_count(), 3);
        assert_eq!(table.stream_size(0).unwrap(), 5);
        assert_eq!(table.stream_size(1).unwrap(), 0);
        assert_eq!(table.read_stream(0, 1, 4).unwrap(), b"irs".to_vec());
        assert_eq!(table.read_stream(2, 0, 200).unwrap(), long);
        assert_eq!(table.stream(2).unwrap().read(60, 140).unwrap(), long[60..140].to_vec());
    }

    #[test]
    fn test_nil_stream() {
        let mut builder = MsfBuilder::new(64);
        builder.add_nil_stream();
        builder.add_stream(b"after".to_vec());

        let table = StreamTable::open(BlockStore::open(builder.build()).unwrap()).unwrap();
        assert_eq!(table.stream_size(0).unwrap(), 0);
        assert_eq!(table.stream(1).unwrap().read_all().unwrap(), b"after".to_vec());
    }

    #[test]
    fn test_stream_out_of_range() {
        let mut builder = MsfBuilder::new(64);
        builder.add_stream(b"only".to_vec());

        let table = StreamTable::open(BlockStore::open(builder.build()).unwrap()).unwrap();
        let err = table.stream_size(1).unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::StreamOutOfRange);
        let err = table.read_stream(1, 0, 0).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::StreamOutOfRange));
    }

    #[test]
    fn test_read_past_stream_end() {
        let mut builder = MsfBuilder::new(64);
        builder.add_stream(b"short".to_vec());

        let table = StreamTable::open(BlockStore::open(builder.build()).unwrap()).unwrap();
        let err = table.read_stream(0, 2, 6).unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::InvalidRange));
    }

    #[test]
    fn test_directory_too_large() {
        // 16 byte blocks hold 4 block indices, the directory of 40 streams needs more
        let mut builder = MsfBuilder::new(16);
        for _ in 0..40 {
            builder.add_stream(Vec::new());
        }
        let err = BlockStore::open(builder.build())
            .and_then(StreamTable::open)
            .unwrap_err();
        assert_eq!(err.format_kind(), Some(FormatErrorKind::DirectoryTooLarge));
    }
}
