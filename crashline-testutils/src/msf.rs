/// The MSF 7.00 signature.
pub const MSF_MAGIC: &[u8; 32] = b"Microsoft C/C++ MSF 7.00\r\n\x1a\x44\x53\x00\x00\x00";

const SUPERBLOCK_END: usize = MSF_MAGIC.len() + 24;

fn header_blocks(block_size: u32) -> u32 {
    (SUPERBLOCK_END as u32).div_ceil(block_size)
}

fn superblock(block_size: u32, block_count: u32, directory_bytes: u32, directory_addr: u32) -> Vec<u8> {
    let mut data = MSF_MAGIC.to_vec();
    for value in [block_size, 0, block_count, directory_bytes, 0, directory_addr] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

fn pad_to(data: &mut Vec<u8>, block_size: u32) {
    let rem = data.len() % block_size as usize;
    if rem != 0 {
        data.resize(data.len() + block_size as usize - rem, 0);
    }
}

/// Writes a container of raw blocks without a stream directory.
///
/// The superblock occupies the leading block(s), `blocks` follow in order and are padded to the
/// block size. With 64 byte blocks, `blocks[0]` is block 1.
pub fn msf_image(block_size: u32, blocks: &[Vec<u8>]) -> Vec<u8> {
    let header_blocks = header_blocks(block_size);
    let block_count = header_blocks + blocks.len() as u32;

    let mut data = superblock(block_size, block_count, 0, 0);
    pad_to(&mut data, block_size);
    for block in blocks {
        let mut block = block.clone();
        block.resize(block_size as usize, 0);
        data.extend_from_slice(&block);
    }
    data
}

/// Writes a container with a stream directory.
///
/// Streams are laid out back to back after the superblock, followed by the directory and the
/// block listing the directory blocks.
///
/// # Example
///
/// ```
/// use crashline_testutils::MsfBuilder;
///
/// let mut builder = MsfBuilder::new(64);
/// builder.add_stream(b"hello".to_vec());
/// let image = builder.build();
/// assert_eq!(image.len() % 64, 0);
/// ```
#[derive(Clone, Debug)]
pub struct MsfBuilder {
    block_size: u32,
    streams: Vec<Option<Vec<u8>>>,
}

impl MsfBuilder {
    /// Creates an empty container with the given block size.
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            streams: Vec::new(),
        }
    }

    /// Appends a stream, returning its index.
    pub fn add_stream(&mut self, data: Vec<u8>) -> u32 {
        self.streams.push(Some(data));
        self.streams.len() as u32 - 1
    }

    /// Appends a nil stream (size `0xFFFFFFFF`), returning its index.
    pub fn add_nil_stream(&mut self) -> u32 {
        self.streams.push(None);
        self.streams.len() as u32 - 1
    }

    /// Replaces the contents of stream `index`.
    pub fn set_stream(&mut self, index: u32, data: Vec<u8>) {
        self.streams[index as usize] = Some(data);
    }

    /// Writes the container.
    pub fn build(&self) -> Vec<u8> {
        let block_size = self.block_size;
        let mut next_block = header_blocks(block_size);

        let mut body = Vec::new();
        let mut sizes = Vec::new();
        let mut block_lists = Vec::new();

        for stream in &self.streams {
            match stream {
                Some(data) => {
                    let count = (data.len() as u32).div_ceil(block_size);
                    sizes.push(data.len() as u32);
                    block_lists.extend(next_block..next_block + count);
                    next_block += count;
                    body.extend_from_slice(data);
                    pad_to(&mut body, block_size);
                }
                None => sizes.push(u32::MAX),
            }
        }

        let mut directory = Vec::new();
        directory.extend_from_slice(&(self.streams.len() as u32).to_le_bytes());
        for size in &sizes {
            directory.extend_from_slice(&size.to_le_bytes());
        }
        for block in &block_lists {
            directory.extend_from_slice(&block.to_le_bytes());
        }

        let directory_bytes = directory.len() as u32;
        let directory_count = directory_bytes.div_ceil(block_size);
        let directory_blocks: Vec<u32> = (next_block..next_block + directory_count).collect();
        next_block += directory_count;
        body.extend_from_slice(&directory);
        pad_to(&mut body, block_size);

        // the block list holds at most one block worth of indices
        let mut block_list: Vec<u8> = directory_blocks
            .iter()
            .take(block_size as usize / 4)
            .flat_map(|block| block.to_le_bytes())
            .collect();
        block_list.resize(block_size as usize, 0);
        let directory_addr = next_block;
        next_block += 1;
        body.extend_from_slice(&block_list);

        let mut data = superblock(block_size, next_block, directory_bytes, directory_addr);
        pad_to(&mut data, block_size);
        data.extend_from_slice(&body);
        data
    }
}
