//! Shared, read-only views of PDB bytes.

use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

#[derive(Debug)]
enum Bytes<'a> {
    Memory(Cow<'a, [u8]>),
    Mapped(Mmap),
}

/// Bytes of a PDB, either mapped from disk or held in memory.
///
/// PDBs of large binaries easily reach hundreds of megabytes, of which only the directory, a few
/// index streams and the line programs of the modules actually hit are ever read. Opening a file
/// therefore maps it instead of reading it, and the decoder pulls in pages on demand.
///
/// Clones share the same mapping or buffer.
///
/// # Example
///
/// ```
/// use std::io::Write;
/// use crashline_common::{ByteView, Source};
///
/// let mut file = tempfile::NamedTempFile::new()?;
/// file.write_all(b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0")?;
///
/// let view = ByteView::open(file.path())?;
/// assert_eq!(view.size(), 32);
/// assert_eq!(&*view.read_range(0, 9)?, b"Microsoft");
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct ByteView<'a> {
    bytes: Arc<Bytes<'a>>,
}

impl<'a> ByteView<'a> {
    fn new(bytes: Bytes<'a>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }

    /// Wraps a borrowed buffer.
    pub fn from_slice(buffer: &'a [u8]) -> Self {
        Self::new(Bytes::Memory(Cow::Borrowed(buffer)))
    }

    /// Takes ownership of a buffer.
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        Self::new(Bytes::Memory(Cow::Owned(buffer)))
    }

    /// Maps an open file into memory.
    ///
    /// The mapping stays valid after `file` is closed. Empty files cannot be mapped on every
    /// platform and produce an empty view instead.
    pub fn map_file(file: &File) -> io::Result<Self> {
        if file.metadata()?.len() == 0 {
            return Ok(Self::from_slice(&[]));
        }

        // SAFETY: The file is opened read-only by the caller. Modifying a PDB on disk while it is
        // being decoded is not supported.
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self::new(Bytes::Mapped(mmap)))
    }

    /// Opens and maps the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::map_file(&file)
    }

    /// Returns the viewed bytes.
    pub fn as_slice(&self) -> &[u8] {
        match &*self.bytes {
            Bytes::Memory(buffer) => buffer,
            Bytes::Mapped(mmap) => mmap,
        }
    }
}

impl From<Vec<u8>> for ByteView<'static> {
    fn from(buffer: Vec<u8>) -> Self {
        Self::from_vec(buffer)
    }
}

impl AsRef<[u8]> for ByteView<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Deref for ByteView<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use similar_asserts::assert_eq;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_empty_file() -> io::Result<()> {
        let file = NamedTempFile::new()?;
        let view = ByteView::open(file.path())?;
        assert!(view.is_empty());
        Ok(())
    }

    #[test]
    fn test_open_file() -> io::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"Microsoft C/C++ MSF 7.00")?;
        file.flush()?;

        let view = ByteView::open(file.path())?;
        assert_eq!(&*view, b"Microsoft C/C++ MSF 7.00");
        Ok(())
    }

    #[test]
    fn test_mapping_outlives_file() -> io::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"1234")?;
        file.flush()?;

        let view = ByteView::map_file(file.as_file())?;
        drop(file);

        assert_eq!(view.as_slice(), b"1234");
        Ok(())
    }

    #[test]
    fn test_clones_share_bytes() {
        let view = ByteView::from_vec(vec![1, 2, 3]);
        let clone = view.clone();
        assert_eq!(view.as_ptr(), clone.as_ptr());
    }
}
