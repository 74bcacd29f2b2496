use std::borrow::Cow;
use std::io;
use std::sync::Arc;

use crate::ByteView;

/// A sized provider of bytes with random access.
///
/// This is the only way the PDB decoder touches its input. Every read is issued for an exact,
/// bounds-checked range and may be served in any order. Implementations report failures as
/// [`io::Error`], which callers keep separate from format errors.
///
/// # Example
///
/// ```
/// use crashline_common::Source;
///
/// let data = b"Microsoft".to_vec();
/// assert_eq!(data.size(), 9);
/// assert_eq!(&*data.read_range(2, 5).unwrap(), b"cro");
/// assert!(data.read_range(5, 10).is_err());
/// ```
pub trait Source {
    /// The total number of bytes available.
    fn size(&self) -> u64;

    /// Reads the bytes in `start..end`.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the range reaches past [`size`](Self::size),
    /// and with [`io::ErrorKind::InvalidInput`] if `start > end`.
    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>>;
}

fn slice_range(data: &[u8], start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
    if start > end {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("inverted read range {start:#x}..{end:#x}"),
        ));
    }

    let range = usize::try_from(start)
        .ok()
        .zip(usize::try_from(end).ok())
        .and_then(|(start, end)| data.get(start..end));

    match range {
        Some(bytes) => Ok(Cow::Borrowed(bytes)),
        None => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "read of {start:#x}..{end:#x} exceeds source size {:#x}",
                data.len()
            ),
        )),
    }
}

impl Source for [u8] {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
        slice_range(self, start, end)
    }
}

impl Source for Vec<u8> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
        slice_range(self, start, end)
    }
}

impl Source for ByteView<'_> {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
        slice_range(self.as_slice(), start, end)
    }
}

impl<S: Source + ?Sized> Source for &S {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
        (**self).read_range(start, end)
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
        (**self).read_range(start, end)
    }
}

impl<S: Source + ?Sized> Source for Arc<S> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
        (**self).read_range(start, end)
    }
}
