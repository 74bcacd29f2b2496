use std::error::Error;
use std::io;

use thiserror::Error;

/// The kind of a [`FormatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FormatErrorKind {
    /// The file does not start with the MSF 7.00 signature.
    #[error("bad magic")]
    BadMagic,
    /// The superblock declares a block size that is zero or not a multiple of 4.
    #[error("invalid block size")]
    InvalidBlockSize,
    /// The superblock declares fewer blocks than the file holds.
    #[error("invalid block count")]
    InvalidBlockCount,
    /// The stream directory byte count is not a multiple of 4.
    #[error("invalid directory byte count")]
    InvalidDirectorySize,
    /// A block index points outside of the file.
    #[error("block index out of range")]
    BlockOutOfRange,
    /// A read was requested outside of the bounds of a stream.
    #[error("invalid data range")]
    InvalidRange,
    /// The stream directory needs more block indices than fit into one block.
    #[error("invalid directory block count")]
    DirectoryTooLarge,
    /// A stream index does not name a stream in the directory.
    #[error("stream index out of range")]
    StreamOutOfRange,
    /// A structure ends prematurely.
    #[error("truncated structure")]
    Truncated,
    /// A header carries a version or signature this decoder does not understand.
    #[error("unsupported version")]
    UnsupportedVersion,
    /// The feature list of the PDB info stream is not a whole number of codes.
    #[error("unsupported PDB info feature layout")]
    UnsupportedFeatureLayout,
    /// The PDB info stream does not name a `/names` stream.
    #[error("missing /names stream")]
    MissingNamesStream,
    /// A string is not terminated within the bounds of its pool.
    #[error("out of range string")]
    StringOutOfRange,
    /// A module carries legacy C11 line information.
    #[error("unsupported module with C11 line info")]
    UnsupportedC11LineInfo,
    /// A size or offset field holds a negative or otherwise impossible value.
    #[error("invalid size")]
    InvalidSize,
    /// A module index does not name a module in the DBI stream.
    #[error("module index out of range")]
    ModuleOutOfRange,
    /// Address fragments that must be disjoint overlap.
    #[error("overlapping fragments")]
    OverlappingFragments,
    /// The hash buckets of a symbol index do not match its hash records.
    #[error("corrupt symbol hash index")]
    CorruptHashIndex,
    /// A C13 line subsection is malformed.
    #[error("corrupt line program")]
    CorruptLineProgram,
    /// A module with line information has no file checksum subsection.
    #[error("missing file checksum table")]
    MissingChecksumTable,
}

/// An error encountered while decoding a PDB file.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct FormatError {
    pub(crate) kind: FormatErrorKind,
    #[source]
    pub(crate) source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl FormatError {
    /// Creates a new FormatError error from a known kind of error as well as an
    /// arbitrary error payload.
    pub(crate) fn new<E>(kind: FormatErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`FormatErrorKind`] for this error.
    pub fn kind(&self) -> FormatErrorKind {
        self.kind
    }
}

impl From<FormatErrorKind> for FormatError {
    fn from(kind: FormatErrorKind) -> Self {
        Self { kind, source: None }
    }
}

/// An error returned while reading a PDB.
///
/// Failures of the underlying byte source are kept apart from malformed content, so that callers
/// can tell an unreadable file from a corrupt one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PdbError {
    /// The byte source failed to deliver a requested range.
    #[error("failed to read from pdb source")]
    Io(#[from] io::Error),
    /// The PDB content is malformed or unsupported.
    #[error("invalid pdb file")]
    Format(#[from] FormatError),
}

impl PdbError {
    /// Returns the [`FormatErrorKind`] if this is a format error.
    pub fn format_kind(&self) -> Option<FormatErrorKind> {
        match self {
            Self::Format(error) => Some(error.kind()),
            Self::Io(_) => None,
        }
    }
}

impl From<FormatErrorKind> for PdbError {
    fn from(kind: FormatErrorKind) -> Self {
        Self::Format(kind.into())
    }
}
