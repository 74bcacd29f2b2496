//! Provides support for reading Microsoft Program Database (PDB) files, specifically the
//! resolution of image addresses to source file and line locations.
//!
//! # Functionality
//!
//! * Open a PDB from any [`Source`](crashline_common::Source) with [`Pdb::open`].
//! * Look up the image address of a global function with [`Pdb::function_address`], or of a
//!   public symbol with [`Pdb::public_function_address`].
//! * Resolve an image address to a [`SourceLocation`] with [`Pdb::resolve_file_line`].
//!
//! # Structure of a PDB file
//!
//! A PDB is an MSF ("multi-stream file") container: a sequence of fixed-size blocks holding a
//! number of logical _streams_. The stream directory lists, for every stream, its byte size and
//! the blocks it occupies. The streams relevant for line lookups are
//!
//! * the PDB info stream (index 1), naming further streams such as `/names`, the string table of
//!   source file paths,
//! * the DBI stream (index 3), listing all modules (compilation units) and the ranges of the code
//!   section each of them contributed,
//! * the global and public symbol indices, hash tables from symbol names to symbol records,
//! * one symbol stream per module, which ends with the module's C13 line program.
//!
//! An address is resolved by finding the owning module through the section contributions, then
//! the enclosing function in the module's line program, then the enclosing line within that
//! function.

#![warn(missing_docs)]

mod c13;
mod dbi;
mod error;
mod gsi;
mod hash_table;
mod index;
mod info;
mod msf;
mod names;
mod pdb;
mod raw;
mod streams;

pub use c13::{LineEntry, LineFragment, ModuleLines};
pub use dbi::{DebugInfo, ModuleInfo, ModuleRange};
pub use error::{FormatError, FormatErrorKind, PdbError};
pub use gsi::{name_hash, IndexKind, SymbolIndex};
pub use hash_table::HashTable;
pub use index::{Duplicates, Fragment, IntervalIndex};
pub use info::InfoStream;
pub use msf::BlockStore;
pub use names::{NameTable, NAMES_STREAM_NAME};
pub use pdb::{Pdb, SourceLocation};
pub use streams::{Stream, StreamTable};
