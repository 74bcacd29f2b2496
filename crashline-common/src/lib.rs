//! Common functionality for `crashline`.
//!
//! This crate exposes the byte source abstraction that all PDB decoding is built on:
//!
//!  - [`Source`]: A sized provider of bytes that supports arbitrary, non-sequential range reads.
//!  - [`ByteView`]: Gives access to binary data in-memory or on the file system.
//!
//! This module is part of the `crashline` crate.

#![warn(missing_docs)]

mod byteview;
mod source;

pub use crate::byteview::ByteView;
pub use crate::source::Source;
