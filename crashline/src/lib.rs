//! Annotates crash reports of Windows builds with source locations.
//!
//! A crash report lists the stack of the crashed thread as virtual addresses of the running
//! process. To map them to the image addresses recorded in the Program Database (PDB), the report
//! needs an _anchor_: a symbol whose virtual address is known. `crashline` supports two kinds:
//!
//! - A `Main is at 0x…:` line, printed by builds that log the address of `Main` on startup.
//! - The top stack frame of builds that do not, located at a known offset into the stack trace
//!   printer. These offsets are specific to a build and configured with an [`AnchorConfig`].
//!
//! Once calibrated, every stack frame of the form `- <text> [0x…]` that resolves to a source
//! location is annotated with `@ <file>:<line>` in front of its address. All other text is left
//! unchanged.
//!
//! # Example
//!
//! ```
//! use crashline::Annotator;
//! use crashline_testutils::PdbBuilder;
//!
//! let pdb = PdbBuilder::new()
//!     .module("main.obj")
//!     .contribution(0x100, 0x100)
//!     .function("Main", "main.cpp", 0x100, 0x40, &[(0, 3), (0x10, 4)])
//!     .build();
//!
//! let report = "Main is at 0x1100:\n- Main [0x1118]\n";
//! let annotated = Annotator::default().annotate(report, pdb).unwrap();
//! assert_eq!(annotated, "Main is at 0x1100:\n- Main @ main.cpp:4 [0x1118]\n");
//! ```

#![warn(missing_docs)]

mod annotate;
mod config;
mod error;
mod report;

pub use crashline_common as common;
pub use crashline_pdb as pdb;

pub use annotate::{Annotator, Calibration};
pub use config::{AnchorConfig, FallbackAnchor, DEFAULT_FALLBACK_SYMBOL};
pub use error::{AnnotateError, ReportError};
pub use report::{find_anchor, parse_address, rewrite_frames, Anchor, MAIN_SYMBOL};
