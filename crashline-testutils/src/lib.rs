//! Test helpers for `crashline`.
//!
//! Instead of binary fixtures, tests write the PDB structures they need. The individual stream
//! writers produce exactly one structure each, [`PdbBuilder`] assembles complete PDB images.
#![warn(missing_docs)]

mod builder;
mod lines;
mod msf;
mod streams;
mod symbols;

use std::path::{Path, PathBuf};

pub use builder::PdbBuilder;
pub use lines::{c13_lines, Line, LineBlock, CHECKSUM_ENTRY_SIZE};
pub use msf::{msf_image, MsfBuilder, MSF_MAGIC};
pub use streams::{dbi_stream, hash_table, info_stream, names_stream, DbiModule, SectionContrib};
pub use symbols::{
    gsi_stream, procedure_record, procedure_reference_record, psi_stream, public_record,
};

/// Returns the full path to the specified fixture.
///
/// Fixtures are stored in the `crashline-testutils/fixtures` directory and paths should be given
/// relative to that location.
///
/// # Example
///
/// ```
/// use crashline_testutils::fixture;
///
/// let path = fixture("reports/main_anchor.txt");
/// assert!(path.ends_with("reports/main_anchor.txt"));
/// ```
pub fn fixture<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut full_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    full_path.push("fixtures");

    let path = path.as_ref();
    full_path.push(path);

    assert!(
        full_path.exists(),
        "Fixture does not exist: {}",
        full_path.display()
    );

    full_path
}
