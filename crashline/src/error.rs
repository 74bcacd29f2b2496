use thiserror::Error;

use crashline_pdb::PdbError;

/// An error caused by the content of a crash report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// Neither a `Main is at` marker nor a known fallback anchor was found in the report.
    #[error("Main VA not specified")]
    MissingAnchor,
    /// The symbol the anchor address refers to does not exist in the PDB.
    #[error("anchor symbol {symbol:?} not found in pdb")]
    UnresolvedAnchor {
        /// The name of the anchor symbol.
        symbol: String,
    },
}

/// An error returned when annotating a crash report.
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// The PDB could not be read or is malformed.
    #[error("failed to read pdb")]
    Pdb(#[from] PdbError),
    /// The report does not allow to calibrate addresses.
    #[error("failed to process crash report")]
    Report(#[from] ReportError),
}
