//! Calibration of crash report addresses and annotation of stack frames.

use std::borrow::Cow;

use crashline_common::Source;
use crashline_pdb::{Pdb, PdbError};

use crate::config::AnchorConfig;
use crate::error::{AnnotateError, ReportError};
use crate::report::{find_anchor, rewrite_frames, Anchor, MAIN_SYMBOL};

/// The relation between virtual addresses of the crashed process and image addresses of the PDB.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Calibration {
    /// The anchor the calibration was derived from.
    pub anchor: Anchor,
    /// The image address of the anchor symbol.
    pub image_address: u32,
}

impl Calibration {
    /// The difference between virtual and image addresses (`iaToVa`).
    pub fn bias(&self) -> i128 {
        i128::from(self.anchor.address) - i128::from(self.image_address)
    }

    /// Converts a virtual address of the crashed process to an image address.
    ///
    /// Returns `None` if the result is outside of the 32-bit image address space.
    pub fn image_address_for(&self, virtual_address: u64) -> Option<u32> {
        u32::try_from(i128::from(virtual_address) - self.bias()).ok()
    }
}

/// Annotates crash reports with source locations.
///
/// # Example
///
/// ```no_run
/// use crashline::{AnchorConfig, Annotator};
/// use crashline_common::ByteView;
///
/// let pdb = ByteView::open("game.pdb")?;
/// let report = std::fs::read_to_string("crash.txt")?;
///
/// let annotated = Annotator::new(AnchorConfig::default()).annotate(&report, pdb)?;
/// println!("{annotated}");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct Annotator {
    config: AnchorConfig,
    main_address: Option<u64>,
}

impl Annotator {
    /// Creates an annotator using the given fallback anchors.
    pub fn new(config: AnchorConfig) -> Self {
        Self {
            config,
            main_address: None,
        }
    }

    /// Uses `address` as the virtual address of `Main` instead of searching the report.
    pub fn with_anchor(mut self, address: u64) -> Self {
        self.main_address = Some(address);
        self
    }

    /// The fallback anchor configuration.
    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    /// Determines the anchor of `report`.
    pub fn anchor(&self, report: &str) -> Result<Anchor, ReportError> {
        match self.main_address {
            Some(address) => Ok(Anchor {
                symbol: MAIN_SYMBOL.to_owned(),
                address,
            }),
            None => find_anchor(report, &self.config),
        }
    }

    /// Resolves the anchor symbol in `pdb`.
    ///
    /// The global symbol index is searched first, then the public symbol index.
    pub fn calibrate<S: Source>(
        &self,
        anchor: Anchor,
        pdb: &Pdb<S>,
    ) -> Result<Calibration, AnnotateError> {
        let image_address = match pdb.function_address(&anchor.symbol)? {
            Some(address) => Some(address),
            None => pdb.public_function_address(&anchor.symbol)?,
        };

        let Some(image_address) = image_address else {
            return Err(ReportError::UnresolvedAnchor {
                symbol: anchor.symbol,
            }
            .into());
        };

        let calibration = Calibration {
            anchor,
            image_address,
        };
        tracing::debug!(
            symbol = %calibration.anchor.symbol,
            virtual_address = calibration.anchor.address,
            image_address,
            bias = %calibration.bias(),
            "calibrated addresses"
        );
        Ok(calibration)
    }

    /// Annotates every stack frame of `report` with its source location.
    ///
    /// The anchor is located before the PDB in `source` is opened, so a report without an anchor
    /// fails without reading the PDB.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn annotate<S: Source>(&self, report: &str, source: S) -> Result<String, AnnotateError> {
        let anchor = self.anchor(report)?;
        let pdb = Pdb::open(source)?;
        let calibration = self.calibrate(anchor, &pdb)?;
        Ok(annotate_frames(report, &pdb, &calibration)?.into_owned())
    }

    /// Annotates every stack frame of `report` using an already opened PDB.
    pub fn annotate_with<'r, S: Source>(
        &self,
        report: &'r str,
        pdb: &Pdb<S>,
    ) -> Result<Cow<'r, str>, AnnotateError> {
        let anchor = self.anchor(report)?;
        let calibration = self.calibrate(anchor, pdb)?;
        Ok(annotate_frames(report, pdb, &calibration)?)
    }
}

fn annotate_frames<'r, S: Source>(
    report: &'r str,
    pdb: &Pdb<S>,
    calibration: &Calibration,
) -> Result<Cow<'r, str>, PdbError> {
    rewrite_frames(report, |virtual_address| {
        let Some(image_address) = calibration.image_address_for(virtual_address) else {
            tracing::trace!(virtual_address, "address outside of the image");
            return Ok(None);
        };
        let location = pdb.resolve_file_line(image_address)?;
        Ok(location.map(|location| location.to_string()))
    })
}
