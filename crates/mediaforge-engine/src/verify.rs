//! Whole-image and per-sector verification
//!
//! Verification findings are data, not errors: an image full of bad
//! sectors still verifies "successfully" in the sense that the run
//! completes and reports what it found.

use crate::progress::{ProgressCallback, ProgressEvent, RunControl};
use crate::walker::{ChunkPlan, Span, WalkLimits};
use mediaforge_core::{
    Error, MediaImage, MediaView, Result, VerifiableImage, VerifiableSectorsImage,
};
use std::time::Instant;
use tracing::debug;

/// Sectors per verification chunk
pub const VERIFY_CHUNK: u32 = 512;

/// Tri-state outcome of a verification check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Checksums matched
    Correct,
    /// At least one checksum mismatched
    Incorrect,
    /// No embedded checksum existed to compare against
    NotApplicable,
}

/// Verify the whole image against its embedded checksum metadata
pub fn verify_image(image: &mut dyn MediaImage) -> Result<VerificationStatus> {
    match image.as_verifiable() {
        Some(verifiable) => Ok(match verifiable.verify_media_image()? {
            Some(true) => VerificationStatus::Correct,
            Some(false) => VerificationStatus::Incorrect,
            None => VerificationStatus::NotApplicable,
        }),
        None => Ok(VerificationStatus::NotApplicable),
    }
}

/// Outcome of a per-sector verification run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorVerification {
    /// LBAs whose embedded checksum mismatched
    pub failing_lbas: Vec<u64>,
    /// LBAs carrying no embedded checksum
    pub unknown_lbas: Vec<u64>,
    /// Sectors examined
    pub total_sectors: u64,
}

impl SectorVerification {
    /// Derive the tri-state for the sector check
    pub fn status(&self) -> VerificationStatus {
        if !self.failing_lbas.is_empty() {
            VerificationStatus::Incorrect
        } else if (self.unknown_lbas.len() as u64) < self.total_sectors {
            VerificationStatus::Correct
        } else {
            VerificationStatus::NotApplicable
        }
    }
}

/// Verify sectors one at a time against their embedded checksums/ECC.
///
/// `range` restricts the run to `[start, start + length)`; the default is
/// the whole image. Chunks respect track boundaries on optical media.
pub fn verify_sectors(
    image: &mut dyn MediaImage,
    range: Option<(u64, u64)>,
    progress: Option<ProgressCallback>,
    control: &RunControl,
) -> Result<SectorVerification> {
    let view = MediaView::resolve(image);
    let plan = ChunkPlan::for_view(&view, WalkLimits::with_sectors(VERIFY_CHUNK), true);
    let start_time = Instant::now();

    let (range_start, range_end) = match range {
        Some((start, length)) => {
            if length == 0 {
                return Ok(SectorVerification::default());
            }
            (start, start + length - 1)
        }
        None => (0, image.info().sectors.saturating_sub(1)),
    };

    let mut result = SectorVerification::default();
    let total_requested = range_end - range_start + 1;
    debug!(view = view.kind(), range_start, range_end, "verifying sectors");

    for span in plan.spans() {
        if control.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Span::Sectors { start, count, .. } = *span else {
            // Byte-addressable media carries no per-sector checksums
            continue;
        };
        let span_end = start + count as u64 - 1;
        if span_end < range_start || start > range_end {
            continue;
        }
        let from = start.max(range_start);
        let to = span_end.min(range_end);

        for lba in from..=to {
            let verdict = match image.as_verifiable_sectors() {
                Some(verifiable) => verifiable.verify_sector(lba)?,
                None => None,
            };
            match verdict {
                Some(true) => {}
                Some(false) => result.failing_lbas.push(lba),
                None => result.unknown_lbas.push(lba),
            }
            result.total_sectors += 1;
        }

        if let Some(ref callback) = progress {
            callback(&ProgressEvent::calculate(
                "Verifying",
                result.total_sectors,
                Some(total_requested),
                start_time,
            ));
        }
    }

    Ok(result)
}

/// Combined exit classification for a verification command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Image correct, sectors correct
    NoError,
    /// Image correct, some sectors bad
    CorrectImageBadSectors,
    /// Image correct, sectors carry nothing to verify
    CorrectImageSectorsNotVerified,
    /// Sectors correct, image checksum bad
    CorrectSectorsBadImage,
    /// Image bad and sectors bad
    BadImageBadSectors,
    /// Image bad, sectors carry nothing to verify
    BadImageSectorsNotVerified,
    /// Some sectors bad, image carries nothing to verify
    BadSectorsImageNotVerified,
    /// Sectors correct, image carries nothing to verify
    CorrectSectorsImageNotVerified,
    /// Nothing to verify on either axis
    NotVerifiable,
}

impl ExitStatus {
    /// Merge the whole-image and per-sector tri-states
    pub fn classify(image: VerificationStatus, sectors: VerificationStatus) -> ExitStatus {
        use VerificationStatus::*;
        match (image, sectors) {
            (Correct, Correct) => ExitStatus::NoError,
            (Correct, Incorrect) => ExitStatus::CorrectImageBadSectors,
            (Correct, NotApplicable) => ExitStatus::CorrectImageSectorsNotVerified,
            (Incorrect, Correct) => ExitStatus::CorrectSectorsBadImage,
            (Incorrect, Incorrect) => ExitStatus::BadImageBadSectors,
            (Incorrect, NotApplicable) => ExitStatus::BadImageSectorsNotVerified,
            (NotApplicable, Incorrect) => ExitStatus::BadSectorsImageNotVerified,
            (NotApplicable, Correct) => ExitStatus::CorrectSectorsImageNotVerified,
            (NotApplicable, NotApplicable) => ExitStatus::NotVerifiable,
        }
    }

    /// Process exit code for the CLI
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::NoError => 0,
            ExitStatus::CorrectImageBadSectors => 1,
            ExitStatus::CorrectImageSectorsNotVerified => 2,
            ExitStatus::CorrectSectorsBadImage => 3,
            ExitStatus::BadImageBadSectors => 4,
            ExitStatus::BadImageSectorsNotVerified => 5,
            ExitStatus::BadSectorsImageNotVerified => 6,
            ExitStatus::CorrectSectorsImageNotVerified => 7,
            ExitStatus::NotVerifiable => 8,
        }
    }
}
