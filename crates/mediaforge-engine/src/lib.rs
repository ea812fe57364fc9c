//! # MediaForge Engine
//!
//! The sector-topology processing engine: checksumming, conversion, and
//! verification over the MediaForge capability model.
//!
//! This crate provides:
//! - **Walker**: deterministic chunk plans per topology (tracks, tape
//!   files, linear bytes, flat blocks)
//! - **Checksum**: incremental multi-algorithm digests, whole-media and
//!   per-segment
//! - **Convert**: topology-aware copy into a new destination image,
//!   including subchannel reconstruction and synthesis
//! - **Verify**: whole-image and per-sector checks with tri-state results
//!
//! ## Example
//!
//! ```rust,no_run
//! use mediaforge_engine::checksum::{checksum_media, ChecksumOptions};
//! use mediaforge_engine::progress::RunControl;
//! use mediaforge_formats::Registry;
//! use std::path::Path;
//!
//! let registry = Registry::with_builtin();
//! let mut image = registry.open(Path::new("disc.mfi")).unwrap();
//! let report = checksum_media(
//!     image.as_mut(),
//!     &ChecksumOptions::default(),
//!     None,
//!     &RunControl::new(),
//! )
//! .unwrap();
//! for digest in report.whole_media.unwrap() {
//!     println!("{}: {}", digest.kind.name(), digest.value);
//! }
//! ```

pub mod checksum;
pub mod convert;
pub mod progress;
pub mod verify;
pub mod walker;

pub use checksum::{
    checksum_media, ChecksumAccumulator, ChecksumDigest, ChecksumKind, ChecksumOptions,
    ChecksumReport, ChecksumSet, SegmentChecksum,
};
pub use convert::{convert_media, ConvertOptions, ConvertSummary};
pub use progress::{ProgressCallback, ProgressEvent, RunControl};
pub use verify::{
    verify_image, verify_sectors, ExitStatus, SectorVerification, VerificationStatus,
};
pub use walker::{fetch, ChunkPlan, SegmentId, Span, WalkLimits};
