//! Multi-algorithm checksum engine
//!
//! An accumulator is created per scope (one for the whole media, one per
//! track or tape file), fed chunks in ascending address order, and
//! finalized exactly once. Digest emission follows the fixed enumeration
//! order of [`ChecksumKind`], never insertion order.

pub mod algs;
pub mod spamsum;

use crate::progress::{ProgressCallback, ProgressEvent, RunControl};
use crate::walker::{fetch, ChunkPlan, SegmentId, WalkLimits};
use algs::{Adler32, Crc16, Crc64, Fletcher16, Fletcher32};
use md5::Md5;
use mediaforge_core::{Error, MediaImage, MediaView, Result};
use sha1::Sha1;
use sha2::{Digest as _, Sha256, Sha384, Sha512};
use spamsum::SpamSum;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::debug;

/// Supported checksum algorithms, in fixed emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChecksumKind {
    Adler32,
    Crc16,
    Crc32,
    Crc64,
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Fletcher16,
    Fletcher32,
    SpamSum,
}

impl ChecksumKind {
    /// All algorithms, in emission order
    pub fn all() -> [ChecksumKind; 12] {
        [
            ChecksumKind::Adler32,
            ChecksumKind::Crc16,
            ChecksumKind::Crc32,
            ChecksumKind::Crc64,
            ChecksumKind::Md5,
            ChecksumKind::Sha1,
            ChecksumKind::Sha256,
            ChecksumKind::Sha384,
            ChecksumKind::Sha512,
            ChecksumKind::Fletcher16,
            ChecksumKind::Fletcher32,
            ChecksumKind::SpamSum,
        ]
    }

    /// Get the algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumKind::Adler32 => "adler32",
            ChecksumKind::Crc16 => "crc16",
            ChecksumKind::Crc32 => "crc32",
            ChecksumKind::Crc64 => "crc64",
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha384 => "sha384",
            ChecksumKind::Sha512 => "sha512",
            ChecksumKind::Fletcher16 => "fletcher16",
            ChecksumKind::Fletcher32 => "fletcher32",
            ChecksumKind::SpamSum => "spamsum",
        }
    }

    /// Look an algorithm up by name
    pub fn from_name(name: &str) -> Option<ChecksumKind> {
        ChecksumKind::all()
            .into_iter()
            .find(|kind| kind.name() == name.to_lowercase())
    }
}

/// A set of requested algorithms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumSet {
    kinds: BTreeSet<ChecksumKind>,
}

impl ChecksumSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set with every algorithm enabled
    pub fn all() -> Self {
        ChecksumKind::all().into_iter().collect()
    }

    /// Add an algorithm
    pub fn insert(&mut self, kind: ChecksumKind) {
        self.kinds.insert(kind);
    }

    /// True when the algorithm is requested
    pub fn contains(&self, kind: ChecksumKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// True when no algorithm is requested
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Iterate requested algorithms in emission order
    pub fn iter(&self) -> impl Iterator<Item = ChecksumKind> + '_ {
        self.kinds.iter().copied()
    }
}

impl FromIterator<ChecksumKind> for ChecksumSet {
    fn from_iter<I: IntoIterator<Item = ChecksumKind>>(iter: I) -> Self {
        Self { kinds: iter.into_iter().collect() }
    }
}

/// One finalized digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumDigest {
    /// Algorithm that produced the digest
    pub kind: ChecksumKind,
    /// Rendered digest (lowercase hex, or the SpamSum signature)
    pub value: String,
}

/// Incremental multi-algorithm accumulator for one scope.
///
/// Streaming: never holds more than the chunk currently being absorbed.
pub struct ChecksumAccumulator {
    adler32: Option<Adler32>,
    crc16: Option<Crc16>,
    crc32: Option<crc32fast::Hasher>,
    crc64: Option<Crc64>,
    md5: Option<Md5>,
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
    sha384: Option<Sha384>,
    sha512: Option<Sha512>,
    fletcher16: Option<Fletcher16>,
    fletcher32: Option<Fletcher32>,
    spamsum: Option<SpamSum>,
    bytes_processed: u64,
}

impl ChecksumAccumulator {
    /// Create an accumulator for the requested algorithms
    pub fn new(set: &ChecksumSet) -> Self {
        Self {
            adler32: set.contains(ChecksumKind::Adler32).then(Adler32::new),
            crc16: set.contains(ChecksumKind::Crc16).then(Crc16::new),
            crc32: set.contains(ChecksumKind::Crc32).then(crc32fast::Hasher::new),
            crc64: set.contains(ChecksumKind::Crc64).then(Crc64::new),
            md5: set.contains(ChecksumKind::Md5).then(Md5::new),
            sha1: set.contains(ChecksumKind::Sha1).then(Sha1::new),
            sha256: set.contains(ChecksumKind::Sha256).then(Sha256::new),
            sha384: set.contains(ChecksumKind::Sha384).then(Sha384::new),
            sha512: set.contains(ChecksumKind::Sha512).then(Sha512::new),
            fletcher16: set.contains(ChecksumKind::Fletcher16).then(Fletcher16::new),
            fletcher32: set.contains(ChecksumKind::Fletcher32).then(Fletcher32::new),
            spamsum: set.contains(ChecksumKind::SpamSum).then(SpamSum::new),
            bytes_processed: 0,
        }
    }

    /// Feed one chunk
    pub fn update(&mut self, data: &[u8]) {
        if let Some(ref mut ctx) = self.adler32 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.crc16 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.crc32 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.crc64 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.md5 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.sha1 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.sha256 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.sha384 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.sha512 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.fletcher16 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.fletcher32 {
            ctx.update(data);
        }
        if let Some(ref mut ctx) = self.spamsum {
            ctx.update(data);
        }
        self.bytes_processed += data.len() as u64;
    }

    /// Finalize and emit digests in enumeration order
    pub fn finalize(self) -> Vec<ChecksumDigest> {
        let mut digests = Vec::new();

        if let Some(ctx) = self.adler32 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Adler32,
                value: format!("{:08x}", ctx.finalize()),
            });
        }
        if let Some(ctx) = self.crc16 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Crc16,
                value: format!("{:04x}", ctx.finalize()),
            });
        }
        if let Some(ctx) = self.crc32 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Crc32,
                value: format!("{:08x}", ctx.finalize()),
            });
        }
        if let Some(ctx) = self.crc64 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Crc64,
                value: format!("{:016x}", ctx.finalize()),
            });
        }
        if let Some(ctx) = self.md5 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Md5,
                value: hex::encode(ctx.finalize()),
            });
        }
        if let Some(ctx) = self.sha1 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Sha1,
                value: hex::encode(ctx.finalize()),
            });
        }
        if let Some(ctx) = self.sha256 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Sha256,
                value: hex::encode(ctx.finalize()),
            });
        }
        if let Some(ctx) = self.sha384 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Sha384,
                value: hex::encode(ctx.finalize()),
            });
        }
        if let Some(ctx) = self.sha512 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Sha512,
                value: hex::encode(ctx.finalize()),
            });
        }
        if let Some(ctx) = self.fletcher16 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Fletcher16,
                value: format!("{:04x}", ctx.finalize()),
            });
        }
        if let Some(ctx) = self.fletcher32 {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::Fletcher32,
                value: format!("{:08x}", ctx.finalize()),
            });
        }
        if let Some(ctx) = self.spamsum {
            digests.push(ChecksumDigest {
                kind: ChecksumKind::SpamSum,
                value: ctx.finalize(),
            });
        }

        digests
    }

    /// Get bytes processed so far
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }
}

/// Options for one checksum run
#[derive(Debug, Clone)]
pub struct ChecksumOptions {
    /// Requested algorithms
    pub set: ChecksumSet,
    /// Emit a digest list for the whole media
    pub whole_media: bool,
    /// Emit a digest list per track or tape file
    pub per_segment: bool,
    /// Chunk limits for the walk
    pub limits: WalkLimits,
}

impl Default for ChecksumOptions {
    fn default() -> Self {
        Self {
            set: ChecksumSet::all(),
            whole_media: true,
            per_segment: false,
            limits: WalkLimits::default(),
        }
    }
}

/// Digests for one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentChecksum {
    /// Track or file the digests cover
    pub segment: SegmentId,
    /// Digest list in enumeration order
    pub digests: Vec<ChecksumDigest>,
}

/// Result of one checksum run
#[derive(Debug, Clone, Default)]
pub struct ChecksumReport {
    /// Per-segment digests, ascending by segment sequence
    pub segments: Vec<SegmentChecksum>,
    /// Whole-media digests, if requested
    pub whole_media: Option<Vec<ChecksumDigest>>,
}

/// Checksum an image.
///
/// Chunks are fed in ascending address order. Per-segment accumulators are
/// created fresh per segment and dropped after emission; unsegmented ranges
/// feed only the whole-media accumulator. Any read error aborts the run
/// with no digests.
pub fn checksum_media(
    image: &mut dyn MediaImage,
    options: &ChecksumOptions,
    progress: Option<ProgressCallback>,
    control: &RunControl,
) -> Result<ChecksumReport> {
    let view = MediaView::resolve(image);
    let plan = ChunkPlan::for_view(&view, options.limits, options.whole_media);
    let total = plan.total_units();
    let start = Instant::now();
    debug!(view = view.kind(), chunks = plan.spans().len(), "checksum walk planned");

    let mut whole = options
        .whole_media
        .then(|| ChecksumAccumulator::new(&options.set));
    let mut segment_state: Option<(SegmentId, ChecksumAccumulator)> = None;
    let mut report = ChecksumReport::default();
    let mut done = 0u64;

    for span in plan.spans() {
        if control.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if options.per_segment {
            let entering = span.segment();
            let leaving = match (&segment_state, entering) {
                (Some((current, _)), Some(next)) => *current != next,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if leaving {
                if let Some((segment, accumulator)) = segment_state.take() {
                    report.segments.push(SegmentChecksum {
                        segment,
                        digests: accumulator.finalize(),
                    });
                }
            }
            if segment_state.is_none() {
                if let Some(segment) = entering {
                    segment_state = Some((segment, ChecksumAccumulator::new(&options.set)));
                }
            }
        }

        let data = fetch(image, *span, false)?;

        if let Some(ref mut accumulator) = whole {
            accumulator.update(&data);
        }
        if let Some((_, ref mut accumulator)) = segment_state {
            accumulator.update(&data);
        }

        done += span.units();
        if let Some(ref callback) = progress {
            callback(&ProgressEvent::calculate("Checksumming", done, Some(total), start));
        }
    }

    if let Some((segment, accumulator)) = segment_state.take() {
        report.segments.push(SegmentChecksum {
            segment,
            digests: accumulator.finalize(),
        });
    }

    if let Some(accumulator) = whole {
        report.whole_media = Some(accumulator.finalize());
    }

    Ok(report)
}
