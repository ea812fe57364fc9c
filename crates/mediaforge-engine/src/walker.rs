//! Topology walker
//!
//! Enumerates an image's addressable units in deterministic ascending order,
//! batched into fixed-size chunks. A chunk never spans two tracks or two
//! tape files; file-less tape ranges are surfaced as unsegmented spans.

use mediaforge_core::{ByteAddressableImage, Error, MediaImage, MediaView, Result};

/// Chunk size limits for one walk
#[derive(Debug, Clone, Copy)]
pub struct WalkLimits {
    /// Maximum sectors (or tape blocks) per chunk
    pub sectors: u32,
    /// Maximum bytes per chunk for byte-addressable media
    pub bytes: u32,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self { sectors: 256, bytes: 65536 }
    }
}

impl WalkLimits {
    /// Limits with a custom sector chunk size
    pub fn with_sectors(sectors: u32) -> Self {
        Self { sectors, ..Self::default() }
    }
}

/// Which segment a span belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SegmentId {
    /// Optical track, by sequence number
    Track(u32),
    /// Tape file, by file number
    File(u64),
}

/// One chunk of addressable units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// A run of sectors (or tape blocks)
    Sectors {
        start: u64,
        count: u32,
        /// Segment the run belongs to; `None` for unsegmented ranges
        segment: Option<SegmentId>,
    },
    /// A run of raw bytes on byte-addressable media
    Bytes { offset: u64, length: u32 },
}

impl Span {
    /// Number of addressable units covered by this span
    pub fn units(&self) -> u64 {
        match self {
            Span::Sectors { count, .. } => *count as u64,
            Span::Bytes { length, .. } => *length as u64,
        }
    }

    /// Segment this span belongs to, if any
    pub fn segment(&self) -> Option<SegmentId> {
        match self {
            Span::Sectors { segment, .. } => *segment,
            Span::Bytes { .. } => None,
        }
    }
}

/// A deterministic chunk plan over one view
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    spans: Vec<Span>,
}

impl ChunkPlan {
    /// Build the plan for a resolved view.
    ///
    /// `include_orphans` adds file-less tape ranges (gaps between files and
    /// the tail after the last file); those spans carry no segment id.
    pub fn for_view(view: &MediaView, limits: WalkLimits, include_orphans: bool) -> Self {
        let mut spans = Vec::new();

        match view {
            MediaView::Optical { tracks } => {
                for track in tracks {
                    push_sector_runs(
                        &mut spans,
                        track.start_sector,
                        track.end_sector,
                        limits.sectors,
                        Some(SegmentId::Track(track.sequence)),
                    );
                }
            }
            MediaView::Tape { files, blocks, .. } => {
                let mut previous_end: Option<u64> = None;
                for file in files {
                    if include_orphans {
                        let gap_start = previous_end.map(|e| e + 1).unwrap_or(0);
                        if file.first_block > gap_start {
                            push_sector_runs(
                                &mut spans,
                                gap_start,
                                file.first_block - 1,
                                limits.sectors,
                                None,
                            );
                        }
                    }
                    push_sector_runs(
                        &mut spans,
                        file.first_block,
                        file.last_block,
                        limits.sectors,
                        Some(SegmentId::File(file.file)),
                    );
                    previous_end = Some(file.last_block);
                }
                if include_orphans {
                    let tail_start = previous_end.map(|e| e + 1).unwrap_or(0);
                    if *blocks > tail_start {
                        push_sector_runs(&mut spans, tail_start, blocks - 1, limits.sectors, None);
                    }
                }
            }
            MediaView::ByteAddressable { length } => {
                let mut offset = 0u64;
                while offset < *length {
                    let take = (*length - offset).min(limits.bytes as u64) as u32;
                    spans.push(Span::Bytes { offset, length: take });
                    offset += take as u64;
                }
            }
            MediaView::Block { sectors } => {
                if *sectors > 0 {
                    push_sector_runs(&mut spans, 0, sectors - 1, limits.sectors, None);
                }
            }
        }

        Self { spans }
    }

    /// The planned spans, in ascending address order
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Total addressable units covered by the plan
    pub fn total_units(&self) -> u64 {
        self.spans.iter().map(|s| s.units()).sum()
    }
}

fn push_sector_runs(
    spans: &mut Vec<Span>,
    start: u64,
    end: u64,
    chunk: u32,
    segment: Option<SegmentId>,
) {
    let chunk = chunk.max(1);
    let mut position = start;
    while position <= end {
        let count = (end - position + 1).min(chunk as u64) as u32;
        spans.push(Span::Sectors { start: position, count, segment });
        position += count as u64;
    }
}

/// Fetch the bytes for one span.
///
/// `long` selects long sector reads; it is ignored for byte spans. Any
/// error aborts the caller's run.
pub fn fetch(image: &mut dyn MediaImage, span: Span, long: bool) -> Result<Vec<u8>> {
    match span {
        Span::Sectors { start, count, .. } => {
            if long {
                image.read_sectors_long(start, count)
            } else {
                image.read_sectors(start, count)
            }
        }
        Span::Bytes { offset, length } => match image.as_byte_addressable() {
            Some(linear) => linear.read_bytes(offset, length as usize),
            None => Err(Error::invalid_operation(
                "byte span on media without a byte-addressable view",
            )),
        },
    }
}
