//! Capability view resolution
//!
//! One view is selected per run, in a fixed priority order: optical with
//! tracks, then tape with files, then byte-addressable linear, then flat
//! block. The order is load-bearing; an optical image with tracks is never
//! treated as flat block even though it also satisfies the block view.

use crate::traits::{ByteAddressableImage, MediaImage, OpticalImage, TapeImage};
use crate::types::{TapeFile, TapePartition, Track};

/// The topology selected for one algorithm run.
///
/// Carries an owned snapshot of the segmentation tables so that algorithm
/// loops never re-enter format-specific decoding for topology questions.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaView {
    /// Track-bounded optical media
    Optical {
        /// Track list, ascending by sequence
        tracks: Vec<Track>,
    },
    /// File-bounded tape media
    Tape {
        /// Tape files, ascending by file number
        files: Vec<TapeFile>,
        /// Tape partitions
        partitions: Vec<TapePartition>,
        /// Total block count of the tape
        blocks: u64,
    },
    /// Byte-addressable linear media
    ByteAddressable {
        /// Addressable length in bytes
        length: u64,
    },
    /// Flat block media
    Block {
        /// Total sector count
        sectors: u64,
    },
}

impl MediaView {
    /// Resolve the view for an opened image, applying the priority order.
    pub fn resolve(image: &mut dyn MediaImage) -> MediaView {
        if let Some(optical) = image.as_optical() {
            let tracks = optical.tracks().to_vec();
            if !tracks.is_empty() {
                return MediaView::Optical { tracks };
            }
        }

        if let Some(tape) = image.as_tape() {
            if tape.is_tape() && !tape.files().is_empty() {
                let files = tape.files().to_vec();
                let partitions = tape.partitions().to_vec();
                let blocks = tape.info().sectors;
                return MediaView::Tape { files, partitions, blocks };
            }
        }

        if let Some(linear) = image.as_byte_addressable() {
            let length = linear.byte_length();
            return MediaView::ByteAddressable { length };
        }

        MediaView::Block { sectors: image.info().sectors }
    }

    /// Short name of the selected topology
    pub fn kind(&self) -> &'static str {
        match self {
            MediaView::Optical { .. } => "optical",
            MediaView::Tape { .. } => "tape",
            MediaView::ByteAddressable { .. } => "byte-addressable",
            MediaView::Block { .. } => "block",
        }
    }

    /// Total addressable units (sectors, blocks, or bytes)
    pub fn total_units(&self) -> u64 {
        match self {
            MediaView::Optical { tracks } => {
                tracks.iter().map(|t| t.sector_count()).sum()
            }
            MediaView::Tape { blocks, .. } => *blocks,
            MediaView::ByteAddressable { length } => *length,
            MediaView::Block { sectors } => *sectors,
        }
    }
}
