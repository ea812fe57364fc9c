//! Core types for MediaForge media images

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Raw CD sector size in bytes (2352), including sync, header, and ECC.
///
/// This value is defined by the CD specification and is not a tunable.
pub const RAW_SECTOR_SIZE: u32 = 2352;

/// Size of one raw interleaved subchannel frame in bytes
pub const SUBCHANNEL_SIZE: u32 = 96;

/// Media families an image can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    /// Audio CD
    Cdda,
    /// Generic CD / CD-ROM
    Cd,
    /// CD-ROM
    CdRom,
    /// CD-R
    CdR,
    /// CD-RW
    CdRw,
    /// Video CD
    VideoCd,
    /// DVD-ROM
    DvdRom,
    /// DVD-R
    DvdR,
    /// DVD-RW
    DvdRw,
    /// Generic hard disk
    GenericHdd,
    /// Flash drive / memory card
    FlashDrive,
    /// Double-density floppy
    FloppyDd,
    /// High-density floppy
    FloppyHd,
    /// Extra-density floppy
    FloppyEd,
    /// DDS tape cartridge
    Dds,
    /// DLT tape cartridge
    Dlt,
    /// LTO tape cartridge
    Lto,
    /// Tape of unknown family
    UnknownTape,
    /// Unknown media
    Unknown,
}

impl MediaType {
    /// True for the CD-like family (the only media that carries subchannel)
    pub fn is_cd(&self) -> bool {
        matches!(
            self,
            MediaType::Cdda
                | MediaType::Cd
                | MediaType::CdRom
                | MediaType::CdR
                | MediaType::CdRw
                | MediaType::VideoCd
        )
    }

    /// True for optical media (CD and DVD families)
    pub fn is_optical(&self) -> bool {
        self.is_cd()
            || matches!(self, MediaType::DvdRom | MediaType::DvdR | MediaType::DvdRw)
    }

    /// True for tape media
    pub fn is_tape(&self) -> bool {
        matches!(
            self,
            MediaType::Dds | MediaType::Dlt | MediaType::Lto | MediaType::UnknownTape
        )
    }

    /// Get a human-readable name for this media type
    pub fn name(&self) -> &'static str {
        match self {
            MediaType::Cdda => "Audio CD",
            MediaType::Cd => "Compact Disc",
            MediaType::CdRom => "CD-ROM",
            MediaType::CdR => "CD-R",
            MediaType::CdRw => "CD-RW",
            MediaType::VideoCd => "Video CD",
            MediaType::DvdRom => "DVD-ROM",
            MediaType::DvdR => "DVD-R",
            MediaType::DvdRw => "DVD-RW",
            MediaType::GenericHdd => "Hard Disk",
            MediaType::FlashDrive => "Flash Drive",
            MediaType::FloppyDd => "DD Floppy",
            MediaType::FloppyHd => "HD Floppy",
            MediaType::FloppyEd => "ED Floppy",
            MediaType::Dds => "DDS Tape",
            MediaType::Dlt => "DLT Tape",
            MediaType::Lto => "LTO Tape",
            MediaType::UnknownTape => "Unknown Tape",
            MediaType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Disc-scoped (medium-scoped) tag kinds. At most one blob per kind per image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaTagKind {
    /// CD table of contents as returned by READ TOC
    CdToc,
    /// CD full TOC (session mode 2)
    CdFullToc,
    /// CD ATIP (recordable media)
    CdAtip,
    /// CD-TEXT
    CdText,
    /// Media catalogue number
    CdMcn,
    /// CD PMA
    CdPma,
    /// DVD physical format information
    DvdPfi,
    /// DVD disc manufacturing information
    DvdDmi,
    /// DVD burst cutting area
    DvdBca,
}

impl MediaTagKind {
    /// Get a human-readable name for this tag kind
    pub fn name(&self) -> &'static str {
        match self {
            MediaTagKind::CdToc => "CD TOC",
            MediaTagKind::CdFullToc => "CD full TOC",
            MediaTagKind::CdAtip => "CD ATIP",
            MediaTagKind::CdText => "CD-TEXT",
            MediaTagKind::CdMcn => "CD MCN",
            MediaTagKind::CdPma => "CD PMA",
            MediaTagKind::DvdPfi => "DVD PFI",
            MediaTagKind::DvdDmi => "DVD DMI",
            MediaTagKind::DvdBca => "DVD BCA",
        }
    }
}

impl fmt::Display for MediaTagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-sector or per-track tag kinds.
///
/// Inline tags live inside the long sector layout and are never transferred
/// independently; out-of-band tags travel as separate streams or records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectorTagKind {
    /// 12-byte sync field (inline)
    CdSectorSync,
    /// 4-byte sector header (inline)
    CdSectorHeader,
    /// Mode 2 sub-header (inline)
    CdSectorSubHeader,
    /// Error detection code (inline)
    CdSectorEdc,
    /// ECC P parity (inline)
    CdSectorEccP,
    /// ECC Q parity (inline)
    CdSectorEccQ,
    /// Whole ECC field (inline)
    CdSectorEcc,
    /// 96-byte interleaved subchannel (out-of-band)
    CdSectorSubchannel,
    /// Per-track control flags (out-of-band, scalar)
    CdTrackFlags,
    /// Per-track ISRC (out-of-band, scalar)
    CdTrackIsrc,
}

impl SectorTagKind {
    /// True for tags physically embedded in the long sector layout
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            SectorTagKind::CdSectorSync
                | SectorTagKind::CdSectorHeader
                | SectorTagKind::CdSectorSubHeader
                | SectorTagKind::CdSectorEdc
                | SectorTagKind::CdSectorEccP
                | SectorTagKind::CdSectorEccQ
                | SectorTagKind::CdSectorEcc
        )
    }

    /// True for tags read and written once per track rather than per sector
    pub fn is_track_scalar(&self) -> bool {
        matches!(self, SectorTagKind::CdTrackFlags | SectorTagKind::CdTrackIsrc)
    }

    /// Get a human-readable name for this tag kind
    pub fn name(&self) -> &'static str {
        match self {
            SectorTagKind::CdSectorSync => "sector sync",
            SectorTagKind::CdSectorHeader => "sector header",
            SectorTagKind::CdSectorSubHeader => "sector sub-header",
            SectorTagKind::CdSectorEdc => "sector EDC",
            SectorTagKind::CdSectorEccP => "sector ECC P",
            SectorTagKind::CdSectorEccQ => "sector ECC Q",
            SectorTagKind::CdSectorEcc => "sector ECC",
            SectorTagKind::CdSectorSubchannel => "subchannel",
            SectorTagKind::CdTrackFlags => "track flags",
            SectorTagKind::CdTrackIsrc => "track ISRC",
        }
    }
}

impl fmt::Display for SectorTagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Track data mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackType {
    /// Red Book audio
    Audio,
    /// Mode 1 data
    CdMode1,
    /// Mode 2 formless
    CdMode2Formless,
    /// Mode 2 form 1
    CdMode2Form1,
    /// Mode 2 form 2
    CdMode2Form2,
    /// Non-CD data track
    Data,
}

impl TrackType {
    /// True for audio tracks
    pub fn is_audio(&self) -> bool {
        matches!(self, TrackType::Audio)
    }
}

/// Subchannel storage variant attached to a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubchannelKind {
    /// No subchannel stored
    None,
    /// 96 bytes per sector, deinterleaved channel-major
    Packed,
    /// 96 bytes per sector, raw interleaved
    Raw,
    /// 16 bytes per sector, Q only
    Q16,
}

/// A track on optical media: a contiguous LBA range with its own mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Track number, ascending across the disc
    pub sequence: u32,
    /// Session this track belongs to
    pub session: u16,
    /// First LBA of the track
    pub start_sector: u64,
    /// Last LBA of the track, inclusive
    pub end_sector: u64,
    /// Pregap length in sectors
    pub pregap: u64,
    /// Data mode
    pub track_type: TrackType,
    /// Raw (long) bytes per sector
    pub raw_bytes_per_sector: u32,
    /// User-data bytes per sector
    pub bytes_per_sector: u32,
    /// Subchannel variant stored for this track
    pub subchannel: SubchannelKind,
    /// Index number to starting LBA; index 0 may precede `start_sector`
    pub indexes: BTreeMap<u16, i64>,
}

impl Track {
    /// Create a new track with the given sequence and LBA range
    pub fn new(sequence: u32, start_sector: u64, end_sector: u64, track_type: TrackType) -> Self {
        Self {
            sequence,
            session: 1,
            start_sector,
            end_sector,
            pregap: 0,
            track_type,
            raw_bytes_per_sector: RAW_SECTOR_SIZE,
            bytes_per_sector: if track_type.is_audio() { RAW_SECTOR_SIZE } else { 2048 },
            subchannel: SubchannelKind::None,
            indexes: BTreeMap::new(),
        }
    }

    /// Set the session number
    pub fn with_session(mut self, session: u16) -> Self {
        self.session = session;
        self
    }

    /// Set the pregap length
    pub fn with_pregap(mut self, pregap: u64) -> Self {
        self.pregap = pregap;
        self
    }

    /// Set sector sizes
    pub fn with_sector_sizes(mut self, raw: u32, cooked: u32) -> Self {
        self.raw_bytes_per_sector = raw;
        self.bytes_per_sector = cooked;
        self
    }

    /// Set the subchannel variant
    pub fn with_subchannel(mut self, subchannel: SubchannelKind) -> Self {
        self.subchannel = subchannel;
        self
    }

    /// Add an index entry
    pub fn with_index(mut self, index: u16, lba: i64) -> Self {
        self.indexes.insert(index, lba);
        self
    }

    /// Number of sectors in this track, inclusive of both ends
    pub fn sector_count(&self) -> u64 {
        self.end_sector - self.start_sector + 1
    }

    /// True if the LBA falls within this track
    pub fn contains(&self, lba: u64) -> bool {
        lba >= self.start_sector && lba <= self.end_sector
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Track {:2} [session {}] LBA {}..={} ({:?})",
            self.sequence, self.session, self.start_sector, self.end_sector, self.track_type
        )
    }
}

/// Validate a track list: ascending sequence, sane ranges, no overlap
/// between tracks of the same session.
pub fn validate_track_list(tracks: &[Track]) -> Result<()> {
    for window in tracks.windows(2) {
        if window[1].sequence <= window[0].sequence {
            return Err(Error::invalid_image(format!(
                "track {} listed after track {}",
                window[1].sequence, window[0].sequence
            )));
        }
    }

    for track in tracks {
        if track.start_sector > track.end_sector {
            return Err(Error::invalid_image(format!(
                "track {} starts at {} but ends at {}",
                track.sequence, track.start_sector, track.end_sector
            )));
        }
    }

    for (i, a) in tracks.iter().enumerate() {
        for b in tracks.iter().skip(i + 1) {
            if a.session == b.session
                && a.start_sector <= b.end_sector
                && b.start_sector <= a.end_sector
            {
                return Err(Error::invalid_image(format!(
                    "tracks {} and {} overlap in session {}",
                    a.sequence, b.sequence, a.session
                )));
            }
        }
    }

    Ok(())
}

/// A file on tape media: a contiguous block range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapeFile {
    /// File number, ascending along the tape
    pub file: u64,
    /// Partition the file lives in
    pub partition: u8,
    /// First block of the file
    pub first_block: u64,
    /// Last block of the file, inclusive
    pub last_block: u64,
}

impl TapeFile {
    /// Create a new tape file entry
    pub fn new(file: u64, partition: u8, first_block: u64, last_block: u64) -> Self {
        Self { file, partition, first_block, last_block }
    }

    /// Number of blocks in this file
    pub fn block_count(&self) -> u64 {
        self.last_block - self.first_block + 1
    }
}

/// A tape partition: a block range holding zero or more files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapePartition {
    /// Partition number
    pub number: u8,
    /// First block of the partition
    pub first_block: u64,
    /// Last block of the partition, inclusive
    pub last_block: u64,
}

/// Cylinder/head/sector geometry for block media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub cylinders: u32,
    pub heads: u32,
    pub sectors_per_track: u32,
}

impl Geometry {
    /// Create a new geometry
    pub fn new(cylinders: u32, heads: u32, sectors_per_track: u32) -> Self {
        Self { cylinders, heads, sectors_per_track }
    }

    /// Total sectors described by this geometry
    pub fn total_sectors(&self) -> u64 {
        self.cylinders as u64 * self.heads as u64 * self.sectors_per_track as u64
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cylinders, self.heads, self.sectors_per_track)
    }
}

/// Summary information about an opened image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Number of addressable sectors (or blocks)
    pub sectors: u64,
    /// Sector (block) size in bytes
    pub sector_size: u32,
    /// Media family
    pub media_type: MediaType,
    /// Media tags the image can supply
    pub readable_media_tags: Vec<MediaTagKind>,
    /// Sector tags the image can supply
    pub readable_sector_tags: Vec<SectorTagKind>,
    /// Application that created the image, if recorded
    pub application: Option<String>,
    /// Version of that application, if recorded
    pub application_version: Option<String>,
}

impl ImageInfo {
    /// Create info for a plain block image
    pub fn new(sectors: u64, sector_size: u32, media_type: MediaType) -> Self {
        Self {
            sectors,
            sector_size,
            media_type,
            readable_media_tags: Vec::new(),
            readable_sector_tags: Vec::new(),
            application: None,
            application_version: None,
        }
    }

    /// Set the readable media tag kinds
    pub fn with_media_tags(mut self, tags: Vec<MediaTagKind>) -> Self {
        self.readable_media_tags = tags;
        self
    }

    /// Set the readable sector tag kinds
    pub fn with_sector_tags(mut self, tags: Vec<SectorTagKind>) -> Self {
        self.readable_sector_tags = tags;
        self
    }

    /// Set the creating application
    pub fn with_application(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.application = Some(name.into());
        self.application_version = Some(version.into());
        self
    }
}

/// One dump-history entry propagated during conversion finalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpRecord {
    /// Software that produced the dump
    pub software: String,
    /// Software version
    pub version: String,
    /// When the dump was taken
    pub when: DateTime<Utc>,
    /// First sector covered
    pub start: u64,
    /// Last sector covered, inclusive
    pub end: u64,
}

/// Format-agnostic metadata carried between images
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Person or tool that created the image
    pub creator: Option<String>,
    /// Free-form comments
    pub comments: Option<String>,
    /// Media title
    pub media_title: Option<String>,
    /// Media serial number
    pub media_serial: Option<String>,
}

impl ImageMetadata {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.creator.is_none()
            && self.comments.is_none()
            && self.media_title.is_none()
            && self.media_serial.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_families() {
        assert!(MediaType::CdRom.is_cd());
        assert!(MediaType::CdRom.is_optical());
        assert!(!MediaType::CdRom.is_tape());
        assert!(MediaType::DvdRom.is_optical());
        assert!(!MediaType::DvdRom.is_cd());
        assert!(MediaType::Lto.is_tape());
        assert!(!MediaType::GenericHdd.is_optical());
    }

    #[test]
    fn test_inline_tags() {
        assert!(SectorTagKind::CdSectorEcc.is_inline());
        assert!(SectorTagKind::CdSectorSync.is_inline());
        assert!(!SectorTagKind::CdSectorSubchannel.is_inline());
        assert!(!SectorTagKind::CdTrackIsrc.is_inline());
        assert!(SectorTagKind::CdTrackFlags.is_track_scalar());
        assert!(!SectorTagKind::CdSectorSubchannel.is_track_scalar());
    }

    #[test]
    fn test_track_helpers() {
        let track = Track::new(1, 0, 999, TrackType::Audio)
            .with_pregap(150)
            .with_index(1, 0);
        assert_eq!(track.sector_count(), 1000);
        assert!(track.contains(0));
        assert!(track.contains(999));
        assert!(!track.contains(1000));
        assert_eq!(track.bytes_per_sector, RAW_SECTOR_SIZE);
    }

    #[test]
    fn test_validate_track_list_ok() {
        let tracks = vec![
            Track::new(1, 0, 999, TrackType::Audio),
            Track::new(2, 1000, 1499, TrackType::CdMode1),
        ];
        assert!(validate_track_list(&tracks).is_ok());
    }

    #[test]
    fn test_validate_track_list_overlap() {
        let tracks = vec![
            Track::new(1, 0, 1000, TrackType::Audio),
            Track::new(2, 1000, 1499, TrackType::CdMode1),
        ];
        assert!(validate_track_list(&tracks).is_err());
    }

    #[test]
    fn test_validate_track_list_order() {
        let tracks = vec![
            Track::new(2, 1000, 1499, TrackType::CdMode1),
            Track::new(1, 0, 999, TrackType::Audio),
        ];
        assert!(validate_track_list(&tracks).is_err());
    }

    #[test]
    fn test_validate_track_list_inverted_range() {
        let tracks = vec![Track::new(1, 10, 5, TrackType::Data)];
        assert!(validate_track_list(&tracks).is_err());
    }

    #[test]
    fn test_tape_file() {
        let file = TapeFile::new(1, 0, 100, 199);
        assert_eq!(file.block_count(), 100);
    }

    #[test]
    fn test_geometry() {
        let geometry = Geometry::new(80, 2, 18);
        assert_eq!(geometry.total_sectors(), 2880);
        assert_eq!(geometry.to_string(), "80/2/18");
    }
}
