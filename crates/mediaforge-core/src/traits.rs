//! Capability traits for MediaForge images and format plugins

use crate::error::{Error, Result};
use crate::types::{
    DumpRecord, Geometry, ImageInfo, ImageMetadata, MediaTagKind, MediaType, SectorTagKind,
    TapeFile, TapePartition, Track,
};
use std::path::Path;

/// Base trait every opened image implements.
///
/// Richer topologies are exposed through the `as_*` accessors; an image
/// that implements none of them is treated as flat block media.
pub trait MediaImage: Send {
    /// Get a human-readable identifier for this image format
    fn identify(&self) -> &str;

    /// Get summary information about the image
    fn info(&self) -> &ImageInfo;

    /// Read `count` sectors of user data starting at `start`
    fn read_sectors(&mut self, start: u64, count: u32) -> Result<Vec<u8>>;

    /// Read `count` long sectors (user data plus inline tags) starting at `start`
    fn read_sectors_long(&mut self, start: u64, count: u32) -> Result<Vec<u8>> {
        self.read_sectors(start, count)
    }

    /// Read a disc-scoped tag
    fn read_media_tag(&mut self, kind: MediaTagKind) -> Result<Vec<u8>> {
        Err(Error::tag_not_present(kind.name()))
    }

    /// Read a per-sector tag for a sector range
    fn read_sector_tag(&mut self, _start: u64, _count: u32, kind: SectorTagKind) -> Result<Vec<u8>> {
        Err(Error::tag_not_present(kind.name()))
    }

    /// Read a scalar per-track tag (flags, ISRC)
    fn read_track_tag(&mut self, _track: u32, kind: SectorTagKind) -> Result<Vec<u8>> {
        Err(Error::tag_not_present(kind.name()))
    }

    /// C/H/S geometry for block media, when known
    fn geometry(&self) -> Option<Geometry> {
        None
    }

    /// Format-agnostic metadata carried by the image
    fn metadata(&self) -> ImageMetadata {
        ImageMetadata::default()
    }

    /// Dump-history records carried by the image
    fn dump_records(&self) -> Vec<DumpRecord> {
        Vec::new()
    }

    /// Optical view, present iff the image exposes a non-empty track list
    fn as_optical(&mut self) -> Option<&mut dyn OpticalImage> {
        None
    }

    /// Tape view, present iff the image is a tape with a non-empty file list
    fn as_tape(&mut self) -> Option<&mut dyn TapeImage> {
        None
    }

    /// Byte-addressable linear view
    fn as_byte_addressable(&mut self) -> Option<&mut dyn ByteAddressableImage> {
        None
    }

    /// Whole-image verification capability
    fn as_verifiable(&mut self) -> Option<&mut dyn VerifiableImage> {
        None
    }

    /// Per-sector verification capability
    fn as_verifiable_sectors(&mut self) -> Option<&mut dyn VerifiableSectorsImage> {
        None
    }
}

/// Track-bounded optical media
pub trait OpticalImage: MediaImage {
    /// Get the track list, ascending by sequence
    fn tracks(&self) -> &[Track];
}

/// File-bounded tape media
pub trait TapeImage: MediaImage {
    /// True when the image really describes a tape
    fn is_tape(&self) -> bool;

    /// Get the tape file list, ascending by file number
    fn files(&self) -> &[TapeFile];

    /// Get the tape partition list
    fn partitions(&self) -> &[TapePartition];
}

/// Byte-addressable linear media
pub trait ByteAddressableImage: MediaImage {
    /// Total addressable length in bytes
    fn byte_length(&self) -> u64;

    /// Read `count` bytes starting at `offset`
    fn read_bytes(&mut self, offset: u64, count: usize) -> Result<Vec<u8>>;
}

/// Whole-image verification against embedded checksum metadata
pub trait VerifiableImage {
    /// Verify the whole image. `None` means no embedded checksum exists.
    fn verify_media_image(&mut self) -> Result<Option<bool>>;
}

/// Per-sector verification against embedded checksums/ECC
pub trait VerifiableSectorsImage {
    /// Verify one sector. `None` means the sector carries no embedded checksum.
    fn verify_sector(&mut self, lba: u64) -> Result<Option<bool>>;
}

/// Write side of a destination image created by a format plugin
pub trait WritableImage: Send {
    /// Get a human-readable identifier for this image format
    fn identify(&self) -> &str;

    /// Write `count` sectors of user data starting at `start`
    fn write_sectors(&mut self, start: u64, count: u32, data: &[u8]) -> Result<()>;

    /// Write `count` long sectors starting at `start`
    fn write_sectors_long(&mut self, start: u64, count: u32, data: &[u8]) -> Result<()> {
        self.write_sectors(start, count, data)
    }

    /// Store a disc-scoped tag
    fn write_media_tag(&mut self, kind: MediaTagKind, data: &[u8]) -> Result<()>;

    /// Store a per-sector tag for a sector range
    fn write_sector_tag(&mut self, start: u64, count: u32, kind: SectorTagKind, data: &[u8])
        -> Result<()>;

    /// Store a scalar per-track tag (flags, ISRC)
    fn write_track_tag(&mut self, track: u32, kind: SectorTagKind, data: &[u8]) -> Result<()>;

    /// Push the full track list. Destinations may pre-allocate per-track
    /// structures, so this must happen before any sector write, and again
    /// whenever the list changes mid-run.
    fn set_tracks(&mut self, tracks: &[Track]) -> Result<()>;

    /// Record a tape file entry
    fn add_file(&mut self, file: TapeFile) -> Result<()> {
        let _ = file;
        Err(Error::unsupported("destination does not store tape files"))
    }

    /// Record a tape partition entry
    fn add_partition(&mut self, partition: TapePartition) -> Result<()> {
        let _ = partition;
        Err(Error::unsupported("destination does not store tape partitions"))
    }

    /// Set C/H/S geometry for block media
    fn set_geometry(&mut self, geometry: Geometry) -> Result<()> {
        let _ = geometry;
        Err(Error::unsupported("destination does not store geometry"))
    }

    /// Store format-agnostic metadata
    fn set_metadata(&mut self, metadata: &ImageMetadata) -> Result<()> {
        let _ = metadata;
        Ok(())
    }

    /// Append a dump-history record
    fn add_dump_record(&mut self, record: &DumpRecord) -> Result<()> {
        let _ = record;
        Ok(())
    }

    /// Flush and finish the image. Must be called exactly once.
    fn close(&mut self) -> Result<()>;
}

/// A format plugin: opens existing images and creates new ones.
pub trait ImageFormat: Send + Sync {
    /// Full format name, e.g. "MediaForge Image"
    fn name(&self) -> &'static str;

    /// Short identifier, e.g. "mfi"
    fn id(&self) -> &'static str;

    /// File extensions this format claims, lowercase without dot
    fn extensions(&self) -> &'static [&'static str];

    /// True when this plugin can create destination images
    fn can_write(&self) -> bool {
        false
    }

    /// Cheap magic-byte check; must not fail on short or foreign files
    fn sniff(&self, path: &Path) -> Result<bool>;

    /// Open an existing image for reading
    fn open(&self, path: &Path) -> Result<Box<dyn MediaImage>>;

    /// Media types a destination of this format can describe
    fn supported_media_types(&self) -> &'static [MediaType];

    /// Media tag kinds a destination of this format can store
    fn supported_media_tags(&self) -> &'static [MediaTagKind] {
        &[]
    }

    /// Sector tag kinds a destination of this format can store
    fn supported_sector_tags(&self) -> &'static [SectorTagKind] {
        &[]
    }

    /// Create a new writable image
    fn create(
        &self,
        _path: &Path,
        _media_type: MediaType,
        _sectors: u64,
        _sector_size: u32,
    ) -> Result<Box<dyn WritableImage>> {
        Err(Error::unsupported(self.name()))
    }
}
