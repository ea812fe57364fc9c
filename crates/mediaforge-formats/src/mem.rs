//! In-memory scratch images
//!
//! Owned-buffer images for staging and testing. Builders exist for every
//! topology the engine understands; reads never touch the filesystem.

use mediaforge_core::{
    ByteAddressableImage, Error, ImageInfo, MediaImage, MediaTagKind, MediaType, OpticalImage,
    Result, SectorTagKind, TapeFile, TapeImage, TapePartition, Track, VerifiableImage,
    VerifiableSectorsImage,
};
use std::collections::BTreeMap;

/// An image held entirely in memory.
pub struct MemoryImage {
    info: ImageInfo,
    data: Vec<u8>,
    long_data: Option<Vec<u8>>,
    tracks: Vec<Track>,
    is_tape: bool,
    files: Vec<TapeFile>,
    partitions: Vec<TapePartition>,
    byte_addressable: bool,
    media_tags: BTreeMap<MediaTagKind, Vec<u8>>,
    sector_tags: BTreeMap<SectorTagKind, Vec<u8>>,
    track_tags: BTreeMap<(u32, SectorTagKind), Vec<u8>>,
    image_verdict: Option<Option<bool>>,
    sector_verdicts: Option<Vec<Option<bool>>>,
}

impl MemoryImage {
    /// Create a flat block image over `data`
    pub fn block(data: Vec<u8>, sector_size: u32, media_type: MediaType) -> Self {
        let sectors = data.len() as u64 / sector_size as u64;
        Self {
            info: ImageInfo::new(sectors, sector_size, media_type),
            data,
            long_data: None,
            tracks: Vec::new(),
            is_tape: false,
            files: Vec::new(),
            partitions: Vec::new(),
            byte_addressable: false,
            media_tags: BTreeMap::new(),
            sector_tags: BTreeMap::new(),
            track_tags: BTreeMap::new(),
            image_verdict: None,
            sector_verdicts: None,
        }
    }

    /// Create an optical image: user data plus a track list
    pub fn optical(data: Vec<u8>, sector_size: u32, tracks: Vec<Track>) -> Self {
        let mut image = Self::block(data, sector_size, MediaType::CdRom);
        image.tracks = tracks;
        image
    }

    /// Create a tape image: block data plus file and partition tables
    pub fn tape(
        data: Vec<u8>,
        block_size: u32,
        files: Vec<TapeFile>,
        partitions: Vec<TapePartition>,
    ) -> Self {
        let mut image = Self::block(data, block_size, MediaType::UnknownTape);
        image.is_tape = true;
        image.files = files;
        image.partitions = partitions;
        image
    }

    /// Create a byte-addressable linear image over raw bytes
    pub fn linear(data: Vec<u8>) -> Self {
        let mut image = Self::block(data, 1, MediaType::Unknown);
        image.byte_addressable = true;
        image
    }

    /// Set the media type
    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.info.media_type = media_type;
        self
    }

    /// Attach long (raw) sector data; per-sector width is inferred from the
    /// stream length
    pub fn with_long_data(mut self, long_data: Vec<u8>) -> Self {
        self.long_data = Some(long_data);
        self
    }

    /// Attach a media tag blob
    pub fn with_media_tag(mut self, kind: MediaTagKind, data: Vec<u8>) -> Self {
        self.info.readable_media_tags.push(kind);
        self.media_tags.insert(kind, data);
        self
    }

    /// Attach a per-sector tag stream covering the whole image
    pub fn with_sector_tag(mut self, kind: SectorTagKind, stream: Vec<u8>) -> Self {
        self.info.readable_sector_tags.push(kind);
        self.sector_tags.insert(kind, stream);
        self
    }

    /// Attach a scalar per-track tag
    pub fn with_track_tag(mut self, track: u32, kind: SectorTagKind, data: Vec<u8>) -> Self {
        if !self.info.readable_sector_tags.contains(&kind) {
            self.info.readable_sector_tags.push(kind);
        }
        self.track_tags.insert((track, kind), data);
        self
    }

    /// Give the image an embedded whole-image verdict
    pub fn with_image_verdict(mut self, verdict: Option<bool>) -> Self {
        self.image_verdict = Some(verdict);
        self
    }

    /// Give the image per-sector verdicts, one per sector
    pub fn with_sector_verdicts(mut self, verdicts: Vec<Option<bool>>) -> Self {
        self.sector_verdicts = Some(verdicts);
        self
    }

    fn check_range(&self, start: u64, count: u32) -> Result<()> {
        let end = start + count as u64;
        if end > self.info.sectors {
            return Err(Error::invalid_operation(format!(
                "read of sectors {}..{} beyond image end {}",
                start, end, self.info.sectors
            )));
        }
        Ok(())
    }
}

impl MediaImage for MemoryImage {
    fn identify(&self) -> &str {
        "In-Memory Image"
    }

    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn read_sectors(&mut self, start: u64, count: u32) -> Result<Vec<u8>> {
        self.check_range(start, count)?;
        let width = self.info.sector_size as usize;
        let from = start as usize * width;
        let to = from + count as usize * width;
        Ok(self.data[from..to].to_vec())
    }

    fn read_sectors_long(&mut self, start: u64, count: u32) -> Result<Vec<u8>> {
        self.check_range(start, count)?;
        match &self.long_data {
            Some(long) => {
                let width = long.len() / self.info.sectors as usize;
                let from = start as usize * width;
                let to = from + count as usize * width;
                Ok(long[from..to].to_vec())
            }
            None => self.read_sectors(start, count),
        }
    }

    fn read_media_tag(&mut self, kind: MediaTagKind) -> Result<Vec<u8>> {
        self.media_tags
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::tag_not_present(kind.name()))
    }

    fn read_sector_tag(&mut self, start: u64, count: u32, kind: SectorTagKind) -> Result<Vec<u8>> {
        self.check_range(start, count)?;
        let stream = self
            .sector_tags
            .get(&kind)
            .ok_or_else(|| Error::tag_not_present(kind.name()))?;
        let width = stream.len() / self.info.sectors as usize;
        let from = start as usize * width;
        let to = from + count as usize * width;
        Ok(stream[from..to].to_vec())
    }

    fn read_track_tag(&mut self, track: u32, kind: SectorTagKind) -> Result<Vec<u8>> {
        self.track_tags
            .get(&(track, kind))
            .cloned()
            .ok_or_else(|| Error::tag_not_present(kind.name()))
    }

    fn as_optical(&mut self) -> Option<&mut dyn OpticalImage> {
        if self.tracks.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn as_tape(&mut self) -> Option<&mut dyn TapeImage> {
        if self.is_tape {
            Some(self)
        } else {
            None
        }
    }

    fn as_byte_addressable(&mut self) -> Option<&mut dyn ByteAddressableImage> {
        if self.byte_addressable {
            Some(self)
        } else {
            None
        }
    }

    fn as_verifiable(&mut self) -> Option<&mut dyn VerifiableImage> {
        if self.image_verdict.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_verifiable_sectors(&mut self) -> Option<&mut dyn VerifiableSectorsImage> {
        if self.sector_verdicts.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl OpticalImage for MemoryImage {
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

impl TapeImage for MemoryImage {
    fn is_tape(&self) -> bool {
        self.is_tape
    }

    fn files(&self) -> &[TapeFile] {
        &self.files
    }

    fn partitions(&self) -> &[TapePartition] {
        &self.partitions
    }
}

impl ByteAddressableImage for MemoryImage {
    fn byte_length(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_bytes(&mut self, offset: u64, count: usize) -> Result<Vec<u8>> {
        let end = offset as usize + count;
        if end > self.data.len() {
            return Err(Error::invalid_operation(format!(
                "read of bytes {}..{} beyond image end {}",
                offset,
                end,
                self.data.len()
            )));
        }
        Ok(self.data[offset as usize..end].to_vec())
    }
}

impl VerifiableImage for MemoryImage {
    fn verify_media_image(&mut self) -> Result<Option<bool>> {
        Ok(self.image_verdict.unwrap_or(None))
    }
}

impl VerifiableSectorsImage for MemoryImage {
    fn verify_sector(&mut self, lba: u64) -> Result<Option<bool>> {
        let verdicts = self
            .sector_verdicts
            .as_ref()
            .ok_or_else(|| Error::invalid_operation("image has no sector verdicts"))?;
        verdicts
            .get(lba as usize)
            .copied()
            .ok_or_else(|| Error::invalid_operation(format!("LBA {} beyond image end", lba)))
    }
}
