//! MediaForge Image (MFI) native container
//!
//! The one in-tree format that can store everything the engine moves:
//! sector data, long sectors, media tags, out-of-band sector tag streams,
//! scalar track tags, track/file/partition tables, geometry, metadata, and
//! dump history.
//!
//! Layout: 8-byte magic, little-endian u32 header length, JSON header,
//! then raw blobs. Blob extents in the header are relative to the end of
//! the header so the header can be serialized in one pass.

use mediaforge_core::{
    validate_track_list, DumpRecord, Error, Geometry, ImageFormat, ImageInfo, ImageMetadata,
    MediaImage, MediaTagKind, MediaType, OpticalImage, Result, SectorTagKind, TapeFile, TapeImage,
    TapePartition, Track, TrackType, VerifiableImage, WritableImage, RAW_SECTOR_SIZE,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const MFI_MAGIC: &[u8; 8] = b"MFRGIMG1";
const MFI_VERSION: u32 = 1;
const MAX_HEADER_LEN: u32 = 16 * 1024 * 1024;

/// A blob location relative to the end of the header
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Extent {
    offset: u64,
    length: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MediaTagEntry {
    kind: MediaTagKind,
    extent: Extent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SectorStreamEntry {
    kind: SectorTagKind,
    width: u32,
    extent: Extent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrackTagEntry {
    track: u32,
    kind: SectorTagKind,
    extent: Extent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MfiHeader {
    version: u32,
    media_type: MediaType,
    sectors: u64,
    sector_size: u32,
    long_sector_size: Option<u32>,
    tracks: Vec<Track>,
    files: Vec<TapeFile>,
    partitions: Vec<TapePartition>,
    geometry: Option<Geometry>,
    metadata: ImageMetadata,
    dump_records: Vec<DumpRecord>,
    media_tags: Vec<MediaTagEntry>,
    sector_streams: Vec<SectorStreamEntry>,
    track_tags: Vec<TrackTagEntry>,
    data: Extent,
    long_data: Option<Extent>,
    content_sha256: String,
}

/// An MFI image opened for reading
pub struct MfiImage {
    file: File,
    header: MfiHeader,
    blob_base: u64,
    info: ImageInfo,
}

impl MfiImage {
    /// Open an existing MFI image
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != MFI_MAGIC {
            return Err(Error::invalid_image("bad MFI magic"));
        }

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        let header_len = u32::from_le_bytes(len_bytes);
        if header_len == 0 || header_len > MAX_HEADER_LEN {
            return Err(Error::invalid_image(format!(
                "implausible header length {}",
                header_len
            )));
        }

        let mut header_bytes = vec![0u8; header_len as usize];
        file.read_exact(&mut header_bytes)?;
        let header: MfiHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| Error::invalid_image(format!("header parse: {}", e)))?;
        if header.version != MFI_VERSION {
            return Err(Error::unsupported(format!(
                "MFI version {}",
                header.version
            )));
        }
        if header.data.length != header.sectors * header.sector_size as u64 {
            return Err(Error::invalid_image("data extent does not match geometry"));
        }

        let blob_base = 12 + header_len as u64;

        let mut info = ImageInfo::new(header.sectors, header.sector_size, header.media_type)
            .with_media_tags(header.media_tags.iter().map(|t| t.kind).collect())
            .with_application("MediaForge", env!("CARGO_PKG_VERSION"));
        info.readable_sector_tags = header.sector_streams.iter().map(|s| s.kind).collect();
        for entry in &header.track_tags {
            if !info.readable_sector_tags.contains(&entry.kind) {
                info.readable_sector_tags.push(entry.kind);
            }
        }
        info.readable_sector_tags.sort();

        Ok(Self { file, header, blob_base, info })
    }

    fn read_extent(&mut self, extent: Extent, skip: u64, take: u64) -> Result<Vec<u8>> {
        if skip + take > extent.length {
            return Err(Error::invalid_operation(format!(
                "read of {} bytes at {} beyond extent length {}",
                take, skip, extent.length
            )));
        }
        let mut buffer = vec![0u8; take as usize];
        self.file
            .seek(SeekFrom::Start(self.blob_base + extent.offset + skip))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn check_range(&self, start: u64, count: u32) -> Result<()> {
        if start + count as u64 > self.header.sectors {
            return Err(Error::invalid_operation(format!(
                "read of sectors {}..{} beyond image end {}",
                start,
                start + count as u64,
                self.header.sectors
            )));
        }
        Ok(())
    }
}

impl MediaImage for MfiImage {
    fn identify(&self) -> &str {
        "MediaForge Image"
    }

    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn geometry(&self) -> Option<Geometry> {
        self.header.geometry
    }

    fn metadata(&self) -> ImageMetadata {
        self.header.metadata.clone()
    }

    fn dump_records(&self) -> Vec<DumpRecord> {
        self.header.dump_records.clone()
    }

    fn read_sectors(&mut self, start: u64, count: u32) -> Result<Vec<u8>> {
        self.check_range(start, count)?;
        let width = self.header.sector_size as u64;
        self.read_extent(self.header.data, start * width, count as u64 * width)
    }

    fn read_sectors_long(&mut self, start: u64, count: u32) -> Result<Vec<u8>> {
        self.check_range(start, count)?;
        match (self.header.long_data, self.header.long_sector_size) {
            (Some(extent), Some(width)) => {
                self.read_extent(extent, start * width as u64, count as u64 * width as u64)
            }
            _ => self.read_sectors(start, count),
        }
    }

    fn read_media_tag(&mut self, kind: MediaTagKind) -> Result<Vec<u8>> {
        let extent = self
            .header
            .media_tags
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| t.extent)
            .ok_or_else(|| Error::tag_not_present(kind.name()))?;
        self.read_extent(extent, 0, extent.length)
    }

    fn read_sector_tag(&mut self, start: u64, count: u32, kind: SectorTagKind) -> Result<Vec<u8>> {
        self.check_range(start, count)?;
        let (extent, width) = self
            .header
            .sector_streams
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| (s.extent, s.width))
            .ok_or_else(|| Error::tag_not_present(kind.name()))?;
        self.read_extent(extent, start * width as u64, count as u64 * width as u64)
    }

    fn read_track_tag(&mut self, track: u32, kind: SectorTagKind) -> Result<Vec<u8>> {
        let extent = self
            .header
            .track_tags
            .iter()
            .find(|t| t.track == track && t.kind == kind)
            .map(|t| t.extent)
            .ok_or_else(|| Error::tag_not_present(kind.name()))?;
        self.read_extent(extent, 0, extent.length)
    }

    fn as_optical(&mut self) -> Option<&mut dyn OpticalImage> {
        if self.header.tracks.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn as_tape(&mut self) -> Option<&mut dyn TapeImage> {
        if self.header.files.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn as_verifiable(&mut self) -> Option<&mut dyn VerifiableImage> {
        Some(self)
    }
}

impl OpticalImage for MfiImage {
    fn tracks(&self) -> &[Track] {
        &self.header.tracks
    }
}

impl TapeImage for MfiImage {
    fn is_tape(&self) -> bool {
        self.header.media_type.is_tape() || !self.header.files.is_empty()
    }

    fn files(&self) -> &[TapeFile] {
        &self.header.files
    }

    fn partitions(&self) -> &[TapePartition] {
        &self.header.partitions
    }
}

impl VerifiableImage for MfiImage {
    fn verify_media_image(&mut self) -> Result<Option<bool>> {
        if self.header.content_sha256.is_empty() {
            return Ok(None);
        }
        let mut hasher = Sha256::new();
        let mut remaining = self.header.data.length;
        let mut offset = 0u64;
        while remaining > 0 {
            let take = remaining.min(1024 * 1024);
            let chunk = self.read_extent(self.header.data, offset, take)?;
            hasher.update(&chunk);
            offset += take;
            remaining -= take;
        }
        let digest = hex::encode(hasher.finalize());
        Ok(Some(digest == self.header.content_sha256))
    }
}

/// An MFI image being written. Blobs are buffered and flushed on close.
pub struct MfiWritableImage {
    path: PathBuf,
    media_type: MediaType,
    sectors: u64,
    sector_size: u32,
    long_sector_size: Option<u32>,
    data: Vec<u8>,
    long_data: Option<Vec<u8>>,
    tracks: Vec<Track>,
    files: Vec<TapeFile>,
    partitions: Vec<TapePartition>,
    geometry: Option<Geometry>,
    metadata: ImageMetadata,
    dump_records: Vec<DumpRecord>,
    media_tags: BTreeMap<MediaTagKind, Vec<u8>>,
    sector_streams: BTreeMap<SectorTagKind, (u32, Vec<u8>)>,
    track_tags: BTreeMap<(u32, SectorTagKind), Vec<u8>>,
    closed: bool,
}

impl MfiWritableImage {
    fn check_range(&self, start: u64, count: u32) -> Result<()> {
        if start + count as u64 > self.sectors {
            return Err(Error::write_failure(format!(
                "write of sectors {}..{} beyond image end {}",
                start,
                start + count as u64,
                self.sectors
            )));
        }
        Ok(())
    }

    fn infer_width(count: u32, data: &[u8]) -> Result<u32> {
        if count == 0 || data.len() % count as usize != 0 {
            return Err(Error::write_failure(format!(
                "{} bytes do not divide into {} sectors",
                data.len(),
                count
            )));
        }
        Ok((data.len() / count as usize) as u32)
    }
}

impl WritableImage for MfiWritableImage {
    fn identify(&self) -> &str {
        "MediaForge Image"
    }

    fn write_sectors(&mut self, start: u64, count: u32, data: &[u8]) -> Result<()> {
        self.check_range(start, count)?;
        let expected = count as usize * self.sector_size as usize;
        if data.len() != expected {
            return Err(Error::write_failure(format!(
                "expected {} bytes for {} sectors, got {}",
                expected,
                count,
                data.len()
            )));
        }
        let from = start as usize * self.sector_size as usize;
        self.data[from..from + expected].copy_from_slice(data);
        Ok(())
    }

    fn write_sectors_long(&mut self, start: u64, count: u32, data: &[u8]) -> Result<()> {
        self.check_range(start, count)?;
        let width = Self::infer_width(count, data)?;
        match self.long_sector_size {
            None => self.long_sector_size = Some(width),
            Some(existing) if existing == width => {}
            Some(existing) => {
                return Err(Error::write_failure(format!(
                    "long sector width changed from {} to {}",
                    existing, width
                )))
            }
        }
        let total = self.sectors as usize * width as usize;
        let long = self.long_data.get_or_insert_with(|| vec![0u8; total]);
        let from = start as usize * width as usize;
        long[from..from + data.len()].copy_from_slice(data);

        // Short reads are served from the user-data stream, so mirror the
        // user bytes out of each raw sector.
        let user_width = self.sector_size as usize;
        if width as usize == user_width {
            let from = start as usize * user_width;
            self.data[from..from + data.len()].copy_from_slice(data);
        } else if width == RAW_SECTOR_SIZE {
            for i in 0..count as usize {
                let lba = start + i as u64;
                let Some(track) = self.tracks.iter().find(|t| t.contains(lba)) else {
                    continue;
                };
                let offset = match track.track_type {
                    TrackType::CdMode1 | TrackType::Data => 16,
                    TrackType::CdMode2Form1 => 24,
                    _ => continue,
                };
                if offset + user_width > width as usize {
                    continue;
                }
                let raw = &data[i * width as usize..][offset..offset + user_width];
                let to = lba as usize * user_width;
                self.data[to..to + user_width].copy_from_slice(raw);
            }
        }
        Ok(())
    }

    fn write_media_tag(&mut self, kind: MediaTagKind, data: &[u8]) -> Result<()> {
        self.media_tags.insert(kind, data.to_vec());
        Ok(())
    }

    fn write_sector_tag(
        &mut self,
        start: u64,
        count: u32,
        kind: SectorTagKind,
        data: &[u8],
    ) -> Result<()> {
        if kind.is_inline() {
            return Err(Error::invalid_operation(format!(
                "{} travels inside long sectors",
                kind
            )));
        }
        self.check_range(start, count)?;
        let width = Self::infer_width(count, data)?;
        let total = self.sectors as usize * width as usize;
        let (stored_width, stream) = self
            .sector_streams
            .entry(kind)
            .or_insert_with(|| (width, vec![0u8; total]));
        if *stored_width != width {
            return Err(Error::write_failure(format!(
                "{} width changed from {} to {}",
                kind, stored_width, width
            )));
        }
        let from = start as usize * width as usize;
        stream[from..from + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn write_track_tag(&mut self, track: u32, kind: SectorTagKind, data: &[u8]) -> Result<()> {
        self.track_tags.insert((track, kind), data.to_vec());
        Ok(())
    }

    fn set_tracks(&mut self, tracks: &[Track]) -> Result<()> {
        validate_track_list(tracks)?;
        self.tracks = tracks.to_vec();
        Ok(())
    }

    fn add_file(&mut self, file: TapeFile) -> Result<()> {
        self.files.push(file);
        Ok(())
    }

    fn add_partition(&mut self, partition: TapePartition) -> Result<()> {
        self.partitions.push(partition);
        Ok(())
    }

    fn set_geometry(&mut self, geometry: Geometry) -> Result<()> {
        self.geometry = Some(geometry);
        Ok(())
    }

    fn set_metadata(&mut self, metadata: &ImageMetadata) -> Result<()> {
        self.metadata = metadata.clone();
        Ok(())
    }

    fn add_dump_record(&mut self, record: &DumpRecord) -> Result<()> {
        self.dump_records.push(record.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_operation("image already closed"));
        }

        let mut offset = 0u64;
        let mut place = |length: u64| {
            let extent = Extent { offset, length };
            offset += length;
            extent
        };

        let data_extent = place(self.data.len() as u64);
        let long_extent = self.long_data.as_ref().map(|l| place(l.len() as u64));
        let media_tags: Vec<MediaTagEntry> = self
            .media_tags
            .iter()
            .map(|(kind, blob)| MediaTagEntry { kind: *kind, extent: place(blob.len() as u64) })
            .collect();
        let sector_streams: Vec<SectorStreamEntry> = self
            .sector_streams
            .iter()
            .map(|(kind, (width, stream))| SectorStreamEntry {
                kind: *kind,
                width: *width,
                extent: place(stream.len() as u64),
            })
            .collect();
        let track_tags: Vec<TrackTagEntry> = self
            .track_tags
            .iter()
            .map(|((track, kind), blob)| TrackTagEntry {
                track: *track,
                kind: *kind,
                extent: place(blob.len() as u64),
            })
            .collect();

        let header = MfiHeader {
            version: MFI_VERSION,
            media_type: self.media_type,
            sectors: self.sectors,
            sector_size: self.sector_size,
            long_sector_size: self.long_sector_size,
            tracks: self.tracks.clone(),
            files: self.files.clone(),
            partitions: self.partitions.clone(),
            geometry: self.geometry,
            metadata: self.metadata.clone(),
            dump_records: self.dump_records.clone(),
            media_tags,
            sector_streams,
            track_tags,
            data: data_extent,
            long_data: long_extent,
            content_sha256: hex::encode(Sha256::digest(&self.data)),
        };

        let header_bytes = serde_json::to_vec(&header)
            .map_err(|e| Error::write_failure(format!("header serialize: {}", e)))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::write_failure(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(MFI_MAGIC)?;
        file.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
        file.write_all(&header_bytes)?;
        file.write_all(&self.data)?;
        if let Some(long) = &self.long_data {
            file.write_all(long)?;
        }
        for blob in self.media_tags.values() {
            file.write_all(blob)?;
        }
        for (_, stream) in self.sector_streams.values() {
            file.write_all(stream)?;
        }
        for blob in self.track_tags.values() {
            file.write_all(blob)?;
        }
        file.flush()?;

        debug!(
            path = %self.path.display(),
            sectors = self.sectors,
            "finished MFI image"
        );
        self.closed = true;
        Ok(())
    }
}

/// Plugin for the MFI native container
pub struct MfiFormat;

impl ImageFormat for MfiFormat {
    fn name(&self) -> &'static str {
        "MediaForge Image"
    }

    fn id(&self) -> &'static str {
        "mfi"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["mfi"]
    }

    fn can_write(&self) -> bool {
        true
    }

    fn sniff(&self, path: &Path) -> Result<bool> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(_) => return Ok(false),
        };
        let mut magic = [0u8; 8];
        match file.read_exact(&mut magic) {
            Ok(()) => Ok(&magic == MFI_MAGIC),
            Err(_) => Ok(false),
        }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn MediaImage>> {
        Ok(Box::new(MfiImage::open(path)?))
    }

    fn supported_media_types(&self) -> &'static [MediaType] {
        &[
            MediaType::Cdda,
            MediaType::Cd,
            MediaType::CdRom,
            MediaType::CdR,
            MediaType::CdRw,
            MediaType::VideoCd,
            MediaType::DvdRom,
            MediaType::DvdR,
            MediaType::DvdRw,
            MediaType::GenericHdd,
            MediaType::FlashDrive,
            MediaType::FloppyDd,
            MediaType::FloppyHd,
            MediaType::FloppyEd,
            MediaType::Dds,
            MediaType::Dlt,
            MediaType::Lto,
            MediaType::UnknownTape,
            MediaType::Unknown,
        ]
    }

    fn supported_media_tags(&self) -> &'static [MediaTagKind] {
        &[
            MediaTagKind::CdToc,
            MediaTagKind::CdFullToc,
            MediaTagKind::CdAtip,
            MediaTagKind::CdText,
            MediaTagKind::CdMcn,
            MediaTagKind::CdPma,
            MediaTagKind::DvdPfi,
            MediaTagKind::DvdDmi,
            MediaTagKind::DvdBca,
        ]
    }

    fn supported_sector_tags(&self) -> &'static [SectorTagKind] {
        &[
            SectorTagKind::CdSectorSync,
            SectorTagKind::CdSectorHeader,
            SectorTagKind::CdSectorSubHeader,
            SectorTagKind::CdSectorEdc,
            SectorTagKind::CdSectorEccP,
            SectorTagKind::CdSectorEccQ,
            SectorTagKind::CdSectorEcc,
            SectorTagKind::CdSectorSubchannel,
            SectorTagKind::CdTrackFlags,
            SectorTagKind::CdTrackIsrc,
        ]
    }

    fn create(
        &self,
        path: &Path,
        media_type: MediaType,
        sectors: u64,
        sector_size: u32,
    ) -> Result<Box<dyn WritableImage>> {
        if path.exists() {
            return Err(Error::OutputExists(path.display().to_string()));
        }
        Ok(Box::new(MfiWritableImage {
            path: path.to_path_buf(),
            media_type,
            sectors,
            sector_size,
            long_sector_size: None,
            data: vec![0u8; sectors as usize * sector_size as usize],
            long_data: None,
            tracks: Vec::new(),
            files: Vec::new(),
            partitions: Vec::new(),
            geometry: None,
            metadata: ImageMetadata::default(),
            dump_records: Vec::new(),
            media_tags: BTreeMap::new(),
            sector_streams: BTreeMap::new(),
            track_tags: BTreeMap::new(),
            closed: false,
        }))
    }
}
