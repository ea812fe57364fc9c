//! Raw flat-block sector images
//!
//! Plain sector-by-sector files (.img, .ima, .iso, .bin, .dd and friends).
//! No header, no tags; the media family and geometry are inferred from the
//! file size where a well-known floppy size matches.

use mediaforge_core::{
    Error, Geometry, ImageFormat, ImageInfo, MediaImage, MediaType, Result, WritableImage,
};
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Well-known floppy sizes: (bytes, media type, geometry)
const FLOPPY_SIZES: &[(u64, MediaType, Geometry)] = &[
    (368_640, MediaType::FloppyDd, Geometry { cylinders: 40, heads: 2, sectors_per_track: 9 }),
    (737_280, MediaType::FloppyDd, Geometry { cylinders: 80, heads: 2, sectors_per_track: 9 }),
    (1_228_800, MediaType::FloppyHd, Geometry { cylinders: 80, heads: 2, sectors_per_track: 15 }),
    (1_474_560, MediaType::FloppyHd, Geometry { cylinders: 80, heads: 2, sectors_per_track: 18 }),
    (2_949_120, MediaType::FloppyEd, Geometry { cylinders: 80, heads: 2, sectors_per_track: 36 }),
];

/// A raw image opened for reading
pub struct RawImage {
    mmap: Option<Mmap>,
    file: File,
    info: ImageInfo,
    geometry: Option<Geometry>,
}

impl RawImage {
    /// Open a raw image, inferring sector size and media family from the
    /// file size and extension.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();

        let is_iso = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("iso"))
            .unwrap_or(false);

        let sector_size: u32 = if is_iso && length % 2048 == 0 { 2048 } else { 512 };
        if length % sector_size as u64 != 0 {
            return Err(Error::invalid_image(format!(
                "file length {} is not a multiple of {}",
                length, sector_size
            )));
        }

        let (media_type, geometry) = FLOPPY_SIZES
            .iter()
            .find(|(size, _, _)| *size == length)
            .map(|(_, media, geometry)| (*media, Some(*geometry)))
            .unwrap_or_else(|| {
                let media = if is_iso { MediaType::CdRom } else { MediaType::GenericHdd };
                (media, None)
            });

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => Some(mmap),
            Err(e) => {
                debug!("mmap failed, falling back to seek/read: {}", e);
                None
            }
        };

        Ok(Self {
            mmap,
            file,
            info: ImageInfo::new(length / sector_size as u64, sector_size, media_type),
            geometry,
        })
    }

    /// Geometry inferred from a well-known floppy size, if any
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }
}

impl MediaImage for RawImage {
    fn identify(&self) -> &str {
        "Raw Sector Image"
    }

    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    fn read_sectors(&mut self, start: u64, count: u32) -> Result<Vec<u8>> {
        let width = self.info.sector_size as u64;
        let offset = start * width;
        let length = count as u64 * width;
        if start + count as u64 > self.info.sectors {
            return Err(Error::invalid_operation(format!(
                "read of sectors {}..{} beyond image end {}",
                start,
                start + count as u64,
                self.info.sectors
            )));
        }

        if let Some(mmap) = &self.mmap {
            return Ok(mmap[offset as usize..(offset + length) as usize].to_vec());
        }

        let mut buffer = vec![0u8; length as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        std::io::Read::read_exact(&mut self.file, &mut buffer)?;
        Ok(buffer)
    }
}

/// A raw image being written
pub struct RawWritableImage {
    file: File,
    sectors: u64,
    sector_size: u32,
    closed: bool,
}

impl WritableImage for RawWritableImage {
    fn identify(&self) -> &str {
        "Raw Sector Image"
    }

    fn write_sectors(&mut self, start: u64, count: u32, data: &[u8]) -> Result<()> {
        if start + count as u64 > self.sectors {
            return Err(Error::write_failure(format!(
                "write of sectors {}..{} beyond image end {}",
                start,
                start + count as u64,
                self.sectors
            )));
        }
        let expected = count as usize * self.sector_size as usize;
        if data.len() != expected {
            return Err(Error::write_failure(format!(
                "expected {} bytes for {} sectors, got {}",
                expected,
                count,
                data.len()
            )));
        }
        self.file
            .seek(SeekFrom::Start(start * self.sector_size as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn write_media_tag(&mut self, kind: mediaforge_core::MediaTagKind, _data: &[u8]) -> Result<()> {
        Err(Error::unsupported(format!("raw images cannot store {}", kind)))
    }

    fn write_sector_tag(
        &mut self,
        _start: u64,
        _count: u32,
        kind: mediaforge_core::SectorTagKind,
        _data: &[u8],
    ) -> Result<()> {
        Err(Error::unsupported(format!("raw images cannot store {}", kind)))
    }

    fn write_track_tag(
        &mut self,
        _track: u32,
        kind: mediaforge_core::SectorTagKind,
        _data: &[u8],
    ) -> Result<()> {
        Err(Error::unsupported(format!("raw images cannot store {}", kind)))
    }

    fn set_tracks(&mut self, _tracks: &[mediaforge_core::Track]) -> Result<()> {
        // Raw images hold bare sector data; the track list has nowhere to go
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_operation("image already closed"));
        }
        self.file.flush()?;
        self.closed = true;
        Ok(())
    }
}

/// Plugin for raw flat-block images
pub struct RawFormat;

impl ImageFormat for RawFormat {
    fn name(&self) -> &'static str {
        "Raw Sector Image"
    }

    fn id(&self) -> &'static str {
        "raw"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["img", "ima", "dd", "raw", "bin", "iso", "flp", "vfd"]
    }

    fn can_write(&self) -> bool {
        true
    }

    fn sniff(&self, _path: &Path) -> Result<bool> {
        // No magic bytes; raw images are only claimed by extension
        Ok(false)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn MediaImage>> {
        Ok(Box::new(RawImage::open(path)?))
    }

    fn supported_media_types(&self) -> &'static [MediaType] {
        &[
            MediaType::GenericHdd,
            MediaType::FlashDrive,
            MediaType::FloppyDd,
            MediaType::FloppyHd,
            MediaType::FloppyEd,
            MediaType::CdRom,
            MediaType::DvdRom,
            MediaType::Unknown,
        ]
    }

    fn create(
        &self,
        path: &Path,
        _media_type: MediaType,
        sectors: u64,
        sector_size: u32,
    ) -> Result<Box<dyn WritableImage>> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| Error::write_failure(format!("{}: {}", path.display(), e)))?;
        file.set_len(sectors * sector_size as u64)?;
        Ok(Box::new(RawWritableImage {
            file,
            sectors,
            sector_size,
            closed: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_infers_floppy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("boot.img");
        std::fs::write(&path, vec![0u8; 1_474_560]).unwrap();

        let image = RawImage::open(&path).unwrap();
        assert_eq!(image.info().media_type, MediaType::FloppyHd);
        assert_eq!(image.info().sectors, 2880);
        assert_eq!(image.geometry(), Some(Geometry::new(80, 2, 18)));
    }

    #[test]
    fn test_open_rejects_ragged_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.img");
        std::fs::write(&path, vec![0u8; 700]).unwrap();
        assert!(RawImage::open(&path).is_err());
    }

    #[test]
    fn test_create_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");

        let format = RawFormat;
        let mut dest = format
            .create(&path, MediaType::GenericHdd, 4, 512)
            .unwrap();
        let payload: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
        dest.write_sectors(1, 2, &payload).unwrap();
        dest.close().unwrap();

        let mut image = RawImage::open(&path).unwrap();
        assert_eq!(image.info().sectors, 4);
        assert_eq!(image.read_sectors(1, 2).unwrap(), payload);
        assert_eq!(image.read_sectors(0, 1).unwrap(), vec![0u8; 512]);
    }

    #[test]
    fn test_create_refuses_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        std::fs::write(&path, b"taken").unwrap();
        assert!(RawFormat
            .create(&path, MediaType::GenericHdd, 1, 512)
            .is_err());
    }

    #[test]
    fn test_write_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut dest = RawFormat
            .create(&path, MediaType::GenericHdd, 2, 512)
            .unwrap();
        assert!(dest.write_sectors(1, 2, &vec![0u8; 1024]).is_err());
        assert!(dest.write_sectors(0, 1, &vec![0u8; 100]).is_err());
    }
}
