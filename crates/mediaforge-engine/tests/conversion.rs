//! Converter scenarios: round trips, data-loss policy, subchannel work

use mediaforge_core::{
    Error, ImageFormat, MediaImage, MediaTagKind, MediaType, OpticalImage, SectorTagKind,
    TapeImage, Track, TrackType,
};
use mediaforge_engine::checksum::{checksum_media, ChecksumKind, ChecksumOptions};
use mediaforge_engine::convert::subchannel::{
    deinterleave, interleave, q_crc_ok, synthesize_frame, FRAME_SIZE,
};
use mediaforge_engine::convert::{convert_media, ConvertOptions};
use mediaforge_engine::progress::RunControl;
use mediaforge_engine::verify::{verify_image, VerificationStatus};
use mediaforge_formats::{MemoryImage, MfiFormat, RawFormat, Registry};
use std::path::Path;
use tempfile::tempdir;

fn lcg_bytes(seed: u32, len: usize) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

fn cd_tracks() -> Vec<Track> {
    vec![
        Track::new(1, 0, 299, TrackType::CdMode1).with_index(1, 0),
        Track::new(2, 300, 499, TrackType::CdMode1).with_index(1, 300),
    ]
}

fn subchannel_stream(tracks: &[Track]) -> Vec<u8> {
    let mut stream = Vec::new();
    for track in tracks {
        for lba in track.start_sector..=track.end_sector {
            stream.extend_from_slice(&synthesize_frame(track, lba));
        }
    }
    stream
}

/// Raw Mode 1 sectors: sync + header, then user data, then filler parity
fn long_stream(data: &[u8]) -> Vec<u8> {
    let sectors = data.len() / 2048;
    let mut long = Vec::with_capacity(sectors * 2352);
    for sector in 0..sectors {
        let mut raw = [0u8; 2352];
        raw[1..11].fill(0xFF);
        raw[15] = 0x01;
        raw[16..2064].copy_from_slice(&data[sector * 2048..(sector + 1) * 2048]);
        long.extend_from_slice(&raw);
    }
    long
}

/// A CD source with tags but no long sector data
fn cd_source_short(data: &[u8]) -> MemoryImage {
    let tracks = cd_tracks();
    let subchannel = subchannel_stream(&tracks);
    MemoryImage::optical(data.to_vec(), 2048, tracks)
        .with_sector_tag(SectorTagKind::CdSectorSubchannel, subchannel)
        .with_track_tag(1, SectorTagKind::CdTrackFlags, vec![0x04])
        .with_track_tag(1, SectorTagKind::CdTrackIsrc, b"GBAYE0000001".to_vec())
        .with_media_tag(MediaTagKind::CdToc, b"fake toc".to_vec())
}

/// The same CD source with proper 2352-byte raw sectors attached
fn cd_source_long(data: &[u8]) -> MemoryImage {
    cd_source_short(data).with_long_data(long_stream(data))
}

#[test]
fn force_skip_scenario() {
    let dir = tempdir().unwrap();
    let data = lcg_bytes(10, 500 * 2048);
    let raw = RawFormat;

    // Without force: aborts with a data-loss error before any byte is written
    let mut source = cd_source_short(&data);
    let out = dir.path().join("without_force.iso");
    let result = convert_media(
        &mut source,
        &raw,
        &out,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    );
    assert!(matches!(result, Err(Error::DataLoss(_))));
    assert!(!out.exists());

    // With force: completes, and the destination lacks the tags
    let mut source = cd_source_short(&data);
    let out = dir.path().join("with_force.iso");
    let options = ConvertOptions { force: true, ..ConvertOptions::default() };
    let summary =
        convert_media(&mut source, &raw, &out, &options, None, &RunControl::new()).unwrap();
    assert_eq!(summary.sectors_copied, 500);
    assert!(summary.skipped_tags.iter().any(|t| t == "subchannel"));
    // 2048-byte reads could not satisfy long-sector copying, so the run
    // downgraded mid-flight
    assert!(summary.downgraded_long);

    let registry = Registry::with_builtin();
    let mut converted = registry.open(&out).unwrap();
    assert_eq!(converted.info().sectors, 500);
    assert!(converted.info().readable_sector_tags.is_empty());
    assert_eq!(converted.read_sectors(0, 500).unwrap(), data);
}

#[test]
fn output_path_precondition() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("exists.mfi");
    std::fs::write(&out, b"taken").unwrap();

    let mut source = MemoryImage::block(vec![0u8; 2048], 512, MediaType::GenericHdd);
    let result = convert_media(
        &mut source,
        &MfiFormat,
        &out,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    );
    assert!(matches!(result, Err(Error::OutputExists(_))));
}

#[test]
fn incompatible_media_precondition() {
    struct HddOnly;
    impl ImageFormat for HddOnly {
        fn name(&self) -> &'static str {
            "HDD Only"
        }
        fn id(&self) -> &'static str {
            "hddonly"
        }
        fn extensions(&self) -> &'static [&'static str] {
            &["hdd"]
        }
        fn can_write(&self) -> bool {
            true
        }
        fn sniff(&self, _path: &Path) -> mediaforge_core::Result<bool> {
            Ok(false)
        }
        fn open(
            &self,
            _path: &Path,
        ) -> mediaforge_core::Result<Box<dyn mediaforge_core::MediaImage>> {
            Err(Error::unsupported("open"))
        }
        fn supported_media_types(&self) -> &'static [MediaType] {
            &[MediaType::GenericHdd]
        }
    }

    let dir = tempdir().unwrap();
    let data = lcg_bytes(11, 10 * 2048);
    let mut source = MemoryImage::optical(data, 2048, cd_tracks());
    let out = dir.path().join("disc.hdd");
    let result = convert_media(
        &mut source,
        &HddOnly,
        &out,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    );
    assert!(matches!(result, Err(Error::IncompatibleMedia { .. })));
    assert!(!out.exists());
}

#[test]
fn optical_round_trip_through_mfi() {
    let dir = tempdir().unwrap();
    let data = lcg_bytes(12, 500 * 2048);
    let long = long_stream(&data);
    let subchannel = subchannel_stream(&cd_tracks());

    // A -> B
    let mut source = cd_source_long(&data);
    let b_path = dir.path().join("b.mfi");
    let summary = convert_media(
        &mut source,
        &MfiFormat,
        &b_path,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    )
    .unwrap();
    assert_eq!(summary.sectors_copied, 500);
    assert!(summary.skipped_tags.is_empty());
    assert!(!summary.downgraded_long);

    // B -> C
    let registry = Registry::with_builtin();
    let mut b = registry.open(&b_path).unwrap();
    let c_path = dir.path().join("c.mfi");
    convert_media(
        b.as_mut(),
        &MfiFormat,
        &c_path,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    )
    .unwrap();

    // C equals A: user data, raw sectors, tags
    let mut c = registry.open(&c_path).unwrap();
    assert_eq!(c.read_sectors(0, 500).unwrap(), data);
    assert_eq!(c.read_sectors_long(0, 500).unwrap(), long);
    assert_eq!(
        c.read_sector_tag(0, 500, SectorTagKind::CdSectorSubchannel).unwrap(),
        subchannel
    );
    assert_eq!(
        c.read_track_tag(1, SectorTagKind::CdTrackIsrc).unwrap(),
        b"GBAYE0000001"
    );
    assert_eq!(c.read_media_tag(MediaTagKind::CdToc).unwrap(), b"fake toc");

    // Whole-media digests agree for every requested algorithm
    let mut a = cd_source_long(&data);
    let options = ChecksumOptions {
        set: [ChecksumKind::Crc32, ChecksumKind::Sha256].into_iter().collect(),
        ..ChecksumOptions::default()
    };
    let digest_a = checksum_media(&mut a, &options, None, &RunControl::new()).unwrap();
    let digest_c = checksum_media(c.as_mut(), &options, None, &RunControl::new()).unwrap();
    assert_eq!(digest_a.whole_media, digest_c.whole_media);

    // The MFI embedded checksum holds after the double conversion
    assert_eq!(verify_image(c.as_mut()).unwrap(), VerificationStatus::Correct);
}

#[test]
fn flat_round_trip_raw_mfi_raw() {
    let dir = tempdir().unwrap();
    let data = lcg_bytes(13, 2880 * 512);

    let a_path = dir.path().join("a.img");
    std::fs::write(&a_path, &data).unwrap();

    let registry = Registry::with_builtin();
    let mut a = registry.open(&a_path).unwrap();
    let b_path = dir.path().join("b.mfi");
    convert_media(
        a.as_mut(),
        &MfiFormat,
        &b_path,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    )
    .unwrap();

    let mut b = registry.open(&b_path).unwrap();
    // Geometry inferred from the floppy size survives the first hop
    assert_eq!(
        b.geometry().map(|g| (g.cylinders, g.heads, g.sectors_per_track)),
        Some((80, 2, 18))
    );

    let c_path = dir.path().join("c.img");
    convert_media(
        b.as_mut(),
        &RawFormat,
        &c_path,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    )
    .unwrap();

    assert_eq!(std::fs::read(&c_path).unwrap(), data);
}

#[test]
fn generate_subchannels_covers_every_lba() {
    let dir = tempdir().unwrap();
    let data = lcg_bytes(14, 500 * 2048);

    // A CD image lacking subchannel entirely
    let mut source = MemoryImage::optical(data, 2048, cd_tracks());
    let out = dir.path().join("generated.mfi");
    let options = ConvertOptions { generate_subchannels: true, ..ConvertOptions::default() };
    let summary =
        convert_media(&mut source, &MfiFormat, &out, &options, None, &RunControl::new()).unwrap();

    assert_eq!(summary.subchannel.len(), 500);
    assert!(summary.subchannel.covers(0, 499));

    // The destination carries a valid generated frame for an arbitrary LBA
    let registry = Registry::with_builtin();
    let mut converted = registry.open(&out).unwrap();
    let raw = converted
        .read_sector_tag(123, 1, SectorTagKind::CdSectorSubchannel)
        .unwrap();
    let mut frame = [0u8; FRAME_SIZE];
    frame.copy_from_slice(&raw);
    let packed = deinterleave(&frame);
    let mut q = [0u8; 12];
    q.copy_from_slice(&packed[12..24]);
    assert!(q_crc_ok(&q));
}

#[test]
fn subchannel_repair_and_index_discovery() {
    let dir = tempdir().unwrap();
    let data = lcg_bytes(15, 200 * 2048);

    // Track table knows only index 1, but the subchannel reveals index 2
    // starting at LBA 100; one frame carries a broken CRC.
    let table_track = Track::new(1, 0, 199, TrackType::Audio).with_index(1, 0);
    let q_track = table_track.clone().with_index(2, 100);

    let mut stream = Vec::with_capacity(200 * FRAME_SIZE);
    for lba in 0..200u64 {
        let mut frame = synthesize_frame(&q_track, lba);
        if lba == 42 {
            let mut packed = deinterleave(&frame);
            packed[22] ^= 0xFF;
            frame = interleave(&packed);
        }
        stream.extend_from_slice(&frame);
    }

    let mut source = MemoryImage::optical(data, 2048, vec![table_track])
        .with_long_data(lcg_bytes(16, 200 * 2352))
        .with_sector_tag(SectorTagKind::CdSectorSubchannel, stream);

    let out = dir.path().join("repaired.mfi");
    let options = ConvertOptions { fix_subchannel_crc: true, ..ConvertOptions::default() };
    let summary =
        convert_media(&mut source, &MfiFormat, &out, &options, None, &RunControl::new()).unwrap();

    assert_eq!(summary.repaired_subchannel_frames, 1);
    assert_eq!(summary.subchannel.len(), 200);

    // The discovered index was pushed to the destination's track table
    let registry = Registry::with_builtin();
    let mut converted = registry.open(&out).unwrap();
    let tracks = converted.as_optical().unwrap().tracks().to_vec();
    assert_eq!(tracks[0].indexes.get(&2), Some(&100));

    // The repaired frame now carries a valid CRC
    let raw = converted
        .read_sector_tag(42, 1, SectorTagKind::CdSectorSubchannel)
        .unwrap();
    let mut frame = [0u8; FRAME_SIZE];
    frame.copy_from_slice(&raw);
    let packed = deinterleave(&frame);
    let mut q = [0u8; 12];
    q.copy_from_slice(&packed[12..24]);
    assert!(q_crc_ok(&q));
}

#[test]
fn long_sector_mismatch_aborts_without_force() {
    let dir = tempdir().unwrap();
    let data = lcg_bytes(17, 100 * 2048);

    // Sector tags present, so the run starts with long reads, but the
    // source serves 2048-byte sectors
    let mut source =
        MemoryImage::optical(data, 2048, vec![Track::new(1, 0, 99, TrackType::CdMode1)])
            .with_track_tag(1, SectorTagKind::CdTrackFlags, vec![0x04]);

    let out = dir.path().join("mismatch.mfi");
    let result = convert_media(
        &mut source,
        &MfiFormat,
        &out,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    );
    assert!(matches!(result, Err(Error::SectorSizeMismatch { .. })));
}

#[test]
fn tape_conversion_reemits_files_and_partitions() {
    use mediaforge_core::{TapeFile, TapePartition};

    let dir = tempdir().unwrap();
    let data = lcg_bytes(18, 60 * 512);
    let files = vec![TapeFile::new(0, 0, 0, 19), TapeFile::new(1, 0, 25, 49)];
    let partitions = vec![TapePartition { number: 0, first_block: 0, last_block: 59 }];
    let mut source = MemoryImage::tape(data.clone(), 512, files.clone(), partitions.clone());

    let out = dir.path().join("tape.mfi");
    let summary = convert_media(
        &mut source,
        &MfiFormat,
        &out,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    )
    .unwrap();
    // Gaps between files are copied too
    assert_eq!(summary.sectors_copied, 60);

    let registry = Registry::with_builtin();
    let mut converted = registry.open(&out).unwrap();
    assert_eq!(converted.read_sectors(0, 60).unwrap(), data);
    let tape = converted.as_tape().unwrap();
    assert_eq!(tape.files(), files.as_slice());
    assert_eq!(tape.partitions(), partitions.as_slice());
}

#[test]
fn cancellation_leaves_output_as_flushed() {
    let dir = tempdir().unwrap();
    let data = lcg_bytes(19, 100 * 512);
    let mut source = MemoryImage::block(data, 512, MediaType::GenericHdd);

    let control = RunControl::new();
    control.cancel();
    let out = dir.path().join("cancelled.mfi");
    let result = convert_media(
        &mut source,
        &MfiFormat,
        &out,
        &ConvertOptions::default(),
        None,
        &control,
    );
    assert!(matches!(result, Err(Error::Cancelled)));
    // The MFI destination buffers until close, so nothing was flushed
    assert!(!out.exists());
}

#[test]
fn metadata_and_dump_history_propagate() {
    let dir = tempdir().unwrap();

    // Build a source MFI carrying metadata and a dump record
    let src_path = dir.path().join("src.mfi");
    {
        use chrono::TimeZone;
        use mediaforge_core::{DumpRecord, ImageMetadata, WritableImage as _};

        let mut dest = MfiFormat
            .create(&src_path, MediaType::GenericHdd, 8, 512)
            .unwrap();
        dest.write_sectors(0, 8, &lcg_bytes(20, 8 * 512)).unwrap();
        dest.set_metadata(&ImageMetadata {
            creator: Some("archivist".to_string()),
            media_title: Some("scratch disk".to_string()),
            ..ImageMetadata::default()
        })
        .unwrap();
        dest.add_dump_record(&DumpRecord {
            software: "dumper".to_string(),
            version: "1.2".to_string(),
            when: chrono::Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap(),
            start: 0,
            end: 7,
        })
        .unwrap();
        dest.close().unwrap();
    }

    let registry = Registry::with_builtin();
    let mut source = registry.open(&src_path).unwrap();
    let out = dir.path().join("copy.mfi");
    convert_media(
        source.as_mut(),
        &MfiFormat,
        &out,
        &ConvertOptions::default(),
        None,
        &RunControl::new(),
    )
    .unwrap();

    let copy = registry.open(&out).unwrap();
    assert_eq!(copy.metadata().creator.as_deref(), Some("archivist"));
    assert_eq!(copy.metadata().media_title.as_deref(), Some("scratch disk"));
    let records = copy.dump_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].software, "dumper");
}
