//! Checksum engine scenarios over in-memory images

use mediaforge_core::{MediaType, TapeFile, TapePartition, Track, TrackType};
use mediaforge_engine::checksum::{checksum_media, ChecksumKind, ChecksumOptions, ChecksumSet};
use mediaforge_engine::progress::RunControl;
use mediaforge_engine::walker::{SegmentId, WalkLimits};
use mediaforge_formats::MemoryImage;

fn lcg_bytes(seed: u32, len: usize) -> Vec<u8> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

fn crc32_of(data: &[u8]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    format!("{:08x}", hasher.finalize())
}

fn two_track_disc(data: &[u8]) -> MemoryImage {
    let tracks = vec![
        Track::new(1, 0, 999, TrackType::Audio),
        Track::new(2, 1000, 1499, TrackType::CdMode1),
    ];
    MemoryImage::optical(data.to_vec(), 2048, tracks)
}

#[test]
fn two_track_scenario_whole_is_concat_and_order_ascending() {
    let data = lcg_bytes(1, 1500 * 2048);
    let mut image = two_track_disc(&data);

    let options = ChecksumOptions {
        set: [ChecksumKind::Crc32].into_iter().collect(),
        whole_media: true,
        per_segment: true,
        limits: WalkLimits::default(),
    };
    let report = checksum_media(&mut image, &options, None, &RunControl::new()).unwrap();

    // Whole-media digest equals the digest of track 1 ++ track 2 bytes
    let whole = report.whole_media.unwrap();
    assert_eq!(whole.len(), 1);
    assert_eq!(whole[0].value, crc32_of(&data));

    // Two per-track digests, reported in order 1, 2
    assert_eq!(report.segments.len(), 2);
    assert_eq!(report.segments[0].segment, SegmentId::Track(1));
    assert_eq!(report.segments[1].segment, SegmentId::Track(2));
    assert_eq!(report.segments[0].digests[0].value, crc32_of(&data[..1000 * 2048]));
    assert_eq!(report.segments[1].digests[0].value, crc32_of(&data[1000 * 2048..]));
}

#[test]
fn chunk_size_invariance() {
    let data = lcg_bytes(2, 1500 * 2048);

    let mut reference = None;
    for chunk in [1u32, 7, 64, 256, 4096] {
        let mut image = two_track_disc(&data);
        let options = ChecksumOptions {
            set: [ChecksumKind::Crc32, ChecksumKind::Md5, ChecksumKind::SpamSum]
                .into_iter()
                .collect(),
            whole_media: true,
            per_segment: true,
            limits: WalkLimits::with_sectors(chunk),
        };
        let report = checksum_media(&mut image, &options, None, &RunControl::new()).unwrap();
        let fingerprint = (report.whole_media.clone(), report.segments.clone());
        match &reference {
            None => reference = Some(fingerprint),
            Some(expected) => assert_eq!(&fingerprint, expected, "chunk size {}", chunk),
        }
    }
}

#[test]
fn tape_orphan_ranges_feed_only_whole_media() {
    let data = lcg_bytes(3, 50 * 512);
    let files = vec![TapeFile::new(0, 0, 10, 19), TapeFile::new(1, 0, 30, 39)];
    let partitions = vec![TapePartition { number: 0, first_block: 0, last_block: 49 }];
    let mut image = MemoryImage::tape(data.clone(), 512, files, partitions);

    let options = ChecksumOptions {
        set: [ChecksumKind::Sha256].into_iter().collect(),
        whole_media: true,
        per_segment: true,
        limits: WalkLimits::default(),
    };
    let report = checksum_media(&mut image, &options, None, &RunControl::new()).unwrap();

    // Whole media covers all 50 blocks, gaps included
    use sha2::{Digest, Sha256};
    let expected_whole = hex::encode(Sha256::digest(&data));
    assert_eq!(report.whole_media.unwrap()[0].value, expected_whole);

    // Per-file digests cover only the file ranges, ascending
    assert_eq!(report.segments.len(), 2);
    assert_eq!(report.segments[0].segment, SegmentId::File(0));
    assert_eq!(report.segments[1].segment, SegmentId::File(1));
    let file0 = hex::encode(Sha256::digest(&data[10 * 512..20 * 512]));
    let file1 = hex::encode(Sha256::digest(&data[30 * 512..40 * 512]));
    assert_eq!(report.segments[0].digests[0].value, file0);
    assert_eq!(report.segments[1].digests[0].value, file1);
}

#[test]
fn byte_addressable_media_checksums_whole_range() {
    let data = lcg_bytes(4, 200_000);
    let mut image = MemoryImage::linear(data.clone());

    let options = ChecksumOptions {
        set: [ChecksumKind::Md5].into_iter().collect(),
        whole_media: true,
        per_segment: false,
        limits: WalkLimits::default(),
    };
    let report = checksum_media(&mut image, &options, None, &RunControl::new()).unwrap();

    use md5::{Digest, Md5};
    assert_eq!(
        report.whole_media.unwrap()[0].value,
        hex::encode(Md5::digest(&data))
    );
    assert!(report.segments.is_empty());
}

#[test]
fn cancelled_run_reports_no_digests() {
    let data = lcg_bytes(5, 100 * 512);
    let mut image = MemoryImage::block(data, 512, MediaType::GenericHdd);

    let control = RunControl::new();
    control.cancel();
    let result = checksum_media(&mut image, &ChecksumOptions::default(), None, &control);
    assert!(matches!(result, Err(mediaforge_core::Error::Cancelled)));
}

#[test]
fn per_segment_state_does_not_leak_between_tracks() {
    // Two tracks with identical content must produce identical digests
    let track_bytes = lcg_bytes(6, 500 * 2048);
    let mut data = track_bytes.clone();
    data.extend_from_slice(&track_bytes);

    let tracks = vec![
        Track::new(1, 0, 499, TrackType::CdMode1),
        Track::new(2, 500, 999, TrackType::CdMode1),
    ];
    let mut image = MemoryImage::optical(data, 2048, tracks);

    let options = ChecksumOptions {
        set: [ChecksumKind::Sha1, ChecksumKind::SpamSum].into_iter().collect(),
        whole_media: false,
        per_segment: true,
        limits: WalkLimits::with_sectors(99),
    };
    let report = checksum_media(&mut image, &options, None, &RunControl::new()).unwrap();
    assert_eq!(report.segments.len(), 2);
    assert_eq!(report.segments[0].digests, report.segments[1].digests);
    assert!(report.whole_media.is_none());
}
