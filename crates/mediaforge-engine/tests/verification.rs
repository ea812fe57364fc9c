//! Verifier scenarios over in-memory and MFI images

use mediaforge_core::{MediaType, Track, TrackType};
use mediaforge_engine::progress::RunControl;
use mediaforge_engine::verify::{
    verify_image, verify_sectors, ExitStatus, VerificationStatus,
};
use mediaforge_formats::MemoryImage;

fn image_with_verdicts(verdicts: Vec<Option<bool>>) -> MemoryImage {
    let sectors = verdicts.len();
    MemoryImage::block(vec![0u8; sectors * 512], 512, MediaType::GenericHdd)
        .with_sector_verdicts(verdicts)
}

#[test]
fn image_without_capability_is_not_applicable() {
    let mut image = MemoryImage::block(vec![0u8; 1024], 512, MediaType::GenericHdd);
    assert_eq!(
        verify_image(&mut image).unwrap(),
        VerificationStatus::NotApplicable
    );
}

#[test]
fn image_verdicts_map_to_tristate() {
    let mut correct = MemoryImage::block(vec![0u8; 512], 512, MediaType::GenericHdd)
        .with_image_verdict(Some(true));
    assert_eq!(verify_image(&mut correct).unwrap(), VerificationStatus::Correct);

    let mut incorrect = MemoryImage::block(vec![0u8; 512], 512, MediaType::GenericHdd)
        .with_image_verdict(Some(false));
    assert_eq!(
        verify_image(&mut incorrect).unwrap(),
        VerificationStatus::Incorrect
    );

    let mut absent = MemoryImage::block(vec![0u8; 512], 512, MediaType::GenericHdd)
        .with_image_verdict(None);
    assert_eq!(
        verify_image(&mut absent).unwrap(),
        VerificationStatus::NotApplicable
    );
}

#[test]
fn sector_sets_are_disjoint_and_bounded() {
    let mut verdicts: Vec<Option<bool>> = Vec::new();
    for i in 0..1000u64 {
        verdicts.push(match i % 5 {
            0 => Some(false),
            1 | 2 => None,
            _ => Some(true),
        });
    }
    let mut image = image_with_verdicts(verdicts);

    let result = verify_sectors(&mut image, None, None, &RunControl::new()).unwrap();
    assert_eq!(result.total_sectors, 1000);
    assert_eq!(result.failing_lbas.len(), 200);
    assert_eq!(result.unknown_lbas.len(), 400);

    for lba in &result.failing_lbas {
        assert!(!result.unknown_lbas.contains(lba));
    }
    assert!(result.failing_lbas.len() + result.unknown_lbas.len() <= 1000);
    assert_eq!(result.status(), VerificationStatus::Incorrect);
}

#[test]
fn sector_status_not_applicable_when_all_unknown() {
    let mut image = image_with_verdicts(vec![None; 64]);
    let result = verify_sectors(&mut image, None, None, &RunControl::new()).unwrap();
    assert_eq!(result.unknown_lbas.len(), 64);
    assert_eq!(result.status(), VerificationStatus::NotApplicable);
}

#[test]
fn sector_verification_without_capability_reports_unknown() {
    let mut image = MemoryImage::block(vec![0u8; 32 * 512], 512, MediaType::GenericHdd);
    let result = verify_sectors(&mut image, None, None, &RunControl::new()).unwrap();
    assert_eq!(result.unknown_lbas.len(), 32);
    assert_eq!(result.status(), VerificationStatus::NotApplicable);
}

#[test]
fn range_restricts_the_walk() {
    let mut verdicts = vec![Some(true); 100];
    verdicts[40] = Some(false);
    verdicts[60] = Some(false);
    let mut image = image_with_verdicts(verdicts);

    let result = verify_sectors(&mut image, Some((30, 20)), None, &RunControl::new()).unwrap();
    assert_eq!(result.total_sectors, 20);
    assert_eq!(result.failing_lbas, vec![40]);
}

#[test]
fn optical_verification_walks_tracks() {
    let mut verdicts = vec![Some(true); 800];
    verdicts[700] = Some(false);
    let tracks = vec![
        Track::new(1, 0, 499, TrackType::CdMode1),
        Track::new(2, 500, 799, TrackType::CdMode1),
    ];
    let mut image = MemoryImage::optical(vec![0u8; 800 * 2048], 2048, tracks)
        .with_sector_verdicts(verdicts);

    let result = verify_sectors(&mut image, None, None, &RunControl::new()).unwrap();
    assert_eq!(result.total_sectors, 800);
    assert_eq!(result.failing_lbas, vec![700]);
    assert_eq!(result.status(), VerificationStatus::Incorrect);
}

#[test]
fn combined_classification_paths() {
    // Correct image, failing sectors
    let mut verdicts = vec![Some(true); 10];
    verdicts[3] = Some(false);
    let mut image = image_with_verdicts(verdicts).with_image_verdict(Some(true));

    let image_status = verify_image(&mut image).unwrap();
    let sectors = verify_sectors(&mut image, None, None, &RunControl::new()).unwrap();
    let exit = ExitStatus::classify(image_status, sectors.status());
    assert_eq!(exit, ExitStatus::CorrectImageBadSectors);
    assert_eq!(exit.code(), 1);

    // Nothing verifiable on either axis
    let mut image = MemoryImage::block(vec![0u8; 512], 512, MediaType::GenericHdd);
    let image_status = verify_image(&mut image).unwrap();
    let sectors = verify_sectors(&mut image, None, None, &RunControl::new()).unwrap();
    let exit = ExitStatus::classify(image_status, sectors.status());
    assert_eq!(exit, ExitStatus::NotVerifiable);
    assert_eq!(exit.code(), 8);
}
