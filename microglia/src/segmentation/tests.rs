use common::Buffer3;

use super::*;
use crate::error::Error;
use crate::region_mask::RegionMask;
use crate::testing::{add_noise, fill_blob, init_tracing, volume_with_boxes};
use crate::volume::Calibration;

const SHAPE: (usize, usize, usize) = (40, 40, 6);

// The slice-wise median removes the four corner pixels of every box plane
// and nothing else: 10×10×4 → 384 voxels, 8×8×3 → 180 voxels.
const BIG_BOX: ((usize, usize, usize), (usize, usize, usize)) = ((5, 5, 1), (10, 10, 4));
const SMALL_BOX: ((usize, usize, usize), (usize, usize, usize)) = ((25, 25, 2), (8, 8, 3));
const BIG_BOX_MASKED: usize = 384;
const SMALL_BOX_MASKED: usize = 180;

fn two_boxes() -> Volume {
    volume_with_boxes(SHAPE, Calibration::unit(), &[BIG_BOX, SMALL_BOX], 10.0, 200.0)
}

fn no_exclusion() -> ExclusionPlane {
    ExclusionPlane::new(&[], SHAPE.0, SHAPE.1)
}

fn index(x: usize, y: usize, z: usize) -> usize {
    (z * SHAPE.1 + y) * SHAPE.0 + x
}

fn context() -> ProcessingContext {
    ProcessingContext::new(Some(2)).unwrap()
}

#[test]
fn test_all_zero_volume_gives_empty_mask() {
    init_tracing();
    let (w, h, d) = SHAPE;
    let volume = Volume::new(Buffer3::new_default(w, h, d), Calibration::unit());
    let mask = CellBodySegmenter::new(ThresholdMethod::Otsu, 0.0)
        .segment(&context(), &volume, &no_exclusion())
        .unwrap();
    assert!(mask.is_empty());
    assert_eq!(mask.label(), LABEL_BASE);
}

#[test]
fn test_boxes_merged_into_one_mask() {
    let ctx = context();
    let mask = CellBodySegmenter::new(ThresholdMethod::Otsu, 0.0)
        .segment(&ctx, &two_boxes(), &no_exclusion())
        .unwrap();

    assert_eq!(mask.voxel_count(), BIG_BOX_MASKED + SMALL_BOX_MASKED);
    assert_eq!(mask.plane_span(), 4);
    assert!(mask.contains(index(10, 10, 2)));
    assert!(mask.contains(index(28, 28, 3)));
    assert!(!mask.contains(index(5, 5, 1)));
    assert!(!mask.contains(index(0, 0, 0)));
    assert_eq!(ctx.active_leases(), 0);
}

#[test]
fn test_noise_does_not_change_mask() {
    let mut volume = two_boxes();
    let mut voxels = volume.voxels().clone();
    add_noise(&mut voxels, 17, 2.0);
    volume = Volume::new(voxels, volume.calibration());

    let mask = CellBodySegmenter::new(ThresholdMethod::Otsu, 0.0)
        .segment(&context(), &volume, &no_exclusion())
        .unwrap();
    assert_eq!(mask.voxel_count(), BIG_BOX_MASKED + SMALL_BOX_MASKED);
}

#[test]
fn test_blob_is_one_component() {
    let (w, h, d) = SHAPE;
    let mut voxels = Buffer3::new_filled(w, h, d, 5.0f32);
    fill_blob(&mut voxels, (20.0, 20.0, 2.5), (8.0, 6.0, 2.5), 150.0);
    let volume = Volume::new(voxels, Calibration::unit());

    let mask = CellBodySegmenter::new(ThresholdMethod::Otsu, 0.0)
        .segment(&context(), &volume, &no_exclusion())
        .unwrap();
    assert!(mask.contains(index(20, 20, 2)));
    assert!(!mask.contains(index(2, 2, 2)));
    assert!(mask.voxel_count() > 0);
}

#[test]
fn test_small_components_discarded() {
    let mask = CellBodySegmenter::new(ThresholdMethod::Otsu, 200.0)
        .segment(&context(), &two_boxes(), &no_exclusion())
        .unwrap();
    assert_eq!(mask.voxel_count(), BIG_BOX_MASKED);
    assert!(!mask.contains(index(28, 28, 3)));
}

#[test]
fn test_min_volume_uses_calibration() {
    // 0.5 × 0.5 × 2 µm voxels: the big box is 192 µm³, the small one 90 µm³.
    let volume = two_boxes().with_calibration(Calibration::new(0.5, 2.0));
    let mask = CellBodySegmenter::new(ThresholdMethod::Otsu, 100.0)
        .segment(&context(), &volume, &no_exclusion())
        .unwrap();
    assert_eq!(mask.voxel_count(), BIG_BOX_MASKED);
}

#[test]
fn test_region_mask_covering_image_gives_empty_mask() {
    let exclusion = ExclusionPlane::new(
        &[RegionMask::rectangle(0.0, 0.0, SHAPE.0 as f64, SHAPE.1 as f64)],
        SHAPE.0,
        SHAPE.1,
    );
    let mask = CellBodySegmenter::new(ThresholdMethod::Otsu, 0.0)
        .segment(&context(), &two_boxes(), &exclusion)
        .unwrap();
    assert!(mask.is_empty());
}

#[test]
fn test_region_mask_removes_covered_box() {
    let exclusion = ExclusionPlane::new(&[RegionMask::rectangle(0.0, 0.0, 20.0, 20.0)], SHAPE.0, SHAPE.1);
    let mask = CellBodySegmenter::new(ThresholdMethod::Otsu, 0.0)
        .segment(&context(), &two_boxes(), &exclusion)
        .unwrap();
    assert_eq!(mask.voxel_count(), SMALL_BOX_MASKED);
}

#[test]
fn test_method_resolved_by_name() {
    let segmenter = CellBodySegmenter::from_method_name("otsu", 0.5).unwrap();
    assert_eq!(segmenter.method(), ThresholdMethod::Otsu);
    assert_eq!(segmenter.min_cell_volume(), 0.5);

    let segmenter = CellBodySegmenter::from_method_name("MaxEntropy", 0.5).unwrap();
    assert_eq!(segmenter.method(), ThresholdMethod::MaxEntropy);
}

#[test]
fn test_unknown_method_is_config_error() {
    let err = CellBodySegmenter::from_method_name("Sauvola", 0.5).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownThresholdMethod { ref name, .. } if name == "Sauvola"));
    assert!(Error::from(err).is_fatal_for_batch());
}
