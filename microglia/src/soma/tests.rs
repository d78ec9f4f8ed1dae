use common::Buffer3;

use super::*;
use crate::constants::LABEL_BASE;
use crate::error::Error;
use crate::region_mask::RegionMask;
use crate::testing::{
    FixedLabelsBackend, ThresholdSliceDetector, UnavailableBackend, default_params, fill_box,
    init_tracing, volume_with_boxes,
};

const SHAPE: (usize, usize, usize) = (100, 100, 10);

fn calibration() -> Calibration {
    Calibration::new(0.5, 1.0)
}

fn empty_volume() -> Volume {
    let (w, h, d) = SHAPE;
    Volume::new(Buffer3::new_default(w, h, d), calibration())
}

fn no_exclusion() -> ExclusionPlane {
    ExclusionPlane::new(&[], SHAPE.0, SHAPE.1)
}

/// Cell mask covering the whole raster.
fn full_cell_mask() -> LabeledObject {
    let (w, h, d) = SHAPE;
    LabeledObject::new(LABEL_BASE, (0..w * h * d).collect(), w * h)
}

fn detector(min: f64, max: f64) -> SomaDetector {
    SomaDetector::new(default_params(), min, max)
}

fn labels_with_boxes(boxes: &[((usize, usize, usize), (usize, usize, usize), u32)]) -> Buffer3<u32> {
    let (w, h, d) = SHAPE;
    let mut labels = Buffer3::new_default(w, h, d);
    for &(origin, size, label) in boxes {
        fill_box(&mut labels, origin, size, label);
    }
    labels
}

// ---------------------------------------------------------------------------
// Stitching
// ---------------------------------------------------------------------------

fn plane(width: usize, height: usize, pixels: &[(usize, usize, u32)]) -> Vec<u32> {
    let mut out = vec![0; width * height];
    for &(x, y, l) in pixels {
        out[y * width + x] = l;
    }
    out
}

fn rows(width: usize, height: usize, runs: &[(usize, std::ops::Range<usize>, u32)]) -> Vec<u32> {
    let mut out = vec![0; width * height];
    for (y, xs, l) in runs {
        for x in xs.clone() {
            out[y * width + x] = *l;
        }
    }
    out
}

#[test]
fn test_stitch_links_identical_instances() {
    let p = rows(4, 4, &[(1, 0..3, 9), (2, 0..3, 9)]);
    let stitched = stitch_planes(vec![p.clone(), p.clone(), p], 4, 4, 0.5);
    assert_eq!(stitched.depth(), 3);
    for z in 0..3 {
        assert_eq!(*stitched.get(1, 1, z), 1);
        assert_eq!(*stitched.get(3, 1, z), 0);
    }
}

#[test]
fn test_stitch_keeps_weak_overlaps_separate() {
    // IoU = 1 / 7.
    let a = rows(4, 4, &[(0, 0..4, 3)]);
    let b = rows(4, 4, &[(0, 3..4, 3), (1, 0..3, 3)]);
    let stitched = stitch_planes(vec![a, b], 4, 4, 0.5);
    assert_eq!(*stitched.get(0, 0, 0), 1);
    assert_eq!(*stitched.get(3, 0, 1), 2);
    assert_eq!(*stitched.get(0, 1, 1), 2);
}

#[test]
fn test_stitch_threshold_is_inclusive() {
    // IoU = 2 / 4 exactly.
    let a = rows(4, 4, &[(0, 0..2, 1), (1, 0..2, 1)]);
    let b = rows(4, 4, &[(0, 0..2, 4)]);
    let stitched = stitch_planes(vec![a, b], 4, 4, 0.5);
    assert_eq!(*stitched.get(0, 0, 1), 1);
}

#[test]
fn test_stitch_previous_instance_claimed_once() {
    let a = rows(4, 4, &[(0, 0..4, 1), (1, 0..4, 1)]);
    // Label 5: IoU 4/8. Label 7: IoU 3/8.
    let b = rows(4, 4, &[(0, 0..4, 5), (1, 0..3, 7)]);
    let stitched = stitch_planes(vec![a, b], 4, 4, 0.3);
    assert_eq!(*stitched.get(0, 0, 1), 1);
    assert_eq!(*stitched.get(0, 1, 1), 2);
    assert_eq!(*stitched.get(3, 1, 1), 0);
}

#[test]
fn test_stitch_empty_plane_breaks_chain() {
    let p = plane(4, 4, &[(1, 1, 2), (2, 1, 2)]);
    let stitched = stitch_planes(vec![p.clone(), vec![0; 16], p], 4, 4, 0.1);
    assert_eq!(*stitched.get(1, 1, 0), 1);
    assert_eq!(*stitched.get(1, 1, 1), 0);
    assert_eq!(*stitched.get(1, 1, 2), 2);
}

#[test]
fn test_stitch_ids_contiguous() {
    let a = rows(6, 2, &[(0, 0..2, 10), (0, 4..6, 20)]);
    let b = rows(6, 2, &[(1, 0..2, 30), (1, 4..6, 40)]);
    let stitched = stitch_planes(vec![a, b], 6, 2, 0.5);
    let mut ids: Vec<u32> = stitched.voxels().iter().copied().filter(|&l| l != 0).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn test_stitching_backend_builds_3d_objects() {
    let volume = volume_with_boxes(
        (20, 20, 4),
        Calibration::unit(),
        &[((2, 2, 0), (4, 4, 4)), ((12, 12, 1), (5, 5, 2))],
        0.0,
        100.0,
    );
    let backend = StitchingBackend::new(ThresholdSliceDetector { level: 50.0 });
    let labels = backend.detect(&volume, &default_params()).unwrap();

    let population = ObjectPopulation::from_label_volume(&labels);
    assert_eq!(population.len(), 2);
    let spans: Vec<usize> = population.iter().map(|o| o.plane_span()).collect();
    assert_eq!(spans, vec![4, 2]);
    assert_eq!(backend.name(), "threshold-slices");
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[test]
fn test_soma_spanning_four_planes_retained() {
    init_tracing();
    // 5 × 5 × 4 = 100 voxels of 0.25 µm³ each.
    let backend = FixedLabelsBackend {
        labels: labels_with_boxes(&[((40, 40, 3), (5, 5, 4), 7)]),
    };
    let result = detector(10.0, 50.0)
        .detect(&backend, &empty_volume(), &no_exclusion(), &full_cell_mask())
        .unwrap();

    assert_eq!(result.somas.len(), 1);
    let soma = &result.somas.objects()[0];
    assert_eq!(soma.label(), LABEL_BASE);
    assert!((soma.volume(&calibration()) - 25.0).abs() < 1e-9);
    assert!((result.somas.total_volume().unwrap() - 25.0).abs() < 1e-9);
    assert_eq!(
        result.diagnostics,
        SomaDiagnostics {
            detected: 1,
            after_plane_span: 1,
            after_volume: 1,
            after_colocalization: 1,
        }
    );
}

#[test]
fn test_single_plane_soma_removed() {
    let backend = FixedLabelsBackend {
        labels: labels_with_boxes(&[((10, 10, 5), (10, 5, 1), 1)]),
    };
    let result = detector(0.0, 1e6)
        .detect(&backend, &empty_volume(), &no_exclusion(), &full_cell_mask())
        .unwrap();

    assert!(result.somas.is_empty());
    assert_eq!(result.diagnostics.detected, 1);
    assert_eq!(result.diagnostics.after_plane_span, 0);
}

#[test]
fn test_volume_bounds_applied() {
    // 25, 8 and 100 µm³.
    let backend = FixedLabelsBackend {
        labels: labels_with_boxes(&[
            ((0, 0, 0), (5, 5, 4), 1),
            ((20, 20, 0), (4, 4, 2), 2),
            ((50, 50, 0), (10, 10, 4), 3),
        ]),
    };
    let result = detector(10.0, 50.0)
        .detect(&backend, &empty_volume(), &no_exclusion(), &full_cell_mask())
        .unwrap();

    assert_eq!(result.diagnostics.after_plane_span, 3);
    assert_eq!(result.diagnostics.after_volume, 1);
    assert_eq!(result.somas.len(), 1);
    assert_eq!(result.somas.objects()[0].voxel_count(), 100);
}

#[test]
fn test_colocalization_thirty_percent_kept_ten_percent_removed() {
    let (w, h, _) = SHAPE;
    // Two 5 × 5 × 4 somas. The cell mask covers plane z = 0 of the first
    // soma plus 5 voxels of plane z = 1 (30 voxels), and 10 voxels of the
    // second one.
    let backend = FixedLabelsBackend {
        labels: labels_with_boxes(&[((0, 0, 0), (5, 5, 4), 1), ((50, 50, 0), (5, 5, 4), 2)]),
    };
    let mut mask_voxels = Vec::new();
    for y in 0..5 {
        for x in 0..5 {
            mask_voxels.push(y * w + x);
        }
    }
    for x in 0..5 {
        mask_voxels.push(w * h + x);
    }
    for y in 50..52 {
        for x in 50..55 {
            mask_voxels.push(y * w + x);
        }
    }
    let cell_mask = LabeledObject::new(LABEL_BASE, mask_voxels, w * h);

    let result = detector(10.0, 50.0)
        .detect(&backend, &empty_volume(), &no_exclusion(), &cell_mask)
        .unwrap();

    assert_eq!(result.diagnostics.after_volume, 2);
    assert_eq!(result.somas.len(), 1);
    let kept = &result.somas.objects()[0];
    assert!(kept.contains(0));
    assert!((kept.colocalization_ratio(&cell_mask) - 0.3).abs() < 1e-9);
}

#[test]
fn test_empty_cell_mask_removes_every_soma() {
    let backend = FixedLabelsBackend {
        labels: labels_with_boxes(&[((0, 0, 0), (5, 5, 4), 1)]),
    };
    let result = detector(10.0, 50.0)
        .detect(&backend, &empty_volume(), &no_exclusion(), &LabeledObject::empty(LABEL_BASE))
        .unwrap();
    assert!(result.somas.is_empty());
    assert_eq!(result.diagnostics.after_volume, 1);
}

#[test]
fn test_region_mask_covering_image_leaves_no_somas() {
    let backend = FixedLabelsBackend {
        labels: labels_with_boxes(&[((0, 0, 0), (5, 5, 4), 1), ((50, 50, 2), (6, 6, 3), 2)]),
    };
    let exclusion = ExclusionPlane::new(
        &[RegionMask::rectangle(0.0, 0.0, SHAPE.0 as f64, SHAPE.1 as f64)],
        SHAPE.0,
        SHAPE.1,
    );
    let candidates = detector(0.0, 1e6)
        .detect_candidates(&backend, &empty_volume(), &exclusion)
        .unwrap();
    assert!(candidates.is_empty());
}

#[test]
fn test_region_mask_splits_nothing_outside() {
    let backend = FixedLabelsBackend {
        labels: labels_with_boxes(&[((0, 0, 0), (5, 5, 4), 1), ((50, 50, 2), (6, 6, 3), 2)]),
    };
    let exclusion = ExclusionPlane::new(&[RegionMask::rectangle(0.0, 0.0, 10.0, 10.0)], SHAPE.0, SHAPE.1);
    let candidates = detector(0.0, 1e6)
        .detect_candidates(&backend, &empty_volume(), &exclusion)
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates.objects()[0].voxel_count(), 108);
    assert_eq!(candidates.labels(), vec![LABEL_BASE]);
}

#[test]
fn test_all_zero_volume_yields_no_somas() {
    let backend = StitchingBackend::new(ThresholdSliceDetector { level: 0.5 });
    let result = detector(0.0, 1e6)
        .detect(&backend, &empty_volume(), &no_exclusion(), &LabeledObject::empty(LABEL_BASE))
        .unwrap();
    assert!(result.somas.is_empty());
    assert_eq!(result.diagnostics, SomaDiagnostics::default());
}

#[test]
fn test_backend_failure_is_service_error() {
    let err = detector(10.0, 50.0)
        .detect(&UnavailableBackend, &empty_volume(), &no_exclusion(), &full_cell_mask())
        .unwrap_err();
    assert!(matches!(err, Error::Service(ServiceError::Unavailable { .. })));
    assert!(!err.is_fatal_for_batch());
}

#[test]
fn test_wrong_output_shape_rejected() {
    let backend = FixedLabelsBackend {
        labels: Buffer3::new_default(10, 10, 2),
    };
    let err = detector(10.0, 50.0)
        .detect_candidates(&backend, &empty_volume(), &no_exclusion())
        .unwrap_err();
    assert!(matches!(err, Error::Service(ServiceError::InvalidOutput { .. })));
}

#[test]
fn test_cellpose_arguments() {
    let command = CellposeCommand::new(CellposeSettings {
        extra_args: vec!["--verbose".to_string()],
        ..CellposeSettings::default()
    });
    let mut params = default_params();
    params.use_gpu = true;
    let args = command.arguments(std::path::Path::new("/tmp/stack.tif"), &params);

    let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
    assert_eq!(args[pos("--pretrained_model") + 1], "test-model");
    assert_eq!(args[pos("--diameter") + 1], "10");
    assert_eq!(args[pos("--stitch_threshold") + 1], "0.5");
    assert!(args.contains(&"--use_gpu".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("--verbose"));
}

#[test]
fn test_cellpose_missing_executable_unavailable() {
    let command = CellposeCommand::new(CellposeSettings {
        executable: "/nonexistent/cellpose-binary".into(),
        ..CellposeSettings::default()
    });
    let volume = Volume::new(Buffer3::new_default(4, 4, 2), Calibration::unit());
    let err = command.detect(&volume, &default_params()).unwrap_err();
    assert!(matches!(err, ServiceError::Unavailable { .. }));
}
