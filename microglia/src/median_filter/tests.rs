//! Tests for the slice-wise median filter.

use super::*;

#[test]
fn test_disk_radius_two_has_thirteen_taps() {
    let offsets = disk_offsets(2.0);
    assert_eq!(offsets.len(), 13);
    assert!(offsets.contains(&(2, 0)));
    assert!(offsets.contains(&(1, 1)));
    assert!(!offsets.contains(&(2, 1)));
}

#[test]
fn test_uniform_volume_unchanged() {
    let volume = Buffer3::new_filled(20, 15, 3, 0.5f32);
    let output = median_filter_slice_wise(&volume, 2.0);
    assert!(output.voxels().iter().all(|&v| (v - 0.5).abs() < 1e-6));
}

#[test]
fn test_single_hot_voxel_removed() {
    let mut volume = Buffer3::new_filled(9, 9, 2, 0.1f32);
    volume[(4, 4, 1)] = 100.0;

    let output = median_filter_slice_wise(&volume, 2.0);

    assert!((output[(4, 4, 1)] - 0.1).abs() < 1e-6);
}

#[test]
fn test_planes_filtered_independently() {
    // Plane 0 dark, plane 1 bright: a 3D filter would mix them.
    let mut volume = Buffer3::new_filled(6, 6, 2, 0.0f32);
    volume.plane_mut(1).fill(10.0);

    let output = median_filter_slice_wise(&volume, 2.0);

    assert!(output.plane(0).iter().all(|&v| v == 0.0));
    assert!(output.plane(1).iter().all(|&v| v == 10.0));
}

#[test]
fn test_large_block_survives() {
    let mut volume = Buffer3::new_filled(30, 30, 1, 0.0f32);
    for y in 10..20 {
        for x in 10..20 {
            volume[(x, y, 0)] = 5.0;
        }
    }

    let output = median_filter_slice_wise(&volume, 2.0);

    assert_eq!(output[(15, 15, 0)], 5.0);
    assert_eq!(output[(2, 2, 0)], 0.0);
    // Corners of a square lose to the disk majority.
    assert_eq!(output[(10, 10, 0)], 0.0);
}

#[test]
fn test_edges_use_nearest_pixel() {
    let volume = Buffer3::new(3, 1, 1, vec![1.0, 2.0, 3.0]);
    let output = median_filter_slice_wise(&volume, 1.0);
    // x = 0 window: clamp(-1)=1, 1, 2, and rows clamp to the same row.
    assert_eq!(output.voxels(), &[1.0, 2.0, 3.0]);
}

#[test]
fn test_empty_volume() {
    let volume = Buffer3::<f32>::new_default(0, 0, 0);
    let output = median_filter_slice_wise(&volume, 2.0);
    assert!(output.is_empty());
}
