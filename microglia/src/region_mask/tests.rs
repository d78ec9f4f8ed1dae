use super::*;

#[test]
fn test_rectangle_rasterizes_pixel_centers() {
    let mask = RegionMask::rectangle(1.0, 1.0, 3.0, 4.0);
    let plane = mask.rasterize(5, 5);
    let inside: Vec<(usize, usize)> = (0..25)
        .filter(|&i| plane[i])
        .map(|i| (i % 5, i / 5))
        .collect();
    assert_eq!(
        inside,
        vec![(1, 1), (2, 1), (1, 2), (2, 2), (1, 3), (2, 3)]
    );
}

#[test]
fn test_rasterize_matches_contains() {
    let mask = RegionMask::new(vec![[2.0, 1.0], [18.5, 4.0], [12.0, 17.3], [4.2, 11.0]]);
    let (w, h) = (20, 20);
    let plane = mask.rasterize(w, h);
    for y in 0..h {
        for x in 0..w {
            assert_eq!(
                plane[y * w + x],
                mask.contains(x as f64 + 0.5, y as f64 + 0.5),
                "pixel ({x}, {y})"
            );
        }
    }
}

#[test]
fn test_self_intersecting_polygon_is_even_odd() {
    // Bow tie with a left and a right lobe meeting at (5, 5).
    let mask = RegionMask::new(vec![[0.0, 0.0], [10.0, 10.0], [10.0, 0.0], [0.0, 10.0]]);
    assert!(mask.contains(1.0, 5.0));
    assert!(mask.contains(9.0, 5.0));
    assert!(!mask.contains(5.0, 1.0));
    assert!(!mask.contains(5.0, 9.0));
}

#[test]
fn test_polygon_outside_plane_is_clipped() {
    let mask = RegionMask::rectangle(-5.0, -5.0, 2.0, 100.0);
    let plane = mask.rasterize(4, 3);
    assert_eq!(plane.iter().filter(|&&p| p).count(), 2 * 3);
}

#[test]
fn test_exclusion_plane_is_union() {
    let masks = vec![
        RegionMask::rectangle(0.0, 0.0, 4.0, 4.0),
        RegionMask::rectangle(2.0, 2.0, 6.0, 6.0),
    ];
    let plane = ExclusionPlane::new(&masks, 10, 10);
    assert_eq!(plane.excluded_pixels(), 16 + 16 - 4);

    let volume = plane.excluded_volume(10, &Calibration::new(0.5, 1.0));
    assert!((volume - 28.0 * 0.25 * 10.0).abs() < 1e-9);
}

#[test]
fn test_blank_mask_and_labels_on_every_plane() {
    let plane = ExclusionPlane::new(&[RegionMask::rectangle(0.0, 0.0, 2.0, 1.0)], 3, 2);

    let mut mask = BitBuffer3::new_filled(3, 2, 3, true);
    plane.blank(&mut mask);
    assert_eq!(mask.count_ones(), 4 * 3);
    for z in 0..3 {
        assert!(!mask.get_xyz(0, 0, z));
        assert!(!mask.get_xyz(1, 0, z));
        assert!(mask.get_xyz(2, 0, z));
    }

    let mut labels = Buffer3::new_filled(3, 2, 2, 5u32);
    plane.blank(&mut labels);
    assert_eq!(labels.plane(1), &[0, 0, 5, 5, 5, 5]);
}

#[test]
fn test_empty_exclusion_leaves_target_untouched() {
    let plane = ExclusionPlane::new(&[], 4, 4);
    assert!(plane.is_empty());
    let mut mask = BitBuffer3::new_filled(4, 4, 2, true);
    plane.blank(&mut mask);
    assert_eq!(mask.count_ones(), 32);
}

#[test]
fn test_missing_sidecar_means_no_masks() {
    let dir = tempfile::tempdir().unwrap();
    let masks = load_sidecar(&dir.path().join("image.tif")).unwrap();
    assert!(masks.is_empty());
}

#[test]
fn test_imagej_roi_set_without_sidecar_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("slice_02.tif");
    let roi_set = dir.path().join("slice_02.zip");
    std::fs::write(&roi_set, b"PK").unwrap();

    let err = load_sidecar(&image).unwrap_err();
    assert!(matches!(
        &err,
        InputError::UnreadableRoiSet { path, expected }
            if *path == roi_set && *expected == sidecar_path(&image)
    ));

    // An exported sidecar takes precedence.
    std::fs::write(sidecar_path(&image), "[]").unwrap();
    assert!(load_sidecar(&image).unwrap().is_empty());
}

#[test]
fn test_load_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("slice_01.tif");
    std::fs::write(
        dir.path().join("slice_01.rois.json"),
        r#"[{"name": "vessel", "points": [[0, 0], [4, 0], [4, 4], [0, 4]]},
            {"points": [[5, 5], [6, 5], [6, 6]]}]"#,
    )
    .unwrap();

    let masks = load_sidecar(&image).unwrap();

    assert_eq!(masks.len(), 2);
    assert_eq!(masks[0].name.as_deref(), Some("vessel"));
    assert_eq!(masks[1].name, None);
    assert_eq!(masks[1].points.len(), 3);
}

#[test]
fn test_malformed_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("a.tif");
    let sidecar = sidecar_path(&image);

    std::fs::write(&sidecar, "{ not json").unwrap();
    assert!(matches!(
        load_sidecar(&image),
        Err(InputError::MalformedRegionMask { .. })
    ));

    std::fs::write(&sidecar, r#"[{"points": [[0, 0], [1, 1]]}]"#).unwrap();
    assert!(matches!(
        load_sidecar(&image),
        Err(InputError::MalformedRegionMask { .. })
    ));
}
