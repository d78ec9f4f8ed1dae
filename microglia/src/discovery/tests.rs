use super::*;

fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"").unwrap();
}

#[test]
fn test_table_covers_every_format() {
    for format in ImageFormat::iter() {
        assert_eq!(format.entry().format, format);
        assert!(!format.extensions().is_empty());
    }
    assert!(ImageFormat::Tiff.is_readable());
    assert!(!ImageFormat::Nd2.is_readable());
}

#[test]
fn test_from_extension() {
    assert_eq!(ImageFormat::from_extension("TIF"), Some(ImageFormat::Tiff));
    assert_eq!(ImageFormat::from_extension("tiff"), Some(ImageFormat::Tiff));
    assert_eq!(ImageFormat::from_extension("ics2"), Some(ImageFormat::Ics2));
    assert_eq!(ImageFormat::from_extension("png"), None);
    assert_eq!(ImageFormat::from_path(Path::new("a/b.czi")), Some(ImageFormat::Czi));
    assert_eq!(ImageFormat::Ics2.to_string(), "ics2");
}

#[test]
fn test_channel_names_per_format() {
    let channels = vec![
        ChannelMetadata {
            id: Some("Channel:0".into()),
            name: Some("Iba1".into()),
            fluorophore: Some("Alexa488".into()),
            emission_wavelength: Some(520.0),
        },
        ChannelMetadata {
            id: None,
            name: Some("  ".into()),
            fluorophore: None,
            emission_wavelength: None,
        },
        ChannelMetadata {
            id: None,
            name: Some("DAPI".into()),
            fluorophore: Some("".into()),
            emission_wavelength: Some(461.5),
        },
    ];

    assert_eq!(ImageFormat::Nd2.channel_names(&channels), ["Iba1", "1", "DAPI"]);
    assert_eq!(ImageFormat::Lif.channel_names(&channels), ["Iba1", "1", "2"]);
    assert_eq!(ImageFormat::Czi.channel_names(&channels), ["Alexa488", "1", "2"]);
    assert_eq!(ImageFormat::Ics.channel_names(&channels), ["520", "1", "461.5"]);
    assert_eq!(ImageFormat::Tiff.channel_names(&channels), ["Iba1", "1", "DAPI"]);
    assert_eq!(ImageFormat::Lsm.channel_names(&channels), ["0", "1", "2"]);
}

#[test]
fn test_majority_format_selected_and_sorted() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["c.tif", "a.tif", "b.TIFF", "x.nd2", ".hidden.tif", "notes.txt"] {
        touch(dir.path(), name);
    }
    std::fs::create_dir(dir.path().join("d.tif")).unwrap();

    let (format, images) = find_images(dir.path()).unwrap();
    assert_eq!(format, ImageFormat::Tiff);
    let names: Vec<String> = images
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a.tif", "b.TIFF", "c.tif"]);
}

#[test]
fn test_tie_goes_to_table_order() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "one.tif");
    touch(dir.path(), "one.czi");
    let (format, images) = find_images(dir.path()).unwrap();
    assert_eq!(format, ImageFormat::Czi);
    assert_eq!(images.len(), 1);
}

#[test]
fn test_no_images() {
    let dir = tempfile::tempdir().unwrap();
    touch(dir.path(), "readme.md");
    assert!(matches!(
        find_images(dir.path()),
        Err(InputError::NoImages { .. })
    ));
    assert!(matches!(
        find_images(&dir.path().join("missing")),
        Err(InputError::ListDirectory { .. })
    ));
}
