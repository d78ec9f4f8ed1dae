use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use common::Buffer3;
use tiff::TiffResult;
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use crate::error::InputError;

/// `ResolutionUnit` tag value for centimeters.
const RESOLUTION_UNIT_CENTIMETER: u16 = 3;
const MICRONS_PER_CENTIMETER: f64 = 10_000.0;
/// `PageName`, used by several acquisition tools for the channel label.
pub(crate) const PAGE_NAME: Tag = Tag::Unknown(285);

/// One channel of a multi-page TIFF plus whatever calibration the file
/// carried.
#[derive(Debug, Clone)]
pub struct LoadedStack {
    pub voxels: Buffer3<f32>,
    pub channel_count: usize,
    /// Page name of each channel's first plane, when present.
    pub channel_labels: Vec<Option<String>>,
    pub xy_calibration: Option<f64>,
    pub z_calibration: Option<f64>,
}

/// Layout and calibration from an ImageJ `ImageDescription`.
#[derive(Debug, Default, Clone, PartialEq)]
pub(super) struct ImageJDescription {
    pub channels: Option<usize>,
    pub slices: Option<usize>,
    pub spacing: Option<f64>,
    pub unit: Option<String>,
}

impl ImageJDescription {
    pub fn parse(text: &str) -> Option<Self> {
        if !text.starts_with("ImageJ=") {
            return None;
        }
        let mut desc = Self::default();
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "channels" => desc.channels = value.parse().ok(),
                "slices" => desc.slices = value.parse().ok(),
                "spacing" => desc.spacing = value.parse().ok(),
                "unit" => desc.unit = Some(value.to_string()),
                _ => {}
            }
        }
        Some(desc)
    }

    /// ImageJ writes micrometers in several spellings.
    pub fn unit_is_micron(&self) -> bool {
        matches!(
            self.unit.as_deref(),
            Some("micron" | "microns" | "um" | "µm" | "\\u00B5m")
        )
    }
}

fn decode_err(path: &Path, e: impl std::fmt::Display) -> InputError {
    InputError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, InputError> {
    let file = File::open(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Decoder::new(BufReader::new(file))
        .map(|d| d.with_limits(Limits::unlimited()))
        .map_err(|e| decode_err(path, e))
}

fn samples_to_f32(result: DecodingResult) -> Option<Vec<f32>> {
    match result {
        DecodingResult::U8(buf) => Some(buf.into_iter().map(f32::from).collect()),
        DecodingResult::U16(buf) => Some(buf.into_iter().map(f32::from).collect()),
        DecodingResult::U32(buf) => Some(buf.into_iter().map(|v| v as f32).collect()),
        DecodingResult::F32(buf) => Some(buf),
        _ => None,
    }
}

fn page_name(decoder: &mut Decoder<BufReader<File>>) -> Option<String> {
    let text = decoder.get_tag_ascii_string(PAGE_NAME).ok()?;
    let text = text.trim_end_matches('\0').trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Load channel `channel` of a grayscale multi-page TIFF.
///
/// Pages are interpreted in ImageJ hyperstack order (channel fastest, then
/// slice) when an ImageJ description is present, otherwise every page is
/// one z-plane of a single channel. Only the first time point is read.
pub fn load_tiff_volume(path: &Path, channel: usize) -> Result<LoadedStack, InputError> {
    let mut decoder = open_decoder(path)?;

    let description = decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .ok()
        .and_then(|text| ImageJDescription::parse(&text));
    let x_resolution = match decoder.find_tag(Tag::XResolution) {
        Ok(Some(Value::Rational(num, den))) if num > 0 && den > 0 => {
            Some(num as f64 / den as f64)
        }
        _ => None,
    };
    let resolution_unit = decoder
        .find_tag(Tag::ResolutionUnit)
        .ok()
        .flatten()
        .and_then(|v| v.into_u16().ok());

    let channel_count = description
        .as_ref()
        .and_then(|d| d.channels)
        .unwrap_or(1)
        .max(1);
    if channel >= channel_count {
        return Err(InputError::ChannelOutOfRange {
            path: path.to_path_buf(),
            requested: channel,
            available: channel_count,
        });
    }
    let slice_limit = description.as_ref().and_then(|d| d.slices);
    let complete = |planes: usize| slice_limit.is_some_and(|limit| planes >= limit);

    let (width, height) = decoder.dimensions().map_err(|e| decode_err(path, e))?;
    let (width, height) = (width as usize, height as usize);

    let mut planes = Vec::new();
    let mut channel_labels = Vec::with_capacity(channel_count);
    let mut page = 0usize;
    loop {
        if page < channel_count {
            channel_labels.push(page_name(&mut decoder));
        }
        if page % channel_count == channel && !complete(planes.len()) {
            match decoder.colortype().map_err(|e| decode_err(path, e))? {
                tiff::ColorType::Gray(_) => {}
                other => {
                    return Err(decode_err(
                        path,
                        format!("page {page}: unsupported color type {other:?}"),
                    ));
                }
            }
            let (w, h) = decoder.dimensions().map_err(|e| decode_err(path, e))?;
            if (w as usize, h as usize) != (width, height) {
                return Err(decode_err(
                    path,
                    format!("page {page} is {w}x{h}, expected {width}x{height}"),
                ));
            }
            let samples = decoder.read_image().map_err(|e| decode_err(path, e))?;
            let plane = samples_to_f32(samples).ok_or_else(|| {
                decode_err(path, format!("page {page}: unsupported sample format"))
            })?;
            planes.push(plane);
        }
        if page + 1 >= channel_count && complete(planes.len()) {
            break;
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| decode_err(path, e))?;
        page += 1;
    }

    if planes.is_empty() {
        return Err(decode_err(path, "no image planes"));
    }
    channel_labels.resize(channel_count, None);

    let xy_calibration = x_resolution.and_then(|pixels_per_unit| {
        let unit_size = 1.0 / pixels_per_unit;
        match (&description, resolution_unit) {
            (Some(d), _) if d.unit_is_micron() => Some(unit_size),
            (_, Some(RESOLUTION_UNIT_CENTIMETER)) => Some(unit_size * MICRONS_PER_CENTIMETER),
            _ => None,
        }
    });
    let z_calibration = description
        .as_ref()
        .filter(|d| d.unit_is_micron())
        .and_then(|d| d.spacing)
        .filter(|s| *s > 0.0);

    tracing::debug!(
        path = %path.display(),
        width,
        height,
        depth = planes.len(),
        channel_count,
        ?xy_calibration,
        ?z_calibration,
        "Loaded TIFF stack"
    );

    Ok(LoadedStack {
        voxels: Buffer3::from_planes(width, height, planes),
        channel_count,
        channel_labels,
        xy_calibration,
        z_calibration,
    })
}

/// Read an integer label stack (one page per z-plane).
pub fn read_label_stack(path: &Path) -> Result<Buffer3<u32>, InputError> {
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions().map_err(|e| decode_err(path, e))?;
    let mut planes = Vec::new();
    loop {
        let plane: Vec<u32> = match decoder.read_image().map_err(|e| decode_err(path, e))? {
            DecodingResult::U8(buf) => buf.into_iter().map(u32::from).collect(),
            DecodingResult::U16(buf) => buf.into_iter().map(u32::from).collect(),
            DecodingResult::U32(buf) => buf,
            DecodingResult::F32(buf) => buf.into_iter().map(|v| v.max(0.0) as u32).collect(),
            _ => return Err(decode_err(path, "unsupported label sample format")),
        };
        if plane.len() != width as usize * height as usize {
            return Err(decode_err(path, "label pages differ in size"));
        }
        planes.push(plane);
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| decode_err(path, e))?;
    }
    Ok(Buffer3::from_planes(width as usize, height as usize, planes))
}

/// Write a float stack, one page per z-plane.
pub fn write_f32_stack(path: &Path, voxels: &Buffer3<f32>) -> TiffResult<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut tiff = TiffEncoder::new(file)?;
    for plane in voxels.planes() {
        tiff.write_image::<colortype::Gray32Float>(
            voxels.width() as u32,
            voxels.height() as u32,
            plane,
        )?;
    }
    Ok(())
}

/// Write 16-bit pages; `description` goes into the first page.
pub(crate) fn write_u16_pages(
    path: &Path,
    width: usize,
    height: usize,
    pages: impl IntoIterator<Item = Vec<u16>>,
    description: Option<&str>,
) -> TiffResult<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut tiff = TiffEncoder::new(file)?;
    for (i, page) in pages.into_iter().enumerate() {
        debug_assert_eq!(page.len(), width * height);
        let mut image = tiff.new_image::<colortype::Gray16>(width as u32, height as u32)?;
        if i == 0
            && let Some(text) = description
        {
            image.encoder().write_tag(Tag::ImageDescription, text)?;
        }
        image.write_data(&page)?;
    }
    Ok(())
}
