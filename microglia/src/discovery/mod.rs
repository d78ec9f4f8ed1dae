//! Input discovery: recognized microscope formats, their channel naming
//! conventions, and the image list of a batch directory.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::error::InputError;

/// How a format's metadata names its channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelNaming {
    /// Metadata channel name, index when blank.
    Name,
    /// Metadata channel name when the channel also has an ID, index otherwise.
    IdentifiedName,
    /// Fluorophore, index when blank.
    Fluorophore,
    /// Emission wavelength, index when missing.
    EmissionWavelength,
    Index,
}

/// Per-channel metadata as reported by a format reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMetadata {
    pub id: Option<String>,
    pub name: Option<String>,
    pub fluorophore: Option<String>,
    pub emission_wavelength: Option<f64>,
}

/// Recognized input formats, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    Nd,
    Nd2,
    Czi,
    Lif,
    Ics,
    Ics2,
    Lsm,
    Tiff,
}

struct FormatEntry {
    format: ImageFormat,
    extensions: &'static [&'static str],
    naming: ChannelNaming,
    readable: bool,
}

const FORMAT_TABLE: [FormatEntry; 8] = [
    FormatEntry {
        format: ImageFormat::Nd,
        extensions: &["nd"],
        naming: ChannelNaming::Name,
        readable: false,
    },
    FormatEntry {
        format: ImageFormat::Nd2,
        extensions: &["nd2"],
        naming: ChannelNaming::Name,
        readable: false,
    },
    FormatEntry {
        format: ImageFormat::Czi,
        extensions: &["czi"],
        naming: ChannelNaming::Fluorophore,
        readable: false,
    },
    FormatEntry {
        format: ImageFormat::Lif,
        extensions: &["lif"],
        naming: ChannelNaming::IdentifiedName,
        readable: false,
    },
    FormatEntry {
        format: ImageFormat::Ics,
        extensions: &["ics"],
        naming: ChannelNaming::EmissionWavelength,
        readable: false,
    },
    FormatEntry {
        format: ImageFormat::Ics2,
        extensions: &["ics2"],
        naming: ChannelNaming::EmissionWavelength,
        readable: false,
    },
    FormatEntry {
        format: ImageFormat::Lsm,
        extensions: &["lsm"],
        naming: ChannelNaming::Index,
        readable: false,
    },
    FormatEntry {
        format: ImageFormat::Tiff,
        extensions: &["tif", "tiff"],
        naming: ChannelNaming::Name,
        readable: true,
    },
];

impl ImageFormat {
    fn entry(self) -> &'static FormatEntry {
        // Every variant has exactly one row, in declaration order.
        &FORMAT_TABLE[self as usize]
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::iter().find(|f| {
            f.extensions()
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extensions(self) -> &'static [&'static str] {
        self.entry().extensions
    }

    pub fn channel_naming(self) -> ChannelNaming {
        self.entry().naming
    }

    /// Whether volumes in this format can be loaded.
    pub fn is_readable(self) -> bool {
        self.entry().readable
    }

    /// Display names for the channels described by `channels`.
    pub fn channel_names(self, channels: &[ChannelMetadata]) -> Vec<String> {
        let naming = self.channel_naming();
        channels
            .iter()
            .enumerate()
            .map(|(i, meta)| channel_name(naming, i, meta))
            .collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn channel_name(naming: ChannelNaming, index: usize, meta: &ChannelMetadata) -> String {
    let named = match naming {
        ChannelNaming::Name => non_blank(&meta.name).map(str::to_string),
        ChannelNaming::IdentifiedName => meta
            .id
            .as_ref()
            .and_then(|_| non_blank(&meta.name))
            .map(str::to_string),
        ChannelNaming::Fluorophore => non_blank(&meta.fluorophore).map(str::to_string),
        ChannelNaming::EmissionWavelength => meta.emission_wavelength.map(|w| w.to_string()),
        ChannelNaming::Index => None,
    };
    named.unwrap_or_else(|| index.to_string())
}

/// Images of the batch in `dir`.
///
/// The recognized format carried by the most files wins (ties go to the
/// earlier format in [`ImageFormat`] order). Hidden files are skipped and
/// the result is sorted by path.
pub fn find_images(dir: &Path) -> Result<(ImageFormat, Vec<PathBuf>), InputError> {
    let entries = std::fs::read_dir(dir).map_err(|source| InputError::ListDirectory {
        dir: dir.to_path_buf(),
        source,
    })?;

    let mut by_format: HashMap<ImageFormat, Vec<PathBuf>> = HashMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| InputError::ListDirectory {
            dir: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_file() {
            continue;
        }
        if let Some(format) = ImageFormat::from_path(&path) {
            by_format.entry(format).or_default().push(path);
        }
    }

    let mut best: Option<(ImageFormat, usize)> = None;
    for format in ImageFormat::iter() {
        let count = by_format.get(&format).map_or(0, Vec::len);
        if count > best.map_or(0, |(_, n)| n) {
            best = Some((format, count));
        }
    }
    let Some((format, _)) = best else {
        return Err(InputError::NoImages {
            dir: dir.to_path_buf(),
        });
    };

    let mut images = by_format.remove(&format).unwrap_or_default();
    images.sort();
    tracing::info!(
        dir = %dir.display(),
        %format,
        count = images.len(),
        "Found images"
    );
    Ok((format, images))
}
