//! Results output: the shared tab-separated report and per-image overlays.

mod overlay;


use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub use overlay::{overlay_description, write_overlay};

use crate::error::ReportError;
use crate::measurement::MeasurementRecord;

pub const REPORT_FILE_NAME: &str = "results.tsv";

pub const REPORT_HEADER: [&str; 8] = [
    "Image name",
    "Image vol (µm3)",
    "Image-ROI vol (µm3)",
    "Iba1 bg",
    "Somas number",
    "Cells volume (µm3)",
    "Cells bg-corr mean intensity",
    "Cells bg-corr integrated intensity",
];

/// Create `dir` (and parents) if it does not exist yet.
pub fn ensure_output_dir(dir: &Path) -> Result<(), ReportError> {
    std::fs::create_dir_all(dir).map_err(|source| ReportError::CreateDirectory {
        path: dir.to_path_buf(),
        source,
    })
}

/// One row per image, flushed as soon as it is written so a crash later in
/// the batch keeps every finished row.
#[derive(Debug)]
pub struct ReportWriter<W: Write> {
    out: W,
    path: PathBuf,
    rows: usize,
}

impl ReportWriter<BufWriter<File>> {
    /// Create `<dir>/results.tsv` and write the header. An existing report
    /// is never truncated.
    pub fn create(dir: &Path) -> Result<Self, ReportError> {
        ensure_output_dir(dir)?;
        let path = dir.join(REPORT_FILE_NAME);
        let file = File::create_new(&path).map_err(|source| match source.kind() {
            io::ErrorKind::AlreadyExists => ReportError::ReportExists { path: path.clone() },
            _ => ReportError::Write {
                path: path.clone(),
                source,
            },
        })?;
        tracing::info!(path = %path.display(), "Writing report");
        Self::new(BufWriter::new(file), path)
    }
}

impl<W: Write> ReportWriter<W> {
    /// Wrap `out` and write the header. `path` is only used in errors.
    pub fn new(out: W, path: PathBuf) -> Result<Self, ReportError> {
        let mut writer = Self { out, path, rows: 0 };
        let header = REPORT_HEADER.join("\t");
        writer.write_line(&header)?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn write_record(&mut self, record: &MeasurementRecord) -> Result<(), ReportError> {
        let line = format_row(record);
        self.write_line(&line)?;
        self.rows += 1;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) -> Result<(), ReportError> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.out
            .write_all(buf.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|source| ReportError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

pub fn format_row(record: &MeasurementRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        record.image_name,
        record.image_volume,
        record.analyzed_volume,
        record.background,
        record.soma_count,
        record.cell_volume,
        record.cell_mean_corrected,
        record.cell_integrated_corrected,
    )
}
