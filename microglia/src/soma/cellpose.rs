//! Cellpose command-line backend.
//!
//! The stack is written to a temporary TIFF, Cellpose runs on it as a child
//! process with per-plane detection and its own IoU stitching, and the
//! `_cp_masks` TIFF it leaves next to the input is read back.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use common::Buffer3;
use serde::{Deserialize, Serialize};

use super::backend::{DetectionParams, SomaDetectionBackend};
use crate::error::ServiceError;
use crate::volume::{self, Volume};

const BACKEND_NAME: &str = "cellpose";
const INPUT_STEM: &str = "stack";
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Lines of the Cellpose log quoted in error messages.
const LOG_TAIL_LINES: usize = 5;

/// How to run the Cellpose executable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellposeSettings {
    pub executable: PathBuf,
    /// Appended verbatim after the generated arguments.
    pub extra_args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for CellposeSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("cellpose"),
            extra_args: Vec::new(),
            timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CellposeCommand {
    settings: CellposeSettings,
}

impl CellposeCommand {
    pub fn new(settings: CellposeSettings) -> Self {
        Self { settings }
    }

    fn failed(reason: impl Into<String>) -> ServiceError {
        ServiceError::Failed {
            backend: BACKEND_NAME.to_string(),
            reason: reason.into(),
        }
    }

    /// Command line for one run on `input`.
    pub fn arguments(&self, input: &Path, params: &DetectionParams) -> Vec<String> {
        let mut args = vec![
            "--image_path".to_string(),
            input.display().to_string(),
            "--pretrained_model".to_string(),
            params.model.clone(),
            "--diameter".to_string(),
            params.diameter.to_string(),
            "--stitch_threshold".to_string(),
            params.stitch_threshold.to_string(),
            "--chan".to_string(),
            "0".to_string(),
            "--chan2".to_string(),
            "0".to_string(),
            "--save_tif".to_string(),
            "--no_npy".to_string(),
        ];
        if params.use_gpu {
            args.push("--use_gpu".to_string());
        }
        args.extend(self.settings.extra_args.iter().cloned());
        args
    }

    fn run(&self, input: &Path, log_path: &Path, params: &DetectionParams) -> Result<(), ServiceError> {
        let log = File::create(log_path).map_err(|e| Self::failed(format!("log file: {e}")))?;
        let log_err = log
            .try_clone()
            .map_err(|e| Self::failed(format!("log file: {e}")))?;

        let args = self.arguments(input, params);
        tracing::debug!(executable = %self.settings.executable.display(), ?args, "Starting Cellpose");

        let mut child = Command::new(&self.settings.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| ServiceError::Unavailable {
                backend: BACKEND_NAME.to_string(),
                reason: format!("cannot start '{}': {e}", self.settings.executable.display()),
            })?;

        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    // Already exited or unkillable; either way the run is abandoned.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ServiceError::Timeout {
                        backend: BACKEND_NAME.to_string(),
                        timeout,
                    });
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(Self::failed(format!("waiting for process: {e}"))),
            }
        };

        if status.success() {
            return Ok(());
        }
        let tail = log_tail(log_path);
        if tail.to_ascii_lowercase().contains("out of memory") {
            return Err(ServiceError::OutOfMemory {
                backend: BACKEND_NAME.to_string(),
            });
        }
        Err(Self::failed(format!("exited with {status}: {tail}")))
    }
}

fn log_tail(path: &Path) -> String {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(LOG_TAIL_LINES)..].join(" | ")
}

impl SomaDetectionBackend for CellposeCommand {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn detect(
        &self,
        stack: &Volume,
        params: &DetectionParams,
    ) -> Result<Buffer3<u32>, ServiceError> {
        let workdir = tempfile::Builder::new()
            .prefix("microglia-cellpose-")
            .tempdir()
            .map_err(|e| ServiceError::Unavailable {
                backend: BACKEND_NAME.to_string(),
                reason: format!("temporary directory: {e}"),
            })?;
        let input = workdir.path().join(format!("{INPUT_STEM}.tif"));
        let output = workdir.path().join(format!("{INPUT_STEM}_cp_masks.tif"));
        let log_path = workdir.path().join("cellpose.log");

        volume::write_f32_stack(&input, stack.voxels())
            .map_err(|e| Self::failed(format!("writing input stack: {e}")))?;

        let started = Instant::now();
        self.run(&input, &log_path, params)?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            model = %params.model,
            "Cellpose finished"
        );

        let labels = volume::read_label_stack(&output).map_err(|e| ServiceError::InvalidOutput {
            backend: BACKEND_NAME.to_string(),
            reason: e.to_string(),
        })?;
        if !labels.same_shape(stack.voxels()) {
            return Err(ServiceError::InvalidOutput {
                backend: BACKEND_NAME.to_string(),
                reason: format!(
                    "mask is {}x{}x{}, stack is {}x{}x{}",
                    labels.width(),
                    labels.height(),
                    labels.depth(),
                    stack.width(),
                    stack.height(),
                    stack.depth()
                ),
            });
        }
        Ok(labels)
    }
}
