use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{error, info};

use super::controller::CaptureError;
use crate::device::CaptureDevice;

/// Lifecycle of one recording segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Output target derived, device prepared, not yet capturing.
    Configuring,
    /// Device is capturing into the output file.
    Active,
    /// Stopped without ever hearing sound; the file is discardable.
    StoppedEmpty,
    /// Stopped after capturing audio; the file is ready for upload.
    StoppedWithAudio,
}

/// One recording segment, delimited by rotation events.
///
/// The session owns the output target and the device's per-segment lifecycle;
/// the controller decides when transitions happen. Exactly one session is
/// active at a time.
#[derive(Debug)]
pub struct RecordingSession {
    file_name: String,
    path: PathBuf,
    state: SessionState,
}

impl RecordingSession {
    /// Derive an output target from the current time and prepare the device
    /// for it. The filename is `<timestamp>.<extension>` directly under
    /// `output_dir`.
    pub async fn configure(
        output_dir: &Path,
        timestamp_format: &str,
        extension: &str,
        device: &mut dyn CaptureDevice,
    ) -> Result<Self, CaptureError> {
        let file_name = Local::now().format(timestamp_format).to_string();
        let path = output_dir.join(format!("{}.{}", file_name, extension));

        info!("configuring recording session: {}", path.display());

        device
            .configure_output(&path)
            .await
            .map_err(|e| CaptureError::DeviceConfig(e.to_string()))?;

        Ok(Self {
            file_name,
            path,
            state: SessionState::Configuring,
        })
    }

    /// Begin capturing.
    pub async fn start(&mut self, device: &mut dyn CaptureDevice) -> Result<(), CaptureError> {
        device.start().await?;
        self.state = SessionState::Active;
        Ok(())
    }

    /// Stop capturing and release the device for reuse.
    ///
    /// `stop()` and `reset()` are always invoked as a pair, even when stop
    /// fails, so no exit path leaves the device claimed.
    pub async fn finish(
        &mut self,
        device: &mut dyn CaptureDevice,
        has_captured_audio: bool,
    ) -> Result<(), CaptureError> {
        let stopped = device.stop().await;
        device.reset().await;

        self.state = if has_captured_audio {
            SessionState::StoppedWithAudio
        } else {
            SessionState::StoppedEmpty
        };

        stopped.map_err(CaptureError::from)
    }

    /// Delete the output file if the session never heard sound. A failed
    /// delete of an empty file is logged, not retried.
    pub fn discard_if_empty(&self, has_captured_audio: bool) -> bool {
        if has_captured_audio {
            return false;
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("deleted empty recording {}", self.path.display());
                true
            }
            Err(e) => {
                error!("failed to delete {}: {}", self.path.display(), e);
                false
            }
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}
