use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::session::RecordingSession;
use super::storage::StorageProbe;
use crate::config::CaptureConfig;
use crate::device::{CaptureDevice, DeviceError, Notifier};

/// Errors that abort the capture lifecycle. None of these are recoverable
/// in-process; an external restart is required.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("recordings directory is not writable: {path}")]
    StorageUnwritable { path: PathBuf },

    #[error("free space {free_percent:.1}% is below the {min_percent:.1}% minimum")]
    StorageLow { free_percent: f64, min_percent: f64 },

    #[error("device configuration failed: {0}")]
    DeviceConfig(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("capture controller is not active")]
    NotActive,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Observable controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No session yet; `start()` has not succeeded.
    Stopped,
    /// A session is being configured (transient, during start and rotation).
    Configuring,
    /// A session is active and ticks are being processed.
    Active,
    /// Terminal. Reached only by precondition failure or external shutdown.
    Terminated,
}

/// Result of one poll of the capture state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The current segment keeps recording.
    Recording { amplitude: i32 },
    /// Sustained silence rotated the segment. `retained` names the finished
    /// file, or is None when the segment was silent throughout and discarded.
    Rotated { retained: Option<PathBuf> },
}

/// The capture state machine.
///
/// Polls the device amplitude at a fixed interval and applies the
/// threshold/hysteresis policy: a single quiet sample never ends a segment,
/// only `silence_tolerance` consecutive quiet samples do, at which point the
/// segment is rotated and a fresh one starts immediately. Storage
/// preconditions are re-checked on every tick and their failure is fatal.
pub struct CaptureController {
    settings: CaptureConfig,
    device: Box<dyn CaptureDevice>,
    notifier: Box<dyn Notifier>,
    storage: Box<dyn StorageProbe>,
    state: ControllerState,
    consecutive_low_samples: u32,
    has_captured_audio: bool,
    session: Option<RecordingSession>,
}

impl CaptureController {
    pub fn new(
        settings: CaptureConfig,
        device: Box<dyn CaptureDevice>,
        notifier: Box<dyn Notifier>,
        storage: Box<dyn StorageProbe>,
    ) -> Self {
        Self {
            settings,
            device,
            notifier,
            storage,
            state: ControllerState::Stopped,
            consecutive_low_samples: 0,
            has_captured_audio: false,
            session: None,
        }
    }

    /// Check preconditions and begin the first recording session.
    ///
    /// On `StorageLow` the notifier is told why; on any failure no session
    /// is created.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        fs::create_dir_all(&self.settings.output_dir)?;

        if let Err(e) = self.check_preconditions() {
            if matches!(e, CaptureError::StorageLow { .. }) {
                self.notifier.notify("(Almost) out of storage space");
            }
            return Err(e);
        }

        self.begin_session().await.map_err(|e| {
            self.state = ControllerState::Stopped;
            e
        })
    }

    /// One poll of the state machine. Returns an error only when the
    /// controller has terminated; the caller must not tick again after that.
    pub async fn tick(&mut self) -> Result<TickOutcome, CaptureError> {
        if self.state != ControllerState::Active {
            return Err(CaptureError::NotActive);
        }

        match self.tick_inner().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.state = ControllerState::Terminated;
                Err(e)
            }
        }
    }

    async fn tick_inner(&mut self) -> Result<TickOutcome, CaptureError> {
        if let Err(e) = self.check_preconditions() {
            error!("storage precondition failed: {}", e);
            self.close_session().await;
            self.notifier.notify(&match e {
                CaptureError::StorageLow { .. } => "(Almost) out of storage space".to_string(),
                _ => format!("Recording stopped: {}", e),
            });
            return Err(e);
        }

        let amplitude = self.device.current_amplitude();
        debug!(
            "({}/{}) amplitude: {}",
            self.consecutive_low_samples, self.settings.silence_tolerance, amplitude
        );

        if amplitude > self.settings.amplitude_threshold {
            self.has_captured_audio = true;
            self.consecutive_low_samples = 0;
            return Ok(TickOutcome::Recording { amplitude });
        }

        self.consecutive_low_samples += 1;
        if self.consecutive_low_samples >= self.settings.silence_tolerance {
            let retained = self.rotate().await?;
            return Ok(TickOutcome::Rotated { retained });
        }

        Ok(TickOutcome::Recording { amplitude })
    }

    /// Drive ticks at the configured poll interval until termination.
    /// The first tick fires one interval after the call; ticks never overlap.
    pub async fn run(&mut self) -> CaptureError {
        let period = self.settings.poll_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(TickOutcome::Recording { .. }) => {}
                Ok(TickOutcome::Rotated { retained }) => {
                    if let Some(path) = retained {
                        info!("segment ready for upload: {}", path.display());
                    }
                }
                Err(e) => {
                    error!("capture terminated: {}", e);
                    return e;
                }
            }
        }
    }

    /// External stop. Always leaves the device released; an empty segment's
    /// file is discarded.
    pub async fn shutdown(&mut self) {
        info!("shutting down capture controller");
        self.close_session().await;
        self.state = ControllerState::Terminated;
    }

    fn check_preconditions(&self) -> Result<(), CaptureError> {
        let dir = &self.settings.output_dir;

        if !self.storage.is_writable(dir) {
            return Err(CaptureError::StorageUnwritable { path: dir.clone() });
        }

        let free_percent = self.storage.free_space_percent(dir)?;
        if free_percent < self.settings.min_free_space_percent {
            return Err(CaptureError::StorageLow {
                free_percent,
                min_percent: self.settings.min_free_space_percent,
            });
        }

        Ok(())
    }

    /// Configure and start a fresh session, resetting the per-segment state.
    async fn begin_session(&mut self) -> Result<(), CaptureError> {
        self.state = ControllerState::Configuring;

        let mut session = RecordingSession::configure(
            &self.settings.output_dir,
            &self.settings.timestamp_format,
            &self.settings.file_extension,
            self.device.as_mut(),
        )
        .await?;
        session.start(self.device.as_mut()).await?;

        self.session = Some(session);
        self.has_captured_audio = false;
        self.consecutive_low_samples = 0;
        self.state = ControllerState::Active;
        Ok(())
    }

    /// Rotate after exhausted silence tolerance: finish the current segment,
    /// discard it if it was silent throughout, then immediately start a new
    /// one. Rolling capture, not terminate-on-silence.
    async fn rotate(&mut self) -> Result<Option<PathBuf>, CaptureError> {
        let mut session = self.session.take().ok_or(CaptureError::NotActive)?;

        info!(
            "rotating segment {} after {} quiet samples",
            session.file_name(),
            self.consecutive_low_samples
        );

        session
            .finish(self.device.as_mut(), self.has_captured_audio)
            .await?;

        let retained = if self.has_captured_audio {
            Some(session.path().to_path_buf())
        } else {
            session.discard_if_empty(false);
            None
        };

        self.begin_session().await?;
        Ok(retained)
    }

    /// Stop and release whatever session is active, discarding its file when
    /// nothing was captured. Errors are logged; this path never bails early,
    /// so the device is released on every exit from the controller.
    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session
                .finish(self.device.as_mut(), self.has_captured_audio)
                .await
            {
                error!("failed to stop recording device: {}", e);
            }
            session.discard_if_empty(self.has_captured_audio);
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn consecutive_low_samples(&self) -> u32 {
        self.consecutive_low_samples
    }

    pub fn has_captured_audio(&self) -> bool {
        self.has_captured_audio
    }

    /// Output path of the active session, if any.
    pub fn active_recording_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path())
    }
}
