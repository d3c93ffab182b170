// Integration tests for the capture state machine.
//
// The controller is driven tick-by-tick against a scripted device, so the
// threshold/hysteresis policy is observable without a live timer.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use audio_sentry::{
    CaptureConfig, CaptureController, CaptureDevice, CaptureError, ControllerState, Notifier,
    SimDevice,
    StorageProbe, TickOutcome,
};
use tempfile::TempDir;

/// Storage probe with adjustable answers.
#[derive(Clone)]
struct FakeProbe {
    writable: Arc<AtomicBool>,
    free_percent: Arc<Mutex<f64>>,
}

impl FakeProbe {
    fn new(writable: bool, free_percent: f64) -> Self {
        Self {
            writable: Arc::new(AtomicBool::new(writable)),
            free_percent: Arc::new(Mutex::new(free_percent)),
        }
    }

    fn set_free_percent(&self, value: f64) {
        *self.free_percent.lock().unwrap() = value;
    }
}

impl StorageProbe for FakeProbe {
    fn is_writable(&self, _dir: &Path) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn free_space_percent(&self, _dir: &Path) -> std::io::Result<f64> {
        Ok(*self.free_percent.lock().unwrap())
    }
}

/// Notifier that records every message.
#[derive(Clone, Default)]
struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

fn test_settings(dir: &Path) -> CaptureConfig {
    CaptureConfig {
        output_dir: dir.to_path_buf(),
        // Sub-second precision so rotated segments within one test get
        // distinct filenames.
        timestamp_format: "%d-%m-%Y_%H-%M-%S%.9f".to_string(),
        ..CaptureConfig::default()
    }
}

struct Harness {
    controller: CaptureController,
    device: SimDevice,
    probe: FakeProbe,
    notifier: RecordingNotifier,
    _temp: TempDir,
}

fn harness() -> Result<Harness> {
    let temp = TempDir::new()?;
    let device = SimDevice::new();
    let probe = FakeProbe::new(true, 50.0);
    let notifier = RecordingNotifier::default();

    let controller = CaptureController::new(
        test_settings(temp.path()),
        Box::new(device.clone()),
        Box::new(notifier.clone()),
        Box::new(probe.clone()),
    );

    Ok(Harness {
        controller,
        device,
        probe,
        notifier,
        _temp: temp,
    })
}

#[tokio::test]
async fn test_rotation_retains_file_after_captured_audio() -> Result<()> {
    // Scenario: two loud samples followed by sustained silence.
    let mut h = harness()?;
    h.device.push_amplitudes([1500, 1500]);
    h.device.push_amplitudes(std::iter::repeat(200).take(60));

    h.controller.start().await?;
    assert_eq!(h.controller.state(), ControllerState::Active);

    for _ in 0..2 {
        let outcome = h.controller.tick().await?;
        assert!(matches!(outcome, TickOutcome::Recording { amplitude: 1500 }));
    }
    assert!(h.controller.has_captured_audio());
    assert_eq!(h.controller.consecutive_low_samples(), 0);

    let first_path = h.controller.active_recording_path().unwrap().to_path_buf();

    let mut rotated = None;
    for i in 1..=60 {
        match h.controller.tick().await? {
            TickOutcome::Recording { .. } => {
                assert!(i < 60, "rotation must happen on the 60th quiet sample")
            }
            TickOutcome::Rotated { retained } => {
                assert_eq!(i, 60, "rotation happened after {} quiet samples", i);
                rotated = Some(retained);
            }
        }
    }

    let retained = rotated.expect("segment should have rotated");
    assert_eq!(retained.as_deref(), Some(first_path.as_path()));
    assert!(first_path.exists(), "segment with audio must be retained");
    let size = std::fs::metadata(&first_path)?.len();
    assert!(size > 44, "retained recording should hold samples, got {} bytes", size);

    // Rolling capture: a fresh session is already active.
    assert_eq!(h.controller.state(), ControllerState::Active);
    assert!(!h.controller.has_captured_audio());
    assert_ne!(h.controller.active_recording_path().unwrap(), first_path);

    Ok(())
}

#[tokio::test]
async fn test_silent_segment_is_discarded_on_rotation() -> Result<()> {
    // Scenario: the threshold is never exceeded.
    let mut h = harness()?;
    h.device.push_amplitudes(std::iter::repeat(200).take(60));

    h.controller.start().await?;
    let first_path = h.controller.active_recording_path().unwrap().to_path_buf();

    let mut last = None;
    for _ in 0..60 {
        last = Some(h.controller.tick().await?);
    }

    assert_eq!(last, Some(TickOutcome::Rotated { retained: None }));
    assert!(!first_path.exists(), "silent segment's file must be deleted");

    // A new session started immediately.
    assert_eq!(h.controller.state(), ControllerState::Active);
    assert!(h.controller.active_recording_path().is_some());

    Ok(())
}

#[tokio::test]
async fn test_loud_sample_resets_silence_counter() -> Result<()> {
    // Property: no rotation occurs if at least one in every 60 samples is
    // above the threshold.
    let mut h = harness()?;
    for _ in 0..3 {
        h.device.push_amplitudes(std::iter::repeat(200).take(59));
        h.device.push_amplitudes([1500]);
    }

    h.controller.start().await?;

    for _ in 0..180 {
        let outcome = h.controller.tick().await?;
        assert!(
            matches!(outcome, TickOutcome::Recording { .. }),
            "segment must never rotate while sound recurs within tolerance"
        );
    }
    assert_eq!(h.controller.consecutive_low_samples(), 0);

    Ok(())
}

#[tokio::test]
async fn test_has_captured_audio_follows_threshold() -> Result<()> {
    let mut h = harness()?;
    h.device.push_amplitudes(std::iter::repeat(200).take(5));

    h.controller.start().await?;
    assert!(!h.controller.has_captured_audio());

    for _ in 0..5 {
        h.controller.tick().await?;
        assert!(!h.controller.has_captured_audio());
    }

    h.device.push_amplitudes([5000]);
    h.controller.tick().await?;
    assert!(h.controller.has_captured_audio());

    Ok(())
}

#[tokio::test]
async fn test_no_rotation_before_tolerance_is_exhausted() -> Result<()> {
    let mut h = harness()?;
    h.device.push_amplitudes(std::iter::repeat(200).take(59));

    h.controller.start().await?;
    for _ in 0..59 {
        let outcome = h.controller.tick().await?;
        assert!(matches!(outcome, TickOutcome::Recording { .. }));
    }
    assert_eq!(h.controller.consecutive_low_samples(), 59);

    Ok(())
}

#[tokio::test]
async fn test_start_fails_when_storage_is_low() -> Result<()> {
    // Scenario: 5% free against a 10% minimum.
    let mut h = harness()?;
    h.probe.set_free_percent(5.0);

    let err = h.controller.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::StorageLow { .. }));

    assert_eq!(h.controller.state(), ControllerState::Stopped);
    assert!(h.controller.active_recording_path().is_none());

    let messages = h.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].to_lowercase().contains("storage"));

    Ok(())
}

#[tokio::test]
async fn test_start_fails_when_storage_is_unwritable() -> Result<()> {
    let mut h = harness()?;
    h.probe.writable.store(false, Ordering::SeqCst);

    let err = h.controller.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::StorageUnwritable { .. }));
    assert!(h.controller.active_recording_path().is_none());

    Ok(())
}

#[tokio::test]
async fn test_tick_terminates_when_storage_drops() -> Result<()> {
    let mut h = harness()?;
    h.device.push_amplitudes(std::iter::repeat(200).take(3));

    h.controller.start().await?;
    let path = h.controller.active_recording_path().unwrap().to_path_buf();

    for _ in 0..3 {
        h.controller.tick().await?;
    }

    h.probe.set_free_percent(5.0);
    let err = h.controller.tick().await.unwrap_err();
    assert!(matches!(err, CaptureError::StorageLow { .. }));

    // Terminal state, device released, silent file discarded, user told.
    assert_eq!(h.controller.state(), ControllerState::Terminated);
    assert!(!h.device.is_capturing());
    assert!(!path.exists(), "silent segment must be discarded on termination");
    assert!(!h.notifier.messages().is_empty());

    // Ticking a terminated controller fails cleanly.
    let err = h.controller.tick().await.unwrap_err();
    assert!(matches!(err, CaptureError::NotActive));

    Ok(())
}

#[tokio::test]
async fn test_termination_retains_segment_with_audio() -> Result<()> {
    let mut h = harness()?;
    h.device.push_amplitudes([1500]);

    h.controller.start().await?;
    let path = h.controller.active_recording_path().unwrap().to_path_buf();
    h.controller.tick().await?;

    h.probe.set_free_percent(5.0);
    h.controller.tick().await.unwrap_err();

    assert!(path.exists(), "segment with audio survives termination");
    assert!(!h.device.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_shutdown_releases_device_and_discards_empty_segment() -> Result<()> {
    let mut h = harness()?;
    h.device.push_amplitudes(std::iter::repeat(200).take(2));

    h.controller.start().await?;
    let path = h.controller.active_recording_path().unwrap().to_path_buf();
    for _ in 0..2 {
        h.controller.tick().await?;
    }

    h.controller.shutdown().await;

    assert_eq!(h.controller.state(), ControllerState::Terminated);
    assert!(!h.device.is_capturing());
    assert!(!path.exists());

    Ok(())
}

#[tokio::test]
async fn test_shutdown_retains_segment_with_audio() -> Result<()> {
    let mut h = harness()?;
    h.device.push_amplitudes([2000]);

    h.controller.start().await?;
    let path = h.controller.active_recording_path().unwrap().to_path_buf();
    h.controller.tick().await?;

    h.controller.shutdown().await;

    assert!(path.exists());

    Ok(())
}
