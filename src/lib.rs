pub mod capture;
pub mod config;
pub mod device;
pub mod upload;

pub use capture::{
    CaptureController, CaptureError, ControllerState, DiskProbe, RecordingSession, SessionState,
    StorageProbe, TickOutcome,
};
pub use config::{CaptureConfig, Config, UploadConfig};
pub use device::{CaptureDevice, DeviceError, LogNotifier, Notifier, SimDevice};
pub use upload::{scan, AttemptState, UploadError, UploadReport, UploadTask, Uploader};
