pub mod controller;
pub mod session;
pub mod storage;

pub use controller::{CaptureController, CaptureError, ControllerState, TickOutcome};
pub use session::{RecordingSession, SessionState};
pub use storage::{DiskProbe, StorageProbe};
