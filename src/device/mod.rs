pub mod sim;

pub use sim::SimDevice;

use std::path::Path;
use tracing::warn;

/// Errors raised by a capture device implementation.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Preparing the device for an output target failed. The device must not
    /// be left claimed after this error.
    #[error("device configuration failed: {0}")]
    Config(String),

    /// An operation was invoked out of order (e.g. start before configure).
    #[error("device not ready: {0}")]
    NotReady(&'static str),
}

/// Capture device capability.
///
/// The real recording hardware lives behind this trait; the crate never talks
/// to a platform API directly. `stop()` followed by `reset()` must always be
/// called as a pair before the device can be reconfigured for a new session.
#[async_trait::async_trait]
pub trait CaptureDevice: Send {
    /// Prepare the device to record into the given file.
    async fn configure_output(&mut self, path: &Path) -> Result<(), DeviceError>;

    /// Begin capturing into the configured output.
    async fn start(&mut self) -> Result<(), DeviceError>;

    /// Stop capturing and finalize the output file.
    async fn stop(&mut self) -> Result<(), DeviceError>;

    /// Release per-session state so the device can be reused.
    async fn reset(&mut self);

    /// Peak amplitude observed since the previous poll.
    fn current_amplitude(&mut self) -> i32;

    /// Whether the device is currently capturing.
    fn is_capturing(&self) -> bool;
}

/// User-notification capability. Fire-and-forget; the core never observes
/// a result.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that only writes to the log. Stands in where no platform
/// notification surface is wired up.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!("user notification: {}", message);
    }
}
