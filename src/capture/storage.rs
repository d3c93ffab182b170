use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// Storage preconditions consumed by the capture controller.
///
/// Faked in tests to drive the precondition-failure paths without filling a
/// real disk.
pub trait StorageProbe: Send + Sync {
    /// Whether the recordings directory accepts writes.
    fn is_writable(&self, dir: &Path) -> bool;

    /// Free space on the volume holding `dir`, as a percentage of its total.
    fn free_space_percent(&self, dir: &Path) -> io::Result<f64>;
}

/// Probe backed by the real filesystem.
pub struct DiskProbe;

impl StorageProbe for DiskProbe {
    fn is_writable(&self, dir: &Path) -> bool {
        let probe = dir.join(".write-probe");
        match fs::OpenOptions::new().write(true).create(true).open(&probe) {
            Ok(_) => {
                let _ = fs::remove_file(&probe);
                true
            }
            Err(_) => false,
        }
    }

    fn free_space_percent(&self, dir: &Path) -> io::Result<f64> {
        let free = fs2::available_space(dir)?;
        let total = fs2::total_space(dir)?;
        if total == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "volume reports zero total space",
            ));
        }

        let percent = 100.0 * free as f64 / total as f64;
        debug!("{:.2}% remaining on {}", percent, dir.display());
        Ok(percent)
    }
}
