use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Progress of one upload attempt. Files are only removed in `Succeeded`;
/// a `Failed` task's file stays on disk for a later pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

/// One file queued for upload during a scan pass.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub source: PathBuf,
    pub attempt: AttemptState,
}

impl UploadTask {
    pub fn new(source: PathBuf) -> Self {
        Self {
            source,
            attempt: AttemptState::Pending,
        }
    }
}

/// List completed recordings directly under `dir` (non-recursive), one
/// Pending task per regular file. Ordering follows the directory listing and
/// is not guaranteed stable; every file present at scan time appears exactly
/// once.
pub fn scan(dir: &Path) -> io::Result<Vec<UploadTask>> {
    let mut tasks = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() {
            tasks.push(UploadTask::new(path));
        }
    }

    debug!("scan of {} found {} file(s)", dir.display(), tasks.len());
    Ok(tasks)
}
