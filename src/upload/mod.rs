pub mod task;
pub mod uploader;

pub use task::{scan, AttemptState, UploadTask};
pub use uploader::{UploadError, UploadReport, Uploader};
