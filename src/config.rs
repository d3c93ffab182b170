use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Settings for the capture state machine.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Amplitude above which a sample counts as sound.
    /// 1000 is roughly half the representable range of a 16-bit PCM signal.
    #[serde(default = "default_amplitude_threshold")]
    pub amplitude_threshold: i32,

    /// Interval between amplitude polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive below-threshold samples tolerated before the current
    /// segment is rotated (60 samples at 2s = ~120s of sustained silence).
    #[serde(default = "default_silence_tolerance")]
    pub silence_tolerance: u32,

    /// Minimum free space on the recordings volume, as a percentage.
    #[serde(default = "default_min_free_space_percent")]
    pub min_free_space_percent: f64,

    /// Flat directory all recordings are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File extension for recordings (determined by the device's container).
    #[serde(default = "default_file_extension")]
    pub file_extension: String,

    /// chrono format string used to derive recording filenames.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Endpoint that receives one multipart POST per recording.
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
}

fn default_amplitude_threshold() -> i32 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_silence_tolerance() -> u32 {
    60
}

fn default_min_free_space_percent() -> f64 {
    10.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("recordings")
}

fn default_file_extension() -> String {
    "wav".to_string()
}

fn default_timestamp_format() -> String {
    "%d-%m-%Y_%H-%M-%S".to_string()
}

fn default_endpoint_url() -> String {
    "http://localhost:8080/upload".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: default_amplitude_threshold(),
            poll_interval_ms: default_poll_interval_ms(),
            silence_tolerance: default_silence_tolerance(),
            min_free_space_percent: default_min_free_space_percent(),
            output_dir: default_output_dir(),
            file_extension: default_file_extension(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
        }
    }
}

impl CaptureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from a named file. The file is optional; missing
    /// keys (or a missing file) fall back to the documented defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
