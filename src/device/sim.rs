use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::{CaptureDevice, DeviceError};

const SIM_SAMPLE_RATE: u32 = 22050;

/// Samples written per amplitude poll while capturing. Keeps retained files
/// small but nonzero.
const SAMPLES_PER_POLL: usize = 64;

/// Simulated capture device.
///
/// Amplitudes are scripted through [`SimDevice::push_amplitudes`]; once the
/// script is exhausted every poll reads as silence. While capturing, each
/// poll appends a burst of samples at the polled amplitude to a mono 16-bit
/// WAV file, so a session that heard sound leaves a nonzero recording behind.
///
/// The handle is clonable; all clones share one underlying device, which lets
/// tests keep a handle for inspection after handing one to the controller.
#[derive(Clone)]
pub struct SimDevice {
    inner: Arc<Mutex<SimInner>>,
}

struct SimInner {
    script: VecDeque<i32>,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    capturing: bool,
}

impl SimDevice {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                script: VecDeque::new(),
                writer: None,
                capturing: false,
            })),
        }
    }

    /// Append amplitudes to the script, consumed one per poll.
    pub fn push_amplitudes(&self, amplitudes: impl IntoIterator<Item = i32>) {
        let mut inner = self.inner.lock().expect("sim device lock poisoned");
        inner.script.extend(amplitudes);
    }

    /// Remaining scripted polls.
    pub fn remaining(&self) -> usize {
        self.inner.lock().expect("sim device lock poisoned").script.len()
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CaptureDevice for SimDevice {
    async fn configure_output(&mut self, path: &Path) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().expect("sim device lock poisoned");
        if inner.writer.is_some() {
            return Err(DeviceError::NotReady("previous output not released"));
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SIM_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| DeviceError::Config(format!("{}: {}", path.display(), e)))?;

        debug!("sim device configured for {}", path.display());
        inner.writer = Some(writer);
        Ok(())
    }

    async fn start(&mut self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().expect("sim device lock poisoned");
        if inner.writer.is_none() {
            return Err(DeviceError::NotReady("no output configured"));
        }
        inner.capturing = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        let mut inner = self.inner.lock().expect("sim device lock poisoned");
        inner.capturing = false;
        if let Some(writer) = inner.writer.take() {
            writer
                .finalize()
                .map_err(|e| DeviceError::Config(e.to_string()))?;
        }
        Ok(())
    }

    async fn reset(&mut self) {
        let mut inner = self.inner.lock().expect("sim device lock poisoned");
        inner.capturing = false;
        if inner.writer.take().is_some() {
            warn!("sim device reset with an unfinalized output");
        }
    }

    fn current_amplitude(&mut self) -> i32 {
        let mut inner = self.inner.lock().expect("sim device lock poisoned");
        let amplitude = inner.script.pop_front().unwrap_or(0);

        if inner.capturing {
            let sample = amplitude.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            if let Some(writer) = &mut inner.writer {
                for i in 0..SAMPLES_PER_POLL {
                    // Crude square wave at the polled amplitude.
                    let s = if i % 2 == 0 { sample } else { -sample };
                    if let Err(e) = writer.write_sample(s) {
                        warn!("sim device failed to write sample: {}", e);
                        break;
                    }
                }
            }
        }

        amplitude
    }

    fn is_capturing(&self) -> bool {
        self.inner.lock().expect("sim device lock poisoned").capturing
    }
}
