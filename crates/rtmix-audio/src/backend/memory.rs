//! In-memory backend for stream manager tests.
//!
//! Devices are a fixed list. Blocks are delivered by calling
//! [`MemoryBackend::drive`] instead of by a hardware thread.

use std::sync::Arc;

use parking_lot::Mutex;
use rtmix_comms::StatusFlags;
use rtmix_core::{DeviceInfo, Error, Result};

use super::{AudioBackend, DuplexStream, StreamRequest};
use crate::engine::{DuplexBlock, EngineCallback};

#[derive(Default)]
struct MemoryState {
    opened: Vec<StreamRequest>,
    /// Opens still to fail with `StreamOpenFailed`
    failing_opens: usize,
    /// Callback of the live stream, if any
    callback: Option<EngineCallback>,
    running: bool,
}

pub struct MemoryBackend {
    devices: Vec<DeviceInfo>,
    default_output: Option<usize>,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new(devices: Vec<DeviceInfo>, default_output: Option<usize>) -> Self {
        Self {
            devices,
            default_output,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Device 0: 2-in microphone at 44.1 kHz. Device 1: 6-out interface at 48 kHz.
    pub fn stereo_pair() -> Self {
        Self::new(
            vec![
                device(0, "Mic", 2, 0, 44100),
                device(1, "Interface", 0, 6, 48000),
                device(2, "Headset", 1, 2, 16000),
            ],
            Some(1),
        )
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().opened.len()
    }

    pub fn last_request(&self) -> Option<StreamRequest> {
        self.state.lock().opened.last().copied()
    }

    /// Make the next `open_duplex` fail with `StreamOpenFailed`
    pub fn fail_next_open(&self) {
        self.fail_opens(1);
    }

    /// Make the next `count` calls to `open_duplex` fail with `StreamOpenFailed`
    pub fn fail_opens(&self, count: usize) {
        self.state.lock().failing_opens = count;
    }

    pub fn is_live(&self) -> bool {
        self.state.lock().callback.is_some()
    }

    /// Run one block through the live stream's callback.
    ///
    /// Returns `false` when no stream is open and started.
    pub fn drive(
        &self,
        input: &[f32],
        input_channels: usize,
        output: &mut [f32],
        output_channels: usize,
    ) -> bool {
        let mut state = self.state.lock();
        if !state.running {
            return false;
        }
        let Some(callback) = state.callback.as_mut() else {
            return false;
        };
        callback.process_block(DuplexBlock {
            input,
            input_channels,
            output,
            output_channels,
            status: StatusFlags::default(),
        });
        true
    }
}

pub fn device(
    id: usize,
    name: &str,
    max_input_channels: usize,
    max_output_channels: usize,
    default_sample_rate: u32,
) -> DeviceInfo {
    DeviceInfo {
        id,
        name: name.to_string(),
        max_input_channels,
        max_output_channels,
        default_sample_rate,
        default_input_sample_rate: default_sample_rate,
    }
}

impl AudioBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn default_output_device(&self) -> Result<DeviceInfo> {
        self.default_output
            .and_then(|id| self.devices.get(id).cloned())
            .ok_or_else(|| Error::DeviceUnavailable("no default output device".into()))
    }

    fn open_duplex(
        &self,
        request: &StreamRequest,
        callback: EngineCallback,
    ) -> Result<Box<dyn DuplexStream>> {
        let mut state = self.state.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(Error::StreamOpenFailed("driver rejected configuration".into()));
        }
        state.opened.push(*request);
        state.callback = Some(callback);
        state.running = false;
        Ok(Box::new(MemoryStream {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryStream {
    state: Arc<Mutex<MemoryState>>,
}

impl DuplexStream for MemoryStream {
    fn start(&mut self) -> Result<()> {
        self.state.lock().running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().running = false;
        Ok(())
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.running = false;
        state.callback = None;
    }
}
