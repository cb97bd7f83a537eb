//! Hardware abstraction.
//!
//! The stream manager only talks to an [`AudioBackend`]; the cpal
//! implementation lives in [`cpal_host`].

pub mod cpal_host;
#[cfg(test)]
pub(crate) mod memory;

pub use cpal_host::CpalBackend;

use rtmix_core::{ChannelCount, DeviceId, DeviceInfo, Error, Frames, Result, SampleRate};

use crate::engine::EngineCallback;

/// A resolved stream plan: what to open and how
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    /// `None` uses the host's default input device
    pub input_device: Option<DeviceId>,
    /// `None` uses the host's default output device
    pub output_device: Option<DeviceId>,
    /// Active (processed) channels
    pub channels: ChannelCount,
    pub sample_rate: SampleRate,
    /// Fixed block size requested from the driver
    pub block_size: Frames,
    /// Length of the input bridge ring, in blocks
    pub ring_blocks: usize,
}

/// A running (or paused) duplex stream.
///
/// Dropping the handle closes the stream; no callback runs afterwards.
pub trait DuplexStream {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Source of devices and duplex streams
pub trait AudioBackend: Send + Sync {
    /// Human readable backend name, for logs
    fn name(&self) -> &str;

    /// Snapshot of the devices currently present
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Look up one device by id
    fn device(&self, id: DeviceId) -> Result<DeviceInfo> {
        self.devices()?
            .into_iter()
            .find(|info| info.id == id)
            .ok_or_else(|| Error::DeviceUnavailable(format!("no device with id {id}")))
    }

    /// The system default output device
    fn default_output_device(&self) -> Result<DeviceInfo>;

    /// Open a stream for `request` that calls `callback` once per block.
    ///
    /// The stream is returned stopped.
    fn open_duplex(
        &self,
        request: &StreamRequest,
        callback: EngineCallback,
    ) -> Result<Box<dyn DuplexStream>>;
}
