//! cpal implementation of [`AudioBackend`].
//!
//! cpal has no duplex streams, so a "duplex" stream here is an input stream
//! and an output stream on the same rate, joined by an `rtrb` sample ring.
//! The ring starts with one block of silence so the output side has something
//! to read before the first capture arrives. A full ring sets the overflow
//! flag; a short read sets the underflow flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtmix_comms::{StatusFlags, rtrb};
use rtmix_core::{DeviceId, DeviceInfo, Error, Result, Sample, sample_rates};

use super::{AudioBackend, DuplexStream, StreamRequest};
use crate::engine::{DuplexBlock, EngineCallback};

/// Backend bound to one cpal host
#[derive(Debug, Clone, Copy)]
pub struct CpalBackend {
    host_id: cpal::HostId,
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalBackend {
    /// Use the platform's default host
    pub fn new() -> Self {
        Self {
            host_id: cpal::default_host().id(),
        }
    }

    fn host(&self) -> Result<cpal::Host> {
        cpal::host_from_id(self.host_id).map_err(|e| Error::Backend(e.to_string()))
    }

    fn device_at(host: &cpal::Host, id: DeviceId) -> Result<cpal::Device> {
        host.devices()
            .map_err(|e| Error::Backend(e.to_string()))?
            .nth(id)
            .ok_or_else(|| Error::DeviceUnavailable(format!("no device with id {id}")))
    }
}

fn describe(id: DeviceId, device: &cpal::Device) -> DeviceInfo {
    let name = device.name().unwrap_or_else(|_| format!("device {id}"));
    let max_input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| usize::from(c.channels())).max().unwrap_or(0))
        .unwrap_or(0);
    let max_output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| usize::from(c.channels())).max().unwrap_or(0))
        .unwrap_or(0);
    let input_rate = device
        .default_input_config()
        .ok()
        .map(|c| c.sample_rate().0);
    let default_sample_rate = device
        .default_output_config()
        .ok()
        .map(|c| c.sample_rate().0)
        .or(input_rate)
        .unwrap_or(sample_rates::SR_48000);

    DeviceInfo {
        id,
        name,
        max_input_channels,
        max_output_channels,
        default_sample_rate,
        default_input_sample_rate: input_rate.unwrap_or(default_sample_rate),
    }
}

fn map_build_error(err: &cpal::BuildStreamError) -> Error {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => Error::DeviceUnavailable(err.to_string()),
        _ => Error::StreamOpenFailed(err.to_string()),
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        self.host_id.name()
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let host = self.host()?;
        let devices = host.devices().map_err(|e| Error::Backend(e.to_string()))?;
        Ok(devices
            .enumerate()
            .map(|(id, device)| describe(id, &device))
            .collect())
    }

    fn device(&self, id: DeviceId) -> Result<DeviceInfo> {
        let host = self.host()?;
        Self::device_at(&host, id).map(|device| describe(id, &device))
    }

    fn default_output_device(&self) -> Result<DeviceInfo> {
        let host = self.host()?;
        let default = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no default output device".into()))?;
        let default_name = default.name().ok();

        // Ids are enumeration positions, so find the default in the list.
        // cpal exposes no stable device identity, only names; with two devices of
        // the same name this picks the first, which may not be the default.
        let id = host
            .devices()
            .map_err(|e| Error::Backend(e.to_string()))?
            .position(|device| device.name().ok() == default_name)
            .ok_or_else(|| Error::DeviceUnavailable("default output device not listed".into()))?;

        Ok(describe(id, &default))
    }

    #[allow(clippy::too_many_lines)] // Both stream callbacks are built here
    fn open_duplex(
        &self,
        request: &StreamRequest,
        mut callback: EngineCallback,
    ) -> Result<Box<dyn DuplexStream>> {
        let host = self.host()?;

        let output_device = match request.output_device {
            Some(id) => Self::device_at(&host, id)?,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::DeviceUnavailable("no default output device".into()))?,
        };
        let input_device = match request.input_device {
            Some(id) => Some(Self::device_at(&host, id)?),
            None => host.default_input_device(),
        };
        tracing::debug!(
            "Opening duplex stream: input {:?}, output {:?}",
            input_device.as_ref().and_then(|d| d.name().ok()),
            output_device.name().ok()
        );

        let input_channels = request.channels;
        // The output stream runs at the device's own width; channels past the
        // active count are written as silence by the engine callback.
        let output_channels = output_device
            .default_output_config()
            .map_or(input_channels, |c| usize::from(c.channels()))
            .max(input_channels);

        let input_config = cpal::StreamConfig {
            channels: input_channels as u16,
            sample_rate: cpal::SampleRate(request.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(request.block_size as u32),
        };
        let output_config = cpal::StreamConfig {
            channels: output_channels as u16,
            ..input_config.clone()
        };
        tracing::debug!("Input config: {:?}", input_config);
        tracing::debug!("Output config: {:?}", output_config);

        let block_samples = request.block_size * input_channels;
        let ring_len = block_samples * request.ring_blocks.max(2);
        let (mut producer, mut consumer) = rtrb::RingBuffer::<Sample>::new(ring_len);
        for _ in 0..block_samples {
            let _ = producer.push(0.0);
        }
        let overflow = Arc::new(AtomicBool::new(false));

        let has_input = input_device.is_some();
        let input_stream = match input_device {
            Some(device) => {
                let overflow = Arc::clone(&overflow);
                let stream = device
                    .build_input_stream(
                        &input_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            // REAL-TIME SAFE: push into the pre-allocated ring only
                            for &sample in data {
                                if producer.push(sample).is_err() {
                                    overflow.store(true, Ordering::Relaxed);
                                    break;
                                }
                            }
                        },
                        move |err| {
                            tracing::error!("Audio input stream error: {}", err);
                        },
                        None,
                    )
                    .map_err(|e| map_build_error(&e))?;
                Some(stream)
            }
            None => None,
        };

        // Pre-allocated to the whole ring so a read never needs to grow it
        let mut input = vec![0.0; ring_len];
        let output_stream = output_device
            .build_output_stream(
                &output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // REAL-TIME SAFE: no tracing, no allocation in here
                    let frames = data.len() / output_channels;
                    let wanted = (frames * input_channels).min(input.len());
                    let available = consumer.slots().min(wanted);

                    let mut read = 0;
                    if let Ok(chunk) = consumer.read_chunk(available) {
                        let (first, second) = chunk.as_slices();
                        input[..first.len()].copy_from_slice(first);
                        input[first.len()..first.len() + second.len()].copy_from_slice(second);
                        read = first.len() + second.len();
                        chunk.commit_all();
                    }
                    input[read..wanted].fill(0.0);

                    let status = StatusFlags {
                        input_overflow: overflow.swap(false, Ordering::Relaxed),
                        input_underflow: has_input && read < wanted,
                    };
                    callback.process_block(DuplexBlock {
                        input: &input[..wanted],
                        input_channels,
                        output: data,
                        output_channels,
                        status,
                    });
                },
                move |err| {
                    tracing::error!("Audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| map_build_error(&e))?;

        if !has_input {
            tracing::warn!("No input device available, processing silence");
        }
        Ok(Box::new(CpalStream {
            input: input_stream,
            output: output_stream,
        }))
    }
}

/// An input and an output cpal stream that start and stop together
struct CpalStream {
    input: Option<cpal::Stream>,
    output: cpal::Stream,
}

impl DuplexStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        if let Some(input) = &self.input {
            input
                .play()
                .map_err(|e| Error::StreamOpenFailed(e.to_string()))?;
        }
        self.output
            .play()
            .map_err(|e| Error::StreamOpenFailed(e.to_string()))?;
        tracing::info!("Audio stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.output
            .pause()
            .map_err(|e| Error::Backend(e.to_string()))?;
        if let Some(input) = &self.input {
            input.pause().map_err(|e| Error::Backend(e.to_string()))?;
        }
        tracing::info!("Audio stream stopped");
        Ok(())
    }
}
