//! Engine callback - the real-time entry point invoked once per audio block.

use std::sync::Arc;

use rtmix_comms::{EngineEvent, EventSender, LevelMeters, ParameterStore, StatusFlags};
use rtmix_core::{ChannelCount, Frames, Sample, SampleRate};

use crate::builtin::ChannelStrip;

/// One block as delivered by the hardware layer.
///
/// Both buffers are interleaved. The frame count is taken from the output
/// buffer; missing input frames are treated as silence.
pub struct DuplexBlock<'a> {
    pub input: &'a [Sample],
    pub input_channels: ChannelCount,
    pub output: &'a mut [Sample],
    pub output_channels: ChannelCount,
    pub status: StatusFlags,
}

/// Per-stream processing state driven by the audio thread.
///
/// Created by the stream manager when a stream opens and moved into the
/// driver callback; it is dropped together with the stream.
pub struct EngineCallback {
    store: Arc<ParameterStore>,
    strips: Vec<ChannelStrip>,
    sample_rate: SampleRate,
    /// De-interleaved working buffer for one channel
    scratch: Vec<Sample>,
    meters: Arc<LevelMeters>,
    events: EventSender,
    blocks: u64,
}

impl EngineCallback {
    /// Prepare `channels` fresh strips and a scratch buffer of `max_block` frames
    pub fn new(
        store: Arc<ParameterStore>,
        channels: ChannelCount,
        sample_rate: SampleRate,
        max_block: Frames,
        meters: Arc<LevelMeters>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            strips: vec![ChannelStrip::new(); channels],
            sample_rate,
            scratch: vec![0.0; max_block.max(1)],
            meters,
            events,
            blocks: 0,
        }
    }

    /// Number of channels with their own strip
    pub fn channels(&self) -> ChannelCount {
        self.strips.len()
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Process one block.
    ///
    /// REAL-TIME SAFE: no allocation, no locking, no logging. Parameters are
    /// read once, so an update never lands in the middle of a block. Output
    /// channels without a matching input channel and strip are zero-filled.
    pub fn process_block(&mut self, block: DuplexBlock<'_>) {
        let DuplexBlock {
            input,
            input_channels,
            output,
            output_channels,
            status,
        } = block;

        if output_channels == 0 {
            return;
        }
        let frames = output.len() / output_channels;
        let input_frames = input.len().checked_div(input_channels).unwrap_or(0);

        self.report(frames, status);

        let params = self.store.read_parameters();
        let mut input_peak_rms = 0.0_f32;
        let mut output_peak_rms = 0.0_f32;

        for channel in 0..output_channels {
            let Some(strip) = self
                .strips
                .get_mut(channel)
                .filter(|_| channel < input_channels)
            else {
                for frame in output.chunks_exact_mut(output_channels) {
                    frame[channel] = 0.0;
                }
                continue;
            };

            let mut input_energy = 0.0_f32;
            let mut output_energy = 0.0_f32;
            let mut start = 0;
            while start < frames {
                let len = (frames - start).min(self.scratch.len());
                let chunk = &mut self.scratch[..len];

                for (offset, sample) in chunk.iter_mut().enumerate() {
                    let frame = start + offset;
                    *sample = if frame < input_frames {
                        input[frame * input_channels + channel]
                    } else {
                        0.0
                    };
                    input_energy += *sample * *sample;
                }

                strip.process(chunk, &params, self.sample_rate);

                for (offset, sample) in chunk.iter().enumerate() {
                    output[(start + offset) * output_channels + channel] = *sample;
                    output_energy += *sample * *sample;
                }
                start += len;
            }

            if frames > 0 {
                input_peak_rms = input_peak_rms.max((input_energy / frames as f32).sqrt());
                output_peak_rms = output_peak_rms.max((output_energy / frames as f32).sqrt());
            }
        }

        // A trailing partial frame can't belong to any channel
        output[frames * output_channels..].fill(0.0);

        self.meters.store(input_peak_rms, output_peak_rms);
    }

    fn report(&mut self, frames: Frames, status: StatusFlags) {
        // Informational only: if the ring is full the event is dropped
        // rather than blocking the audio thread.
        if self.blocks == 0 {
            let _ = self.events.push(EngineEvent::FirstBlock {
                frames,
                sample_rate: self.sample_rate,
            });
        }
        if !status.is_empty() {
            let _ = self.events.push(EngineEvent::Status {
                block: self.blocks,
                flags: status,
            });
        }
        self.blocks += 1;
    }
}
