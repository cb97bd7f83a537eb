//! Built-in processing stages.
//!
//! Each active channel of a stream owns one [`ChannelStrip`]: pre-gain,
//! compressor, peaking EQ, output trim. The strips are created with the
//! stream and dropped with it; nothing here is shared between channels.

pub mod compressor;
pub mod gain;
pub mod peaking;

pub use compressor::Compressor;
pub use peaking::PeakingFilter;

use rtmix_core::{MixerParameters, Sample, SampleRate};

/// Per-channel processing chain and its state
#[derive(Debug, Clone, Default)]
pub struct ChannelStrip {
    compressor: Compressor,
    filter: PeakingFilter,
}

impl ChannelStrip {
    /// Fresh strip: zero envelope, cleared delay line
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one channel's slice of a block through the chain, in place.
    ///
    /// REAL-TIME SAFE: no allocation, no locking.
    pub fn process(
        &mut self,
        samples: &mut [Sample],
        params: &MixerParameters,
        sample_rate: SampleRate,
    ) {
        gain::apply_db(samples, params.gain_db);
        self.compressor
            .process(samples, &params.compressor, sample_rate);
        self.filter.recompute(sample_rate, &params.eq);
        self.filter.process(samples);
        gain::apply_db(samples, params.output_gain_db);
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn filter(&self) -> &PeakingFilter {
        &self.filter
    }
}
