//! Feed-forward compressor with a peak envelope follower.
//!
//! Works sample by sample: the envelope tracks `|x|` with separate attack and
//! release smoothing, and every sample gets its own gain. No look-ahead, no
//! make-up gain.

use rtmix_core::{CompressorSettings, Sample, SampleRate, db};

/// Added to the envelope before taking its logarithm
pub const ENVELOPE_FLOOR: f32 = 1e-9;

/// One-pole smoothing coefficient for a time constant in milliseconds.
///
/// Shorter times give a coefficient closer to 0 (faster tracking); a
/// non-positive time gives 0, i.e. the envelope jumps straight to the level.
pub fn time_coefficient(time_ms: f32, sample_rate: SampleRate) -> f32 {
    let time_samples = 0.001 * time_ms * sample_rate as f32;
    if time_samples.is_finite() && time_samples > 0.0 {
        (-1.0 / time_samples).exp()
    } else {
        0.0
    }
}

/// One channel's compressor state
#[derive(Debug, Clone, Default)]
pub struct Compressor {
    envelope: f32,
}

impl Compressor {
    /// A compressor with a zero envelope
    pub fn new() -> Self {
        Self::default()
    }

    /// Current envelope (linear amplitude)
    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    /// Compress `samples` in place; the envelope carries into the next call
    pub fn process(
        &mut self,
        samples: &mut [Sample],
        settings: &CompressorSettings,
        sample_rate: SampleRate,
    ) {
        let threshold_db = settings.threshold_db;
        let ratio = settings.ratio.max(1.0);
        let attack = time_coefficient(settings.attack_ms, sample_rate);
        let release = time_coefficient(settings.release_ms, sample_rate);
        // (1/ratio - 1) <= 0, so the applied gain can never exceed unity
        let slope = 1.0 / ratio - 1.0;
        let reduces = ratio > 1.0;

        let mut envelope = self.envelope;
        for sample in samples.iter_mut() {
            let level = sample.abs();
            let coefficient = if level > envelope { attack } else { release };
            envelope = coefficient * envelope + (1.0 - coefficient) * level;

            if !reduces {
                continue;
            }
            let envelope_db = 20.0 * (envelope + ENVELOPE_FLOOR).log10();
            if envelope_db > threshold_db {
                // threshold + (env - threshold) / ratio - env
                let gain_db = (envelope_db - threshold_db) * slope;
                *sample *= db::to_gain(gain_db);
            }
        }

        self.envelope = if envelope.is_finite() { envelope } else { 0.0 };
    }

    /// Zero the envelope
    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
