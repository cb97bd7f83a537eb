//! Peaking EQ biquad - one band, boost or cut around a center frequency.
//!
//! Coefficients follow the RBJ cookbook peaking design, normalized so the
//! leading denominator term is 1. The filter runs in transposed direct form
//! II with coefficients and delay registers kept in f64.

use std::f64::consts::PI;

use rtmix_core::{EqSettings, Sample, SampleRate};

/// Lowest center frequency the design accepts (Hz)
pub const MIN_FREQUENCY_HZ: f64 = 10.0;
/// Highest center frequency as a fraction of the sample rate
pub const MAX_FREQUENCY_RATIO: f64 = 0.45;
/// Smallest accepted Q
pub const MIN_Q: f64 = 0.1;

/// Registers smaller than this are flushed to zero after each block
const DENORMAL_FLOOR: f64 = 1e-30;

/// Normalized biquad coefficients (`a0 == 1`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Coefficients {
    /// Pass-through filter
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Design a peaking filter for `settings` at `sample_rate`.
    ///
    /// Frequency is clamped to `[10 Hz, 0.45 * sample_rate]` and Q to at
    /// least 0.1. Gain is used as given. Non-finite settings fall back to the
    /// defaults, so the result is always finite and stable.
    pub fn peaking(sample_rate: SampleRate, settings: &EqSettings) -> Self {
        let defaults = EqSettings::default();
        let fs = f64::from(sample_rate.max(1));

        let max_frequency = (fs * MAX_FREQUENCY_RATIO).max(MIN_FREQUENCY_HZ);
        let frequency =
            finite_or(settings.frequency, defaults.frequency).clamp(MIN_FREQUENCY_HZ, max_frequency);
        let q = finite_or(settings.q, defaults.q).max(MIN_Q);
        let gain_db = finite_or(settings.gain_db, 0.0);

        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * frequency / fs;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_omega) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_omega) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    /// Both poles strictly inside the unit circle
    pub fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }
}

fn finite_or(value: f32, fallback: f32) -> f64 {
    if value.is_finite() {
        f64::from(value)
    } else {
        f64::from(fallback)
    }
}

/// One channel's peaking EQ with its delay line
#[derive(Debug, Clone)]
pub struct PeakingFilter {
    coefficients: Coefficients,
    /// Settings the current coefficients were designed for
    designed_for: Option<(SampleRate, EqSettings)>,
    z1: f64,
    z2: f64,
}

impl Default for PeakingFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PeakingFilter {
    /// A pass-through filter with cleared state
    pub fn new() -> Self {
        Self {
            coefficients: Coefficients::IDENTITY,
            designed_for: None,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Re-derive coefficients for the given settings.
    ///
    /// Called once per block. The design is skipped when neither the rate nor
    /// the settings changed since the last call; the result would be identical.
    /// The delay line is never touched, so output stays continuous.
    pub fn recompute(&mut self, sample_rate: SampleRate, settings: &EqSettings) {
        if self.designed_for == Some((sample_rate, *settings)) {
            return;
        }
        self.coefficients = Coefficients::peaking(sample_rate, settings);
        self.designed_for = Some((sample_rate, *settings));
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coefficients
    }

    /// Filter `samples` in place, carrying state into the next call
    pub fn process(&mut self, samples: &mut [Sample]) {
        let Coefficients { b0, b1, b2, a1, a2 } = self.coefficients;
        let (mut z1, mut z2) = (self.z1, self.z2);

        for sample in samples.iter_mut() {
            let x = f64::from(*sample);
            let y = b0 * x + z1;
            z1 = b1 * x - a1 * y + z2;
            z2 = b2 * x - a2 * y;
            *sample = y as Sample;
        }

        self.z1 = flush(z1);
        self.z2 = flush(z2);
    }

    /// Clear the delay line
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

#[inline]
fn flush(register: f64) -> f64 {
    if register.is_finite() && register.abs() >= DENORMAL_FLOOR {
        register
    } else {
        0.0
    }
}
