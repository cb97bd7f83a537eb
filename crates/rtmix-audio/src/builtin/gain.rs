//! Gain stage - static level change in dB.

use rtmix_core::{Sample, db};

/// Multiply every sample by the amplitude for `gain_db`.
///
/// Unity gain leaves the buffer untouched (bit-exact bypass).
#[inline]
pub fn apply_db(samples: &mut [Sample], gain_db: f32) {
    apply_linear(samples, db::to_gain(gain_db));
}

/// Multiply every sample by a linear gain factor
#[inline]
pub fn apply_linear(samples: &mut [Sample], gain: f32) {
    if gain == 1.0 {
        return;
    }
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}
