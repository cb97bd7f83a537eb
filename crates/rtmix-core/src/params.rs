//! Mixer parameter and device values.
//!
//! Every type here is an immutable value. The engine never edits one in
//! place: a control update builds a new value and publishes it whole.

use serde::{Deserialize, Serialize};

use crate::{ChannelCount, SampleRate};

/// Index of a device in the backend's enumeration order
pub type DeviceId = usize;

/// Single-band peaking EQ settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqSettings {
    /// Center frequency (Hz)
    pub frequency: f32,
    /// Boost (positive) or cut (negative) at the center frequency (dB)
    pub gain_db: f32,
    /// Bandwidth factor; higher is narrower
    pub q: f32,
}

impl Default for EqSettings {
    fn default() -> Self {
        Self {
            frequency: 1000.0,
            gain_db: 0.0,
            q: 1.0,
        }
    }
}

/// Feed-forward compressor settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorSettings {
    /// Level above which gain reduction starts (dBFS)
    pub threshold_db: f32,
    /// Input/output slope above threshold, floored at 1 when applied
    pub ratio: f32,
    /// Envelope rise time constant (ms)
    pub attack_ms: f32,
    /// Envelope fall time constant (ms)
    pub release_ms: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 2.0,
            attack_ms: 10.0,
            release_ms: 100.0,
        }
    }
}

/// Complete parameter snapshot read by the audio callback once per block
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerParameters {
    /// Pre-gain applied ahead of the compressor (dB)
    pub gain_db: f32,
    pub compressor: CompressorSettings,
    pub eq: EqSettings,
    /// Output trim applied after the EQ (dB)
    pub output_gain_db: f32,
}

impl MixerParameters {
    /// Parameters under which the whole chain passes audio through unchanged.
    pub fn bypass() -> Self {
        Self {
            gain_db: 0.0,
            compressor: CompressorSettings {
                ratio: 1.0,
                ..CompressorSettings::default()
            },
            eq: EqSettings {
                gain_db: 0.0,
                ..EqSettings::default()
            },
            output_gain_db: 0.0,
        }
    }
}

/// Which input and output devices the stream should use.
///
/// `None` means the host's default device for that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelection {
    pub input_device: Option<DeviceId>,
    pub output_device: Option<DeviceId>,
}

impl DeviceSelection {
    pub fn new(input_device: Option<DeviceId>, output_device: Option<DeviceId>) -> Self {
        Self {
            input_device,
            output_device,
        }
    }
}

/// Snapshot of one device's capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub max_input_channels: ChannelCount,
    pub max_output_channels: ChannelCount,
    /// Default rate of the output side, or of the input side on input-only devices
    pub default_sample_rate: SampleRate,
    /// Default rate of the input side
    pub default_input_sample_rate: SampleRate,
}
