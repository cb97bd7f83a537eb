//! Core types, parameter values, and errors shared across the rtmix crates.
//!
//! Everything here is plain data: nothing in this crate touches a device,
//! a thread, or an allocator on the audio path.

pub mod params;

pub use params::{
    CompressorSettings, DeviceId, DeviceInfo, DeviceSelection, EqSettings, MixerParameters,
};

/// Sample rate in Hz
pub type SampleRate = u32;

/// Number of audio frames (samples per channel)
pub type Frames = usize;

/// Audio sample type
pub type Sample = f32;

/// Number of audio channels
pub type ChannelCount = usize;

/// Common sample rates
pub mod sample_rates {
    use super::SampleRate;

    /// 44.1 kHz sample rate (CD quality)
    pub const SR_44100: SampleRate = 44100;
    /// 48 kHz sample rate (professional audio standard)
    pub const SR_48000: SampleRate = 48000;
    /// 96 kHz sample rate (high resolution audio)
    pub const SR_96000: SampleRate = 96000;
}

/// Audio buffer block sizes
pub mod block_sizes {
    use super::Frames;

    /// 128 frames per block (low latency, ~2.7ms @ 48kHz)
    pub const BLOCK_128: Frames = 128;
    /// 256 frames per block (balanced, ~5.3ms @ 48kHz)
    pub const BLOCK_256: Frames = 256;
    /// 512 frames per block (~10.7ms @ 48kHz, the engine default)
    pub const BLOCK_512: Frames = 512;
}

/// Decibel conversions.
pub mod db {
    /// Amplitude gain for a level in dB (`10^(db/20)`).
    #[inline]
    pub fn to_gain(db: f32) -> f32 {
        10.0_f32.powf(db / 20.0)
    }

    /// Level in dB for an amplitude, floored at `floor_db`.
    #[inline]
    pub fn from_gain(gain: f32, floor_db: f32) -> f32 {
        if gain > 0.0 {
            (20.0 * gain.log10()).max(floor_db)
        } else {
            floor_db
        }
    }
}

/// Common error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A selected device does not exist or cannot be queried
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The driver rejected the requested stream configuration
    #[error("Stream open failed: {0}")]
    StreamOpenFailed(String),

    /// Any other failure reported by the audio backend
    #[error("Audio backend error: {0}")]
    Backend(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
