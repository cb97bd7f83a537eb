//! Lockless communication primitives between the audio and control threads.
//!
//! - [`ParameterStore`]: control -> audio parameter snapshots
//! - [`LevelMeters`]: audio -> control level readings
//! - [`EngineEvent`] ring: audio -> control status reports
//! - [`ControlSignal`] channel: control -> stream manager wake-ups

pub mod store;

pub use rtrb;
pub use store::ParameterStore;

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_channel::{Receiver, Sender};
use rtmix_core::{Frames, Sample, SampleRate, db};

/// Per-block driver status reported alongside the audio buffers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    /// Captured input was dropped because the bridge ring was full
    pub input_overflow: bool,
    /// Not enough captured input was available; the gap was filled with silence
    pub input_underflow: bool,
}

impl StatusFlags {
    pub fn is_empty(self) -> bool {
        !self.input_overflow && !self.input_underflow
    }
}

/// Events sent from the audio thread back to the control thread
///
/// IMPORTANT: All variants must be real-time safe (no heap allocation/deallocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The first block of a freshly opened stream was processed
    FirstBlock {
        /// Frames delivered in that block
        frames: Frames,
        /// Rate the stream's DSP state was prepared for
        sample_rate: SampleRate,
    },
    /// A block arrived with non-empty status flags
    Status {
        /// Block counter since the stream opened
        block: u64,
        flags: StatusFlags,
    },
}

/// Event sender (audio thread)
pub type EventSender = rtrb::Producer<EngineEvent>;
/// Event receiver (control thread)
pub type EventReceiver = rtrb::Consumer<EngineEvent>;

/// Create the audio -> control event ring
pub fn create_event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    rtrb::RingBuffer::new(capacity)
}

/// Messages that wake the stream manager's control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// A new device selection was published; check the change token now
    DeviceSelectionChanged,
    /// Close the stream and leave the control loop
    Shutdown,
}

/// Create the control -> stream manager notification channel
pub fn create_control_channel() -> (Sender<ControlSignal>, Receiver<ControlSignal>) {
    crossbeam_channel::unbounded()
}

/// Range shown by the level meters (dB below full scale)
pub const METER_FLOOR_DB: f32 = -60.0;

/// Latest per-block RMS levels, written by the audio thread
#[derive(Debug)]
pub struct LevelMeters {
    /// RMS values stored as f32 bits so they can be shared lock-free
    input: AtomicU32,
    output: AtomicU32,
}

impl Default for LevelMeters {
    fn default() -> Self {
        Self {
            input: AtomicU32::new(0.0_f32.to_bits()),
            output: AtomicU32::new(0.0_f32.to_bits()),
        }
    }
}

impl LevelMeters {
    /// Store the levels of the block just processed (real-time safe)
    #[inline]
    pub fn store(&self, input_rms: Sample, output_rms: Sample) {
        self.input.store(input_rms.to_bits(), Ordering::Release);
        self.output.store(output_rms.to_bits(), Ordering::Release);
    }

    pub fn read(&self) -> Levels {
        Levels {
            input_rms: f32::from_bits(self.input.load(Ordering::Acquire)),
            output_rms: f32::from_bits(self.output.load(Ordering::Acquire)),
        }
    }

    /// Zero both meters, e.g. while no stream is running
    pub fn clear(&self) {
        self.store(0.0, 0.0);
    }
}

/// A reading of the level meters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Levels {
    pub input_rms: Sample,
    pub output_rms: Sample,
}

impl Levels {
    /// Input level mapped onto 0..1 across the meter range
    pub fn input_normalized(&self) -> f32 {
        normalize(self.input_rms)
    }

    /// Output level mapped onto 0..1 across the meter range
    pub fn output_normalized(&self) -> f32 {
        normalize(self.output_rms)
    }
}

fn normalize(rms: Sample) -> f32 {
    let level_db = db::from_gain(rms, METER_FLOOR_DB);
    ((level_db - METER_FLOOR_DB) / -METER_FLOOR_DB).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_channel_creation() {
        let (mut tx, mut rx) = create_event_channel(4);
        assert!(
            tx.push(EngineEvent::Status {
                block: 3,
                flags: StatusFlags {
                    input_overflow: true,
                    input_underflow: false,
                },
            })
            .is_ok()
        );
        assert!(matches!(rx.pop(), Ok(EngineEvent::Status { block: 3, .. })));
    }

    #[test]
    fn test_full_event_ring_rejects_without_blocking() {
        let (mut tx, _rx) = create_event_channel(1);
        let event = EngineEvent::FirstBlock {
            frames: 64,
            sample_rate: 48000,
        };
        assert!(tx.push(event).is_ok());
        assert!(tx.push(event).is_err());
    }

    #[test]
    fn test_status_flags_empty() {
        assert!(StatusFlags::default().is_empty());
        let flags = StatusFlags {
            input_underflow: true,
            ..StatusFlags::default()
        };
        assert!(!flags.is_empty());
    }

    #[test]
    fn test_meter_normalization() {
        let meters = LevelMeters::default();
        assert_eq!(meters.read().input_normalized(), 0.0);

        meters.store(1.0, 0.001);
        let levels = meters.read();
        assert!((levels.input_normalized() - 1.0).abs() < 1e-6);
        // 0.001 is -60 dB: bottom of the range
        assert!(levels.output_normalized().abs() < 1e-4);

        meters.store(0.1, 0.0);
        assert!((meters.read().input_normalized() - (40.0 / 60.0)).abs() < 1e-4);

        meters.clear();
        assert_eq!(meters.read(), Levels::default());
    }

    #[test]
    fn test_control_channel() {
        let (tx, rx) = create_control_channel();
        tx.send(ControlSignal::DeviceSelectionChanged).unwrap();
        tx.send(ControlSignal::Shutdown).unwrap();
        assert_eq!(rx.try_recv(), Ok(ControlSignal::DeviceSelectionChanged));
        assert_eq!(rx.try_recv(), Ok(ControlSignal::Shutdown));
    }
}
