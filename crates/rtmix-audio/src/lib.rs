//! Audio engine: per-channel processing, stream lifecycle and cpal integration.
//!
//! The pieces fit together like this:
//!
//! - [`MixerControl`] is what a front end talks to. It publishes parameters and
//!   device selections into the shared [`ParameterStore`].
//! - [`StreamManager`] owns the hardware stream on the control thread and
//!   reopens it when the device selection changes.
//! - [`EngineCallback`] runs on the audio thread, one call per block, and
//!   pushes each active channel through its [`builtin::ChannelStrip`].

pub mod backend;
pub mod builtin;
pub mod config;
pub mod control;
pub mod engine;
pub mod stream;

pub use backend::{AudioBackend, CpalBackend, DuplexStream, StreamRequest};
pub use config::{AudioConfig, ConfigError};
pub use control::MixerControl;
pub use engine::{DuplexBlock, EngineCallback};
pub use stream::{StreamManager, active_channel_count, plan_stream};

use std::sync::Arc;

use crossbeam_channel::Receiver;
use rtmix_comms::{ControlSignal, LevelMeters, ParameterStore, create_control_channel};
use rtmix_core::MixerParameters;

/// Everything a front end needs to run the engine
pub struct Engine {
    /// Drives the stream; keep it on the thread that created it
    pub manager: StreamManager,
    /// Cloneable handle for parameter and device changes
    pub control: MixerControl,
    /// Wake-ups for [`StreamManager::run`]
    pub signals: Receiver<ControlSignal>,
}

/// Wire a store, meters, manager and control handle around `backend`.
///
/// The store starts with default parameters and the devices named in `config`.
/// No stream is opened yet; call [`StreamManager::start`].
pub fn create_engine(backend: Arc<dyn AudioBackend>, config: AudioConfig) -> Engine {
    let store = Arc::new(ParameterStore::with_initial(
        MixerParameters::default(),
        config.devices,
    ));
    let meters = Arc::new(LevelMeters::default());
    let (signal_tx, signal_rx) = create_control_channel();

    let control = MixerControl::new(
        Arc::clone(&backend),
        Arc::clone(&store),
        Arc::clone(&meters),
        signal_tx,
    );
    let manager = StreamManager::new(backend, store, meters, config);

    Engine {
        manager,
        control,
        signals: signal_rx,
    }
}
