//! Stream manager - owns the hardware stream and its restart protocol.
//!
//! Restarts happen on the control side only. The manager compares the store's
//! change token with the one it last opened under; when they differ it
//! resolves a new plan, and only if that succeeds closes the old stream and
//! opens the new one. All of that happens under one lock, so two restarts
//! can never interleave.

use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use rtmix_comms::{
    ControlSignal, EngineEvent, EventReceiver, LevelMeters, ParameterStore, create_event_channel,
};
use rtmix_core::{ChannelCount, DeviceSelection, Result};

use crate::backend::{AudioBackend, DuplexStream, StreamRequest};
use crate::config::AudioConfig;
use crate::engine::EngineCallback;

/// Channels to process for a pair of device capabilities.
///
/// A side that is not selected counts as 1 input channel or 2 output
/// channels. Never less than one.
pub fn active_channel_count(
    max_input_channels: Option<ChannelCount>,
    max_output_channels: Option<ChannelCount>,
) -> ChannelCount {
    max_input_channels
        .unwrap_or(1)
        .min(max_output_channels.unwrap_or(2))
        .max(1)
}

/// Resolve a device selection into a concrete stream request.
///
/// The sample rate is the output device's default output rate, else the input
/// device's default input rate, else the default output device's rate.
pub fn plan_stream(
    backend: &dyn AudioBackend,
    selection: DeviceSelection,
    config: &AudioConfig,
) -> Result<StreamRequest> {
    let input = selection
        .input_device
        .map(|id| backend.device(id))
        .transpose()?;
    let output = selection
        .output_device
        .map(|id| backend.device(id))
        .transpose()?;

    let channels = active_channel_count(
        input.as_ref().map(|d| d.max_input_channels),
        output.as_ref().map(|d| d.max_output_channels),
    );
    let sample_rate = match (&output, &input) {
        (Some(device), _) => device.default_sample_rate,
        (None, Some(device)) => device.default_input_sample_rate,
        (None, None) => backend.default_output_device()?.default_sample_rate,
    };

    Ok(StreamRequest {
        input_device: selection.input_device,
        output_device: selection.output_device,
        channels,
        sample_rate,
        block_size: config.block_size,
        ring_blocks: config.ring_blocks,
    })
}

struct RunningStream {
    stream: Box<dyn DuplexStream>,
    request: StreamRequest,
    events: EventReceiver,
}

#[derive(Default)]
struct StreamSlot {
    running: Option<RunningStream>,
    /// Change token the current stream was opened under
    observed_token: u64,
    /// Token whose failed restart has already been logged
    reported_failure: Option<u64>,
    /// Blocks that arrived with non-empty status flags
    status_blocks: u64,
}

/// Owner of the live stream.
///
/// Lives on the control thread: the stream handle it holds is not `Send` on
/// every platform.
pub struct StreamManager {
    backend: Arc<dyn AudioBackend>,
    store: Arc<ParameterStore>,
    meters: Arc<LevelMeters>,
    config: AudioConfig,
    restart_lock: Mutex<StreamSlot>,
}

impl StreamManager {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        store: Arc<ParameterStore>,
        meters: Arc<LevelMeters>,
        config: AudioConfig,
    ) -> Self {
        Self {
            backend,
            store,
            meters,
            config,
            restart_lock: Mutex::new(StreamSlot::default()),
        }
    }

    /// Open a stream for the store's current device selection
    pub fn start(&self) -> Result<StreamRequest> {
        let (selection, token) = self.store.selection_with_token();
        let mut slot = self.restart_lock.lock();
        let request = self.open_locked(&mut slot, selection)?;
        slot.observed_token = token;
        Ok(request)
    }

    /// Open a stream for `selection`, replacing any open stream.
    ///
    /// On `DeviceUnavailable` the current stream keeps running.
    pub fn open(&self, selection: DeviceSelection) -> Result<StreamRequest> {
        let mut slot = self.restart_lock.lock();
        self.open_locked(&mut slot, selection)
    }

    fn open_locked(
        &self,
        slot: &mut StreamSlot,
        selection: DeviceSelection,
    ) -> Result<StreamRequest> {
        let request = plan_stream(self.backend.as_ref(), selection, &self.config)?;
        self.close_locked(slot);

        // A failing restart is retried every poll; only success is logged above debug
        tracing::debug!("Opening stream on {}: {:?}", self.backend.name(), request);

        let (event_tx, event_rx) = create_event_channel(self.config.event_capacity);
        let callback = EngineCallback::new(
            Arc::clone(&self.store),
            request.channels,
            request.sample_rate,
            request.block_size,
            Arc::clone(&self.meters),
            event_tx,
        );
        let mut stream = self.backend.open_duplex(&request, callback)?;
        stream.start()?;
        tracing::info!(
            "Stream open on {}: {} channel(s) at {} Hz, block {}",
            self.backend.name(),
            request.channels,
            request.sample_rate,
            request.block_size
        );

        slot.running = Some(RunningStream {
            stream,
            request,
            events: event_rx,
        });
        Ok(request)
    }

    /// Stop and release the stream. Calling it with no stream open is a no-op.
    pub fn close(&self) {
        let mut slot = self.restart_lock.lock();
        self.close_locked(&mut slot);
    }

    fn close_locked(&self, slot: &mut StreamSlot) {
        let Some(mut running) = slot.running.take() else {
            return;
        };
        if let Err(e) = running.stream.stop() {
            tracing::warn!("Error stopping stream: {}", e);
        }
        // Dropping the handle guarantees no further callbacks
        drop(running);
        self.meters.clear();
        tracing::info!("Stream closed");
    }

    /// Restart the stream if the device selection changed since it was opened.
    ///
    /// Returns whether a restart happened. A failed restart leaves the token
    /// unobserved, so the next poll tries again; each failing token is logged
    /// once.
    pub fn poll_for_selection_change(&self) -> Result<bool> {
        let (selection, token) = self.store.selection_with_token();
        let mut slot = self.restart_lock.lock();
        if token == slot.observed_token {
            return Ok(false);
        }

        match self.open_locked(&mut slot, selection) {
            Ok(request) => {
                tracing::info!(
                    "Device selection changed (token {}), stream restarted: input {:?}, output {:?}",
                    token,
                    request.input_device,
                    request.output_device
                );
                slot.observed_token = token;
                slot.reported_failure = None;
                Ok(true)
            }
            Err(e) => {
                if slot.reported_failure != Some(token) {
                    tracing::error!("Stream restart failed (token {}): {}", token, e);
                    slot.reported_failure = Some(token);
                }
                Err(e)
            }
        }
    }

    /// Pull pending engine events off the stream's ring and log them
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        let mut slot = self.restart_lock.lock();
        let slot = &mut *slot;
        let Some(running) = slot.running.as_mut() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        while let Ok(event) = running.events.pop() {
            match event {
                EngineEvent::FirstBlock {
                    frames,
                    sample_rate,
                } => {
                    tracing::debug!("First block: {} frames at {} Hz", frames, sample_rate);
                }
                EngineEvent::Status { block, flags } => {
                    slot.status_blocks += 1;
                    tracing::warn!("Block {} reported {:?}", block, flags);
                }
            }
            events.push(event);
        }
        events
    }

    /// Plan of the running stream, if any
    pub fn stream_info(&self) -> Option<StreamRequest> {
        self.restart_lock.lock().running.as_ref().map(|r| r.request)
    }

    /// Blocks reported with status flags since this manager was created
    pub fn status_blocks(&self) -> u64 {
        self.restart_lock.lock().status_blocks
    }

    /// Control loop: wait for a signal or the poll interval, then check for a
    /// device change, drain engine events and free released parameter
    /// snapshots. Returns after `Shutdown` or when every sender is gone, with
    /// the stream closed.
    pub fn run(&self, signals: &Receiver<ControlSignal>) {
        let interval = self.config.poll_interval();
        tracing::info!("Stream manager running (poll every {:?})", interval);

        loop {
            match signals.recv_timeout(interval) {
                Ok(ControlSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(ControlSignal::DeviceSelectionChanged) | Err(RecvTimeoutError::Timeout) => {}
            }

            if let Err(e) = self.poll_for_selection_change() {
                tracing::debug!("Restart still pending: {}", e);
            }
            self.drain_events();
            self.store.collect_garbage();
        }

        self.close();
        tracing::info!("Stream manager stopped");
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryBackend, device};
    use rtmix_core::{DeviceInfo, Error, MixerParameters};

    fn manager(backend: &Arc<MemoryBackend>, selection: DeviceSelection) -> StreamManager {
        let store = Arc::new(ParameterStore::with_initial(
            MixerParameters::bypass(),
            selection,
        ));
        StreamManager::new(
            backend.clone(),
            store,
            Arc::new(LevelMeters::default()),
            AudioConfig {
                block_size: 64,
                ..AudioConfig::default()
            },
        )
    }

    #[test]
    fn test_active_channel_count() {
        assert_eq!(active_channel_count(Some(2), Some(6)), 2);
        assert_eq!(active_channel_count(None, Some(2)), 1);
        assert_eq!(active_channel_count(Some(8), Some(2)), 2);
        assert_eq!(active_channel_count(Some(4), None), 2);
        assert_eq!(active_channel_count(None, None), 1);
        assert_eq!(active_channel_count(Some(0), Some(2)), 1);
    }

    #[test]
    fn test_sample_rate_policy() {
        let backend = MemoryBackend::stereo_pair();
        let config = AudioConfig::default();

        // Output wins
        let plan = plan_stream(&backend, DeviceSelection::new(Some(0), Some(2)), &config).unwrap();
        assert_eq!(plan.sample_rate, 16000);
        // Then input
        let plan = plan_stream(&backend, DeviceSelection::new(Some(0), None), &config).unwrap();
        assert_eq!(plan.sample_rate, 44100);
        // Then the default output device
        let plan = plan_stream(&backend, DeviceSelection::default(), &config).unwrap();
        assert_eq!(plan.sample_rate, 48000);
        assert_eq!(plan.channels, 1);
    }

    #[test]
    fn test_input_only_selection_uses_input_rate() {
        // Both directions, with different default rates per direction
        let combo = DeviceInfo {
            default_input_sample_rate: 44100,
            ..device(0, "Combo", 2, 2, 96000)
        };
        let backend = MemoryBackend::new(vec![combo, device(1, "Speakers", 0, 2, 48000)], Some(1));
        let config = AudioConfig::default();

        let plan = plan_stream(&backend, DeviceSelection::new(Some(0), None), &config).unwrap();
        assert_eq!(plan.sample_rate, 44100);
        let plan = plan_stream(&backend, DeviceSelection::new(None, Some(0)), &config).unwrap();
        assert_eq!(plan.sample_rate, 96000);
    }

    #[test]
    fn test_plan_unknown_device() {
        let backend = MemoryBackend::stereo_pair();
        let result = plan_stream(
            &backend,
            DeviceSelection::new(Some(9), None),
            &AudioConfig::default(),
        );
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    }

    #[test]
    fn test_plan_without_default_output() {
        let backend = MemoryBackend::new(vec![device(0, "Mic", 1, 0, 22050)], None);
        let result = plan_stream(&backend, DeviceSelection::default(), &AudioConfig::default());
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));

        // An explicit input still resolves a rate
        let plan = plan_stream(
            &backend,
            DeviceSelection::new(Some(0), None),
            &AudioConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.sample_rate, 22050);
    }

    #[test]
    fn test_start_opens_selected_devices() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::new(Some(0), Some(1)));

        let request = manager.start().unwrap();
        assert_eq!(request.channels, 2);
        assert_eq!(request.sample_rate, 48000);
        assert_eq!(request.block_size, 64);
        assert_eq!(manager.stream_info(), Some(request));

        // Blocks flow through the callback once started
        let input = vec![0.25_f32; 128];
        let mut output = vec![0.0_f32; 6 * 64];
        assert!(backend.drive(&input, 2, &mut output, 6));
        for frame in output.chunks_exact(6) {
            assert!((frame[0] - 0.25).abs() < 1e-6);
            assert!((frame[1] - 0.25).abs() < 1e-6);
            assert!(frame[2..].iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_restart_exactly_once_for_duplicate_publishes() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();
        assert_eq!(backend.open_count(), 1);

        let next = DeviceSelection::new(Some(0), Some(1));
        assert!(manager.store.publish_device_selection(next));
        assert!(!manager.store.publish_device_selection(next));

        assert!(manager.poll_for_selection_change().unwrap());
        assert!(!manager.poll_for_selection_change().unwrap());
        assert!(!manager.poll_for_selection_change().unwrap());
        assert_eq!(backend.open_count(), 2);
        assert_eq!(backend.last_request().unwrap().output_device, Some(1));
    }

    #[test]
    fn test_parameter_changes_never_restart() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();

        for gain_db in [-6.0, 0.0, 6.0] {
            manager.store.publish_parameters(MixerParameters {
                gain_db,
                ..MixerParameters::default()
            });
            assert!(!manager.poll_for_selection_change().unwrap());
        }
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn test_device_unavailable_keeps_running_stream() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::new(Some(0), Some(1)));
        let original = manager.start().unwrap();

        manager
            .store
            .publish_device_selection(DeviceSelection::new(Some(7), Some(1)));
        assert!(matches!(
            manager.poll_for_selection_change(),
            Err(Error::DeviceUnavailable(_))
        ));

        assert_eq!(manager.stream_info(), Some(original));
        assert!(backend.is_live());
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn test_failed_open_retries_on_next_poll() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();

        manager
            .store
            .publish_device_selection(DeviceSelection::new(None, Some(2)));
        backend.fail_next_open();
        assert!(matches!(
            manager.poll_for_selection_change(),
            Err(Error::StreamOpenFailed(_))
        ));
        assert!(manager.stream_info().is_none());

        // Token still unobserved: the next tick tries again and succeeds
        assert!(manager.poll_for_selection_change().unwrap());
        assert_eq!(manager.stream_info().unwrap().output_device, Some(2));
        assert!(!manager.poll_for_selection_change().unwrap());
    }

    #[test]
    fn test_repeated_open_failures_log_once() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();

        manager
            .store
            .publish_device_selection(DeviceSelection::new(None, Some(2)));
        backend.fail_opens(4);
        // First failure: closes the old stream and reports the error
        assert!(manager.poll_for_selection_change().is_err());

        let logs = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer({
                let logs = Arc::clone(&logs);
                move || LogCapture(Arc::clone(&logs))
            })
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..3 {
                assert!(matches!(
                    manager.poll_for_selection_change(),
                    Err(Error::StreamOpenFailed(_))
                ));
            }
        });
        let captured = String::from_utf8(logs.lock().clone()).unwrap();
        assert!(captured.is_empty(), "retries logged above debug:\n{captured}");

        // Failures exhausted: the restart goes through
        assert!(manager.poll_for_selection_change().unwrap());
        assert_eq!(manager.stream_info().unwrap().output_device, Some(2));
    }

    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();

        manager.close();
        assert!(!backend.is_live());
        assert!(manager.stream_info().is_none());
        manager.close();
        assert!(manager.stream_info().is_none());

        // No callbacks after close
        let mut output = vec![1.0_f32; 128];
        assert!(!backend.drive(&[0.5; 64], 1, &mut output, 2));
        assert!(output.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_close_clears_meters() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();

        let mut output = vec![0.0_f32; 128];
        backend.drive(&[0.5; 64], 1, &mut output, 2);
        assert!(manager.meters.read().input_rms > 0.0);

        manager.close();
        assert_eq!(manager.meters.read().input_rms, 0.0);
    }

    #[test]
    fn test_open_replaces_stream() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();

        let request = manager
            .open(DeviceSelection::new(Some(2), Some(2)))
            .unwrap();
        assert_eq!(request.channels, 1);
        assert_eq!(request.sample_rate, 16000);
        assert_eq!(backend.open_count(), 2);
        assert!(backend.is_live());
    }

    #[test]
    fn test_drain_events() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        assert!(manager.drain_events().is_empty());
        manager.start().unwrap();

        let mut output = vec![0.0_f32; 128];
        backend.drive(&[0.0; 64], 1, &mut output, 2);
        backend.drive(&[0.0; 64], 1, &mut output, 2);

        let events = manager.drain_events();
        assert_eq!(
            events,
            vec![EngineEvent::FirstBlock {
                frames: 64,
                sample_rate: 48000
            }]
        );
        assert_eq!(manager.status_blocks(), 0);
    }

    #[test]
    fn test_run_exits_on_shutdown() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();

        let (tx, rx) = rtmix_comms::create_control_channel();
        manager
            .store
            .publish_device_selection(DeviceSelection::new(Some(0), Some(1)));
        tx.send(ControlSignal::DeviceSelectionChanged).unwrap();
        tx.send(ControlSignal::Shutdown).unwrap();

        manager.run(&rx);
        // The change was picked up before shutdown, then the stream was closed
        assert_eq!(backend.open_count(), 2);
        assert!(manager.stream_info().is_none());
        assert!(!backend.is_live());
    }

    #[test]
    fn test_run_exits_when_senders_dropped() {
        let backend = Arc::new(MemoryBackend::stereo_pair());
        let manager = manager(&backend, DeviceSelection::default());
        manager.start().unwrap();

        let (tx, rx) = rtmix_comms::create_control_channel();
        drop(tx);
        manager.run(&rx);
        assert!(manager.stream_info().is_none());
    }
}
