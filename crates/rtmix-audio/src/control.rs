//! Control-side facade used by front ends.

use std::sync::Arc;

use crossbeam_channel::Sender;
use rtmix_comms::{ControlSignal, LevelMeters, Levels, ParameterStore};
use rtmix_core::{DeviceInfo, DeviceSelection, MixerParameters, Result};

use crate::backend::AudioBackend;

/// Cheap, cloneable handle for changing parameters and devices from any
/// thread.
#[derive(Clone)]
pub struct MixerControl {
    backend: Arc<dyn AudioBackend>,
    store: Arc<ParameterStore>,
    meters: Arc<LevelMeters>,
    signals: Sender<ControlSignal>,
}

impl MixerControl {
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        store: Arc<ParameterStore>,
        meters: Arc<LevelMeters>,
        signals: Sender<ControlSignal>,
    ) -> Self {
        Self {
            backend,
            store,
            meters,
            signals,
        }
    }

    /// Devices currently present
    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.backend.devices()
    }

    pub fn get_parameters(&self) -> MixerParameters {
        self.store.read_parameters()
    }

    /// Publish new parameters; they apply from the next block
    pub fn set_parameters(&self, parameters: MixerParameters) {
        tracing::debug!("Publishing parameters: {:?}", parameters);
        self.store.publish_parameters(parameters);
    }

    pub fn get_device_selection(&self) -> DeviceSelection {
        self.store.read_device_selection()
    }

    /// Publish a new device selection and wake the stream manager.
    ///
    /// Every selected id must exist; otherwise nothing is published. Returns
    /// whether the selection actually changed.
    pub fn set_device_selection(&self, selection: DeviceSelection) -> Result<bool> {
        for id in [selection.input_device, selection.output_device]
            .into_iter()
            .flatten()
        {
            self.backend.device(id)?;
        }

        let changed = self.store.publish_device_selection(selection);
        if changed {
            tracing::info!(
                "Device selection set: input {:?}, output {:?}",
                selection.input_device,
                selection.output_device
            );
            // The manager also polls, so a missed wake-up only delays the restart
            if self
                .signals
                .send(ControlSignal::DeviceSelectionChanged)
                .is_err()
            {
                tracing::debug!("Stream manager not listening for device changes");
            }
        }
        Ok(changed)
    }

    /// Latest meter readings (raw RMS and 0..1 normalized)
    pub fn levels(&self) -> Levels {
        self.meters.read()
    }

    /// Ask the stream manager's loop to close the stream and return
    pub fn shutdown(&self) {
        let _ = self.signals.send(ControlSignal::Shutdown);
    }
}
