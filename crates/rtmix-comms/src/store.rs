//! Process-wide parameter store shared by the control and audio threads.
//!
//! Mixer parameters live in a `basedrop::SharedCell`: a publish swaps in a
//! freshly allocated immutable snapshot, a read clones the current pointer.
//! The audio thread may end up holding the last reference to a replaced
//! snapshot; dropping it there only queues the pointer, and the control side
//! frees it in [`ParameterStore::collect_garbage`].
//!
//! The device selection is only ever touched by control-side code, so it sits
//! behind a plain mutex together with the change token.

use std::sync::atomic::{AtomicU64, Ordering};

use basedrop::{Collector, Handle, Shared, SharedCell};
use parking_lot::Mutex;
use rtmix_core::{DeviceSelection, MixerParameters};

/// Versioned holder of the current mixer parameters and device selection
pub struct ParameterStore {
    // Declared before `collector` so outstanding snapshots are queued before it drops.
    parameters: SharedCell<MixerParameters>,
    handle: Handle,
    collector: Mutex<Collector>,
    selection: Mutex<DeviceSelection>,
    change_token: AtomicU64,
}

impl ParameterStore {
    /// Create a store holding default parameters and the default devices
    pub fn new() -> Self {
        Self::with_initial(MixerParameters::default(), DeviceSelection::default())
    }

    /// Create a store with explicit starting values (token starts at 0)
    pub fn with_initial(parameters: MixerParameters, selection: DeviceSelection) -> Self {
        let collector = Collector::new();
        let handle = collector.handle();
        Self {
            parameters: SharedCell::new(Shared::new(&handle, parameters)),
            handle,
            collector: Mutex::new(collector),
            selection: Mutex::new(selection),
            change_token: AtomicU64::new(0),
        }
    }

    /// Latest complete parameter snapshot.
    ///
    /// REAL-TIME SAFE: no lock, no allocation, no deallocation.
    #[inline]
    pub fn read_parameters(&self) -> MixerParameters {
        *self.parameters.get()
    }

    /// Install a new parameter snapshot; the next block to start will see it
    pub fn publish_parameters(&self, parameters: MixerParameters) {
        self.parameters.set(Shared::new(&self.handle, parameters));
        self.collect_garbage();
    }

    pub fn read_device_selection(&self) -> DeviceSelection {
        *self.selection.lock()
    }

    /// Install a new device selection.
    ///
    /// The change token is bumped only when the value differs from the current
    /// one, so republishing an identical selection never causes a restart.
    /// Returns whether the selection changed.
    pub fn publish_device_selection(&self, selection: DeviceSelection) -> bool {
        let mut current = self.selection.lock();
        if *current == selection {
            return false;
        }
        *current = selection;
        self.change_token.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Number of accepted device-selection changes so far
    pub fn current_token(&self) -> u64 {
        self.change_token.load(Ordering::Acquire)
    }

    /// Selection and the token it was published under, read consistently
    pub fn selection_with_token(&self) -> (DeviceSelection, u64) {
        let current = self.selection.lock();
        (*current, self.change_token.load(Ordering::Acquire))
    }

    /// Free parameter snapshots released since the last collection.
    ///
    /// Control side only.
    pub fn collect_garbage(&self) {
        self.collector.lock().collect();
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}
