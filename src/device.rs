// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The device context.

A [`BoundDevice`] bundles the opaque device layer with the ledger that
accounts for it. Resources take the context as an explicit argument on bind
rather than reaching for a global; the ledger's lifetime is exactly the
device's create/destroy bracket.
*/

use std::sync::Arc;

use crate::imp::DeviceLayer;
use crate::ledger::MemoryLedger;

/// A device context: the allocator capability plus its accounting.
#[derive(Debug)]
pub struct BoundDevice {
    layer: Box<dyn DeviceLayer>,
    ledger: MemoryLedger,
    debug_name: String,
}

impl BoundDevice {
    pub fn new(layer: Box<dyn DeviceLayer>, debug_name: &str) -> Arc<Self> {
        logwise::info_sync!(
            "device context {name} created",
            name = logwise::privacy::LogIt(debug_name)
        );
        Arc::new(BoundDevice {
            layer,
            ledger: MemoryLedger::new(),
            debug_name: debug_name.to_string(),
        })
    }

    /// A context over the heap-simulated device, with `capacity` bytes of
    /// simulated device memory.
    #[cfg(feature = "backend_software")]
    pub fn software(capacity: u64, debug_name: &str) -> Arc<Self> {
        Self::new(
            Box::new(crate::imp::SoftwareDevice::new(capacity)),
            debug_name,
        )
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    /// Device memory still available, straight from the device layer. For
    /// reporting only; resources do not gate binds on it.
    pub fn available_device_memory(&self) -> u64 {
        self.layer.available_device_memory()
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub(crate) fn layer(&self) -> &dyn DeviceLayer {
        &*self.layer
    }
}
