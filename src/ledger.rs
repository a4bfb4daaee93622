// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Per-device memory accounting.

Pure arithmetic bookkeeping: host/device byte and object tallies split by
resource class, plus live view counts. Counters are mutated only by the
resource that owns the corresponding footprint and read concurrently by
diagnostics; each counter is individually atomic, and momentary skew between
a (count, bytes) pair is tolerated by readers.

An unmatched removal means the core itself is broken, so it aborts instead
of continuing with corrupted accounting.
*/

use std::sync::atomic::{AtomicU64, Ordering};

use crate::resources::ResourceKind;

#[derive(Debug, Default)]
struct ClassCounters {
    host_bytes: AtomicU64,
    device_bytes: AtomicU64,
    host_objects: AtomicU64,
    device_objects: AtomicU64,
    views: AtomicU64,
}

fn drop_counter(counter: &AtomicU64, amount: u64, what: &'static str) {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            v.checked_sub(amount)
        })
        .unwrap_or_else(|held| {
            panic!("ledger imbalance: removing {amount} from {what} holding {held}")
        });
}

impl ClassCounters {
    fn snapshot(&self) -> ClassSnapshot {
        ClassSnapshot {
            host_bytes: self.host_bytes.load(Ordering::Relaxed),
            device_bytes: self.device_bytes.load(Ordering::Relaxed),
            host_objects: self.host_objects.load(Ordering::Relaxed),
            device_objects: self.device_objects.load(Ordering::Relaxed),
            views: self.views.load(Ordering::Relaxed),
        }
    }
}

/// Aggregate byte/object counters for one device.
///
/// Created with its device context and destroyed with it; not a global.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    buffers: ClassCounters,
    textures: ClassCounters,
}

impl MemoryLedger {
    pub(crate) fn new() -> Self {
        MemoryLedger::default()
    }

    fn class(&self, kind: ResourceKind) -> &ClassCounters {
        match kind {
            ResourceKind::Buffer => &self.buffers,
            ResourceKind::Texture => &self.textures,
        }
    }

    pub(crate) fn add_host_usage(&self, kind: ResourceKind, bytes: u64) {
        let class = self.class(kind);
        class.host_objects.fetch_add(1, Ordering::Relaxed);
        class.host_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn remove_host_usage(&self, kind: ResourceKind, bytes: u64) {
        let class = self.class(kind);
        drop_counter(&class.host_objects, 1, "host object count");
        drop_counter(&class.host_bytes, bytes, "host byte count");
    }

    pub(crate) fn add_device_usage(&self, kind: ResourceKind, bytes: u64) {
        let class = self.class(kind);
        class.device_objects.fetch_add(1, Ordering::Relaxed);
        class.device_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn remove_device_usage(&self, kind: ResourceKind, bytes: u64) {
        let class = self.class(kind);
        drop_counter(&class.device_objects, 1, "device object count");
        drop_counter(&class.device_bytes, bytes, "device byte count");
    }

    pub(crate) fn add_view(&self, kind: ResourceKind) {
        self.class(kind).views.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remove_view(&self, kind: ResourceKind) {
        drop_counter(&self.class(kind).views, 1, "view count");
    }

    /// Total device memory used across both resource classes.
    pub fn used_device_memory(&self) -> u64 {
        self.buffers.device_bytes.load(Ordering::Relaxed)
            + self.textures.device_bytes.load(Ordering::Relaxed)
    }

    pub fn used_device_memory_by_buffers(&self) -> u64 {
        self.buffers.device_bytes.load(Ordering::Relaxed)
    }

    pub fn used_device_memory_by_textures(&self) -> u64 {
        self.textures.device_bytes.load(Ordering::Relaxed)
    }

    /// Total host memory used across both resource classes.
    pub fn used_host_memory(&self) -> u64 {
        self.buffers.host_bytes.load(Ordering::Relaxed)
            + self.textures.host_bytes.load(Ordering::Relaxed)
    }

    pub fn host_resident_count(&self, kind: ResourceKind) -> u64 {
        self.class(kind).host_objects.load(Ordering::Relaxed)
    }

    pub fn device_resident_count(&self, kind: ResourceKind) -> u64 {
        self.class(kind).device_objects.load(Ordering::Relaxed)
    }

    /// Live views counted against this device. Covers views created while
    /// their resource was associated with the device; views created before
    /// a resource's first bind are not counted anywhere.
    pub fn view_count(&self, kind: ResourceKind) -> u64 {
        self.class(kind).views.load(Ordering::Relaxed)
    }

    /// A coherent-enough copy of all counters for telemetry export.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            buffers: self.buffers.snapshot(),
            textures: self.textures.snapshot(),
        }
    }
}

/// Point-in-time counter values for one resource class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ClassSnapshot {
    pub host_bytes: u64,
    pub device_bytes: u64,
    pub host_objects: u64,
    pub device_objects: u64,
    pub views: u64,
}

/// Point-in-time view of a device's ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LedgerSnapshot {
    pub buffers: ClassSnapshot,
    pub textures: ClassSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_balances() {
        let ledger = MemoryLedger::new();
        ledger.add_device_usage(ResourceKind::Buffer, 4096);
        ledger.add_device_usage(ResourceKind::Texture, 1024);
        assert_eq!(ledger.used_device_memory(), 5120);
        assert_eq!(ledger.used_device_memory_by_buffers(), 4096);
        ledger.remove_device_usage(ResourceKind::Buffer, 4096);
        ledger.remove_device_usage(ResourceKind::Texture, 1024);
        assert_eq!(ledger.used_device_memory(), 0);
        assert_eq!(ledger.device_resident_count(ResourceKind::Buffer), 0);
    }

    #[test]
    #[should_panic(expected = "ledger imbalance")]
    fn underflow_aborts() {
        let ledger = MemoryLedger::new();
        ledger.remove_host_usage(ResourceKind::Buffer, 1);
    }

    #[test]
    fn snapshot_serializes() {
        let ledger = MemoryLedger::new();
        ledger.add_host_usage(ResourceKind::Texture, 512);
        let json = serde_json::to_string(&ledger.snapshot()).unwrap();
        assert!(json.contains("\"host_bytes\":512"));
    }
}
