// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Device-layer boundary.

The core never talks to a native driver directly; it consumes the
capabilities below as opaque traits supplied by the surrounding graphics
layer. Backends are selected by cargo feature; the software backend is the
default and doubles as the test device.
*/

use crate::resources::ResourceKind;

/// One device-resident allocation, opaque to the core. Exclusively owned by
/// the resource that acquired it; other subsystems must not alias it.
pub trait DeviceBacking: Send + Sync + std::fmt::Debug {
    /// Total footprint of the backing in bytes.
    fn byte_size(&self) -> u64;

    /// Copies the device bytes back to host memory, one vector per
    /// subresource. Used by the `HostOrDevice` unbind path and by
    /// device-loss reset preparation.
    fn copy_to_host(&self) -> Vec<Vec<u8>>;
}

/// The allocator capability a device context supplies to resources.
pub trait DeviceLayer: Send + Sync + std::fmt::Debug {
    /// Acquires a backing covering the given subresource sizes, optionally
    /// seeded with initial content (one slice per subresource).
    fn acquire_backing(
        &self,
        kind: ResourceKind,
        subresource_sizes: &[u64],
        initial: Option<&[Vec<u8>]>,
    ) -> Result<Box<dyn DeviceBacking>, BackingError>;

    /// Releases a backing. When `destroy` is false the allocation is merely
    /// detached; the identity owner on the other side of a sharing boundary
    /// remains responsible for teardown.
    fn release_backing(&self, backing: Box<dyn DeviceBacking>, destroy: bool);

    /// Device memory still available, for reporting only. The core performs
    /// no admission control on this value.
    fn available_device_memory(&self) -> u64;
}

/// Allocation refusal from the device layer.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("device allocation of {requested} bytes failed; {available} bytes available")]
pub struct BackingError {
    pub requested: u64,
    pub available: u64,
}

#[cfg(feature = "backend_software")]
mod software;
#[cfg(feature = "backend_software")]
pub use software::SoftwareDevice;
