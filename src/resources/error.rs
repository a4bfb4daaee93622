// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::resources::Locality;

/// Failures surfaced by resource lifecycle operations.
///
/// Callers pattern-match on these; none are retried internally. Retrying a
/// busy resource (for example after draining the device queue) is the
/// caller's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// A bind or unbind was requested that the locality table forbids for
    /// the resource's current placement.
    #[error("{operation} is not a legal transition for locality {locality:?}")]
    IllegalLocalityTransition {
        locality: Locality,
        operation: &'static str,
    },

    /// Unbind, reset preparation, or destruction was attempted while device
    /// operations are still outstanding. Live device state is never
    /// force-detached.
    #[error("resource busy: {device_use_count} device operation(s) outstanding")]
    ResourceBusy { device_use_count: u32 },

    /// A mapping was requested while the device is using the resource, or
    /// device use was requested while a mapping is open. The two contend for
    /// the resource's single exclusive section.
    #[error("mapping conflicts with concurrent access to the resource")]
    MappingConflict,

    /// `unused_by_device` was called without a matching prior
    /// `used_by_device`. This is a programming-error class: the use count is
    /// left untouched, but callers should treat it as fatal.
    #[error("unused_by_device called without a matching used_by_device")]
    UseWithoutAcquire,

    /// The underlying device allocator refused the backing during bind. The
    /// resource's state is rolled back fully; no partial bind is observable.
    #[error("device backing exhausted: requested {requested} bytes, {available} available")]
    DeviceBackingExhausted { requested: u64, available: u64 },
}
