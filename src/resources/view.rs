// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Views: the handles device-side consumers hold on a resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::device::BoundDevice;
use crate::resources::ResourceError;
use crate::resources::resource::{Resource, Shared};

/// A device-facing handle on a resource.
///
/// Each view tracks its own acquisitions and aggregates them into the
/// resource's device-use count, so a view cannot release a use some other
/// view acquired. A view keeps its resource alive; dropping it releases any
/// acquisitions still held.
pub struct ResourceView {
    shared: Arc<Shared>,
    /// Acquisitions made through this view and not yet released.
    active: AtomicU32,
    /// The device whose ledger counts this view, pinned at creation.
    counted_on: Option<Arc<BoundDevice>>,
}

impl ResourceView {
    pub(crate) fn new(shared: Arc<Shared>, counted_on: Option<Arc<BoundDevice>>) -> Self {
        ResourceView {
            shared,
            active: AtomicU32::new(0),
            counted_on,
        }
    }

    /// Marks the start of one device operation against the resource.
    ///
    /// Fails with [`ResourceError::MappingConflict`] while a mapped region
    /// is open; otherwise acquisitions nest freely.
    pub fn used_by_device(&self) -> Result<(), ResourceError> {
        self.shared.begin_device_use()?;
        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Marks the end of one device operation previously started through
    /// this view.
    ///
    /// An unmatched release fails with [`ResourceError::UseWithoutAcquire`]
    /// and leaves all counts untouched.
    pub fn unused_by_device(&self) -> Result<(), ResourceError> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| ResourceError::UseWithoutAcquire)?;
        self.shared.end_device_use()
    }

    /// Brackets one device operation in a guard; the use is released when
    /// the guard drops, even on an early return.
    pub fn device_use_scope(&self) -> Result<DeviceUseGuard<'_>, ResourceError> {
        self.used_by_device()?;
        Ok(DeviceUseGuard { view: self })
    }

    /// Whether this view currently holds any device acquisition.
    pub fn is_device_active(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    /// A fresh handle on the viewed resource.
    pub fn resource(&self) -> Resource {
        Resource::from_shared(self.shared.clone())
    }
}

impl Drop for ResourceView {
    fn drop(&mut self) {
        let leaked = self.active.swap(0, Ordering::AcqRel);
        for _ in 0..leaked {
            let _ = self.shared.end_device_use();
        }
        if let Some(device) = &self.counted_on {
            device.ledger().remove_view(self.shared.kind());
        }
    }
}

impl std::fmt::Debug for ResourceView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceView")
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

/// RAII bracket for one device use of a view.
#[derive(Debug)]
pub struct DeviceUseGuard<'a> {
    view: &'a ResourceView,
}

impl Drop for DeviceUseGuard<'_> {
    fn drop(&mut self) {
        // The guard holds exactly one acquisition, so release cannot fail.
        let _ = self.view.unused_by_device();
    }
}
