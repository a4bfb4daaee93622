// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Heap-simulated device.

Backings are plain host allocations with a capacity cap, so allocation
exhaustion and copy-back paths are exercisable without real hardware.
*/

use std::sync::atomic::{AtomicU64, Ordering};

use crate::imp::{BackingError, DeviceBacking, DeviceLayer};
use crate::resources::ResourceKind;

/// A software device with a fixed amount of simulated device memory.
#[derive(Debug)]
pub struct SoftwareDevice {
    capacity: u64,
    used: AtomicU64,
}

impl SoftwareDevice {
    pub fn new(capacity: u64) -> Self {
        SoftwareDevice {
            capacity,
            used: AtomicU64::new(0),
        }
    }

    /// Bytes currently held by live (not destroyed) backings.
    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct SoftwareBacking {
    subresources: Vec<Vec<u8>>,
    total: u64,
}

impl DeviceBacking for SoftwareBacking {
    fn byte_size(&self) -> u64 {
        self.total
    }

    fn copy_to_host(&self) -> Vec<Vec<u8>> {
        self.subresources.clone()
    }
}

impl DeviceLayer for SoftwareDevice {
    fn acquire_backing(
        &self,
        _kind: ResourceKind,
        subresource_sizes: &[u64],
        initial: Option<&[Vec<u8>]>,
    ) -> Result<Box<dyn DeviceBacking>, BackingError> {
        let total: u64 = subresource_sizes.iter().sum();
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(total).filter(|n| *n <= self.capacity)
            })
            .map_err(|used| BackingError {
                requested: total,
                available: self.capacity.saturating_sub(used),
            })?;

        let subresources = match initial {
            Some(content) => {
                assert_eq!(
                    content.len(),
                    subresource_sizes.len(),
                    "initial content must cover every subresource"
                );
                content.to_vec()
            }
            None => subresource_sizes
                .iter()
                .map(|size| vec![0u8; *size as usize])
                .collect(),
        };
        Ok(Box::new(SoftwareBacking {
            subresources,
            total,
        }))
    }

    fn release_backing(&self, backing: Box<dyn DeviceBacking>, destroy: bool) {
        // A non-destroying release detaches the local view; the simulated
        // allocation stays accounted against the device.
        if destroy {
            self.used.fetch_sub(backing.byte_size(), Ordering::AcqRel);
        }
    }

    fn available_device_memory(&self) -> u64 {
        self.capacity
            .saturating_sub(self.used.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_enforced() {
        let device = SoftwareDevice::new(1000);
        let a = device
            .acquire_backing(ResourceKind::Buffer, &[600], None)
            .unwrap();
        let err = device
            .acquire_backing(ResourceKind::Buffer, &[600], None)
            .unwrap_err();
        assert_eq!(err.requested, 600);
        assert_eq!(err.available, 400);
        device.release_backing(a, true);
        assert_eq!(device.available_device_memory(), 1000);
    }

    #[test]
    fn initial_content_round_trips() {
        let device = SoftwareDevice::new(64);
        let backing = device
            .acquire_backing(ResourceKind::Buffer, &[4], Some(&[vec![1, 2, 3, 4]]))
            .unwrap();
        assert_eq!(backing.copy_to_host(), vec![vec![1, 2, 3, 4]]);
    }

    #[test]
    fn detaching_release_keeps_bytes_accounted() {
        let device = SoftwareDevice::new(100);
        let backing = device
            .acquire_backing(ResourceKind::Texture, &[40], None)
            .unwrap();
        device.release_backing(backing, false);
        assert_eq!(device.used_bytes(), 40);
    }
}
