// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The exclusive-section state machine.

Two counted edges contend for one exclusive section per resource: opening a
mapped region, and the device-use count going 0→1. This module holds the
pure transition logic; the owning resource supplies the mutex and condvar
that make it blocking.

The section is deliberately a single mutex plus a small integer guard, not a
recursive lock: reentrancy in the ancestral design was incidental, not
required.
*/

use crate::resources::ResourceError;

/// Who currently holds (or contends for) a resource's exclusive section.
#[derive(Debug, Default)]
pub(crate) struct UseState {
    device_uses: u32,
    mapped: bool,
}

impl UseState {
    /// The device-use count 0→1 edge takes the section; later increments
    /// ride along under it.
    pub fn begin_device_use(&mut self) -> Result<(), ResourceError> {
        if self.mapped {
            return Err(ResourceError::MappingConflict);
        }
        self.device_uses += 1;
        Ok(())
    }

    /// The 1→0 edge releases the section. Returns `true` when the resource
    /// became idle so the owner can wake blocked mappers.
    ///
    /// A decrement without a matching increment leaves the count untouched
    /// and reports `UseWithoutAcquire`.
    pub fn end_device_use(&mut self) -> Result<bool, ResourceError> {
        if self.device_uses == 0 {
            return Err(ResourceError::UseWithoutAcquire);
        }
        self.device_uses -= 1;
        Ok(self.device_uses == 0)
    }

    pub fn device_uses(&self) -> u32 {
        self.device_uses
    }

    /// Whether a map open could take the section right now.
    pub fn can_map(&self) -> bool {
        self.device_uses == 0 && !self.mapped
    }

    pub fn begin_map(&mut self) -> Result<(), ResourceError> {
        if !self.can_map() {
            return Err(ResourceError::MappingConflict);
        }
        self.mapped = true;
        Ok(())
    }

    /// Only the region guard calls this, exactly once per open.
    pub fn end_map(&mut self) {
        assert!(self.mapped, "exclusive section released without being held");
        self.mapped = false;
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

#[cfg(test)]
mod tests {
    use super::UseState;
    use crate::resources::ResourceError;

    #[test]
    fn device_use_counts_edges() {
        let mut s = UseState::default();
        s.begin_device_use().unwrap();
        s.begin_device_use().unwrap();
        assert_eq!(s.device_uses(), 2);
        assert!(!s.end_device_use().unwrap());
        assert!(s.end_device_use().unwrap());
        assert_eq!(s.device_uses(), 0);
    }

    #[test]
    fn release_without_acquire_is_detected() {
        let mut s = UseState::default();
        assert_eq!(s.end_device_use(), Err(ResourceError::UseWithoutAcquire));
        assert_eq!(s.device_uses(), 0);

        // The count survives the misuse unchanged.
        s.begin_device_use().unwrap();
        assert_eq!(s.device_uses(), 1);
    }

    #[test]
    fn map_excludes_device_use_and_vice_versa() {
        let mut s = UseState::default();
        s.begin_map().unwrap();
        assert_eq!(s.begin_device_use(), Err(ResourceError::MappingConflict));
        s.end_map();

        s.begin_device_use().unwrap();
        assert_eq!(s.begin_map(), Err(ResourceError::MappingConflict));
        s.end_device_use().unwrap();
        s.begin_map().unwrap();
    }

    #[test]
    fn double_map_conflicts() {
        let mut s = UseState::default();
        s.begin_map().unwrap();
        assert_eq!(s.begin_map(), Err(ResourceError::MappingConflict));
    }
}
