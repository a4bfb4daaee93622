// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Cross-process sharing identity.

A sharing token distinguishes resources local to this process from resources
whose device backing is shared across process boundaries. Identity is fixed
at resource creation and immutable afterwards.
*/

/// Identity and ownership of a (possibly shared) device backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharingToken {
    identity: Option<u128>,
    owning: bool,
}

impl SharingToken {
    /// A process-local, unshared resource. This process owns its backing.
    pub fn process_local() -> Self {
        SharingToken {
            identity: None,
            owning: true,
        }
    }

    /// A shared identity created by this process; teardown of the backing
    /// is this process's responsibility.
    pub fn owned(identity: u128) -> Self {
        assert_ne!(identity, 0, "shared identity must be non-zero");
        SharingToken {
            identity: Some(identity),
            owning: true,
        }
    }

    /// Attached to an identity some other process owns. Releasing the local
    /// resource must never destroy the underlying backing, only the local
    /// view onto it.
    pub fn attached(identity: u128) -> Self {
        assert_ne!(identity, 0, "shared identity must be non-zero");
        SharingToken {
            identity: Some(identity),
            owning: false,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.identity.is_some()
    }

    pub fn identity(&self) -> Option<u128> {
        self.identity
    }

    pub fn is_owning(&self) -> bool {
        self.owning
    }

    /// Whether releasing this resource's backing may destroy it, as opposed
    /// to merely detaching the local view.
    pub(crate) fn may_destroy_backing(&self) -> bool {
        self.owning
    }
}
