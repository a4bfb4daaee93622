// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The locality legality table.

Every bind/unbind consults this table before touching device state. The
variants are exhaustive on purpose; a new placement strategy is a semantic
change, not a data change.
*/

/// Where a resource's bytes are allowed to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locality {
    /// Host memory only. Never bindable to a device.
    HostOnly,
    /// Device memory only. No host copy ever exists, so the resource can
    /// never be mapped for CPU access and never unbound.
    DeviceOnly,
    /// A host copy persists for the resource's whole life; a device copy is
    /// attached and detached around it. The host copy is authoritative.
    HostAndDevice,
    /// Host-resident until first bind, then device-resident. The two are
    /// mutually exclusive at any instant; unbinding copies the device bytes
    /// back to a fresh host allocation.
    HostOrDevice,
}

impl Locality {
    /// May a resource in this locality acquire a device backing?
    pub fn can_bind(self) -> bool {
        !matches!(self, Locality::HostOnly)
    }

    /// May a resource in this locality release its device backing?
    ///
    /// `DeviceOnly` has no host fallback to return to, so unbinding it is a
    /// programming error rather than a no-op.
    pub fn can_unbind(self) -> bool {
        matches!(self, Locality::HostAndDevice | Locality::HostOrDevice)
    }

    /// Is a host copy present for this locality, given the bind sub-state?
    pub fn host_resident(self, bound: bool) -> bool {
        match self {
            Locality::HostOnly | Locality::HostAndDevice => true,
            Locality::DeviceOnly => false,
            Locality::HostOrDevice => !bound,
        }
    }

    /// Is a device copy present for this locality, given the bind sub-state?
    pub fn device_resident(self, bound: bool) -> bool {
        match self {
            Locality::HostOnly => false,
            Locality::DeviceOnly | Locality::HostAndDevice | Locality::HostOrDevice => bound,
        }
    }

    /// Can the host side of this resource be mapped for CPU access, given
    /// the bind sub-state? Mapping requires an actual host allocation.
    pub(crate) fn mappable(self, bound: bool) -> bool {
        self.host_resident(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::Locality;

    #[test]
    fn host_only_never_binds() {
        assert!(!Locality::HostOnly.can_bind());
        assert!(!Locality::HostOnly.can_unbind());
    }

    #[test]
    fn device_only_binds_but_never_unbinds() {
        assert!(Locality::DeviceOnly.can_bind());
        assert!(!Locality::DeviceOnly.can_unbind());
    }

    #[test]
    fn dual_residency_is_symmetric() {
        for l in [Locality::HostAndDevice, Locality::HostOrDevice] {
            assert!(l.can_bind());
            assert!(l.can_unbind());
        }
    }

    #[test]
    fn host_or_device_is_exclusive_per_substate() {
        let l = Locality::HostOrDevice;
        assert!(l.host_resident(false) && !l.device_resident(false));
        assert!(!l.host_resident(true) && l.device_resident(true));
    }

    #[test]
    fn device_only_is_never_mappable() {
        assert!(!Locality::DeviceOnly.mappable(false));
        assert!(!Locality::DeviceOnly.mappable(true));
    }
}
