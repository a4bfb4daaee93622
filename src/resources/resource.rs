// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! The resource entity and its bind/unbind protocol.

A resource owns its locality, an optional host copy of its bytes, an
optional opaque device backing, and the exclusive section that serializes
CPU mapping against device use. Every transition reports its footprint to
the owning device's ledger.
*/

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::device::BoundDevice;
use crate::imp::DeviceBacking;
use crate::resources::tracking::UseState;
use crate::resources::{
    Locality, MapAccess, MappedRegion, ResourceError, ResourceKind, ResourceView, SharingToken,
};

/// Texture dimensions: a full mip/face/depth addressing space.
///
/// Buffers do not carry an extent; they are a single subresource addressed
/// by byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub faces: u32,
    pub levels: u32,
}

impl Extent {
    pub fn d2(width: u32, height: u32) -> Self {
        assert!(width > 0 && height > 0, "degenerate extent");
        Extent {
            width,
            height,
            depth: 1,
            faces: 1,
            levels: 1,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        assert!(depth > 0, "degenerate extent");
        self.depth = depth;
        self
    }

    pub fn with_faces(mut self, faces: u32) -> Self {
        assert!(faces > 0, "degenerate extent");
        self.faces = faces;
        self
    }

    pub fn with_levels(mut self, levels: u32) -> Self {
        assert!(levels > 0, "degenerate extent");
        self.levels = levels;
        self
    }

    /// Dimensions of one mip level, halving and clamping at 1.
    pub fn level_dims(&self, level: u32) -> (u32, u32, u32) {
        fn halve(v: u32, level: u32) -> u32 {
            v.checked_shr(level).unwrap_or(0).max(1)
        }
        (
            halve(self.width, level),
            halve(self.height, level),
            halve(self.depth, level),
        )
    }

    pub fn subresource_count(&self) -> u32 {
        self.faces * self.levels
    }

    fn subresource_sizes(&self, texel_bytes: u32) -> Vec<u64> {
        let mut sizes = Vec::with_capacity(self.subresource_count() as usize);
        for _face in 0..self.faces {
            for level in 0..self.levels {
                let (w, h, d) = self.level_dims(level);
                sizes.push(w as u64 * h as u64 * d as u64 * texel_bytes as u64);
            }
        }
        sizes
    }
}

/// Result of a bind/unbind/reset request that succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The transition was performed.
    Applied,
    /// The resource was already in the requested state; nothing was
    /// allocated or released.
    AlreadyInState,
}

/// How long a map open is willing to contend for the exclusive section.
#[derive(Debug, Clone, Copy)]
enum MapWait {
    Block,
    Try,
    Timeout(Duration),
}

pub(crate) struct Inner {
    pub(crate) uses: UseState,
    host: Option<Vec<Vec<u8>>>,
    /// Initial content for device-resident localities, carried until first
    /// bind seeds the backing with it. Not host residency for the ledger.
    staging: Option<Vec<Vec<u8>>>,
    backing: Option<Box<dyn DeviceBacking>>,
    device: Option<Arc<BoundDevice>>,
    counted_host: bool,
    counted_device: bool,
}

pub(crate) struct Shared {
    kind: ResourceKind,
    locality: Locality,
    byte_size: u64,
    subresource_sizes: Vec<u64>,
    extent: Option<Extent>,
    sharing: SharingToken,
    debug_name: String,
    state: Mutex<Inner>,
    /// Signalled when the exclusive section frees up (device-use count hits
    /// zero or a mapping closes).
    idle: Condvar,
}

impl Shared {
    pub(crate) fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.state.lock().expect("resource state poisoned")
    }

    /// Reconciles ledger entries with actual residency. The device reference
    /// recorded at bind time guarantees every increment is matched by a
    /// decrement on the same ledger.
    fn sync_ledger(&self, inner: &mut Inner) {
        let Some(device) = inner.device.clone() else {
            return;
        };
        let ledger = device.ledger();
        let host_now = inner.host.is_some();
        if host_now != inner.counted_host {
            if host_now {
                ledger.add_host_usage(self.kind, self.byte_size);
            } else {
                ledger.remove_host_usage(self.kind, self.byte_size);
            }
            inner.counted_host = host_now;
        }
        let device_now = inner.backing.is_some();
        if device_now != inner.counted_device {
            if device_now {
                ledger.add_device_usage(self.kind, self.byte_size);
            } else {
                ledger.remove_device_usage(self.kind, self.byte_size);
            }
            inner.counted_device = device_now;
        }
    }

    pub(crate) fn begin_device_use(&self) -> Result<(), ResourceError> {
        self.lock().uses.begin_device_use()
    }

    pub(crate) fn end_device_use(&self) -> Result<(), ResourceError> {
        let became_idle = self.lock().uses.end_device_use()?;
        if became_idle {
            self.idle.notify_all();
        }
        Ok(())
    }

    /// Called exactly once per open region, from the region guard's drop.
    pub(crate) fn close_region(&self, subresource: usize, bytes: Vec<u8>, write_back: bool) {
        // Regions can be dropped during unwinding; recover the lock rather
        // than wedging the section.
        let mut inner = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if write_back {
            if let Some(host) = inner.host.as_mut() {
                host[subresource] = bytes;
            }
        }
        inner.uses.end_map();
        self.idle.notify_all();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = match self.state.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(backing) = inner.backing.take() {
            if let Some(device) = &inner.device {
                device
                    .layer()
                    .release_backing(backing, self.sharing.may_destroy_backing());
            }
        }
        if let Some(device) = &inner.device {
            let ledger = device.ledger();
            if inner.counted_host {
                ledger.remove_host_usage(self.kind, self.byte_size);
            }
            if inner.counted_device {
                ledger.remove_device_usage(self.kind, self.byte_size);
            }
        }
    }
}

/// A graphics resource: bytes with a locality, an optional device backing,
/// and one exclusive section.
///
/// Handles are cheap to clone and share one underlying resource; the
/// resource is destroyed (releasing backings and balancing the ledger) when
/// the last handle, view, or region drops.
pub struct Resource {
    shared: Arc<Shared>,
}

impl Resource {
    fn with_content(
        kind: ResourceKind,
        locality: Locality,
        subresource_sizes: Vec<u64>,
        extent: Option<Extent>,
        content: Vec<Vec<u8>>,
        debug_name: &str,
    ) -> Self {
        let byte_size: u64 = subresource_sizes.iter().sum();
        assert_ne!(byte_size, 0, "zero-sized resources are not allowed");
        let (host, staging) = if locality.host_resident(false) {
            (Some(content), None)
        } else {
            (None, Some(content))
        };
        Resource {
            shared: Arc::new(Shared {
                kind,
                locality,
                byte_size,
                subresource_sizes,
                extent,
                sharing: SharingToken::process_local(),
                debug_name: debug_name.to_string(),
                state: Mutex::new(Inner {
                    uses: UseState::default(),
                    host,
                    staging,
                    backing: None,
                    device: None,
                    counted_host: false,
                    counted_device: false,
                }),
                idle: Condvar::new(),
            }),
        }
    }

    /// A zero-initialized buffer, unbound.
    pub fn buffer(byte_size: u64, locality: Locality, debug_name: &str) -> Self {
        Self::with_content(
            ResourceKind::Buffer,
            locality,
            vec![byte_size],
            None,
            vec![vec![0u8; byte_size as usize]],
            debug_name,
        )
    }

    /// A buffer seeded with `data`, unbound.
    pub fn buffer_with_data(data: &[u8], locality: Locality, debug_name: &str) -> Self {
        Self::with_content(
            ResourceKind::Buffer,
            locality,
            vec![data.len() as u64],
            None,
            vec![data.to_vec()],
            debug_name,
        )
    }

    /// A zero-initialized texture, unbound. `texel_bytes` is the byte width
    /// of one texel in whatever format the surrounding layer catalogs.
    pub fn texture(extent: Extent, texel_bytes: u32, locality: Locality, debug_name: &str) -> Self {
        let sizes = extent.subresource_sizes(texel_bytes);
        let content = sizes.iter().map(|s| vec![0u8; *s as usize]).collect();
        Self::with_content(
            ResourceKind::Texture,
            locality,
            sizes,
            Some(extent),
            content,
            debug_name,
        )
    }

    /// A texture seeded with one byte vector per subresource (face-major,
    /// level-minor), unbound.
    pub fn texture_with_data(
        extent: Extent,
        texel_bytes: u32,
        locality: Locality,
        data: Vec<Vec<u8>>,
        debug_name: &str,
    ) -> Self {
        let sizes = extent.subresource_sizes(texel_bytes);
        assert_eq!(
            data.len(),
            sizes.len(),
            "content must cover every subresource"
        );
        for (i, (sub, size)) in data.iter().zip(&sizes).enumerate() {
            assert_eq!(
                sub.len() as u64,
                *size,
                "content size mismatch for subresource {i}"
            );
        }
        Self::with_content(
            ResourceKind::Texture,
            locality,
            sizes,
            Some(extent),
            data,
            debug_name,
        )
    }

    /// Wraps an externally obtained, possibly cross-process device backing.
    ///
    /// The resource is `DeviceOnly`; with a non-owning token, releasing it
    /// detaches the local view without destroying the backing.
    pub fn from_shared_backing(
        device: &Arc<BoundDevice>,
        kind: ResourceKind,
        backing: Box<dyn DeviceBacking>,
        sharing: SharingToken,
        debug_name: &str,
    ) -> Self {
        assert!(
            sharing.is_shared(),
            "shared backing requires a shared identity"
        );
        let byte_size = backing.byte_size();
        assert_ne!(byte_size, 0, "zero-sized resources are not allowed");
        logwise::info_sync!(
            "attaching shared backing for {name}",
            name = logwise::privacy::LogIt(debug_name)
        );
        let shared = Arc::new(Shared {
            kind,
            locality: Locality::DeviceOnly,
            byte_size,
            subresource_sizes: vec![byte_size],
            extent: None,
            sharing,
            debug_name: debug_name.to_string(),
            state: Mutex::new(Inner {
                uses: UseState::default(),
                host: None,
                staging: None,
                backing: Some(backing),
                device: Some(device.clone()),
                counted_host: false,
                counted_device: false,
            }),
            idle: Condvar::new(),
        });
        {
            let mut inner = shared.lock();
            shared.sync_ledger(&mut inner);
        }
        Resource { shared }
    }

    /// Attaches a device backing sized to the resource.
    ///
    /// Idempotent when already bound. On allocation failure the resource is
    /// left exactly as it was: fully bound or fully unbound, never partial.
    pub fn bind_to_device(&self, device: &Arc<BoundDevice>) -> Result<Transition, ResourceError> {
        let sh = &*self.shared;
        let mut inner = sh.lock();
        if !sh.locality.can_bind() {
            logwise::trace_sync!(
                "refusing bind of {name} in locality {locality}",
                name = logwise::privacy::LogIt(&sh.debug_name),
                locality = logwise::privacy::LogIt(&sh.locality)
            );
            return Err(ResourceError::IllegalLocalityTransition {
                locality: sh.locality,
                operation: "bind_to_device",
            });
        }
        if inner.uses.is_mapped() {
            return Err(ResourceError::MappingConflict);
        }
        if inner.backing.is_some() {
            return Ok(Transition::AlreadyInState);
        }
        let initial = inner.staging.as_deref().or(inner.host.as_deref());
        let backing = device
            .layer()
            .acquire_backing(sh.kind, &sh.subresource_sizes, initial)
            .map_err(|e| ResourceError::DeviceBackingExhausted {
                requested: e.requested,
                available: e.available,
            })?;
        // Nothing below can fail; the bind is now fully observable.
        // Rebinding to a different device moves any host accounting off the
        // old ledger first, so every increment stays paired with a decrement
        // on the same ledger.
        if let Some(old) = &inner.device {
            if !Arc::ptr_eq(old, device) && inner.counted_host {
                old.ledger().remove_host_usage(sh.kind, sh.byte_size);
                inner.counted_host = false;
            }
        }
        inner.backing = Some(backing);
        inner.device = Some(device.clone());
        inner.staging = None;
        if !sh.locality.host_resident(true) {
            inner.host = None;
        }
        sh.sync_ledger(&mut inner);
        logwise::info_sync!(
            "bound {name}: {bytes} bytes device-resident",
            name = logwise::privacy::LogIt(&sh.debug_name),
            bytes = sh.byte_size
        );
        Ok(Transition::Applied)
    }

    /// Releases the device backing.
    ///
    /// For `HostOrDevice`, device bytes are first copied back to a fresh
    /// host allocation; skipping that copy is the one place content could
    /// silently be lost, so it is not optional. Fails while device
    /// operations are outstanding or a mapping is open.
    pub fn unbind_from_device(&self) -> Result<Transition, ResourceError> {
        let sh = &*self.shared;
        let mut inner = sh.lock();
        if !sh.locality.can_unbind() {
            return Err(ResourceError::IllegalLocalityTransition {
                locality: sh.locality,
                operation: "unbind_from_device",
            });
        }
        if inner.uses.is_mapped() {
            return Err(ResourceError::MappingConflict);
        }
        if inner.uses.device_uses() > 0 {
            return Err(ResourceError::ResourceBusy {
                device_use_count: inner.uses.device_uses(),
            });
        }
        let Some(backing) = inner.backing.take() else {
            return Ok(Transition::AlreadyInState);
        };
        if sh.locality == Locality::HostOrDevice {
            inner.host = Some(backing.copy_to_host());
        }
        let device = inner.device.as_ref().expect("backing without device");
        device
            .layer()
            .release_backing(backing, sh.sharing.may_destroy_backing());
        sh.sync_ledger(&mut inner);
        logwise::info_sync!(
            "unbound {name}: {bytes} bytes released",
            name = logwise::privacy::LogIt(&sh.debug_name),
            bytes = sh.byte_size
        );
        Ok(Transition::Applied)
    }

    /// Pulls current device bytes to host and releases the backing so the
    /// device can be reset (device-loss recovery).
    ///
    /// Illegal for `DeviceOnly` (no host fallback exists) and for resources
    /// attached to an identity some other process owns.
    pub fn prepare_for_device_reset(&self) -> Result<Transition, ResourceError> {
        let sh = &*self.shared;
        if sh.locality == Locality::DeviceOnly || !sh.sharing.may_destroy_backing() {
            return Err(ResourceError::IllegalLocalityTransition {
                locality: sh.locality,
                operation: "prepare_for_device_reset",
            });
        }
        let mut inner = sh.lock();
        if inner.uses.is_mapped() {
            return Err(ResourceError::MappingConflict);
        }
        if inner.uses.device_uses() > 0 {
            return Err(ResourceError::ResourceBusy {
                device_use_count: inner.uses.device_uses(),
            });
        }
        let Some(backing) = inner.backing.take() else {
            return Ok(Transition::AlreadyInState);
        };
        // The device copy is the freshest at reset time; it replaces any
        // host copy wholesale.
        inner.host = Some(backing.copy_to_host());
        let device = inner.device.as_ref().expect("backing without device");
        device.layer().release_backing(backing, true);
        sh.sync_ledger(&mut inner);
        Ok(Transition::Applied)
    }

    /// Opens an exclusive mapped region over one (level, face) subresource,
    /// blocking while the device is using the resource or another region is
    /// open.
    pub fn map(
        &self,
        level: u32,
        face: u32,
        access: MapAccess,
    ) -> Result<MappedRegion, ResourceError> {
        self.map_with(level, face, access, MapWait::Block)
    }

    /// Like [`Resource::map`] but fails immediately with
    /// [`ResourceError::MappingConflict`] instead of blocking.
    pub fn try_map(
        &self,
        level: u32,
        face: u32,
        access: MapAccess,
    ) -> Result<MappedRegion, ResourceError> {
        self.map_with(level, face, access, MapWait::Try)
    }

    /// Like [`Resource::map`] but gives up after `timeout`, avoiding an
    /// unbounded stall when device work is queued but not yet retired.
    pub fn map_timeout(
        &self,
        level: u32,
        face: u32,
        access: MapAccess,
        timeout: Duration,
    ) -> Result<MappedRegion, ResourceError> {
        self.map_with(level, face, access, MapWait::Timeout(timeout))
    }

    fn map_with(
        &self,
        level: u32,
        face: u32,
        access: MapAccess,
        wait: MapWait,
    ) -> Result<MappedRegion, ResourceError> {
        let sh = &*self.shared;
        let subresource = match &sh.extent {
            Some(extent) => {
                assert!(
                    level < extent.levels && face < extent.faces,
                    "subresource (level {level}, face {face}) out of range"
                );
                (face * extent.levels + level) as usize
            }
            None => {
                assert!(
                    level == 0 && face == 0,
                    "buffers have a single subresource"
                );
                0
            }
        };

        let mut inner = sh.lock();
        let illegal = |sh: &Shared| ResourceError::IllegalLocalityTransition {
            locality: sh.locality,
            operation: "map",
        };
        // Locality legality first: no host bytes exist to expose while the
        // resource is device-resident-only.
        if !sh.locality.mappable(inner.backing.is_some()) {
            return Err(illegal(sh));
        }
        match wait {
            MapWait::Try => {
                if !inner.uses.can_map() {
                    logwise::trace_sync!(
                        "map of {name} denied: section contended",
                        name = logwise::privacy::LogIt(&sh.debug_name)
                    );
                    return Err(ResourceError::MappingConflict);
                }
            }
            MapWait::Block => {
                while !inner.uses.can_map() {
                    inner = sh.idle.wait(inner).expect("resource state poisoned");
                }
            }
            MapWait::Timeout(timeout) => {
                let (guard, result) = sh
                    .idle
                    .wait_timeout_while(inner, timeout, |i| !i.uses.can_map())
                    .expect("resource state poisoned");
                inner = guard;
                if result.timed_out() {
                    return Err(ResourceError::MappingConflict);
                }
            }
        }
        // Bound-ness may have changed while waiting.
        if !sh.locality.mappable(inner.backing.is_some()) {
            return Err(illegal(sh));
        }
        inner
            .uses
            .begin_map()
            .expect("section free but begin_map failed");
        let size = sh.subresource_sizes[subresource] as usize;
        let bytes = match access {
            MapAccess::WriteOnly => vec![0u8; size],
            MapAccess::ReadOnly | MapAccess::ReadWrite => {
                let host = inner.host.as_ref().expect("mappable without host bytes");
                host[subresource].clone()
            }
        };
        drop(inner);

        let (width, height, depth) = match &sh.extent {
            Some(extent) => extent.level_dims(level),
            // Reported width saturates for buffers too large to describe in
            // one dimension; the byte slice itself is never truncated.
            None => (u32::try_from(size).unwrap_or(u32::MAX), 1, 1),
        };
        Ok(MappedRegion::new(
            self.shared.clone(),
            bytes,
            access,
            level,
            face,
            (width, height, depth),
            subresource,
        ))
    }

    /// Creates a view for the device to consume. The view keeps the
    /// resource alive and aggregates its device use into the resource's
    /// use count.
    ///
    /// Views are counted on the ledger of the device the resource is
    /// associated with at creation time. A view created before the first
    /// bind appears in no ledger, even after the resource later binds.
    pub fn create_view(&self) -> ResourceView {
        let counted_on = {
            let inner = self.shared.lock();
            inner.device.clone()
        };
        if let Some(device) = &counted_on {
            device.ledger().add_view(self.shared.kind);
        }
        ResourceView::new(self.shared.clone(), counted_on)
    }

    pub fn kind(&self) -> ResourceKind {
        self.shared.kind
    }

    pub fn locality(&self) -> Locality {
        self.shared.locality
    }

    pub fn byte_size(&self) -> u64 {
        self.shared.byte_size
    }

    pub fn extent(&self) -> Option<Extent> {
        self.shared.extent
    }

    pub fn sharing(&self) -> SharingToken {
        self.shared.sharing
    }

    pub fn debug_name(&self) -> &str {
        &self.shared.debug_name
    }

    pub fn is_bound_to_device(&self) -> bool {
        self.shared.lock().backing.is_some()
    }

    pub fn is_mapped(&self) -> bool {
        self.shared.lock().uses.is_mapped()
    }

    /// Outstanding device operations across all views.
    pub fn device_use_count(&self) -> u32 {
        self.shared.lock().uses.device_uses()
    }

    /// The device this resource last bound to, if any.
    pub fn device(&self) -> Option<Arc<BoundDevice>> {
        self.shared.lock().device.clone()
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Resource { shared }
    }
}

impl Clone for Resource {
    fn clone(&self) -> Self {
        Resource {
            shared: self.shared.clone(),
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("debug_name", &self.shared.debug_name)
            .field("kind", &self.shared.kind)
            .field("locality", &self.shared.locality)
            .field("byte_size", &self.shared.byte_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Extent;

    #[test]
    fn mip_dims_halve_and_clamp() {
        let e = Extent::d2(16, 4).with_levels(5);
        assert_eq!(e.level_dims(0), (16, 4, 1));
        assert_eq!(e.level_dims(2), (4, 1, 1));
        assert_eq!(e.level_dims(4), (1, 1, 1));
    }

    #[test]
    fn deep_mip_chains_clamp_instead_of_overflowing() {
        let e = Extent::d2(8, 8).with_levels(40);
        assert_eq!(e.level_dims(39), (1, 1, 1));
        let sizes = e.subresource_sizes(4);
        assert_eq!(sizes.len(), 40);
        assert_eq!(sizes[39], 4);
    }

    #[test]
    fn subresource_sizes_are_face_major() {
        let e = Extent::d2(4, 4).with_levels(2).with_faces(2);
        let sizes = e.subresource_sizes(1);
        // face 0: 4x4, 2x2; face 1: 4x4, 2x2
        assert_eq!(sizes, vec![16, 4, 16, 4]);
        assert_eq!(e.subresource_count(), 4);
    }
}
