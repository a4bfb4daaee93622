// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Mapped-region guards handed out by [`crate::resources::Resource::map`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::resources::resource::Shared;

/// Access intent declared when opening a mapped region.
///
/// Intent is a contract, not a hint: a `WriteOnly` region starts zeroed
/// rather than carrying current content, and only writable regions copy
/// back on close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl MapAccess {
    pub(crate) fn writable(self) -> bool {
        matches!(self, MapAccess::WriteOnly | MapAccess::ReadWrite)
    }
}

/// An open exclusive window over one subresource's bytes.
///
/// While a region is open the resource admits no device use and no second
/// region. Closing (explicitly or by drop) copies writable bytes back to
/// the resource's host copy and releases the exclusive section; the region
/// cannot outlive that hand-back, so a dangling window is unrepresentable.
pub struct MappedRegion {
    shared: Arc<Shared>,
    bytes: Vec<u8>,
    access: MapAccess,
    level: u32,
    face: u32,
    width: u32,
    height: u32,
    depth: u32,
    subresource: usize,
}

impl MappedRegion {
    pub(crate) fn new(
        shared: Arc<Shared>,
        bytes: Vec<u8>,
        access: MapAccess,
        level: u32,
        face: u32,
        dims: (u32, u32, u32),
        subresource: usize,
    ) -> Self {
        MappedRegion {
            shared,
            bytes,
            access,
            level,
            face,
            width: dims.0,
            height: dims.1,
            depth: dims.2,
            subresource,
        }
    }

    pub fn access(&self) -> MapAccess {
        self.access
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn face(&self) -> u32 {
        self.face
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Closes the region now instead of at end of scope.
    pub fn close(self) {}
}

impl Deref for MappedRegion {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for MappedRegion {
    fn deref_mut(&mut self) -> &mut [u8] {
        assert!(
            self.access.writable(),
            "write through a read-only mapped region"
        );
        &mut self.bytes
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        let bytes = std::mem::take(&mut self.bytes);
        self.shared
            .close_region(self.subresource, bytes, self.access.writable());
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("access", &self.access)
            .field("level", &self.level)
            .field("face", &self.face)
            .field("len", &self.bytes.len())
            .finish()
    }
}
