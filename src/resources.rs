// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Resource lifecycle types: localities, resources, views, mapped regions. */

mod error;
mod locality;
mod mapped;
mod resource;
mod sharing;
mod tracking;
mod view;

pub use error::ResourceError;
pub use locality::Locality;
pub use mapped::{MapAccess, MappedRegion};
pub use resource::{Extent, Resource, Transition};
pub use sharing::SharingToken;
pub use view::{DeviceUseGuard, ResourceView};

/// The resource class, used to partition ledger accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
}
