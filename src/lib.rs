/*! bytes_and_backings is the resource-locality and device-binding core of a
graphics middleware stack.

It answers one question for every buffer and texture: *where do the bytes
live right now, and who is allowed to touch them?* A resource's bytes can be
host-resident, device-resident, both, or host-until-first-bind; this crate
governs the transitions between those placements, serializes CPU-side mapped
access against in-flight device use, and keeps per-device counters of live
objects and bytes.

# Locality model

| Locality        | Host copy             | Device copy     | Bind             | Unbind                      |
|-----------------|-----------------------|-----------------|------------------|-----------------------------|
| `HostOnly`      | always                | never           | error            | error                       |
| `DeviceOnly`    | never                 | after bind      | once, idempotent | error (no host fallback)    |
| `HostAndDevice` | always, authoritative | while bound     | idempotent       | idempotent                  |
| `HostOrDevice`  | while unbound         | while bound     | drops host copy  | copies device bytes to host |

The `HostOrDevice` unbind copy-back is mandatory: it is the only place
content could silently be lost, so the core performs it rather than leaving
it to callers.

# Exclusion model

Each resource owns one exclusive section. It is held for the whole half-open
interval between the device-use count going 0→1 and returning 1→0, and for
the lifetime of any [`resources::MappedRegion`]. Mapping while the device is
using the resource blocks (or fails, for the `try`/timeout forms); marking a
resource used by the device while a mapping is open fails. Exclusion is at
resource granularity, not byte-range granularity: two non-overlapping mip
levels of the same resource still serialize.

# Accounting

Every device context owns a [`ledger::MemoryLedger`]: host/device byte and
object tallies split by resource class, updated only by the resources that
own the corresponding footprint. Counter underflow is a core bug and aborts
rather than continuing with corrupted accounting.

The underlying device allocator is an opaque capability behind the traits in
[`imp`]; the crate ships a heap-simulated software device (feature
`backend_software`, on by default) for tests and as a reference backend.

*/

pub mod device;
pub mod imp;
pub mod ledger;
pub mod resources;
