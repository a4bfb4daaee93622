// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The exclusive section: CPU mappings versus device use, across threads.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rand::Rng;

use bytes_and_backings::resources::{Locality, MapAccess, Resource, ResourceError};

#[test]
fn try_map_fails_while_device_is_using() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "contended");
    let view = buffer.create_view();
    view.used_by_device().unwrap();

    assert!(matches!(
        buffer.try_map(0, 0, MapAccess::ReadWrite),
        Err(ResourceError::MappingConflict)
    ));

    view.unused_by_device().unwrap();
    assert!(buffer.try_map(0, 0, MapAccess::ReadWrite).is_ok());
}

#[test]
fn device_use_fails_while_mapped() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "mapped");
    let view = buffer.create_view();
    let region = buffer.map(0, 0, MapAccess::ReadOnly).unwrap();

    assert!(matches!(
        view.used_by_device(),
        Err(ResourceError::MappingConflict)
    ));
    drop(region);
    view.used_by_device().unwrap();
    view.unused_by_device().unwrap();
}

#[test]
fn second_region_conflicts() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "double-map");
    let _region = buffer.map(0, 0, MapAccess::ReadOnly).unwrap();
    assert!(matches!(
        buffer.try_map(0, 0, MapAccess::ReadOnly),
        Err(ResourceError::MappingConflict)
    ));
}

#[test]
fn device_uses_nest() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "nested");
    let view_a = buffer.create_view();
    let view_b = buffer.create_view();
    view_a.used_by_device().unwrap();
    view_b.used_by_device().unwrap();
    view_a.used_by_device().unwrap();
    assert_eq!(buffer.device_use_count(), 3);

    view_a.unused_by_device().unwrap();
    view_b.unused_by_device().unwrap();
    assert!(matches!(
        buffer.try_map(0, 0, MapAccess::ReadOnly),
        Err(ResourceError::MappingConflict)
    ));
    view_a.unused_by_device().unwrap();
    assert!(buffer.try_map(0, 0, MapAccess::ReadOnly).is_ok());
}

#[test]
fn unmatched_release_leaves_counts_intact() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "unmatched");
    let view_a = buffer.create_view();
    let view_b = buffer.create_view();
    view_a.used_by_device().unwrap();

    // view_b never acquired; the release is refused without disturbing
    // view_a's outstanding use.
    assert!(matches!(
        view_b.unused_by_device(),
        Err(ResourceError::UseWithoutAcquire)
    ));
    assert_eq!(buffer.device_use_count(), 1);
    assert!(view_a.is_device_active());

    view_a.unused_by_device().unwrap();
    assert!(matches!(
        view_a.unused_by_device(),
        Err(ResourceError::UseWithoutAcquire)
    ));
    assert_eq!(buffer.device_use_count(), 0);
}

#[test]
fn scope_guard_releases_on_drop() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "scoped");
    let view = buffer.create_view();
    {
        let _guard = view.device_use_scope().unwrap();
        assert_eq!(buffer.device_use_count(), 1);
    }
    assert_eq!(buffer.device_use_count(), 0);
}

#[test]
fn dropped_view_releases_leaked_uses() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "leaky");
    let view = buffer.create_view();
    view.used_by_device().unwrap();
    view.used_by_device().unwrap();
    drop(view);
    assert_eq!(buffer.device_use_count(), 0);
    assert!(buffer.try_map(0, 0, MapAccess::ReadOnly).is_ok());
}

#[test]
fn blocking_map_waits_for_device_idle() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "waited");
    let view = Arc::new(buffer.create_view());
    let acquired = Arc::new(Barrier::new(2));

    let worker = {
        let view = view.clone();
        let acquired = acquired.clone();
        thread::spawn(move || {
            view.used_by_device().unwrap();
            acquired.wait();
            thread::sleep(Duration::from_millis(50));
            view.unused_by_device().unwrap();
        })
    };

    acquired.wait();
    // The device holds the section; this blocks until the worker releases.
    let mut region = buffer.map(0, 0, MapAccess::ReadWrite).unwrap();
    assert_eq!(buffer.device_use_count(), 0);
    region[0] = 1;
    drop(region);
    worker.join().unwrap();
}

#[test]
fn map_timeout_expires_under_contention() {
    let buffer = Resource::buffer(64, Locality::HostAndDevice, "timed");
    let view = buffer.create_view();
    view.used_by_device().unwrap();

    assert!(matches!(
        buffer.map_timeout(0, 0, MapAccess::ReadOnly, Duration::from_millis(10)),
        Err(ResourceError::MappingConflict)
    ));

    view.unused_by_device().unwrap();
    assert!(
        buffer
            .map_timeout(0, 0, MapAccess::ReadOnly, Duration::from_millis(10))
            .is_ok()
    );
}

#[test]
fn randomized_interleaving_settles_idle() {
    let buffer = Resource::buffer(256, Locality::HostAndDevice, "stress");
    let threads = 8;
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let buffer = buffer.clone();
            let start = start.clone();
            thread::spawn(move || {
                let view = buffer.create_view();
                let mut rng = rand::rng();
                start.wait();
                for _ in 0..200 {
                    if rng.random_range(0..2) == 0 {
                        if let Ok(_guard) = view.device_use_scope() {
                            std::hint::spin_loop();
                        }
                    } else if let Ok(mut region) = buffer.try_map(0, 0, MapAccess::ReadWrite) {
                        let i = rng.random_range(0..region.len());
                        region[i] = region[i].wrapping_add(1);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(buffer.device_use_count(), 0);
    assert!(!buffer.is_mapped());
    assert!(buffer.try_map(0, 0, MapAccess::ReadOnly).is_ok());
}

#[test]
fn write_only_region_starts_zeroed_and_writes_back() {
    let data = vec![0xFF; 32];
    let buffer = Resource::buffer_with_data(&data, Locality::HostAndDevice, "overwrite");
    {
        let mut region = buffer.map(0, 0, MapAccess::WriteOnly).unwrap();
        assert!(region.iter().all(|b| *b == 0));
        region[7] = 9;
    }
    let region = buffer.map(0, 0, MapAccess::ReadOnly).unwrap();
    assert_eq!(region[7], 9);
    assert_eq!(region[0], 0);
}

#[test]
fn read_only_region_discards_local_edits() {
    let buffer = Resource::buffer_with_data(&[1, 2, 3, 4], Locality::HostAndDevice, "pristine");
    {
        let region = buffer.map(0, 0, MapAccess::ReadOnly).unwrap();
        assert_eq!(&region[..], &[1, 2, 3, 4]);
    }
    let region = buffer.map(0, 0, MapAccess::ReadOnly).unwrap();
    assert_eq!(&region[..], &[1, 2, 3, 4]);
}
