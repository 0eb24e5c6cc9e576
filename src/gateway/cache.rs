//! Read Cache (component J, spec §3 "Read cache").
//!
//! Fronts the relational store for hot read paths (device list/detail,
//! alert rule list, ISP-link status). TTL-bounded, and explicitly
//! invalidated the instant the State Machine records a transition — a
//! stale "up" entry surviving past a down transition is the one failure
//! mode this cache must never have (spec §4.3).

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::types::{Device, DeviceId};

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// A single TTL-bounded keyed cache. `ReadCache` below composes several of
/// these, one per hot read path.
struct TtlMap<K, V> {
    ttl: Duration,
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> TtlMap<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key)?;
        if hit.expires_at <= Instant::now() {
            drop(hit);
            self.entries.remove(key);
            return None;
        }
        Some(hit.value.clone())
    }

    fn put(&self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    fn invalidate_all(&self) {
        self.entries.clear();
    }
}

/// The process-wide read cache. Composes one [`TtlMap`] per hot path named
/// in spec §6's cache TTL table.
pub struct ReadCache {
    device_detail: TtlMap<DeviceId, Device>,
    device_list: TtlMap<(), Vec<Device>>,
    isp_status: TtlMap<DeviceId, bool>,
}

impl ReadCache {
    pub fn new(
        device_detail_ttl: Duration,
        device_list_ttl: Duration,
        isp_status_ttl: Duration,
    ) -> Self {
        Self {
            device_detail: TtlMap::new(device_detail_ttl),
            device_list: TtlMap::new(device_list_ttl),
            isp_status: TtlMap::new(isp_status_ttl),
        }
    }

    pub fn get_device(&self, id: &DeviceId) -> Option<Device> {
        self.device_detail.get(id)
    }

    pub fn put_device(&self, device: Device) {
        self.device_detail.put(device.id.clone(), device);
    }

    pub fn get_device_list(&self) -> Option<Vec<Device>> {
        self.device_list.get(&())
    }

    pub fn put_device_list(&self, devices: Vec<Device>) {
        self.device_list.put((), devices);
    }

    pub fn get_isp_status(&self, id: &DeviceId) -> Option<bool> {
        self.isp_status.get(id)
    }

    pub fn put_isp_status(&self, id: DeviceId, is_up: bool) {
        self.isp_status.put(id, is_up);
    }

    /// Invalidate every cache entry touched by a device-state transition.
    /// Called from the State Machine, never lazily on read (spec §4.3).
    pub fn invalidate_device(&self, id: &DeviceId) {
        self.device_detail.invalidate(id);
        self.isp_status.invalidate(id);
        self.device_list.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlapState, MonitoringMode};

    fn device(id: &str) -> Device {
        Device {
            id: DeviceId::from(id),
            ip: "10.0.0.1".parse().unwrap(),
            display_name: id.to_string(),
            device_type: "router".into(),
            branch: None,
            region: None,
            enabled: true,
            snmp_credential_id: None,
            monitoring_mode: MonitoringMode::Both,
            down_since: None,
            flap_state: FlapState::Stable,
            flap_until: None,
        }
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = ReadCache::new(Duration::from_millis(10), Duration::from_secs(30), Duration::from_secs(30));
        cache.put_device(device("d1"));
        assert!(cache.get_device(&DeviceId::from("d1")).is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get_device(&DeviceId::from("d1")).is_none());
    }

    #[test]
    fn invalidate_device_clears_detail_isp_status_and_list() {
        let cache = ReadCache::new(Duration::from_secs(30), Duration::from_secs(30), Duration::from_secs(30));
        let id = DeviceId::from("d1");
        cache.put_device(device("d1"));
        cache.put_isp_status(id.clone(), true);
        cache.put_device_list(vec![device("d1")]);

        cache.invalidate_device(&id);

        assert!(cache.get_device(&id).is_none());
        assert!(cache.get_isp_status(&id).is_none());
        assert!(cache.get_device_list().is_none());
    }
}
