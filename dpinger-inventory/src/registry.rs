//! Process-wide host catalog: a concurrent map from host id to owned record (C4).

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::HostSpec;

/// handle to a running per-host prober task; cancelling stops future firings
/// but does not abort a measurement already in flight (§4.3).
#[derive(Debug)]
pub struct ProberHandle {
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

impl ProberHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[derive(Debug)]
struct HostRecordInner {
    address: String,
    ping_interval_sec: u32,
    alive: bool,
    prober: Option<ProberHandle>,
}

/// a tracked host and its mutable state. `host_id` is unique and immutable;
/// every other field lives behind this record's own lock, never held across
/// a call into the ICMP engine (§3, §5).
#[derive(Debug)]
pub struct HostRecord {
    pub host_id: i64,
    inner: Mutex<HostRecordInner>,
}

impl HostRecord {
    pub fn new(host_id: i64, address: String, ping_interval_sec: u32, alive: bool) -> Self {
        Self {
            host_id,
            inner: Mutex::new(HostRecordInner {
                address,
                ping_interval_sec,
                alive,
                prober: None,
            }),
        }
    }

    pub fn address(&self) -> String {
        self.inner.lock().address.clone()
    }

    pub fn alive(&self) -> bool {
        self.inner.lock().alive
    }

    pub fn ping_interval_sec(&self) -> u32 {
        self.inner.lock().ping_interval_sec
    }

    /// sets the liveness flag, returning whether this changed it (a transition).
    pub fn set_alive(&self, alive: bool) -> bool {
        let mut inner = self.inner.lock();
        let transitioned = inner.alive != alive;
        inner.alive = alive;
        transitioned
    }

    /// applies an update-message spec's fields; returns true if
    /// `ping_interval_sec` changed, signalling the caller should reschedule.
    pub fn apply_spec(&self, spec: &HostSpec) -> bool {
        let mut inner = self.inner.lock();
        inner.address = spec.address.clone();
        inner.alive = spec.alive;
        let interval_changed = inner.ping_interval_sec != spec.ping_interval;
        inner.ping_interval_sec = spec.ping_interval;
        interval_changed
    }

    /// installs a new prober handle, cancelling and replacing any existing one.
    pub fn install_prober(&self, prober: ProberHandle) {
        let mut inner = self.inner.lock();
        if let Some(old) = inner.prober.replace(prober) {
            old.cancel();
        }
    }

    pub fn cancel_prober(&self) {
        let mut inner = self.inner.lock();
        if let Some(prober) = inner.prober.take() {
            prober.cancel();
        }
    }
}

/// process-wide concurrent map from `host_id` to owned [`HostRecord`] (C4).
#[derive(Debug, Default)]
pub struct HostRegistry {
    records: DashMap<i64, Arc<HostRecord>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn load(&self, host_id: i64) -> Option<Arc<HostRecord>> {
        self.records.get(&host_id).map(|entry| entry.clone())
    }

    pub fn store(&self, record: Arc<HostRecord>) {
        self.records.insert(record.host_id, record);
    }

    /// cancels the prober *before* removing the record, so the reconciler
    /// never frees a record a timer could still fire against (§4.5 "Ordering").
    pub fn delete(&self, host_id: i64) {
        if let Some(record) = self.load(host_id) {
            record.cancel_prober();
        }
        if self.records.remove(&host_id).is_some() {
            debug!(host_id, "host record removed");
        }
    }

    /// best-effort moment-in-time snapshot of tracked host ids (§4.4 "range").
    pub fn ids(&self) -> HashSet<i64> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_load_round_trips() {
        let registry = HostRegistry::new();
        let record = Arc::new(HostRecord::new(1, "127.0.0.1".into(), 5, false));
        registry.store(record);
        let loaded = registry.load(1).unwrap();
        assert_eq!(loaded.address(), "127.0.0.1");
        assert!(!loaded.alive());
    }

    #[test]
    fn delete_removes_and_is_idempotent() {
        let registry = HostRegistry::new();
        registry.store(Arc::new(HostRecord::new(1, "127.0.0.1".into(), 5, false)));
        registry.delete(1);
        assert!(registry.load(1).is_none());
        registry.delete(1); // no-op, must not panic
        assert!(registry.is_empty());
    }

    #[test]
    fn set_alive_reports_transition_only_on_change() {
        let record = HostRecord::new(1, "127.0.0.1".into(), 5, false);
        assert!(record.set_alive(true));
        assert!(!record.set_alive(true));
        assert!(record.set_alive(false));
    }

    #[test]
    fn apply_spec_reports_interval_change() {
        let record = HostRecord::new(1, "127.0.0.1".into(), 5, false);
        let same = HostSpec {
            id: 1,
            address: "127.0.0.1".into(),
            ping_interval: 5,
            alive: false,
            removed: false,
        };
        assert!(!record.apply_spec(&same));

        let changed = HostSpec {
            ping_interval: 30,
            ..same
        };
        assert!(record.apply_spec(&changed));
        assert_eq!(record.ping_interval_sec(), 30);
    }
}
