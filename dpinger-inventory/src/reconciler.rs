//! Applies inbound snapshot/update messages to the host registry (C5).

use std::sync::Arc;

use dpinger_icmp::IcmpEngine;
use tracing::debug;

use crate::client::NatsClient;
use crate::models::{HostSpec, InboundMessage};
use crate::prober::schedule_ping;
use crate::registry::{HostRecord, HostRegistry};

/// owns the context needed to turn an [`InboundMessage`] into registry
/// mutations and prober (re)scheduling.
pub struct Reconciler {
    engine: Arc<IcmpEngine>,
    registry: Arc<HostRegistry>,
    bus: NatsClient,
    probes: u32,
    default_ping_interval_sec: u32,
}

impl Reconciler {
    pub fn new(
        engine: Arc<IcmpEngine>,
        registry: Arc<HostRegistry>,
        bus: NatsClient,
        probes: u32,
        default_ping_interval_sec: u32,
    ) -> Self {
        Self {
            engine,
            registry,
            bus,
            probes,
            default_ping_interval_sec,
        }
    }

    pub fn apply(&self, message: InboundMessage) {
        match message {
            InboundMessage::Snapshot { objects } => self.apply_snapshot(objects),
            InboundMessage::Update { objects } => self.apply_update(objects),
        }
    }

    /// the authority asserts the set of valid hosts equals `objects` exactly:
    /// anything tracked but absent here is torn down first, then every listed
    /// host is added or updated (§4.5 "Snapshot message").
    fn apply_snapshot(&self, objects: Vec<HostSpec>) {
        let wanted: std::collections::HashSet<i64> = objects.iter().map(|spec| spec.id).collect();
        for id in self.registry.ids() {
            if !wanted.contains(&id) {
                self.registry.delete(id);
            }
        }
        for spec in &objects {
            self.add_or_update(spec);
        }
        debug!(count = objects.len(), "applied snapshot");
    }

    /// incremental: only hosts named in the message are touched (§4.5 "Update message").
    fn apply_update(&self, objects: Vec<HostSpec>) {
        for spec in &objects {
            if spec.removed {
                // missing records are a silent no-op
                self.registry.delete(spec.id);
                continue;
            }
            self.add_or_update(spec);
        }
        debug!(count = objects.len(), "applied update");
    }

    fn add_or_update(&self, spec: &HostSpec) {
        // the config's default-ping-interval-sec substitutes for an omitted
        // interval (represented as 0 on the wire) before the spec is ever
        // compared against or written into a record, so re-applying the same
        // spec on the update path can never see the raw 0 and think the
        // interval changed (§4.5 "Idempotence").
        let interval = if spec.ping_interval == 0 {
            self.default_ping_interval_sec
        } else {
            spec.ping_interval
        };
        let normalized = if interval == spec.ping_interval {
            None
        } else {
            Some(HostSpec {
                ping_interval: interval,
                ..spec.clone()
            })
        };
        let spec = normalized.as_ref().unwrap_or(spec);

        match self.registry.load(spec.id) {
            None => {
                let record = Arc::new(HostRecord::new(spec.id, spec.address.clone(), interval, spec.alive));
                self.registry.store(record.clone());
                self.arm(record);
                debug!(host_id = spec.id, "host added");
            }
            Some(record) => {
                let interval_changed = record.apply_spec(spec);
                if interval_changed {
                    self.arm(record);
                    debug!(host_id = spec.id, "ping interval changed, prober rescheduled");
                }
            }
        }
    }

    fn arm(&self, record: Arc<HostRecord>) {
        schedule_ping(
            self.engine.clone(),
            self.registry.clone(),
            self.bus.clone(),
            self.probes,
            record,
        );
    }
}
