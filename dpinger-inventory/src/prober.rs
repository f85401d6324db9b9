//! Per-host prober state machine: periodic timer + cancellation token (C3).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dpinger_icmp::IcmpEngine;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::NatsClient;
use crate::models::ProbeResult;
use crate::registry::{HostRecord, HostRegistry, ProberHandle};
use crate::subjects::Channel;

/// arms a periodic timer for `record.ping_interval_sec()` and installs it as
/// the record's active prober, replacing (and cancelling) any prior one. The
/// `tokio::select!` between the tick and cancellation makes re-arming after a
/// cancel structurally impossible rather than a race to close (§4.3).
pub fn schedule_ping(
    engine: Arc<IcmpEngine>,
    registry: Arc<HostRegistry>,
    bus: NatsClient,
    probes: u32,
    record: Arc<HostRecord>,
) {
    let interval_sec = record.ping_interval_sec().max(1) as u64;
    let host_id = record.host_id;
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_sec));
        // the first tick resolves immediately; consume it so the first
        // measurement happens after one full interval, not at arm time.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    fire(&engine, &registry, &bus, probes, host_id).await;
                }
                _ = task_cancel.cancelled() => {
                    debug!(host_id, "prober cancelled");
                    break;
                }
            }
        }
    });

    record.install_prober(ProberHandle { cancel, task });
}

/// one measurement cycle: snapshot, measure, summarize, publish (§4.3).
async fn fire(engine: &IcmpEngine, registry: &HostRegistry, bus: &NatsClient, probes: u32, host_id: i64) {
    // re-validate existence before acting: a cancelled-but-racing tick must
    // never act on a record the reconciler has already freed (§5 "Ordering
    // guarantees").
    let Some(record) = registry.load(host_id) else {
        debug!(host_id, "record gone before firing, skipping");
        return;
    };

    let address = record.address();

    let measurement = match engine.send_echoes(&address, probes).await {
        Ok(measurement) => measurement,
        Err(err) => {
            warn!(host_id, %address, ?err, "measurement failed");
            return;
        }
    };

    // the record may have been removed while the burst was in flight; its
    // result is discarded rather than published (§4.3, §5 "Cancellation").
    if registry.load(host_id).is_none() {
        debug!(host_id, "record removed during measurement, discarding result");
        return;
    }

    let transitioned = record.set_alive(measurement.alive);
    if transitioned {
        info!(host_id, %address, alive = measurement.alive, "liveness transition");
    }

    let result = ProbeResult {
        host_id,
        address,
        alive: measurement.alive,
        received: measurement.received,
        loss_percent: measurement.loss_percent,
        min_ms: measurement.min_ms,
        max_ms: measurement.max_ms,
        avg_ms: measurement.avg_ms,
        transitioned,
        measured_at: Utc::now(),
    };

    let payload = match result.encode() {
        Ok(payload) => payload,
        Err(err) => {
            warn!(host_id, ?err, "failed to encode probe result");
            return;
        }
    };

    if let Err(err) = bus.publish(Channel::Ping, payload).await {
        warn!(host_id, ?err, "failed to publish probe result");
    }
}
