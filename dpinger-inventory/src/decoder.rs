//! Classifies inbound bus messages and hands them to the reconciler (C6).

use tracing::{debug, warn};

use crate::models::Envelope;
use crate::reconciler::Reconciler;

/// decode a raw bus payload and apply it to `reconciler`. Never propagates an
/// error — a malformed or unrecognized message is logged and dropped so one
/// bad message can never take down the subscription loop (§4.6, §7).
pub fn decode_and_reconcile(reconciler: &Reconciler, payload: &[u8]) {
    let envelope = match Envelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(?err, "failed to decode bus envelope, dropping");
            return;
        }
    };

    match envelope.classify() {
        Ok(Some(message)) => reconciler.apply(message),
        Ok(None) => debug!(kind = %envelope.kind, "ignored message type"),
        Err(err) => warn!(?err, kind = %envelope.kind, "failed to decode message payload, dropping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NatsClient;
    use crate::models::InboundMessage;
    use crate::registry::HostRegistry;
    use dpinger_config::NatsConfig;
    use dpinger_icmp::IcmpEngine;
    use std::sync::Arc;

    fn reconciler() -> (Reconciler, Arc<HostRegistry>) {
        let engine = Arc::new(IcmpEngine::new().expect("icmp socket"));
        let registry = Arc::new(HostRegistry::new());
        let bus = NatsClient::new(&NatsConfig {
            url: "nats://127.0.0.1:4222".into(),
            db_chan: "dpinger.db".into(),
            ping_chan: "dpinger.ping".into(),
        });
        let r = Reconciler::new(engine, registry.clone(), bus, 4, 5);
        (r, registry)
    }

    #[tokio::test]
    async fn garbage_bytes_are_dropped_without_panic() {
        let (r, _registry) = reconciler();
        decode_and_reconcile(&r, b"not json");
    }

    #[tokio::test]
    async fn valid_snapshot_reaches_the_reconciler() {
        let (r, registry) = reconciler();
        let envelope = serde_json::json!({
            "type": "db",
            "payload": { "objects": [
                {"id": 1, "address": "127.0.0.1", "ping_interval": 5, "alive": false, "removed": false}
            ]}
        });
        decode_and_reconcile(&r, serde_json::to_vec(&envelope).unwrap().as_slice());
        assert!(registry.load(1).is_some());
    }

    #[test]
    fn classify_returns_the_same_variant_decode_and_reconcile_would_apply() {
        let envelope = Envelope {
            kind: "db_update".into(),
            payload: serde_json::json!({"objects": []}),
        };
        assert!(matches!(
            envelope.classify().unwrap(),
            Some(InboundMessage::Update { .. })
        ));
    }
}
