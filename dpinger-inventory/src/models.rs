//! Typed models and codecs for the host catalog's bus payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{InventoryError, InventoryResult};

/// full or incremental description of a tracked host, as carried on the wire (§3, §6).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HostSpec {
    pub id: i64,
    pub address: String,
    pub ping_interval: u32,
    pub alive: bool,
    #[serde(default)]
    pub removed: bool,
}

/// authoritative catalog message, decoded from an [`Envelope`]'s payload (§3, §4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Snapshot { objects: Vec<HostSpec> },
    Update { objects: Vec<HostSpec> },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ObjectsPayload {
    objects: Vec<HostSpec>,
}

/// outer bus message, tagged by `type` (§6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub const TYPE_SNAPSHOT: &'static str = "db";
    pub const TYPE_UPDATE: &'static str = "db_update";
    pub const TYPE_SYNC_REQUEST: &'static str = "db_request";

    pub fn decode(bytes: &[u8]) -> InventoryResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| InventoryError::Codec(e.to_string()))
    }

    pub fn encode(&self) -> InventoryResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| InventoryError::Codec(e.to_string()))
    }

    /// classify this envelope into an [`InboundMessage`], or `None` for any type
    /// this prober doesn't act on (C6). Never returns a decode error for an
    /// unrecognized type — only for a recognized type with a malformed payload.
    pub fn classify(&self) -> InventoryResult<Option<InboundMessage>> {
        match self.kind.as_str() {
            Self::TYPE_SNAPSHOT => {
                let objects: ObjectsPayload = serde_json::from_value(self.payload.clone())
                    .map_err(|e| InventoryError::Codec(e.to_string()))?;
                Ok(Some(InboundMessage::Snapshot {
                    objects: objects.objects,
                }))
            }
            Self::TYPE_UPDATE => {
                let objects: ObjectsPayload = serde_json::from_value(self.payload.clone())
                    .map_err(|e| InventoryError::Codec(e.to_string()))?;
                Ok(Some(InboundMessage::Update {
                    objects: objects.objects,
                }))
            }
            other => {
                debug!(kind = other, "unrecognized envelope type, ignoring");
                Ok(None)
            }
        }
    }
}

/// encodes the empty marker message published on startup to request a full
/// catalog snapshot (§4.6 "Outbound").
pub fn sync_request() -> InventoryResult<Vec<u8>> {
    Envelope {
        kind: Envelope::TYPE_SYNC_REQUEST.to_string(),
        payload: serde_json::json!({}),
    }
    .encode()
}

/// summarized reachability figures published per measurement (§3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub host_id: i64,
    pub address: String,
    pub alive: bool,
    pub received: u32,
    pub loss_percent: u32,
    pub min_ms: Option<i64>,
    pub max_ms: Option<i64>,
    pub avg_ms: Option<i64>,
    pub transitioned: bool,
    pub measured_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn encode(&self) -> InventoryResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| InventoryError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_envelope() -> Envelope {
        Envelope {
            kind: "db".into(),
            payload: serde_json::json!({
                "objects": [
                    {"id": 1, "address": "127.0.0.1", "ping_interval": 5, "alive": false, "removed": false}
                ]
            }),
        }
    }

    #[test]
    fn classifies_snapshot() {
        let msg = snapshot_envelope().classify().unwrap().unwrap();
        match msg {
            InboundMessage::Snapshot { objects } => {
                assert_eq!(objects.len(), 1);
                assert_eq!(objects[0].id, 1);
                assert_eq!(objects[0].address, "127.0.0.1");
            }
            _ => panic!("expected snapshot"),
        }
    }

    #[test]
    fn classifies_update() {
        let mut envelope = snapshot_envelope();
        envelope.kind = "db_update".into();
        let msg = envelope.classify().unwrap().unwrap();
        assert!(matches!(msg, InboundMessage::Update { .. }));
    }

    #[test]
    fn ignores_unknown_type() {
        let envelope = Envelope {
            kind: "something_else".into(),
            payload: serde_json::json!({}),
        };
        assert_eq!(envelope.classify().unwrap(), None);
    }

    #[test]
    fn malformed_payload_on_known_type_errors() {
        let envelope = Envelope {
            kind: "db".into(),
            payload: serde_json::json!({"not": "objects"}),
        };
        assert!(envelope.classify().is_err());
    }

    #[test]
    fn host_spec_defaults_removed_to_false() {
        let spec: HostSpec =
            serde_json::from_str(r#"{"id":1,"address":"127.0.0.1","ping_interval":5,"alive":true}"#)
                .unwrap();
        assert!(!spec.removed);
    }

    #[test]
    fn sync_request_is_empty_payload() {
        let bytes = sync_request().unwrap();
        let envelope: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope.kind, "db_request");
        assert_eq!(envelope.payload, serde_json::json!({}));
    }

    #[test]
    fn probe_result_round_trips() {
        let result = ProbeResult {
            host_id: 1,
            address: "127.0.0.1".into(),
            alive: true,
            received: 4,
            loss_percent: 0,
            min_ms: Some(1),
            max_ms: Some(3),
            avg_ms: Some(2),
            transitioned: true,
            measured_at: Utc::now(),
        };
        let bytes = result.encode().unwrap();
        let decoded: ProbeResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, result);
    }
}
