//! NATS connection manager and durable subscription for the host catalog bus.
//!
//! Wraps `async-nats` behind `Arc<RwLock<…>>`, matching the teacher's
//! connection-manager shape, but scoped down to what dpinger needs: a single
//! unauthenticated endpoint, a durable pull consumer on the db channel, and a
//! single-choke-point publish path.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream;
use async_nats::jetstream::consumer::{AckPolicy, pull};
use dpinger_config::NatsConfig;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::error::{InventoryError, InventoryResult};
use crate::subjects::{Channel, SubjectResolver};

/// durable consumer ack-wait, per §4.7 / §6.
const ACK_WAIT: Duration = Duration::from_secs(300);
/// durable consumer max in-flight messages, per §4.7 / §6.
const MAX_INFLIGHT: i64 = 200;
const DURABLE_NAME: &str = "dpinger-db";

/// connection state observable by consumers for degraded-mode checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
}

struct ClientInner {
    nats_client: Option<async_nats::Client>,
    state: ConnectionState,
}

/// NATS connection manager for the host catalog bus (C7).
#[derive(Clone)]
pub struct NatsClient {
    inner: Arc<RwLock<ClientInner>>,
    resolver: SubjectResolver,
    url: String,
    // single choke point so `async_nats::Client::publish` is never invoked
    // re-entrantly from two tasks racing on the same connection handle
    // (grounded in the original's `SendLock`).
    publish_mutex: Arc<Mutex<()>>,
}

impl NatsClient {
    /// create a new client from the `[nats]` config table, without connecting yet.
    pub fn new(config: &NatsConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ClientInner {
                nats_client: None,
                state: ConnectionState::Disconnected,
            })),
            resolver: SubjectResolver::from_config(config),
            url: config.url.clone(),
            publish_mutex: Arc::new(Mutex::new(())),
        }
    }

    /// establish the NATS connection.
    pub async fn connect(&self) -> InventoryResult<()> {
        {
            let inner = self.inner.read().await;
            if inner.state == ConnectionState::Connected {
                debug!("NATS client already connected, skipping connect");
                return Ok(());
            }
        }

        info!(url = %self.url, "connecting to NATS");
        {
            let mut inner = self.inner.write().await;
            inner.state = ConnectionState::Reconnecting;
        }

        let client = async_nats::connect(&self.url).await.map_err(|e| {
            error!(error = %e, "NATS connection failed");
            InventoryError::Transport(format!("connect to '{}' failed: {e}", self.url))
        })?;

        let mut inner = self.inner.write().await;
        inner.nats_client = Some(client);
        inner.state = ConnectionState::Connected;
        info!("NATS connection established");
        Ok(())
    }

    pub async fn connection_state(&self) -> ConnectionState {
        let inner = self.inner.read().await;
        if let Some(client) = &inner.nats_client {
            match client.connection_state() {
                async_nats::connection::State::Connected => ConnectionState::Connected,
                async_nats::connection::State::Disconnected
                | async_nats::connection::State::Pending => ConnectionState::Reconnecting,
            }
        } else {
            inner.state
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state().await == ConnectionState::Connected
    }

    async fn nats_client(&self) -> InventoryResult<async_nats::Client> {
        let inner = self.inner.read().await;
        inner
            .nats_client
            .clone()
            .ok_or_else(|| InventoryError::NotConnected("NATS client not connected".into()))
    }

    /// publish to `channel`, serializing concurrent publishes through one mutex (§4.7).
    pub async fn publish(&self, channel: Channel, payload: Vec<u8>) -> InventoryResult<()> {
        let client = self.nats_client().await?;
        let subject = self.resolver.resolve(channel).to_string();
        let _guard = self.publish_mutex.lock().await;
        client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| InventoryError::Transport(format!("publish to '{subject}' failed: {e}")))?;
        Ok(())
    }

    /// create (or reuse) a durable pull consumer on the db channel and return
    /// its message stream. Each yielded message carries its own `ack()` (§4.7).
    pub async fn subscribe_db(&self) -> InventoryResult<pull::Stream> {
        let client = self.nats_client().await?;
        let js = jetstream::new(client);
        let subject = self.resolver.resolve(Channel::Db).to_string();
        let stream_name = subject.replace('.', "_");

        let stream = js
            .get_or_create_stream(jetstream::stream::Config {
                name: stream_name,
                subjects: vec![subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| InventoryError::Transport(format!("stream setup on '{subject}' failed: {e}")))?;

        let consumer = stream
            .get_or_create_consumer(
                DURABLE_NAME,
                pull::Config {
                    durable_name: Some(DURABLE_NAME.to_string()),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: ACK_WAIT,
                    max_ack_pending: MAX_INFLIGHT,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| InventoryError::Transport(format!("consumer setup failed: {e}")))?;

        consumer
            .messages()
            .await
            .map_err(|e| InventoryError::Transport(format!("failed to open message stream: {e}")))
    }

    pub async fn disconnect(&self) {
        let mut inner = self.inner.write().await;
        inner.nats_client = None;
        inner.state = ConnectionState::Disconnected;
        info!("NATS client disconnected");
    }
}

impl std::fmt::Debug for NatsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NatsConfig {
        NatsConfig {
            url: "nats://127.0.0.1:4222".into(),
            db_chan: "dpinger.db".into(),
            ping_chan: "dpinger.ping".into(),
        }
    }

    #[tokio::test]
    async fn initial_state_is_disconnected() {
        let client = NatsClient::new(&test_config());
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn publish_without_connection_fails() {
        let client = NatsClient::new(&test_config());
        let result = client.publish(Channel::Ping, b"hello".to_vec()).await;
        assert!(matches!(result, Err(InventoryError::NotConnected(_))));
    }

    #[tokio::test]
    async fn disconnect_resets_state() {
        let client = NatsClient::new(&test_config());
        client.disconnect().await;
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }
}
