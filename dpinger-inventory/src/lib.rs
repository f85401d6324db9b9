//! # dpinger-inventory
//!
//! Host catalog, reconciliation and per-host probing for dpinger.
//!
//! This crate provides:
//! - **Typed models** for the host catalog's bus payloads (snapshot, update,
//!   probe result).
//! - **Host registry** (C4): a concurrent map from host id to owned record,
//!   each record carrying its own lock and its own prober handle.
//! - **Prober** (C3): the periodic-timer + cancellation-token state machine
//!   driving one host's measurement cycle.
//! - **Reconciler** (C5) and **decoder** (C6): turn inbound bus messages into
//!   registry mutations and (re)scheduled probers.
//! - **Bus client** (C7): a durable JetStream pull consumer on the db channel
//!   and a single-choke-point publish path on the ping channel.
//!
//! ## Design Principles
//!
//! - Small, testable APIs that avoid leaking NATS transport details into callers.
//! - No hard-coded subject strings in runtime paths.
//! - Decode and classification failures are logged and dropped, never propagated.

pub mod client;
pub mod decoder;
pub mod error;
pub mod models;
pub mod prober;
pub mod reconciler;
pub mod registry;
pub mod subjects;

pub use client::{ConnectionState, NatsClient};
pub use decoder::decode_and_reconcile;
pub use error::{InventoryError, InventoryResult};
pub use models::{sync_request, Envelope, HostSpec, InboundMessage, ProbeResult};
pub use prober::schedule_ping;
pub use reconciler::Reconciler;
pub use registry::{HostRecord, HostRegistry, ProberHandle};
pub use subjects::{Channel, SubjectResolver};
