//! Adapter logic between the vote counter store and the streaming broker.
//!
//! - **[`Adapter`]**: Single-owner event loop. Holds the [`Registry`],
//!   the [`DeltaDetector`] cache and the [`PresenceTracker`]; reacts to
//!   broker requests, its two timers and finished store reads.
//!
//! - **[`Reconnector`]**: Owns the broker connection state, retries with
//!   [`BackoffPolicy`], and feeds sessions to the adapter.
//!
//! - **[`BroadcastChannel`]**: Fire-and-forget publishing gated on the
//!   connection state and the registry.
//!
//! - **Seams**: [`CounterStore`], [`Publisher`], [`Acknowledge`] and
//!   [`Connector`], implemented for the `pollcast-api` clients in
//!   [`store`] and [`broker`].
//!
//! [`serve`] wires all of it together.

pub mod adapter;
pub mod broker;
pub mod channel;
pub mod config;
pub mod detector;
pub mod error;
pub mod item;
pub mod presence;
pub mod reconnect;
pub mod registry;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use adapter::{Acknowledge, Adapter, AdapterEvent, CounterStore, Request, serve};
pub use broker::BrokerConnector;
pub use channel::{BroadcastChannel, Publisher};
pub use config::{AdapterConfig, StoreConfig};
pub use detector::{DeltaDetector, ScanPlan};
pub use error::CoreError;
pub use item::{Fields, Item, ItemKind};
pub use pollcast_api::CounterRow;
pub use pollcast_api::broker::SessionConfig;
pub use presence::PresenceTracker;
pub use reconnect::{Backoff, BackoffPolicy, Connection, ConnectionState, Connector, Reconnector};
pub use registry::{Registry, Subscription};
pub use store::store_client;
