//! The seam between the agent and the cloud connectivity layer.
//!
//! The real transport (MQTT session, topic registration, reconnect/backoff)
//! lives outside this crate; the agent sees it as an async publish surface
//! plus a stream of [`TransportEvent`]s delivered over an mpsc channel.

use async_trait::async_trait;
use thiserror::Error;

/// String-keyed property map, the wire unit of shadow synchronization.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,
    #[error("transport setup failed: {0}")]
    Setup(String),
}

/// Inbound notifications from the cloud link.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// Remote property-set notification (shadow desired-state delta).
    PropertyChanged(PropertyMap),
    /// Raw binary command frame, decoded by the command codec.
    RawData(Vec<u8>),
}

#[async_trait]
pub trait ShadowTransport: Send + Sync {
    async fn connect_async(&self) -> Result<(), TransportError>;

    /// Enqueue a property patch for upstream delivery. Must return once the
    /// patch is handed off; delivery itself is fire-and-forget.
    async fn publish_property(&self, props: PropertyMap) -> Result<(), TransportError>;
}
