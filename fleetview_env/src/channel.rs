//! Bidirectional event channel abstraction for FleetView components.

use crate::error::ChannelError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Connection parameters for a channel endpoint.
///
/// Mirrors the two knobs a deployment actually varies: where to connect
/// and whether the handshake carries credentials/cookies.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Target endpoint URL (e.g. `wss://fleet.example.com`)
    pub endpoint: String,

    /// Whether credentials/cookies accompany the handshake
    pub with_credentials: bool,
}

impl ChannelConfig {
    /// Creates a config for the given endpoint, credentials off.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            with_credentials: false,
        }
    }

    /// Enables credentialed handshakes.
    pub fn with_credentials(mut self) -> Self {
        self.with_credentials = true;
        self
    }
}

/// A named event received from the channel.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    /// Wire event name (e.g. `driver:update`)
    pub name: String,

    /// Raw JSON payload; decoding is the protocol layer's job
    pub payload: Value,
}

/// Abstraction for the bidirectional event channel between a FleetView
/// component and its peer.
///
/// # Implementations
///
/// - **Production**: wraps a socket transport with its own
///   reconnection/backoff policy (reconnects are invisible here)
/// - **Tests/Demo**: `LoopbackChannel`, an in-process mpsc pair
///
/// # Event Flow
///
/// ```text
/// Publisher                  Channel                   Peer
///   |                           |                        |
///   |-- emit("driver:location")>|                        |
///   |                           |-- [transport] -------->|
///   |                           |                        |
///   |<------- [transport] ------|<- emit("driver:update")|
///   |   next_event() -> event   |                        |
/// ```
///
/// # Consumption model
///
/// Inbound events are *pulled* via `next_event()` by a single consumer
/// loop per logical session. There is no handler registry, so a
/// transport reconnect cannot double-register handlers; the loop simply
/// keeps pulling.
#[async_trait]
pub trait EventChannel: Send + Sync + 'static {
    /// Emits a named event to the peer.
    ///
    /// # Returns
    /// * `Ok(())` - Event queued for delivery
    /// * `Err(ChannelError::Closed)` - The channel was closed
    ///
    /// # Note
    /// Success does not guarantee delivery - the transport may drop
    /// events while reconnecting.
    async fn emit(&self, event: &str, payload: Value) -> Result<(), ChannelError>;

    /// Receives the next inbound event.
    ///
    /// # Returns
    /// * `Some(event)` - An event arrived
    /// * `None` - The channel was closed
    ///
    /// # Blocking
    /// Suspends until an event arrives or the channel closes. After
    /// `close()`, returns `None` immediately, even if events are still
    /// buffered.
    async fn next_event(&self) -> Option<ChannelEvent>;

    /// Closes the channel.
    ///
    /// Synchronous and idempotent so owners can call it from `Drop`.
    /// Wakes any pending `next_event()`.
    fn close(&self);

    /// Whether `close()` has been called.
    fn is_closed(&self) -> bool;

    /// The endpoint this channel targets.
    fn endpoint(&self) -> &str;
}

/// In-process channel endpoint backed by tokio mpsc queues.
///
/// `loopback_pair` wires two of these together: whatever one end emits,
/// the other end receives. Used by the test suite and the demo relay;
/// a real deployment substitutes a socket-backed implementation.
pub struct LoopbackChannel {
    config: ChannelConfig,

    /// Outbound queue (peer's inbound)
    tx: mpsc::UnboundedSender<ChannelEvent>,

    /// Inbound queue (behind tokio mutex for async recv through &self)
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ChannelEvent>>>,

    /// Set by close(); checked before every emit/recv
    closed: Arc<AtomicBool>,

    /// Wakes a pending next_event() when close() is called
    close_notify: Arc<Notify>,
}

/// Creates a connected pair of loopback endpoints sharing one config.
pub fn loopback_pair(config: ChannelConfig) -> (LoopbackChannel, LoopbackChannel) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();

    let a = LoopbackChannel::from_parts(config.clone(), tx_b, rx_a);
    let b = LoopbackChannel::from_parts(config, tx_a, rx_b);
    (a, b)
}

impl LoopbackChannel {
    fn from_parts(
        config: ChannelConfig,
        tx: mpsc::UnboundedSender<ChannelEvent>,
        rx: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self {
            config,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            closed: Arc::new(AtomicBool::new(false)),
            close_notify: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl EventChannel for LoopbackChannel {
    async fn emit(&self, event: &str, payload: Value) -> Result<(), ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        let evt = ChannelEvent {
            name: event.to_string(),
            payload,
        };

        // Peer dropped its receiver: treat as a closed channel
        self.tx.send(evt).map_err(|_| ChannelError::Closed)
    }

    async fn next_event(&self) -> Option<ChannelEvent> {
        // Register for the close wakeup before checking the flag, so a
        // close() landing between the two cannot be missed
        let closed = self.close_notify.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();

        if self.closed.load(Ordering::SeqCst) {
            return None;
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            event = rx.recv() => {
                // close() may have raced the delivery; honor it
                if self.closed.load(Ordering::SeqCst) {
                    None
                } else {
                    event
                }
            }
            _ = &mut closed => None,
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_notify.notify_waiters();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_loopback_delivery() {
        let (a, b) = loopback_pair(ChannelConfig::new("loopback://test"));

        a.emit("driver:location", json!({"lat": 1.0})).await.unwrap();

        let event = b.next_event().await.unwrap();
        assert_eq!(event.name, "driver:location");
        assert_eq!(event.payload["lat"], 1.0);
    }

    #[tokio::test]
    async fn test_emit_after_close_fails() {
        let (a, _b) = loopback_pair(ChannelConfig::new("loopback://test"));

        a.close();
        let err = a.emit("driver:location", json!({})).await.unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_next_event_none_after_close() {
        let (a, b) = loopback_pair(ChannelConfig::new("loopback://test"));

        // An event is buffered, but close wins: no late delivery
        a.emit("driver:update", json!([])).await.unwrap();
        b.close();
        assert!(b.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receiver() {
        let (_a, b) = loopback_pair(ChannelConfig::new("loopback://test"));
        let b = Arc::new(b);

        let waiter = {
            let b = b.clone();
            tokio::spawn(async move { b.next_event().await })
        };

        // Give the waiter a chance to park in next_event
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        b.close();

        assert!(waiter.await.unwrap().is_none());
    }

    #[test]
    fn test_close_idempotent() {
        let (a, _b) = loopback_pair(ChannelConfig::new("loopback://test"));
        a.close();
        a.close();
        assert!(a.is_closed());
    }

    #[test]
    fn test_config_builder() {
        let config = ChannelConfig::new("wss://fleet.example.com").with_credentials();
        assert!(config.with_credentials);
        assert_eq!(config.endpoint, "wss://fleet.example.com");
    }
}
