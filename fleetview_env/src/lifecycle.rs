//! Scoped ownership of an open channel.

use crate::channel::EventChannel;
use std::ops::Deref;
use std::sync::Arc;

/// RAII guard tying a channel's lifetime to its owning session.
///
/// The channel is closed on every exit path of the owner's active
/// lifetime - normal teardown, early return, panic unwind - because
/// `Drop` calls `close()`. One guard is created per session activation;
/// re-activation wraps a freshly constructed channel, never reuses the
/// old one.
///
/// This replaces the process-wide mutable socket reference pattern:
/// ownership is explicit and there is exactly one close path.
pub struct ChannelGuard<Ch: EventChannel> {
    channel: Arc<Ch>,
}

impl<Ch: EventChannel> ChannelGuard<Ch> {
    /// Takes ownership of a freshly opened channel.
    pub fn new(channel: Ch) -> Self {
        Self {
            channel: Arc::new(channel),
        }
    }

    /// Returns a shared handle to the guarded channel.
    ///
    /// Handles may outlive the guard (e.g. held by a spawned publisher
    /// task), but once the guard drops the channel is closed and every
    /// handle observes `Closed`/`None`.
    pub fn handle(&self) -> Arc<Ch> {
        self.channel.clone()
    }

    /// Closes the channel now instead of waiting for drop.
    pub fn shutdown(&self) {
        self.channel.close();
    }
}

impl<Ch: EventChannel> Deref for ChannelGuard<Ch> {
    type Target = Ch;

    fn deref(&self) -> &Ch {
        &self.channel
    }
}

impl<Ch: EventChannel> Drop for ChannelGuard<Ch> {
    fn drop(&mut self) {
        self.channel.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{loopback_pair, ChannelConfig};

    #[tokio::test]
    async fn test_drop_closes_channel() {
        let (a, _b) = loopback_pair(ChannelConfig::new("loopback://test"));
        let guard = ChannelGuard::new(a);
        let handle = guard.handle();

        assert!(!handle.is_closed());
        drop(guard);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_explicit_shutdown() {
        let (a, _b) = loopback_pair(ChannelConfig::new("loopback://test"));
        let guard = ChannelGuard::new(a);

        guard.shutdown();
        assert!(guard.is_closed());
    }
}
