//! In-process relay hub: the demo's stand-in for the server peer.
//!
//! Collects `driver:location` events from every attached participant
//! and fans the fleet state back out as `driver:update` messages, in
//! whichever wire shape the deployment is configured for. Real
//! deployments replace this with an actual server; the client-side
//! protocol code is identical either way.

use fleetview_core::{PositionSample, WireMode, DRIVER_LOCATION, DRIVER_UPDATE};
use fleetview_env::{DriverId, EventChannel, LoopbackChannel};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Central fan-out hub for loopback participants.
pub struct RelayHub {
    mode: WireMode,

    /// Latest sample per driver, as received
    fleet: HashMap<DriverId, PositionSample>,

    /// All attached peer ends; every one receives each broadcast
    participants: Vec<Arc<LoopbackChannel>>,

    /// Central inbound queue fed by per-participant forwarder tasks
    rx: mpsc::UnboundedReceiver<Value>,
    tx: mpsc::UnboundedSender<Value>,
}

impl RelayHub {
    /// Creates a hub broadcasting in the given wire mode.
    pub fn new(mode: WireMode) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            mode,
            fleet: HashMap::new(),
            participants: Vec::new(),
            rx,
            tx,
        }
    }

    /// Attaches the peer end of a participant's channel.
    ///
    /// Spawns a forwarder pumping the participant's `driver:location`
    /// events into the central queue; the forwarder ends when the
    /// participant's end closes.
    pub fn attach(&mut self, peer: LoopbackChannel) {
        let peer = Arc::new(peer);
        self.participants.push(peer.clone());

        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(event) = peer.next_event().await {
                if event.name != DRIVER_LOCATION {
                    debug!(event = %event.name, "Relay ignoring event");
                    continue;
                }
                if tx.send(event.payload).is_err() {
                    break;
                }
            }
        });
    }

    /// Runs the hub until every participant has disconnected.
    pub async fn run(mut self) {
        // Drop our own sender so rx ends once all forwarders are gone
        drop(self.tx);

        while let Some(payload) = self.rx.recv().await {
            let sample: PositionSample = match serde_json::from_value(payload) {
                Ok(sample) => sample,
                Err(e) => {
                    warn!("Relay dropping malformed location: {e}");
                    continue;
                }
            };

            self.fleet.insert(sample.entity_id.clone(), sample.clone());

            let update = match self.mode {
                WireMode::Snapshot => {
                    serde_json::to_value(self.fleet.values().collect::<Vec<_>>())
                }
                WireMode::Delta => serde_json::to_value(&sample),
            };
            let Ok(update) = update else { continue };

            for participant in &self.participants {
                // Closed participants just error; the rest still get it
                let _ = participant.emit(DRIVER_UPDATE, update.clone()).await;
            }
        }
        debug!("Relay hub stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetview_env::{loopback_pair, ChannelConfig};
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_fanout() {
        let (driver, driver_peer) = loopback_pair(ChannelConfig::new("loopback://relay"));
        let (viewer, viewer_peer) = loopback_pair(ChannelConfig::new("loopback://relay"));

        let mut hub = RelayHub::new(WireMode::Snapshot);
        hub.attach(driver_peer);
        hub.attach(viewer_peer);
        let hub_task = tokio::spawn(hub.run());

        driver
            .emit(
                DRIVER_LOCATION,
                json!({"entityId": "d1", "lat": 1.0, "lng": 2.0}),
            )
            .await
            .unwrap();

        let update = viewer.next_event().await.unwrap();
        assert_eq!(update.name, DRIVER_UPDATE);
        assert_eq!(update.payload[0]["entityId"], "d1");

        // The publishing driver hears its own update too
        let echo = driver.next_event().await.unwrap();
        assert_eq!(echo.name, DRIVER_UPDATE);

        drop(driver);
        drop(viewer);
        hub_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_delta_fanout() {
        let (driver, driver_peer) = loopback_pair(ChannelConfig::new("loopback://relay"));
        let (viewer, viewer_peer) = loopback_pair(ChannelConfig::new("loopback://relay"));

        let mut hub = RelayHub::new(WireMode::Delta);
        hub.attach(driver_peer);
        hub.attach(viewer_peer);
        tokio::spawn(hub.run());

        driver
            .emit(
                DRIVER_LOCATION,
                json!({"entityId": "d1", "lat": 5.0, "lng": 6.0}),
            )
            .await
            .unwrap();

        let update = viewer.next_event().await.unwrap();
        assert_eq!(update.payload["entityId"], "d1");
        assert_eq!(update.payload["lat"], 5.0);
    }
}
