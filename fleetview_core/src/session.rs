//! Tracking session - top-level composition.
//!
//! Owns the channel lifecycle, the Position Publisher, the Fleet
//! Reconciler, and the map widget, and multiplexes their event sources
//! onto one task:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  TrackingSession                     │
//! │                                                      │
//! │  Location Source ──> Publisher ──> emit ──────┐      │
//! │                                               ▼      │
//! │                                        ChannelGuard  │
//! │                                               │      │
//! │  Map Widget <── Render Diff <── Reconciler <──┘      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! All work runs on a single task: reconciliation of one inbound event
//! completes (render diff included) before the next event is looked at,
//! and nothing here blocks.

use crate::publisher::{
    Fix, LocationSource, LocationWatch, PositionPublisher, SensorError, WatchOptions,
};
use crate::reconciler::{render, FleetReconciler, MapWidget, ReconcilerConfig};
use crate::sample::PositionSample;
use crate::wire::{decode_update, DRIVER_UPDATE};
use fleetview_env::{ChannelGuard, DriverId, EventChannel, SessionContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a session obtains its driver identity.
#[derive(Debug, Clone)]
pub enum IdentityPolicy {
    /// Mint a fresh uuid at session start; a restarted session appears
    /// as a new driver to the fleet
    PerSession,

    /// Use a caller-supplied stable identifier that survives restarts
    External(DriverId),
}

impl IdentityPolicy {
    /// Resolves the identity for a new session.
    pub fn provision(&self) -> DriverId {
        match self {
            Self::PerSession => DriverId::random(),
            Self::External(id) => id.clone(),
        }
    }
}

/// Configuration for a tracking session.
///
/// The transport's own parameters (endpoint, credentials) live in
/// `ChannelConfig` and belong to whoever opens the channel; the session
/// receives the channel already opened.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identity provisioning policy (default: per-session)
    pub identity: IdentityPolicy,

    /// Location sensor subscription parameters
    pub watch: WatchOptions,

    /// Wire mode and staleness policy for the reconciler
    pub reconciler: ReconcilerConfig,

    /// Interval between staleness-eviction sweeps (default: 5s)
    pub eviction_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: IdentityPolicy::PerSession,
            watch: WatchOptions::default(),
            reconciler: ReconcilerConfig::default(),
            eviction_interval: Duration::from_secs(5),
        }
    }
}

/// A live publish-and-reconcile session.
///
/// Generic over the context, channel, and widget implementations, so
/// the same session code runs in production and under test harnesses.
pub struct TrackingSession<Ctx, Ch, W>
where
    Ctx: SessionContext,
    Ch: EventChannel,
    W: MapWidget,
{
    ctx: Arc<Ctx>,
    guard: ChannelGuard<Ch>,
    publisher: PositionPublisher<Ch>,
    reconciler: FleetReconciler,
    widget: W,
    eviction_interval: Duration,
}

impl<Ctx, Ch, W> TrackingSession<Ctx, Ch, W>
where
    Ctx: SessionContext,
    Ch: EventChannel,
    W: MapWidget,
{
    /// Composes a session around a freshly opened channel.
    ///
    /// The channel is owned by this session's guard from here on and
    /// will be closed on every exit path.
    pub fn new(ctx: Arc<Ctx>, channel: Ch, config: SessionConfig, widget: W) -> Self {
        let guard = ChannelGuard::new(channel);
        let driver_id = config.identity.provision();
        let publisher = PositionPublisher::new(driver_id, guard.handle(), config.watch);

        Self {
            ctx,
            guard,
            publisher,
            reconciler: FleetReconciler::new(config.reconciler),
            widget,
            eviction_interval: config.eviction_interval,
        }
    }

    /// This session's driver identity.
    pub fn driver_id(&self) -> &DriverId {
        self.publisher.driver_id()
    }

    /// Shared handle to the session's channel.
    ///
    /// Lets an owner close the channel from outside (ending `run`)
    /// while the session itself is parked in its event loop.
    pub fn channel(&self) -> Arc<Ch> {
        self.guard.handle()
    }

    /// The local driver's most recently published sample ("you are
    /// here" display state).
    pub fn last_sample(&self) -> Option<&PositionSample> {
        self.publisher.last_sample()
    }

    /// Number of remote drivers currently known.
    pub fn fleet_size(&self) -> usize {
        self.reconciler.len()
    }

    /// Runs the session until the channel closes.
    ///
    /// A missing location capability does not end the session: the
    /// publisher stays inert and the session keeps reconciling inbound
    /// updates (viewer-only operation).
    pub async fn run(&mut self, source: &dyn LocationSource) {
        let channel = self.guard.handle();
        let ctx = self.ctx.clone();

        let mut watch = self.publisher.subscribe(source);
        let mut publishing = watch.is_some();

        info!(
            driver = %self.publisher.driver_id(),
            endpoint = channel.endpoint(),
            publishing,
            "Session started"
        );

        let mut next_sweep = ctx.now() + self.eviction_interval;

        loop {
            tokio::select! {
                // Outbound: local sensor fixes. Only the cancel-safe
                // wait races the other arms; the emit happens in the
                // handler and runs to completion, so a fix taken out of
                // the watch is never dropped mid-publish
                item = await_watch(&self.publisher, watch.as_mut()), if publishing => {
                    if !self.publisher.handle_fix(item, ctx.as_ref()).await {
                        debug!("Publisher stopped; continuing as viewer");
                        publishing = false;
                    }
                }

                // Inbound: fleet updates, strictly in arrival order
                event = channel.next_event() => {
                    let Some(event) = event else {
                        break; // channel closed
                    };
                    if event.name != DRIVER_UPDATE {
                        debug!(event = %event.name, "Ignoring unrecognized event");
                        continue;
                    }
                    match decode_update(self.reconciler.mode(), event.payload) {
                        Ok(update) => {
                            let ops = self.reconciler.apply(update, ctx.now());
                            render(&ops, &mut self.widget);
                        }
                        // Whole message dropped; known drivers untouched
                        Err(e) => warn!("Dropping malformed update: {e}"),
                    }
                }

                // Periodic staleness sweep (no-op unless configured).
                // Measured against an absolute deadline: steady traffic
                // on the other arms must not keep resetting the timer
                _ = ctx.sleep(next_sweep.saturating_sub(ctx.now())) => {
                    let ops = self.reconciler.evict_stale(ctx.now());
                    render(&ops, &mut self.widget);
                    next_sweep = ctx.now() + self.eviction_interval;
                }
            }
        }

        self.teardown(watch);
        info!(driver = %self.publisher.driver_id(), "Session ended");
    }

    /// Orderly teardown: stop the sensor, drop the fleet state, close
    /// the channel. The guard also closes the channel on drop, covering
    /// paths that never reach here.
    fn teardown(&mut self, watch: Option<LocationWatch>) {
        if let Some(watch) = watch {
            watch.cancel_handle().cancel();
        }
        self.reconciler.clear();
        self.guard.shutdown();
    }
}

/// Select-arm helper: awaits the next fix when a subscription exists.
async fn await_watch<Ch: EventChannel>(
    publisher: &PositionPublisher<Ch>,
    watch: Option<&mut LocationWatch>,
) -> Option<Result<Fix, SensorError>> {
    match watch {
        Some(watch) => publisher.await_fix(watch).await,
        None => None,
    }
}
