//! The Position Publisher - outbound half of the protocol.
//!
//! Turns the device location stream into `driver:location` events:
//! 1. Subscribe to the location source (one subscription per publisher)
//! 2. Gate each fix: finite coordinates, fresh enough, within timeout
//! 3. Emit exactly one event per valid fix and cache it for local
//!    "you are here" display
//!
//! Sensor errors are reported to the log, never thrown across the
//! component boundary; an erroring driver simply stops updating until
//! the sensor recovers.

use crate::sample::PositionSample;
use crate::wire::{encode_location, DRIVER_LOCATION};
use fleetview_env::{ChannelError, DriverId, EventChannel, SessionContext};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, warn};

/// Errors produced by a location sensor.
#[derive(Debug, Clone, Error)]
pub enum SensorError {
    /// Location capability absent on this device. Fatal for the
    /// session: reported once, the publisher stays inert.
    #[error("Location sensor unavailable")]
    Unavailable,

    /// No fix arrived within the configured timeout. Transient; the
    /// next fix attempt proceeds independently.
    #[error("No fix within {0:?}")]
    Timeout(Duration),

    /// Transient per-fix sensor failure.
    #[error("Sensor error: {0}")]
    Sensor(String),
}

/// One raw reading from the location sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Fix {
    /// WGS84 latitude in degrees
    pub lat: f64,

    /// WGS84 longitude in degrees
    pub lng: f64,

    /// Estimated accuracy radius in meters, if the sensor reports one
    pub accuracy_m: Option<f64>,

    /// Wall-clock time the fix was taken (sensor clock)
    pub timestamp: SystemTime,
}

/// Sensor subscription parameters.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Prefer GPS over coarse network positioning (default: true)
    pub high_accuracy: bool,

    /// Reject fixes older than this - a fix must be fresh, not replayed
    /// from the sensor cache (default: 5s)
    pub max_sample_age: Duration,

    /// Maximum wait for a fix before logging a timeout (default: 10s).
    /// Tunable: aggressive values starve deployments without a fast
    /// GPS lock.
    pub sample_timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_sample_age: Duration::from_secs(5),
            sample_timeout: Duration::from_secs(10),
        }
    }
}

/// Handle for cancelling an active location subscription.
///
/// Cloneable so the owner can park one copy wherever teardown happens.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent; wakes a pending `next()`.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// An active location subscription: a stream of fix results plus the
/// cancellation flag.
///
/// The cancellation guarantee is enforced here, not in the sensor: once
/// `cancel()` has been requested, `next()` yields `None` even if a fix
/// was already sitting in the queue (the late-callback guard).
pub struct LocationWatch {
    rx: mpsc::Receiver<Result<Fix, SensorError>>,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl LocationWatch {
    /// Creates a watch and the sender half a sensor implementation
    /// feeds.
    pub fn feed(capacity: usize) -> (mpsc::Sender<Result<Fix, SensorError>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let watch = Self {
            rx,
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        };
        (tx, watch)
    }

    /// Returns a handle that cancels this subscription.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: self.cancelled.clone(),
            notify: self.notify.clone(),
        }
    }

    /// Awaits the next fix result.
    ///
    /// # Returns
    /// * `Some(result)` - A fix or a transient sensor error
    /// * `None` - Subscription ended (cancelled, or sensor stream closed)
    pub async fn next(&mut self) -> Option<Result<Fix, SensorError>> {
        // Register for the wakeup before checking the flag: a cancel()
        // landing between the two would otherwise be missed and leave
        // this future parked on the queue
        let cancelled = self.notify.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        if self.cancelled.load(Ordering::SeqCst) {
            return None;
        }

        tokio::select! {
            item = self.rx.recv() => {
                // A fix may have been in flight while cancel() ran;
                // re-check so it is never surfaced
                if self.cancelled.load(Ordering::SeqCst) {
                    None
                } else {
                    item
                }
            }
            _ = &mut cancelled => None,
        }
    }
}

/// Abstraction over the device location sensor.
///
/// # Implementations
///
/// - **Production**: platform geolocation bindings
/// - **Tests/Demo**: simulated random-walk sources
pub trait LocationSource: Send + Sync + 'static {
    /// Starts watching the device position.
    ///
    /// # Returns
    /// * `Ok(watch)` - Subscription established
    /// * `Err(SensorError::Unavailable)` - Capability absent; no retry
    ///   is possible for this session
    fn watch(&self, options: &WatchOptions) -> Result<LocationWatch, SensorError>;
}

/// Publishes the local driver's position over the channel.
///
/// Stateless pass-through aside from the most recent sample, which is
/// cached so the publisher's own UI can show "you are here" without a
/// round trip.
pub struct PositionPublisher<Ch: EventChannel> {
    /// This driver's stable identity
    driver_id: DriverId,

    /// Outbound channel
    channel: Arc<Ch>,

    /// Sensor subscription parameters
    options: WatchOptions,

    /// Most recently published sample (local display state)
    last_sample: Option<PositionSample>,
}

impl<Ch: EventChannel> PositionPublisher<Ch> {
    /// Creates a publisher for the given identity and channel.
    pub fn new(driver_id: DriverId, channel: Arc<Ch>, options: WatchOptions) -> Self {
        Self {
            driver_id,
            channel,
            options,
            last_sample: None,
        }
    }

    /// This publisher's identity.
    pub fn driver_id(&self) -> &DriverId {
        &self.driver_id
    }

    /// The most recently published sample, for local display.
    pub fn last_sample(&self) -> Option<&PositionSample> {
        self.last_sample.as_ref()
    }

    /// Starts the one sensor subscription this publisher owns.
    ///
    /// On `SensorError::Unavailable` the condition is reported once and
    /// `None` is returned; the publisher stays inert for the session.
    pub fn subscribe(&self, source: &dyn LocationSource) -> Option<LocationWatch> {
        match source.watch(&self.options) {
            Ok(watch) => Some(watch),
            Err(e) => {
                error!(driver = %self.driver_id, "Location sensor unavailable: {e}");
                None
            }
        }
    }

    /// Validates one fix and publishes it.
    ///
    /// Gates, in order: finite coordinates, then freshness against
    /// `max_sample_age`. A gated-out fix produces no outbound event.
    ///
    /// # Returns
    /// * `Ok(Some(sample))` - Published
    /// * `Ok(None)` - Dropped (invalid or stale)
    /// * `Err(_)` - Channel refused the event
    pub async fn publish_fix(
        &mut self,
        fix: Fix,
        now: SystemTime,
    ) -> Result<Option<PositionSample>, ChannelError> {
        let sample = PositionSample::new(self.driver_id.clone(), fix.lat, fix.lng);
        if sample.coords().is_none() {
            debug!(driver = %self.driver_id, "Dropping fix with invalid coordinates");
            return Ok(None);
        }

        let age = now.duration_since(fix.timestamp).unwrap_or(Duration::ZERO);
        if age > self.options.max_sample_age {
            debug!(driver = %self.driver_id, ?age, "Dropping stale cached fix");
            return Ok(None);
        }

        self.channel
            .emit(DRIVER_LOCATION, encode_location(&sample))
            .await?;
        self.last_sample = Some(sample.clone());
        Ok(Some(sample))
    }

    /// Awaits the next fix result, bounded by `sample_timeout`.
    ///
    /// Cancel-safe: dropping this future mid-await never consumes a
    /// fix. The caller hands the result to `handle_fix`, which performs
    /// the emit and must run to completion - a fix taken out of the
    /// watch is otherwise lost if the emit suspends and the caller's
    /// select picks another arm.
    pub async fn await_fix(&self, watch: &mut LocationWatch) -> Option<Result<Fix, SensorError>> {
        match tokio::time::timeout(self.options.sample_timeout, watch.next()).await {
            Ok(item) => item,
            Err(_) => Some(Err(SensorError::Timeout(self.options.sample_timeout))),
        }
    }

    /// Validates and publishes one result from `await_fix`.
    ///
    /// # Returns
    /// `false` once the subscription has ended or the channel closed;
    /// `true` means keep pumping (including after transient errors).
    pub async fn handle_fix(
        &mut self,
        item: Option<Result<Fix, SensorError>>,
        ctx: &dyn SessionContext,
    ) -> bool {
        match item {
            None => false,
            Some(Err(e)) => {
                warn!(driver = %self.driver_id, "Transient sensor failure: {e}");
                true
            }
            Some(Ok(fix)) => match self.publish_fix(fix, ctx.system_time()).await {
                Ok(_) => true,
                Err(ChannelError::Closed) => false,
                Err(e) => {
                    warn!(driver = %self.driver_id, "Publish failed: {e}");
                    true
                }
            },
        }
    }

    /// One full pump cycle: await a fix and publish it if valid.
    pub async fn pump(&mut self, watch: &mut LocationWatch, ctx: &dyn SessionContext) -> bool {
        let item = self.await_fix(watch).await;
        self.handle_fix(item, ctx).await
    }

    /// Standalone publish loop: subscribe once, pump until the
    /// subscription is cancelled or the channel closes.
    pub async fn run(&mut self, source: &dyn LocationSource, ctx: &dyn SessionContext) {
        let Some(mut watch) = self.subscribe(source) else {
            return;
        };
        while self.pump(&mut watch, ctx).await {}
        debug!(driver = %self.driver_id, "Publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetview_env::{loopback_pair, ChannelConfig, TokioContext};
    use std::time::SystemTime;

    fn fresh_fix(lat: f64, lng: f64) -> Fix {
        Fix {
            lat,
            lng,
            accuracy_m: Some(5.0),
            timestamp: SystemTime::now(),
        }
    }

    fn publisher() -> (
        PositionPublisher<fleetview_env::LoopbackChannel>,
        fleetview_env::LoopbackChannel,
    ) {
        let (ours, peer) = loopback_pair(ChannelConfig::new("loopback://test"));
        let publisher = PositionPublisher::new(
            DriverId::external("d1"),
            Arc::new(ours),
            WatchOptions::default(),
        );
        (publisher, peer)
    }

    #[tokio::test]
    async fn test_valid_fix_published_and_cached() {
        let (mut publisher, peer) = publisher();

        let published = publisher
            .publish_fix(fresh_fix(47.5, 19.0), SystemTime::now())
            .await
            .unwrap();
        assert!(published.is_some());

        // Local display state updated
        let (lat, lng) = publisher.last_sample().unwrap().coords().unwrap();
        approx::assert_relative_eq!(lat, 47.5);
        approx::assert_relative_eq!(lng, 19.0);

        // Exactly one event on the wire
        let event = peer.next_event().await.unwrap();
        assert_eq!(event.name, DRIVER_LOCATION);
        assert_eq!(event.payload["entityId"], "d1");
        assert_eq!(event.payload["lat"], 47.5);
    }

    #[tokio::test]
    async fn test_nan_fix_dropped() {
        let (mut publisher, peer) = publisher();

        let published = publisher
            .publish_fix(fresh_fix(f64::NAN, 19.0), SystemTime::now())
            .await
            .unwrap();
        assert!(published.is_none());
        assert!(publisher.last_sample().is_none());

        peer.close();
        assert!(peer.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_cached_fix_rejected() {
        let (mut publisher, _peer) = publisher();

        let mut fix = fresh_fix(47.5, 19.0);
        fix.timestamp = SystemTime::now() - Duration::from_secs(60);

        let published = publisher.publish_fix(fix, SystemTime::now()).await.unwrap();
        assert!(published.is_none());
    }

    #[tokio::test]
    async fn test_no_event_after_cancellation() {
        let (mut publisher, peer) = publisher();
        let ctx = TokioContext::new();

        let (tx, mut watch) = LocationWatch::feed(4);
        let cancel = watch.cancel_handle();

        // A fix is already in flight when cancellation is requested
        tx.send(Ok(fresh_fix(47.5, 19.0))).await.unwrap();
        cancel.cancel();

        assert!(watch.next().await.is_none());
        assert!(!publisher.pump(&mut watch, &ctx).await);

        // Nothing was emitted
        peer.close();
        assert!(peer.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_watch() {
        let (_tx, mut watch) = LocationWatch::feed(4);
        let cancel = watch.cancel_handle();

        let waiter = tokio::spawn(async move { watch.next().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_racing_next_still_returns_promptly() {
        // cancel() fires with no controlled ordering against next()'s
        // startup; whatever the interleaving, next() must not stay
        // parked on the queue (the sender is kept alive on purpose)
        for _ in 0..100 {
            let (_tx, mut watch) = LocationWatch::feed(1);
            let cancel = watch.cancel_handle();

            let waiter = tokio::spawn(async move { watch.next().await });
            cancel.cancel();

            let item = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("next() stayed parked after cancel")
                .unwrap();
            assert!(item.is_none());
        }
    }

    #[tokio::test]
    async fn test_transient_sensor_error_keeps_pumping() {
        let (mut publisher, peer) = publisher();
        let ctx = TokioContext::new();

        let (tx, mut watch) = LocationWatch::feed(4);
        tx.send(Err(SensorError::Sensor("glitch".into())))
            .await
            .unwrap();
        tx.send(Ok(fresh_fix(1.0, 2.0))).await.unwrap();

        // Error tick: reported, subscription survives
        assert!(publisher.pump(&mut watch, &ctx).await);
        // Next fix proceeds independently
        assert!(publisher.pump(&mut watch, &ctx).await);

        let event = peer.next_event().await.unwrap();
        assert_eq!(event.payload["lat"], 1.0);
    }

    #[tokio::test]
    async fn test_unavailable_sensor_leaves_publisher_inert() {
        struct NoSensor;
        impl LocationSource for NoSensor {
            fn watch(&self, _options: &WatchOptions) -> Result<LocationWatch, SensorError> {
                Err(SensorError::Unavailable)
            }
        }

        let (mut publisher, peer) = publisher();
        let ctx = TokioContext::new();

        // run() returns without publishing anything
        publisher.run(&NoSensor, &ctx).await;
        assert!(publisher.last_sample().is_none());

        peer.close();
        assert!(peer.next_event().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix_timeout_is_transient() {
        let (mut publisher, _peer) = publisher();
        let ctx = TokioContext::new();

        let (_tx, mut watch) = LocationWatch::feed(4);

        // No fix arrives; the pump reports a timeout and keeps going
        assert!(publisher.pump(&mut watch, &ctx).await);
    }
}
