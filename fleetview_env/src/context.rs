//! Session context trait: the clock abstraction for FleetView components.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// The central interface for time interaction.
///
/// Fix-freshness checks and staleness eviction both compare timestamps,
/// so the protocol crate takes its clock from this trait instead of
/// `Instant::now()` directly.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `std::time::Instant` and `tokio::time`
/// - **Tests**: manual clocks that advance on demand
#[async_trait]
pub trait SessionContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for staleness eviction and duration measurements.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time.
    ///
    /// Used to judge whether a sensor fix is fresh enough to transmit
    /// (fix timestamps are wall-clock, from the device sensor).
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    async fn sleep(&self, duration: Duration);
}
