//! Simulated location sensor for the demo client.

use fleetview_core::{Fix, LocationSource, LocationWatch, SensorError, WatchOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// A random-walk location source.
///
/// Produces one fix per interval, wandering from a starting position.
/// `error_rate` injects transient sensor failures so the demo exercises
/// the publisher's error path; `high_accuracy` only narrows the
/// reported accuracy radius, as a coarse sensor would.
pub struct SimulatedLocationSource {
    /// Starting position (lat, lng)
    pub start: (f64, f64),

    /// Time between fixes (default: 1s)
    pub interval: Duration,

    /// Probability that a tick yields a transient error instead of a
    /// fix (default: 0.0)
    pub error_rate: f64,
}

impl SimulatedLocationSource {
    /// Creates a source wandering from the given position.
    pub fn new(start: (f64, f64)) -> Self {
        Self {
            start,
            interval: Duration::from_secs(1),
            error_rate: 0.0,
        }
    }

    /// Sets the transient-error injection rate.
    pub fn with_error_rate(mut self, rate: f64) -> Self {
        self.error_rate = rate.clamp(0.0, 1.0);
        self
    }
}

impl LocationSource for SimulatedLocationSource {
    fn watch(&self, options: &WatchOptions) -> Result<LocationWatch, SensorError> {
        let (tx, watch) = LocationWatch::feed(16);
        let (mut lat, mut lng) = self.start;
        let interval = self.interval;
        let error_rate = self.error_rate;
        let accuracy = if options.high_accuracy { 5.0 } else { 50.0 };

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            loop {
                tokio::time::sleep(interval).await;

                let reading = if rng.gen_bool(error_rate) {
                    Err(SensorError::Sensor("simulated dropout".to_string()))
                } else {
                    // ~30m steps at the equator
                    lat += rng.gen_range(-0.0003..0.0003);
                    lng += rng.gen_range(-0.0003..0.0003);
                    Ok(Fix {
                        lat,
                        lng,
                        accuracy_m: Some(accuracy),
                        timestamp: SystemTime::now(),
                    })
                };

                // Subscriber gone (cancelled or dropped): stop producing
                if tx.send(reading).await.is_err() {
                    debug!("Simulated sensor stopped");
                    break;
                }
            }
        });

        Ok(watch)
    }
}
