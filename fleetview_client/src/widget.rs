//! Console map widget: renders the fleet as log lines.

use fleetview_core::MapWidget;
use fleetview_env::DriverId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// MapWidget implementation that logs marker operations.
///
/// Cloneable so the demo can keep a handle for its end-of-run summary
/// while the session owns its copy.
#[derive(Clone, Default)]
pub struct ConsoleMapWidget {
    placed: Arc<AtomicUsize>,
    removed: Arc<AtomicUsize>,
}

impl ConsoleMapWidget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total place/move operations rendered.
    pub fn placed(&self) -> usize {
        self.placed.load(Ordering::Relaxed)
    }

    /// Total remove operations rendered.
    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::Relaxed)
    }
}

impl MapWidget for ConsoleMapWidget {
    fn place_or_move(&mut self, id: &DriverId, lat: f64, lng: f64) {
        self.placed.fetch_add(1, Ordering::Relaxed);
        info!(driver = %id, "marker @ ({lat:.5}, {lng:.5})");
    }

    fn remove(&mut self, id: &DriverId) {
        self.removed.fetch_add(1, Ordering::Relaxed);
        info!(driver = %id, "marker removed");
    }
}
