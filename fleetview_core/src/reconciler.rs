//! The Fleet Reconciler - inbound half of the protocol.
//!
//! Folds the stream of `driver:update` messages into:
//! 1. The fleet snapshot: latest known position per driver, unique keys
//! 2. A minimal render diff: exactly the place/move/remove operations
//!    the map widget needs, no more, no fewer
//!
//! The widget owns drawing; the reconciler only says *what* exists.

use crate::sample::PositionSample;
use crate::wire::{FleetUpdate, WireMode};
use fleetview_env::DriverId;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Configuration for the FleetReconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Wire shape of this deployment's `driver:update` messages
    pub mode: WireMode,

    /// Evict a driver after no update for this long (default: None).
    ///
    /// Only deltas refresh liveness, so this matters for delta-mode
    /// deployments: with `None`, drivers persist until an explicit
    /// removal, which leaks entries across long sessions with a
    /// churning fleet.
    pub stale_after: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            mode: WireMode::Snapshot,
            stale_after: None,
        }
    }
}

/// One operation of the render diff handed to the map widget.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOp {
    /// Draw or move the marker for this driver
    PlaceOrMove { id: DriverId, lat: f64, lng: f64 },

    /// Delete the marker for this driver
    Remove { id: DriverId },
}

/// The rendering collaborator.
///
/// Implementations own the drawable resources (markers, icons, camera);
/// the reconciler only references them by driver id.
pub trait MapWidget: Send {
    /// Draws the marker for `id` at the given position, or moves it if
    /// it already exists.
    fn place_or_move(&mut self, id: &DriverId, lat: f64, lng: f64);

    /// Removes the marker for `id`. Never called for an id without a
    /// live marker.
    fn remove(&mut self, id: &DriverId);
}

/// Applies a render diff to a widget, in order.
pub fn render(ops: &[RenderOp], widget: &mut dyn MapWidget) {
    for op in ops {
        match op {
            RenderOp::PlaceOrMove { id, lat, lng } => widget.place_or_move(id, *lat, *lng),
            RenderOp::Remove { id } => widget.remove(id),
        }
    }
}

/// Maintains the authoritative set of currently-known remote drivers.
///
/// Mutated only by its owner's event handler, one message at a time;
/// each `apply` completes (diff included) before the next message is
/// processed, so the widget never observes an intermediate state.
pub struct FleetReconciler {
    config: ReconcilerConfig,

    /// Latest known position per driver
    fleet: HashMap<DriverId, (f64, f64)>,

    /// Monotonic time of each driver's last liveness-proving update
    last_seen: HashMap<DriverId, Duration>,
}

impl FleetReconciler {
    /// Creates a reconciler with the given configuration.
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            fleet: HashMap::new(),
            last_seen: HashMap::new(),
        }
    }

    /// Creates a reconciler with default configuration (snapshot mode,
    /// no staleness eviction).
    pub fn with_defaults() -> Self {
        Self::new(ReconcilerConfig::default())
    }

    /// This deployment's wire mode.
    pub fn mode(&self) -> WireMode {
        self.config.mode
    }

    /// Number of currently-known drivers.
    pub fn len(&self) -> usize {
        self.fleet.len()
    }

    /// Whether no drivers are currently known.
    pub fn is_empty(&self) -> bool {
        self.fleet.is_empty()
    }

    /// Latest known position of a driver, if any.
    pub fn position_of(&self, id: &DriverId) -> Option<(f64, f64)> {
        self.fleet.get(id).copied()
    }

    /// Read-only view of the fleet snapshot.
    pub fn snapshot(&self) -> &HashMap<DriverId, (f64, f64)> {
        &self.fleet
    }

    /// Applies one decoded `driver:update` message.
    ///
    /// `now` is the session's monotonic clock, used for liveness
    /// bookkeeping.
    pub fn apply(&mut self, update: FleetUpdate, now: Duration) -> Vec<RenderOp> {
        match update {
            FleetUpdate::Snapshot(entries) => self.apply_snapshot(entries, now),
            FleetUpdate::Delta(entry) => self.apply_delta(entry, now),
        }
    }

    /// Wholesale replacement: reconciles the previous snapshot against
    /// a complete new fleet state.
    ///
    /// An entry with invalid coordinates neither places nor removes its
    /// marker: the driver's previous position is carried forward
    /// untouched.
    pub fn apply_snapshot(&mut self, entries: Vec<PositionSample>, now: Duration) -> Vec<RenderOp> {
        let mut next: HashMap<DriverId, (f64, f64)> = HashMap::with_capacity(entries.len());
        let mut refreshed: Vec<DriverId> = Vec::with_capacity(entries.len());

        for entry in entries {
            match entry.coords() {
                Some(coords) => {
                    next.insert(entry.entity_id.clone(), coords);
                    refreshed.push(entry.entity_id);
                }
                None => {
                    debug!(driver = %entry.entity_id, "Ignoring entry with invalid coordinates");
                    // Carry the prior position forward unless a valid
                    // entry in this same message already set one;
                    // liveness is not refreshed by an invalid entry
                    if let Some(prior) = self.fleet.get(&entry.entity_id) {
                        next.entry(entry.entity_id).or_insert(*prior);
                    }
                }
            }
        }

        let mut ops = Vec::new();

        // New or moved drivers
        for (id, coords) in &next {
            if self.fleet.get(id) != Some(coords) {
                ops.push(RenderOp::PlaceOrMove {
                    id: id.clone(),
                    lat: coords.0,
                    lng: coords.1,
                });
            }
        }

        // Departed drivers
        for id in self.fleet.keys() {
            if !next.contains_key(id) {
                ops.push(RenderOp::Remove { id: id.clone() });
                self.last_seen.remove(id);
            }
        }

        self.fleet = next;
        for id in refreshed {
            self.last_seen.insert(id, now);
        }

        ops
    }

    /// Upserts one driver's latest sample. No removal ever results;
    /// drivers leave only via explicit removal or staleness eviction.
    pub fn apply_delta(&mut self, entry: PositionSample, now: Duration) -> Vec<RenderOp> {
        let Some(coords) = entry.coords() else {
            debug!(driver = %entry.entity_id, "Ignoring delta with invalid coordinates");
            return Vec::new();
        };

        // An identical update still proves the driver is alive
        self.last_seen.insert(entry.entity_id.clone(), now);

        if self.fleet.get(&entry.entity_id) == Some(&coords) {
            return Vec::new();
        }

        self.fleet.insert(entry.entity_id.clone(), coords);
        vec![RenderOp::PlaceOrMove {
            id: entry.entity_id,
            lat: coords.0,
            lng: coords.1,
        }]
    }

    /// Removes drivers not heard from within `stale_after`.
    ///
    /// No-op when eviction is not configured.
    pub fn evict_stale(&mut self, now: Duration) -> Vec<RenderOp> {
        let Some(ttl) = self.config.stale_after else {
            return Vec::new();
        };

        let expired: Vec<DriverId> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_sub(**seen) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                self.last_seen.remove(&id);
                self.fleet.remove(&id).map(|_| RenderOp::Remove { id })
            })
            .collect()
    }

    /// Drops all state. Called on channel teardown; the next session
    /// starts from an empty snapshot.
    pub fn clear(&mut self) {
        self.fleet.clear();
        self.last_seen.clear();
    }
}
