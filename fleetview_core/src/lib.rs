//! FleetView Core - Live Driver-Position Synchronization
//!
//! This library implements the client side of a live fleet-tracking
//! protocol:
//! 1. **Position Publisher**: samples the device location stream and
//!    forwards each valid fix over the channel, tagged with a stable id
//! 2. **Fleet Reconciler**: folds inbound position events into a
//!    consistent fleet snapshot and a minimal place/move/remove diff
//!    for the map widget
//! 3. **Tracking Session**: owns both plus the channel lifecycle on a
//!    single-task event loop

pub mod publisher;
pub mod reconciler;
pub mod sample;
pub mod session;
pub mod wire;

// Re-export key types for convenience
pub use publisher::{
    CancelHandle, Fix, LocationSource, LocationWatch, PositionPublisher, SensorError, WatchOptions,
};
pub use reconciler::{render, FleetReconciler, MapWidget, ReconcilerConfig, RenderOp};
pub use sample::PositionSample;
pub use session::{IdentityPolicy, SessionConfig, TrackingSession};
pub use wire::{FleetUpdate, WireError, WireMode, DRIVER_LOCATION, DRIVER_UPDATE};
