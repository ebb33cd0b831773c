//! Position samples and coordinate validation.

use fleetview_env::DriverId;
use serde::{Deserialize, Serialize};

/// One driver's latest known position.
///
/// This is both the outbound wire payload of `driver:location` and the
/// per-entry shape inside `driver:update` messages. Coordinates are
/// optional at the serde level because peers may transmit `null` for a
/// driver without a fix; `coords()` is the gate every consumer goes
/// through before trusting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Stable identifier of the publishing driver
    #[serde(rename = "entityId")]
    pub entity_id: DriverId,

    /// WGS84 latitude in degrees
    pub lat: Option<f64>,

    /// WGS84 longitude in degrees
    pub lng: Option<f64>,
}

impl PositionSample {
    /// Creates a sample with known-good coordinates.
    pub fn new(entity_id: DriverId, lat: f64, lng: f64) -> Self {
        Self {
            entity_id,
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    /// Returns `(lat, lng)` if both are present and finite.
    ///
    /// Samples failing this check are dropped before transmission and
    /// ignored for both placement and removal when reconciling.
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }
}
