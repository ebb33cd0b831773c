//! Wire contract for the driver-position channel.
//!
//! Event names are fixed for compatibility with any peer. Payloads
//! travel as raw JSON through the channel; this module owns the
//! decoding and the malformed-message policy (a message that fails to
//! decode is dropped whole, never partially applied).

use crate::sample::PositionSample;
use serde_json::Value;
use thiserror::Error;

/// Outbound event: one driver's position, published per valid fix.
pub const DRIVER_LOCATION: &str = "driver:location";

/// Inbound event: the peer's view of the fleet (snapshot or delta).
pub const DRIVER_UPDATE: &str = "driver:update";

/// The wire shape used by a deployment for `driver:update` messages.
///
/// One shape per deployment, chosen at configuration time. Messages are
/// never inspected to guess their shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    /// Each message carries the complete current fleet
    Snapshot,

    /// Each message carries one driver's latest sample
    Delta,
}

impl std::str::FromStr for WireMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snapshot" => Ok(Self::Snapshot),
            "delta" => Ok(Self::Delta),
            other => Err(format!("unknown wire mode: {other}")),
        }
    }
}

/// A decoded `driver:update` message.
#[derive(Debug, Clone, PartialEq)]
pub enum FleetUpdate {
    /// Complete current fleet state
    Snapshot(Vec<PositionSample>),

    /// One driver's latest sample
    Delta(PositionSample),
}

/// Errors raised while decoding inbound messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// Message shape does not match the configured wire mode, or
    /// required fields are missing
    #[error("Malformed {event} payload: {reason}")]
    Malformed { event: &'static str, reason: String },
}

impl WireError {
    fn malformed(event: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Malformed {
            event,
            reason: reason.to_string(),
        }
    }
}

/// Encodes an outbound `driver:location` payload.
pub fn encode_location(sample: &PositionSample) -> Value {
    // PositionSample serialization is infallible (strings and floats)
    serde_json::to_value(sample).unwrap_or(Value::Null)
}

/// Decodes a `driver:update` payload according to the deployment's
/// wire mode.
///
/// # Returns
/// * `Ok(update)` - Decoded message
/// * `Err(WireError::Malformed)` - Drop the whole message; unrelated
///   entities must not be affected
pub fn decode_update(mode: WireMode, payload: Value) -> Result<FleetUpdate, WireError> {
    match mode {
        WireMode::Snapshot => {
            let entries: Vec<PositionSample> = serde_json::from_value(payload)
                .map_err(|e| WireError::malformed(DRIVER_UPDATE, e))?;
            Ok(FleetUpdate::Snapshot(entries))
        }
        WireMode::Delta => {
            let entry: PositionSample = serde_json::from_value(payload)
                .map_err(|e| WireError::malformed(DRIVER_UPDATE, e))?;
            Ok(FleetUpdate::Delta(entry))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetview_env::DriverId;
    use serde_json::json;

    #[test]
    fn test_decode_snapshot() {
        let payload = json!([
            {"entityId": "a", "lat": 1.0, "lng": 1.0},
            {"entityId": "b", "lat": 2.0, "lng": 2.0},
        ]);

        let update = decode_update(WireMode::Snapshot, payload).unwrap();
        match update {
            FleetUpdate::Snapshot(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].entity_id, DriverId::external("a"));
            }
            _ => panic!("expected snapshot"),
        }
    }

    #[test]
    fn test_decode_delta() {
        let payload = json!({"entityId": "a", "lat": 5.0, "lng": 5.0});

        let update = decode_update(WireMode::Delta, payload).unwrap();
        assert_eq!(
            update,
            FleetUpdate::Delta(PositionSample::new(DriverId::external("a"), 5.0, 5.0))
        );
    }

    #[test]
    fn test_decode_null_coords_is_not_malformed() {
        // Null coordinates are a valid wire shape; the reconciler
        // ignores them. Only missing fields are malformed.
        let payload = json!({"entityId": "d1", "lat": null, "lng": null});
        let update = decode_update(WireMode::Delta, payload).unwrap();
        match update {
            FleetUpdate::Delta(entry) => assert_eq!(entry.coords(), None),
            _ => panic!("expected delta"),
        }
    }

    #[test]
    fn test_missing_entity_id_is_malformed() {
        let payload = json!({"lat": 1.0, "lng": 1.0});
        assert!(decode_update(WireMode::Delta, payload).is_err());
    }

    #[test]
    fn test_shape_mismatch_is_malformed() {
        // Delta deployment receiving an array: whole message dropped
        let payload = json!([{"entityId": "a", "lat": 1.0, "lng": 1.0}]);
        assert!(decode_update(WireMode::Delta, payload).is_err());

        // Snapshot deployment receiving a lone object likewise
        let payload = json!({"entityId": "a", "lat": 1.0, "lng": 1.0});
        assert!(decode_update(WireMode::Snapshot, payload).is_err());
    }

    #[test]
    fn test_encode_location_roundtrip() {
        let sample = PositionSample::new(DriverId::external("d1"), 47.5, 19.0);
        let value = encode_location(&sample);
        assert_eq!(value["entityId"], "d1");

        let back = decode_update(WireMode::Delta, value).unwrap();
        assert_eq!(back, FleetUpdate::Delta(sample));
    }

    #[test]
    fn test_wire_mode_from_str() {
        assert_eq!("snapshot".parse::<WireMode>().unwrap(), WireMode::Snapshot);
        assert_eq!("delta".parse::<WireMode>().unwrap(), WireMode::Delta);
        assert!("auto".parse::<WireMode>().is_err());
    }
}
