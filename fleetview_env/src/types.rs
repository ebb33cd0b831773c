//! Common types for the FleetView environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a publishing driver.
///
/// On the wire this is an opaque string, so externally-provisioned ids
/// (badge numbers, vehicle plates) work alongside generated uuids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    /// Creates a fresh random DriverId (uuid v4).
    ///
    /// Used by the per-session identity policy; a new id is minted each
    /// time a publisher session starts.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an externally-provisioned identifier.
    pub fn external(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the wire representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show at most 8 chars for readability in logs. External ids
        // may be non-ASCII, so cut on a char boundary
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        write!(f, "{}", &self.0[..end])
    }
}

impl From<&str> for DriverId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_unique() {
        assert_ne!(DriverId::random(), DriverId::random());
    }

    #[test]
    fn test_external_id_roundtrip() {
        let id = DriverId::external("truck-42");
        assert_eq!(id.as_str(), "truck-42");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"truck-42\"");
        let back: DriverId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_display_truncates() {
        let id = DriverId::external("abcdefghijklmnop");
        assert_eq!(id.to_string(), "abcdefgh");

        let short = DriverId::external("abc");
        assert_eq!(short.to_string(), "abc");
    }

    #[test]
    fn test_display_truncates_multibyte_ids() {
        // Byte 8 falls inside the two-byte 'é'
        let id = DriverId::external("abcdefgé-truck");
        assert_eq!(id.to_string(), "abcdefgé");

        let plates = DriverId::external("北京A-12345");
        assert_eq!(plates.to_string(), "北京A-1234");
    }
}
