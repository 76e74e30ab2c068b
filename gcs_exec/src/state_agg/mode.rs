//! Flight modes reported by and sent to the flight stack

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Flight mode of the vehicle.
///
/// Any mode string the ground station doesn't know is decoded as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightMode {
    Stabilize,
    Guided,
    Auto,
    Rtl,
    Land,
    Loiter,
    #[serde(rename = "POSHOLD")]
    PosHold,
    AltHold,
    Unknown,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FlightMode {
    /// Decode a mode string from the flight stack.
    pub fn decode(mode: &str) -> Self {
        match mode.trim() {
            "STABILIZE" => FlightMode::Stabilize,
            "GUIDED" => FlightMode::Guided,
            "AUTO" => FlightMode::Auto,
            "RTL" => FlightMode::Rtl,
            "LAND" => FlightMode::Land,
            "LOITER" => FlightMode::Loiter,
            "POSHOLD" => FlightMode::PosHold,
            "ALT_HOLD" => FlightMode::AltHold,
            _ => FlightMode::Unknown,
        }
    }

    /// The mode string understood by the flight stack.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightMode::Stabilize => "STABILIZE",
            FlightMode::Guided => "GUIDED",
            FlightMode::Auto => "AUTO",
            FlightMode::Rtl => "RTL",
            FlightMode::Land => "LAND",
            FlightMode::Loiter => "LOITER",
            FlightMode::PosHold => "POSHOLD",
            FlightMode::AltHold => "ALT_HOLD",
            FlightMode::Unknown => "UNKNOWN",
        }
    }
}

impl Default for FlightMode {
    fn default() -> Self {
        FlightMode::Unknown
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode() {
        assert_eq!(FlightMode::decode("GUIDED"), FlightMode::Guided);
        assert_eq!(FlightMode::decode("ALT_HOLD"), FlightMode::AltHold);
        assert_eq!(FlightMode::decode("BOGUS_MODE"), FlightMode::Unknown);
        assert_eq!(FlightMode::decode(""), FlightMode::Unknown);
        assert_eq!(FlightMode::decode("guided"), FlightMode::Unknown);
    }

    #[test]
    fn test_wire_names_round_trip() {
        let modes = [
            FlightMode::Stabilize,
            FlightMode::Guided,
            FlightMode::Auto,
            FlightMode::Rtl,
            FlightMode::Land,
            FlightMode::Loiter,
            FlightMode::PosHold,
            FlightMode::AltHold,
        ];

        for mode in modes.iter() {
            assert_eq!(FlightMode::decode(mode.as_str()), *mode);
            assert_eq!(
                serde_json::to_value(mode).unwrap(),
                serde_json::json!(mode.as_str())
            );
        }
    }
}
