//! Vehicle state and telemetry samples

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{UnitQuaternion, Vector2, Vector3};
use serde::Serialize;

use super::FlightMode;
use crate::orient::{self, EulerAngles};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Latest known state of the vehicle, assembled from the telemetry channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleState {
    /// Whether the bridge reports a link to the flight controller
    pub fcu_connected: bool,

    pub armed: bool,

    pub mode: FlightMode,

    /// Battery charge, percent
    pub battery_percent: u8,

    /// Position in the world frame.
    ///
    /// Units: meters
    pub position_m: Vector3<f64>,

    /// Orientation of the body frame in the world frame, always normalised
    pub orientation: UnitQuaternion<f64>,

    /// Linear velocity in the world frame, `None` until the first reading.
    ///
    /// Units: meters/second
    pub velocity_ms: Option<Vector3<f64>>,

    /// Rate of change of the altitude between the last two poses.
    ///
    /// Units: meters/second
    pub vertical_speed_ms: f64,
}

/// Snapshot of the vehicle's motion at the time of a pose update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Time of the pose update
    ///
    /// Units: seconds
    pub timestamp_s: f64,

    pub altitude_m: f64,

    pub velocity_ms: Vector3<f64>,

    pub position_m: Vector2<f64>,

    pub roll: f64,

    pub pitch: f64,

    pub yaw: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehicleState {
    pub fn altitude_m(&self) -> f64 {
        self.position_m.z
    }

    pub fn attitude(&self) -> EulerAngles {
        orient::quat_to_euler(&self.orientation)
    }

    /// Compass heading, degrees clockwise from north.
    pub fn heading_deg(&self) -> f64 {
        orient::compass_heading_deg(self.attitude().yaw)
    }

    /// Compass point nearest to the heading.
    pub fn cardinal(&self) -> &'static str {
        orient::cardinal(self.heading_deg())
    }
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            fcu_connected: false,
            armed: false,
            mode: FlightMode::Unknown,
            battery_percent: 0,
            position_m: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            velocity_ms: None,
            vertical_speed_ms: 0.0,
        }
    }
}

impl TelemetrySample {
    pub fn attitude(&self) -> EulerAngles {
        EulerAngles {
            roll: self.roll,
            pitch: self.pitch,
            yaw: self.yaw,
        }
    }
}
