//! # Command Messages
//!
//! Messages published by the ground station to command the vehicle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::telem::{TwistMsg, Vec3Msg};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Ordered list of waypoints making up a mission path, in the world frame.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct WaypointPathMsg {
    pub waypoints: Vec<Vec3Msg>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TwistMsg {
    /// Build a velocity command from linear velocities (m/s) and a yaw rate (rad/s).
    pub fn velocity(x: f64, y: f64, z: f64, yaw_rate: f64) -> Self {
        Self {
            linear: Vec3Msg::new(x, y, z),
            angular: Vec3Msg::new(0.0, 0.0, yaw_rate),
        }
    }
}
