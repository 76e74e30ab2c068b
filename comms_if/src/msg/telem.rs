//! # Telemetry Messages
//!
//! Messages published by the bridge describing the vehicle's status, pose and motion.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Timestamp attached to stamped messages.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Default, PartialEq)]
pub struct Stamp {
    pub sec: i64,
    pub nanosec: u32,
}

/// Standard message header.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Header {
    #[serde(default)]
    pub stamp: Stamp,

    /// Name of the frame the message data is expressed in
    #[serde(default)]
    pub frame_id: String,
}

/// Vehicle status flags and flight mode.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StateMsg {
    /// Whether the bridge is connected to the flight controller
    #[serde(default)]
    pub connected: bool,

    pub armed: bool,

    #[serde(default)]
    pub guided: bool,

    #[serde(default)]
    pub manual_input: bool,

    /// Free text flight mode as reported by the flight controller
    pub mode: String,
}

/// Battery status.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BatteryMsg {
    #[serde(default)]
    pub voltage: f64,

    #[serde(default)]
    pub current: f64,

    /// Remaining charge as a fraction between 0 and 1.
    pub percentage: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct Vec3Msg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Quaternion as found on the wire, not guaranteed to be normalised.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct QuatMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PoseMsg {
    /// Position in the world frame, meters
    pub position: Vec3Msg,

    /// Attitude of the body frame in the world frame
    pub orientation: QuatMsg,
}

/// Local position of the vehicle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PoseStampedMsg {
    #[serde(default)]
    pub header: Header,

    pub pose: PoseMsg,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct TwistMsg {
    /// Linear velocity in m/s
    pub linear: Vec3Msg,

    /// Angular velocity in rad/s
    pub angular: Vec3Msg,
}

/// Local velocity of the vehicle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TwistStampedMsg {
    #[serde(default)]
    pub header: Header,

    pub twist: TwistMsg,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Vec3Msg {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True if all components are finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}
