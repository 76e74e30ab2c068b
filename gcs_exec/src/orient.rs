//! # Orientation Maths
//!
//! Stateless functions on the vehicle's orientation. All angles are in radians unless a name says
//! otherwise, and all frames are ENU (x east, y north, z up) as published by the flight stack.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::msg::telem::QuatMsg;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::Serialize;
use std::f64::consts::PI;

use util::maths::{clamp, get_ang_dist_2pi, rem_euclid};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Quaternions with a norm below this are rejected as they have no meaningful direction.
const MIN_QUAT_NORM: f64 = 1e-6;

/// The 8 compass points, clockwise from north.
const CARDINALS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Roll, pitch and yaw of a rotation, applied in the order yaw, pitch then roll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build a unit quaternion from a wire quaternion, normalising it.
///
/// Returns `None` if any component is not finite or the quaternion is too close to zero to be
/// normalised.
pub fn quat_from_msg(msg: &QuatMsg) -> Option<UnitQuaternion<f64>> {
    let q = Quaternion::new(msg.w, msg.x, msg.y, msg.z);

    if !q.coords.iter().all(|c| c.is_finite()) {
        return None;
    }

    UnitQuaternion::try_new(q, MIN_QUAT_NORM)
}

/// Convert a quaternion into Euler angles.
///
/// The pitch is clamped at +/-90 degrees, where roll and yaw are no longer independent.
pub fn quat_to_euler(q: &UnitQuaternion<f64>) -> EulerAngles {
    // Vector part first, scalar last
    let c = &q.quaternion().coords;
    let (x, y, z, w) = (c[0], c[1], c[2], c[3]);

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = clamp(&(2.0 * (w * y - z * x)), &-1.0, &1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    EulerAngles { roll, pitch, yaw }
}

/// Convert Euler angles into a quaternion.
pub fn euler_to_quat(angles: &EulerAngles) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(angles.roll, angles.pitch, angles.yaw)
}

/// Wrap an angle into `(-pi, pi]`.
pub fn wrap_pi(angle: f64) -> f64 {
    let wrapped = rem_euclid(angle + PI, 2.0 * PI) - PI;

    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Step `current` toward `target` by `rate` of the shortest angular distance between them.
///
/// The result is wrapped into `(-pi, pi]`, so crossing the +/-pi boundary is continuous.
pub fn damp_angle(current: f64, target: f64, rate: f64) -> f64 {
    let rate = clamp(&rate, &0.0, &1.0);

    wrap_pi(current + get_ang_dist_2pi(current, target) * rate)
}

/// Scale a per-frame damping rate to a step of `dt_s` seconds.
///
/// Stepping twice with half the time covers the same angle as stepping once.
pub fn time_scaled_rate(rate: f64, dt_s: f64, frame_period_s: f64) -> f64 {
    if dt_s <= 0.0 || frame_period_s <= 0.0 {
        return 0.0;
    }

    let rate = clamp(&rate, &0.0, &1.0);

    clamp(
        &(1.0 - (1.0 - rate).powf(dt_s / frame_period_s)),
        &0.0,
        &1.0,
    )
}

/// Transform a point in the vehicle's body frame into the world frame.
pub fn body_to_world(
    point_body: &Vector3<f64>,
    orientation: &UnitQuaternion<f64>,
    position: &Vector3<f64>,
) -> Vector3<f64> {
    orientation * point_body + position
}

/// Compass heading in degrees, clockwise from north, of an ENU yaw.
pub fn compass_heading_deg(yaw: f64) -> f64 {
    let heading = rem_euclid(90.0 - yaw.to_degrees(), 360.0);

    // Rounding can land exactly on 360
    if heading >= 360.0 {
        0.0
    } else {
        heading
    }
}

/// The nearest of the 8 compass points to a heading in degrees.
pub fn cardinal(heading_deg: f64) -> &'static str {
    let sector = (rem_euclid(heading_deg, 360.0) / 45.0).round() as usize;

    CARDINALS[sector % CARDINALS.len()]
}
