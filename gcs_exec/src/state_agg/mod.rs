//! # State Aggregator
//!
//! Fuses the independently timed telemetry channels into a single [`VehicleState`].
//!
//! Each channel updates its own fields as soon as it arrives, there is no attempt to align
//! channels in time. Every pose update produces a [`TelemetrySample`] once at least one velocity
//! reading has been received, using the most recent velocity even if it is older than the pose.
//!
//! Malformed messages are logged and dropped, keeping the previous valid state.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod mode;
mod vehicle;

pub use mode::FlightMode;
pub use vehicle::{TelemetrySample, VehicleState};

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::msg::telem::{BatteryMsg, PoseStampedMsg, StateMsg, TwistStampedMsg};
use log::{debug, info, warn};
use nalgebra::{Vector2, Vector3};

use crate::orient;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct StateAggregator {
    state: VehicleState,

    /// Altitude and receive time of the previous pose, used to difference the vertical speed
    last_altitude: Option<(f64, f64)>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl StateAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Forget everything, returning to the state at the start of a session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn handle_state(&mut self, msg: &StateMsg) {
        let mode = FlightMode::decode(&msg.mode);

        if mode == FlightMode::Unknown && !msg.mode.is_empty() {
            debug!("Unrecognised flight mode \"{}\"", msg.mode);
        }

        if msg.armed != self.state.armed {
            info!("Vehicle {}", if msg.armed { "armed" } else { "disarmed" });
        }
        if mode != self.state.mode {
            info!("Flight mode changed to {}", mode);
        }

        self.state.fcu_connected = msg.connected;
        self.state.armed = msg.armed;
        self.state.mode = mode;
    }

    pub fn handle_battery(&mut self, msg: &BatteryMsg) {
        if !msg.percentage.is_finite() {
            warn!("Dropping battery message with percentage {}", msg.percentage);
            return;
        }

        let percent = (msg.percentage * 100.0).round().max(0.0).min(100.0);
        self.state.battery_percent = percent as u8;
    }

    pub fn handle_velocity(&mut self, msg: &TwistStampedMsg) {
        let linear = &msg.twist.linear;

        if !linear.is_finite() {
            warn!("Dropping velocity message with non-finite components");
            return;
        }

        self.state.velocity_ms = Some(Vector3::new(linear.x, linear.y, linear.z));
    }

    /// Update the pose, received at `now_s` seconds.
    ///
    /// Returns a new telemetry sample if a velocity is known.
    pub fn handle_pose(&mut self, msg: &PoseStampedMsg, now_s: f64) -> Option<TelemetrySample> {
        let position = &msg.pose.position;

        if !position.is_finite() {
            warn!("Dropping pose message with non-finite position");
            return None;
        }

        let orientation = match orient::quat_from_msg(&msg.pose.orientation) {
            Some(q) => q,
            None => {
                warn!(
                    "Dropping pose message with invalid orientation {:?}",
                    msg.pose.orientation
                );
                return None;
            }
        };

        // Vertical speed. The first pose only sets the baseline.
        if let Some((prev_altitude, prev_time_s)) = self.last_altitude {
            let dt = now_s - prev_time_s;

            if dt > 0.0 {
                let vertical_speed = (position.z - prev_altitude) / dt;

                if vertical_speed.is_finite() {
                    self.state.vertical_speed_ms = vertical_speed;
                }
            } else {
                debug!("Pose interval of {} s, vertical speed not updated", dt);
            }
        }

        if now_s.is_finite() {
            self.last_altitude = Some((position.z, now_s));
        }

        self.state.position_m = Vector3::new(position.x, position.y, position.z);
        self.state.orientation = orientation;

        let velocity_ms = self.state.velocity_ms?;
        let attitude = orient::quat_to_euler(&orientation);

        Some(TelemetrySample {
            timestamp_s: now_s,
            altitude_m: position.z,
            velocity_ms,
            position_m: Vector2::new(position.x, position.y),
            roll: attitude.roll,
            pitch: attitude.pitch,
            yaw: attitude.yaw,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::msg::telem::{Header, PoseMsg, QuatMsg, TwistMsg, Vec3Msg};

    fn pose(x: f64, y: f64, z: f64) -> PoseStampedMsg {
        PoseStampedMsg {
            header: Header::default(),
            pose: PoseMsg {
                position: Vec3Msg::new(x, y, z),
                orientation: QuatMsg {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                    w: 1.0,
                },
            },
        }
    }

    fn velocity(x: f64, y: f64, z: f64) -> TwistStampedMsg {
        TwistStampedMsg {
            header: Header::default(),
            twist: TwistMsg {
                linear: Vec3Msg::new(x, y, z),
                angular: Vec3Msg::default(),
            },
        }
    }

    fn state_msg(armed: bool, mode: &str) -> StateMsg {
        StateMsg {
            connected: true,
            armed,
            guided: false,
            manual_input: false,
            mode: mode.to_string(),
        }
    }

    #[test]
    fn test_vertical_speed() {
        let mut agg = StateAggregator::new();

        // Baseline only
        agg.handle_pose(&pose(0.0, 0.0, 1.0), 10.0);
        assert_eq!(agg.state().vertical_speed_ms, 0.0);

        agg.handle_pose(&pose(0.0, 0.0, 2.0), 10.5);
        assert_eq!(agg.state().vertical_speed_ms, (2.0 - 1.0) / 0.5);

        agg.handle_pose(&pose(0.0, 0.0, 1.25), 10.75);
        assert_eq!(agg.state().vertical_speed_ms, (1.25 - 2.0) / 0.25);

        // Duplicate and backwards timestamps keep the previous value
        agg.handle_pose(&pose(0.0, 0.0, 7.0), 10.75);
        assert_eq!(agg.state().vertical_speed_ms, -3.0);
        agg.handle_pose(&pose(0.0, 0.0, 9.0), 9.0);
        assert_eq!(agg.state().vertical_speed_ms, -3.0);
        assert!(agg.state().vertical_speed_ms.is_finite());

        // Position still follows the latest pose
        assert_eq!(agg.state().altitude_m(), 9.0);
    }

    #[test]
    fn test_sample_needs_velocity() {
        let mut agg = StateAggregator::new();

        assert!(agg.handle_pose(&pose(1.0, 2.0, 3.0), 1.0).is_none());

        agg.handle_velocity(&velocity(0.5, 0.0, -0.1));
        let sample = agg.handle_pose(&pose(1.0, 2.0, 3.0), 2.0).unwrap();
        assert_eq!(sample.timestamp_s, 2.0);
        assert_eq!(sample.altitude_m, 3.0);
        assert_eq!(sample.position_m, Vector2::new(1.0, 2.0));
        assert_eq!(sample.velocity_ms, Vector3::new(0.5, 0.0, -0.1));

        // Stale velocity is reused
        assert!(agg.handle_pose(&pose(1.0, 2.0, 3.5), 3.0).is_some());
    }

    #[test]
    fn test_malformed_pose_keeps_state() {
        let mut agg = StateAggregator::new();
        agg.handle_pose(&pose(1.0, 1.0, 1.0), 1.0);

        let mut bad_quat = pose(5.0, 5.0, 5.0);
        bad_quat.pose.orientation.w = 0.0;
        assert!(agg.handle_pose(&bad_quat, 2.0).is_none());

        let bad_pos = pose(std::f64::NAN, 0.0, 0.0);
        assert!(agg.handle_pose(&bad_pos, 3.0).is_none());

        assert_eq!(agg.state().position_m, Vector3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_orientation_normalised() {
        let mut agg = StateAggregator::new();
        let mut msg = pose(0.0, 0.0, 0.0);
        msg.pose.orientation.w = 3.0;
        agg.handle_pose(&msg, 0.0);

        assert!((agg.state().orientation.quaternion().norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mode_and_armed() {
        let mut agg = StateAggregator::new();

        agg.handle_state(&state_msg(true, "GUIDED"));
        assert!(agg.state().armed);
        assert_eq!(agg.state().mode, FlightMode::Guided);

        agg.handle_state(&state_msg(false, "BOGUS_MODE"));
        assert!(!agg.state().armed);
        assert_eq!(agg.state().mode, FlightMode::Unknown);
    }

    #[test]
    fn test_battery() {
        let mut agg = StateAggregator::new();
        let battery = |p| BatteryMsg {
            voltage: 12.0,
            current: 1.0,
            percentage: p,
        };

        agg.handle_battery(&battery(0.876));
        assert_eq!(agg.state().battery_percent, 88);

        agg.handle_battery(&battery(std::f64::NAN));
        assert_eq!(agg.state().battery_percent, 88);

        agg.handle_battery(&battery(1.7));
        assert_eq!(agg.state().battery_percent, 100);

        agg.handle_battery(&battery(-0.2));
        assert_eq!(agg.state().battery_percent, 0);
    }
}
