//! Mission configuration and execution

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

use comms_if::{
    msg::{
        self,
        cmd::WaypointPathMsg,
        srv::{ParamValue, Parameter},
        telem::Vec3Msg,
    },
    net::Transport,
};

use super::{trigger, CommandDispatcher};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const STRATEGY_PARAM: &str = "mission_strategy";
const ROI_X_PARAM: &str = "inspect_roi_x";
const ROI_Y_PARAM: &str = "inspect_roi_y";
const ROI_Z_PARAM: &str = "inspect_roi_z";
const ORBIT_RADIUS_PARAM: &str = "orbit_radius";

/// Orbit radius which lets the vehicle choose the radius itself
const ORBIT_RADIUS_AUTO: f64 = 0.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A mission waypoint in the world frame.
///
/// Units: meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// How the mission should be flown, held only for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MissionConfig {
    pub strategy: MissionStrategy,

    /// Point the vehicle looks at during an inspection
    pub roi: Option<Vector3<f64>>,

    /// Orbit radius in meters, `None` for automatic
    pub orbit_radius: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStrategy {
    Casual,
    FaceTarget,
    Inspect,
    Orbit,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: Transport> CommandDispatcher<T> {
    pub fn set_mission_strategy(&mut self, strategy: MissionStrategy) -> bool {
        self.set_parameter(
            STRATEGY_PARAM,
            ParamValue::String(strategy.as_str().to_string()),
        )
    }

    pub fn set_inspect_roi(&mut self, roi: &Vector3<f64>) -> bool {
        self.set_parameters(vec![
            Parameter::new(ROI_X_PARAM, ParamValue::Double(roi.x)),
            Parameter::new(ROI_Y_PARAM, ParamValue::Double(roi.y)),
            Parameter::new(ROI_Z_PARAM, ParamValue::Double(roi.z)),
        ])
    }

    /// Set the orbit radius in meters, or let the vehicle choose if `None`.
    pub fn set_orbit_radius(&mut self, radius_m: Option<f64>) -> bool {
        self.set_parameter(
            ORBIT_RADIUS_PARAM,
            ParamValue::Double(radius_m.unwrap_or(ORBIT_RADIUS_AUTO)),
        )
    }

    /// Send a whole mission configuration in a single parameter update.
    pub fn apply_mission_config(&mut self, config: &MissionConfig) -> bool {
        let mut parameters = vec![Parameter::new(
            STRATEGY_PARAM,
            ParamValue::String(config.strategy.as_str().to_string()),
        )];

        if let Some(roi) = config.roi {
            parameters.push(Parameter::new(ROI_X_PARAM, ParamValue::Double(roi.x)));
            parameters.push(Parameter::new(ROI_Y_PARAM, ParamValue::Double(roi.y)));
            parameters.push(Parameter::new(ROI_Z_PARAM, ParamValue::Double(roi.z)));
        }

        parameters.push(Parameter::new(
            ORBIT_RADIUS_PARAM,
            ParamValue::Double(config.orbit_radius.unwrap_or(ORBIT_RADIUS_AUTO)),
        ));

        self.set_parameters(parameters)
    }

    /// Upload and start a mission.
    ///
    /// The path is published, then after the settle delay the vehicle is armed and the mission
    /// started. Nothing confirms that the path was received before the start, the delay only
    /// makes it likely. If arming fails the mission is not started.
    pub fn execute_mission(&mut self, waypoints: &[Waypoint]) -> bool {
        if waypoints.is_empty() {
            warn!("Refusing to execute a mission with no waypoints");
            return false;
        }

        let path = WaypointPathMsg {
            waypoints: waypoints
                .iter()
                .map(|w| Vec3Msg::new(w.x, w.y, w.z))
                .collect(),
        };

        let payload = match msg::encode("waypoint path", &path) {
            Ok(p) => p,
            Err(e) => {
                warn!("Mission not sent: {}", e);
                return false;
            }
        };

        info!("Uploading mission of {} waypoints", waypoints.len());
        self.transport.publish(&self.channels.mission_path, &payload);

        std::thread::sleep(self.params.mission_settle_delay());

        if !self.arm() {
            warn!("Mission not started, the vehicle could not be armed");
            return false;
        }

        trigger(
            &mut self.transport,
            "Start mission",
            &self.endpoints.start_mission,
            self.params.call_timeout(),
        )
    }
}

impl MissionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStrategy::Casual => "CASUAL",
            MissionStrategy::FaceTarget => "FACE_TARGET",
            MissionStrategy::Inspect => "INSPECT",
            MissionStrategy::Orbit => "ORBIT",
        }
    }
}

impl Default for MissionStrategy {
    fn default() -> Self {
        MissionStrategy::Casual
    }
}

impl fmt::Display for MissionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Waypoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}
