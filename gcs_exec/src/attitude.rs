//! # Attitude Damper
//!
//! Smooths the displayed attitude of the vehicle. Telemetry arrives at a lower and less regular
//! rate than a display refreshes, so the displayed angles are stepped toward the latest sample
//! each frame instead of jumping.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::{
    orient::{self, EulerAngles},
    params::AttitudeParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AttitudeDamper {
    params: AttitudeParams,

    /// Currently displayed attitude, `None` until the first target
    current: Option<EulerAngles>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AttitudeDamper {
    pub fn new(params: &AttitudeParams) -> Self {
        Self {
            params: params.clone(),
            current: None,
        }
    }

    /// Step the displayed attitude toward `target` over `dt_s` seconds.
    ///
    /// The first call snaps straight to the target.
    pub fn step(&mut self, target: &EulerAngles, dt_s: f64) -> EulerAngles {
        let next = match self.current {
            None => *target,
            Some(current) => {
                let rate =
                    orient::time_scaled_rate(self.params.rate, dt_s, self.params.frame_period_s);

                EulerAngles {
                    roll: orient::damp_angle(current.roll, target.roll, rate),
                    pitch: orient::damp_angle(current.pitch, target.pitch, rate),
                    yaw: orient::damp_angle(current.yaw, target.yaw, rate),
                }
            }
        };

        self.current = Some(next);
        next
    }

    pub fn current(&self) -> Option<EulerAngles> {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
