//! # Ground Control Station Executable Parameters
//!
//! This module provide parameters for the ground control station executable. Every field has a
//! default so a parameter file only needs to contain the values it changes.
//!
//! Loaded parameters must be checked with [`GcsExecParams::validate`] before use. Durations are
//! clamped to `[0, MAX_DURATION_S]` when converted, so invalid values never panic.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest duration any parameter may describe.
///
/// Units: seconds
pub const MAX_DURATION_S: f64 = 3600.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GcsExecParams {
    /// Target period of one cycle of the executable.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Most inbound messages routed in one cycle, the rest wait for the next cycle
    pub max_messages_per_cycle: usize,

    pub history: HistoryParams,

    pub cloud: CloudParams,

    pub dispatch: DispatchParams,

    pub input: InputParams,

    pub attitude: AttitudeParams,
}

/// Parameters of the telemetry history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistoryParams {
    /// Maximum number of samples kept
    pub capacity: usize,
}

/// Parameters of the point cloud accumulator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CloudParams {
    /// Maximum number of points kept before the oldest are evicted
    pub capacity_points: usize,

    /// Only every `decimation`th point of a SLAM cloud frame is kept
    pub decimation: usize,

    /// Scan ranges below this are sensor noise.
    ///
    /// Units: meters
    pub min_range_m: f64,

    /// Scan ranges above this are beyond the sensor's reach.
    ///
    /// Units: meters
    pub max_range_m: f64,

    /// If set, the bearing of the first ray of every scan, replacing the one in the message.
    ///
    /// Units: radians
    pub scan_angle_min_rad: Option<f64>,
}

/// Parameters of the command dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchParams {
    /// Time to wait for the response to a call, no limit if not set.
    ///
    /// Units: seconds
    pub call_timeout_s: Option<f64>,

    /// Height of the bridge's dedicated quick takeoff.
    ///
    /// Units: meters
    pub quick_takeoff_height_m: f64,

    /// Time between publishing a mission's waypoints and starting it.
    ///
    /// Units: seconds
    pub mission_settle_delay_s: f64,

    /// Size of one step of a relative nudge command
    pub nudge_step: f64,
}

/// Parameters of the continuous input loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputParams {
    /// Rate at which commands are sent while input is held.
    ///
    /// Units: hertz
    pub rate_hz: f64,

    /// Input magnitude below which the input is considered released
    pub deadzone: f64,

    /// Initial speed scale applied to the input
    pub speed_scale: f64,

    /// Largest allowed speed scale
    pub max_speed_scale: f64,
}

/// Parameters of the attitude display damping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AttitudeParams {
    /// Fraction of the remaining angle covered in one reference frame, in `(0, 1]`
    pub rate: f64,

    /// Period of the reference frame the rate is given for.
    ///
    /// Units: seconds
    pub frame_period_s: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A parameter value which the executable cannot run with.
#[derive(Debug, Error, PartialEq)]
pub enum ParamsError {
    #[error("{0} must be a finite duration between 0 s and one hour, found {1}")]
    InvalidDuration(&'static str, f64),

    #[error("input.rate_hz must give a period of at most one hour, found {0}")]
    InvalidRate(f64),

    #[error("cloud.decimation must be at least 1")]
    ZeroDecimation,

    #[error("max_messages_per_cycle must be at least 1")]
    ZeroMessageLimit,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GcsExecParams {
    /// Check every value the executable relies on, returning the first invalid one.
    pub fn validate(&self) -> Result<(), ParamsError> {
        check_duration("cycle_period_s", self.cycle_period_s)?;
        check_duration("dispatch.mission_settle_delay_s", self.dispatch.mission_settle_delay_s)?;
        if let Some(t) = self.dispatch.call_timeout_s {
            check_duration("dispatch.call_timeout_s", t)?;
        }

        let rate_hz = self.input.rate_hz;
        if !(rate_hz.is_finite() && rate_hz >= 1.0 / MAX_DURATION_S) {
            return Err(ParamsError::InvalidRate(rate_hz));
        }

        if self.cloud.decimation == 0 {
            return Err(ParamsError::ZeroDecimation);
        }

        if self.max_messages_per_cycle == 0 {
            return Err(ParamsError::ZeroMessageLimit);
        }

        Ok(())
    }

    pub fn cycle_period(&self) -> Duration {
        secs_to_duration(self.cycle_period_s)
    }
}

impl DispatchParams {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_s
            .filter(|t| *t >= 0.0)
            .map(secs_to_duration)
    }

    pub fn mission_settle_delay(&self) -> Duration {
        secs_to_duration(self.mission_settle_delay_s)
    }
}

impl InputParams {
    /// The period between two commands. An invalid rate falls back to the default one.
    pub fn period(&self) -> Duration {
        let rate_hz = if self.rate_hz.is_finite() && self.rate_hz > 0.0 {
            self.rate_hz
        } else {
            Self::default().rate_hz
        };

        secs_to_duration(1.0 / rate_hz)
    }
}

impl Default for GcsExecParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.01,
            max_messages_per_cycle: 500,
            history: HistoryParams::default(),
            cloud: CloudParams::default(),
            dispatch: DispatchParams::default(),
            input: InputParams::default(),
            attitude: AttitudeParams::default(),
        }
    }
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self { capacity: 200 }
    }
}

impl Default for CloudParams {
    fn default() -> Self {
        Self {
            capacity_points: 60_000,
            decimation: 2,
            min_range_m: 0.2,
            max_range_m: 15.0,
            scan_angle_min_rad: None,
        }
    }
}

impl Default for DispatchParams {
    fn default() -> Self {
        Self {
            call_timeout_s: Some(5.0),
            quick_takeoff_height_m: 5.0,
            mission_settle_delay_s: 0.2,
            nudge_step: 1.0,
        }
    }
}

impl Default for InputParams {
    fn default() -> Self {
        Self {
            rate_hz: 20.0,
            deadzone: 0.05,
            speed_scale: 1.0,
            max_speed_scale: 5.0,
        }
    }
}

impl Default for AttitudeParams {
    fn default() -> Self {
        Self {
            rate: 0.15,
            frame_period_s: 1.0 / 60.0,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_duration(name: &'static str, secs: f64) -> Result<(), ParamsError> {
    if secs.is_finite() && (0.0..=MAX_DURATION_S).contains(&secs) {
        Ok(())
    } else {
        Err(ParamsError::InvalidDuration(name, secs))
    }
}

/// Convert seconds to a duration, clamped to `[0, MAX_DURATION_S]`. NaN is zero.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() {
        return Duration::from_secs(0);
    }

    Duration::from_secs_f64(util::maths::clamp(&secs, &0.0, &MAX_DURATION_S))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file() {
        let params: GcsExecParams = util::params::from_toml_str(
            r#"
            cycle_period_s = 0.02

            [cloud]
            decimation = 4

            [dispatch]
            mission_settle_delay_s = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(params.cycle_period(), Duration::from_millis(20));
        assert_eq!(params.cloud.decimation, 4);
        assert_eq!(params.cloud.capacity_points, 60_000);
        assert_eq!(params.dispatch.mission_settle_delay(), Duration::from_secs(0));
        assert_eq!(params.dispatch.call_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(params.input.period(), Duration::from_millis(50));
        assert_eq!(params.history, HistoryParams::default());
        assert_eq!(params.validate(), Ok(()));
    }

    #[test]
    fn test_infinite_delay_rejected() {
        let params: GcsExecParams = util::params::from_toml_str(
            r#"
            [dispatch]
            mission_settle_delay_s = inf
            "#,
        )
        .unwrap();

        assert!(matches!(
            params.validate(),
            Err(ParamsError::InvalidDuration("dispatch.mission_settle_delay_s", _))
        ));

        // Converting the bad value still doesn't panic
        assert_eq!(
            params.dispatch.mission_settle_delay(),
            Duration::from_secs_f64(MAX_DURATION_S)
        );
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut params = GcsExecParams::default();
        params.dispatch.call_timeout_s = Some(1e20);
        assert!(matches!(
            params.validate(),
            Err(ParamsError::InvalidDuration("dispatch.call_timeout_s", _))
        ));
        assert_eq!(
            params.dispatch.call_timeout(),
            Some(Duration::from_secs_f64(MAX_DURATION_S))
        );

        let mut params = GcsExecParams::default();
        params.cycle_period_s = -0.5;
        assert!(params.validate().is_err());
        assert_eq!(params.cycle_period(), Duration::from_secs(0));

        let mut params = GcsExecParams::default();
        params.input.rate_hz = 1e-300;
        assert_eq!(params.validate(), Err(ParamsError::InvalidRate(1e-300)));
        assert_eq!(params.input.period(), Duration::from_secs_f64(MAX_DURATION_S));

        let mut params = GcsExecParams::default();
        params.max_messages_per_cycle = 0;
        assert_eq!(params.validate(), Err(ParamsError::ZeroMessageLimit));
    }

    #[test]
    fn test_zero_decimation_rejected() {
        let params: GcsExecParams = util::params::from_toml_str(
            r#"
            [cloud]
            decimation = 0
            "#,
        )
        .unwrap();

        assert_eq!(params.validate(), Err(ParamsError::ZeroDecimation));
    }
}
