//! # Command Dispatcher
//!
//! Typed flight commands over a [`Transport`].
//!
//! Every command which makes a call returns `true` only if the call succeeded and the vehicle
//! accepted the command. Transport failures, timeouts, and malformed responses are logged and
//! reported as `false`, they never reach the caller as errors. Nothing is retried, retrying is
//! always the caller's choice.
//!
//! Velocity commands are published without acknowledgement. They are dropped if the transport is
//! not connected.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod mission;

pub use mission::{MissionConfig, MissionStrategy, Waypoint};

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, trace, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use comms_if::{
    msg::{
        self,
        srv::{
            CommandTolRequest, CommandTolResponse, ParamValue, Parameter, SetModeRequest,
            SetModeResponse, SetParametersRequest, SetParametersResponse, TriggerRequest,
            TriggerResponse,
        },
        telem::TwistMsg,
        MsgDecodeError,
    },
    net::{ChannelNames, EndpointNames, NetParams, Transport, TransportError},
};

use crate::{params::DispatchParams, state_agg::FlightMode};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which velocity commands can be sent to.
pub trait VelocitySink {
    fn send_velocity(&mut self, cmd: &VelocityCmd);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct CommandDispatcher<T: Transport> {
    transport: T,

    channels: ChannelNames,

    endpoints: EndpointNames,

    params: DispatchParams,
}

/// A velocity command in the world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VelocityCmd {
    /// Units: meters/second
    pub x: f64,

    /// Units: meters/second
    pub y: f64,

    /// Units: meters/second
    pub z: f64,

    /// Units: radians/second
    pub yaw_rate: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Direction of a single step from the step control pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeDirection {
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, thiserror::Error)]
enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Msg(#[from] MsgDecodeError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(transport: T, net_params: &NetParams, params: &DispatchParams) -> Self {
        Self {
            transport,
            channels: net_params.channels.clone(),
            endpoints: net_params.endpoints.clone(),
            params: params.clone(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn arm(&mut self) -> bool {
        trigger(
            &mut self.transport,
            "Arm",
            &self.endpoints.arm,
            self.params.call_timeout(),
        )
    }

    pub fn disarm(&mut self) -> bool {
        trigger(
            &mut self.transport,
            "Disarm",
            &self.endpoints.disarm,
            self.params.call_timeout(),
        )
    }

    /// Take off to the given height in meters, or to the quick takeoff height if `None`.
    ///
    /// The quick takeoff height uses the bridge's dedicated takeoff, any other height goes
    /// through the generic takeoff with an altitude. The two are not interchangeable.
    pub fn takeoff(&mut self, height_m: Option<f64>) -> bool {
        let quick_height = self.params.quick_takeoff_height_m;
        let height_m = height_m.unwrap_or(quick_height);

        if !height_m.is_finite() {
            warn!("Takeoff to {} m refused", height_m);
            return false;
        }

        if height_m == quick_height {
            trigger(
                &mut self.transport,
                "Quick takeoff",
                &self.endpoints.quick_takeoff,
                self.params.call_timeout(),
            )
        } else {
            let result = call(
                &mut self.transport,
                &self.endpoints.takeoff,
                &CommandTolRequest { altitude: height_m },
                self.params.call_timeout(),
            );
            outcome("Takeoff", result, |r: &CommandTolResponse| r.success)
        }
    }

    pub fn land(&mut self) -> bool {
        trigger(
            &mut self.transport,
            "Land",
            &self.endpoints.land,
            self.params.call_timeout(),
        )
    }

    /// Request a flight mode.
    ///
    /// `true` means the flight stack accepted the request, not that the vehicle is in the mode.
    /// The mode reported in the vehicle state confirms the change.
    pub fn set_mode(&mut self, mode: FlightMode) -> bool {
        if mode == FlightMode::Unknown {
            warn!("Cannot request the {} flight mode", mode);
            return false;
        }

        let result = call(
            &mut self.transport,
            &self.endpoints.set_mode,
            &SetModeRequest {
                custom_mode: mode.as_str().to_string(),
            },
            self.params.call_timeout(),
        );
        outcome(
            &format!("Set mode {}", mode),
            result,
            |r: &SetModeResponse| r.mode_sent,
        )
    }

    pub fn return_to_launch(&mut self) -> bool {
        self.set_mode(FlightMode::Rtl)
    }

    /// Publish a single velocity command.
    pub fn send_move(&mut self, cmd: &VelocityCmd) {
        let twist = TwistMsg::velocity(cmd.x, cmd.y, cmd.z, cmd.yaw_rate);

        match msg::encode("twist", &twist) {
            Ok(payload) => {
                trace!("Move {:?}", cmd);
                self.transport.publish(&self.channels.move_cmd, &payload)
            }
            Err(e) => warn!("Move command not sent: {}", e),
        }
    }

    /// Publish a single step along one axis.
    pub fn nudge(&mut self, direction: NudgeDirection) {
        let cmd = direction.to_cmd(self.params.nudge_step);
        self.send_move(&cmd);
    }

    pub fn set_parameter(&mut self, name: &str, value: ParamValue) -> bool {
        self.set_parameters(vec![Parameter::new(name, value)])
    }

    /// Set several parameters in one call.
    ///
    /// Succeeds only if every parameter was set. The vehicle may have applied some of them even
    /// when this returns `false`.
    pub fn set_parameters(&mut self, parameters: Vec<Parameter>) -> bool {
        if parameters.is_empty() {
            return true;
        }

        let num_requested = parameters.len();
        let names: Vec<String> = parameters.iter().map(|p| p.name.clone()).collect();

        let result: Result<SetParametersResponse, CallError> = call(
            &mut self.transport,
            &self.endpoints.set_parameters,
            &SetParametersRequest { parameters },
            self.params.call_timeout(),
        );

        if let Ok(ref rsp) = result {
            for (name, r) in names.iter().zip(rsp.results.iter()) {
                if !r.successful {
                    warn!("Parameter {} was not set: {}", name, r.reason);
                }
            }
        }

        outcome(
            &format!("Set parameters {:?}", names),
            result,
            |r: &SetParametersResponse| r.all_successful(num_requested),
        )
    }
}

impl<T: Transport> VelocitySink for CommandDispatcher<T> {
    fn send_velocity(&mut self, cmd: &VelocityCmd) {
        self.send_move(cmd)
    }
}

impl VelocityCmd {
    /// The command which stops the vehicle.
    pub const STOP: VelocityCmd = VelocityCmd {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        yaw_rate: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64, yaw_rate: f64) -> Self {
        Self { x, y, z, yaw_rate }
    }

    /// Multiply every axis by `scale`.
    pub fn scaled(&self, scale: f64) -> Self {
        Self {
            x: self.x * scale,
            y: self.y * scale,
            z: self.z * scale,
            yaw_rate: self.yaw_rate * scale,
        }
    }

    /// Largest absolute value over all axes.
    pub fn max_abs(&self) -> f64 {
        self.x
            .abs()
            .max(self.y.abs())
            .max(self.z.abs())
            .max(self.yaw_rate.abs())
    }

    /// True if every axis is exactly zero.
    pub fn is_stop(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0 && self.yaw_rate == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.yaw_rate.is_finite()
    }
}

impl NudgeDirection {
    /// The velocity command of one step of the given size in this direction.
    pub fn to_cmd(&self, step: f64) -> VelocityCmd {
        match self {
            NudgeDirection::Forward => VelocityCmd::new(step, 0.0, 0.0, 0.0),
            NudgeDirection::Back => VelocityCmd::new(-step, 0.0, 0.0, 0.0),
            NudgeDirection::Left => VelocityCmd::new(0.0, step, 0.0, 0.0),
            NudgeDirection::Right => VelocityCmd::new(0.0, -step, 0.0, 0.0),
            NudgeDirection::Up => VelocityCmd::new(0.0, 0.0, step, 0.0),
            NudgeDirection::Down => VelocityCmd::new(0.0, 0.0, -step, 0.0),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Encode a request, call the endpoint, and decode the response.
fn call<T, Req, Rsp>(
    transport: &mut T,
    endpoint: &str,
    request: &Req,
    timeout: Option<Duration>,
) -> Result<Rsp, CallError>
where
    T: Transport,
    Req: Serialize,
    Rsp: DeserializeOwned,
{
    let payload = msg::encode("request", request)?;
    let response = transport.call(endpoint, &payload, timeout)?;

    Ok(msg::decode("response", &response)?)
}

/// Call a trigger style endpoint.
fn trigger<T: Transport>(
    transport: &mut T,
    action: &str,
    endpoint: &str,
    timeout: Option<Duration>,
) -> bool {
    let result = call(transport, endpoint, &TriggerRequest {}, timeout);
    outcome(action, result, |r: &TriggerResponse| r.success)
}

/// Reduce the result of a call to success or failure, logging the reason for any failure.
fn outcome<R, F>(action: &str, result: Result<R, CallError>, accepted: F) -> bool
where
    F: FnOnce(&R) -> bool,
{
    match result {
        Ok(ref r) if accepted(r) => {
            info!("{} succeeded", action);
            true
        }
        Ok(_) => {
            warn!("{} refused by the vehicle", action);
            false
        }
        Err(e) => {
            warn!("{} failed: {}", action, e);
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::net::mock::MockTransport;
    use serde_json::json;

    pub(crate) fn dispatcher(mock: MockTransport) -> CommandDispatcher<MockTransport> {
        CommandDispatcher::new(
            mock,
            &NetParams::default(),
            &DispatchParams {
                mission_settle_delay_s: 0.0,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_arm_disconnected() {
        let mut mock = MockTransport::new();
        mock.respond("/commander/arm", json!({"success": true}));
        let mut d = dispatcher(mock);

        assert!(!d.arm());
        assert!(d.transport().calls().is_empty());
    }

    #[test]
    fn test_trigger_outcomes() {
        let mut mock = MockTransport::connected();
        mock.respond("/commander/arm", json!({"success": true, "message": ""}));
        mock.respond("/commander/disarm", json!({"success": false, "message": "flying"}));
        mock.fail("/commander/land");
        let mut d = dispatcher(mock);

        assert!(d.arm());
        assert!(!d.disarm());
        assert!(!d.land());

        let calls = d.transport().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_malformed_response_is_failure() {
        let mut mock = MockTransport::connected();
        mock.respond("/commander/arm", json!({"ok": "yes"}));
        let mut d = dispatcher(mock);

        assert!(!d.arm());
    }

    #[test]
    fn test_takeoff_routes_by_height() {
        let mut mock = MockTransport::connected();
        mock.respond("/commander/takeoff_5m", json!({"success": true}));
        mock.respond("/mavros/cmd/takeoff", json!({"success": true, "result": 0}));
        let mut d = dispatcher(mock);

        assert!(d.takeoff(None));
        assert!(d.takeoff(Some(5.0)));
        assert!(d.takeoff(Some(12.5)));

        let mock = d.transport();
        assert_eq!(mock.calls_to("/commander/takeoff_5m").len(), 2);
        let generic = mock.calls_to("/mavros/cmd/takeoff");
        assert_eq!(generic.len(), 1);
        assert_eq!(generic[0].request, json!({"altitude": 12.5}));
    }

    #[test]
    fn test_set_mode() {
        let mut mock = MockTransport::connected();
        mock.respond("/mavros/set_mode", json!({"mode_sent": true}));
        let mut d = dispatcher(mock);

        assert!(d.set_mode(FlightMode::Guided));
        assert!(d.return_to_launch());
        assert!(!d.set_mode(FlightMode::Unknown));

        let calls = d.transport().calls_to("/mavros/set_mode");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].request, json!({"custom_mode": "GUIDED"}));
        assert_eq!(calls[1].request, json!({"custom_mode": "RTL"}));
    }

    #[test]
    fn test_partial_parameter_success_is_failure() {
        let mut mock = MockTransport::connected();
        mock.respond(
            "/commander/set_parameters",
            json!({"results": [
                {"successful": true, "reason": ""},
                {"successful": false, "reason": "read only"},
            ]}),
        );
        let mut d = dispatcher(mock);

        assert!(!d.set_parameters(vec![
            Parameter::new("a", ParamValue::Integer(1)),
            Parameter::new("b", ParamValue::Bool(true)),
        ]));

        // Fewer results than parameters is also a failure
        assert!(!d.set_parameters(vec![
            Parameter::new("a", ParamValue::Integer(1)),
            Parameter::new("b", ParamValue::Bool(true)),
            Parameter::new("c", ParamValue::Bool(true)),
        ]));
    }

    #[test]
    fn test_all_parameters_set() {
        let mut mock = MockTransport::connected();
        mock.respond(
            "/commander/set_parameters",
            json!({"results": [
                {"successful": true, "reason": ""},
                {"successful": true, "reason": ""},
            ]}),
        );
        let mut d = dispatcher(mock);

        assert!(d.set_parameters(vec![
            Parameter::new("a", ParamValue::Integer(1)),
            Parameter::new("b", ParamValue::Bool(true)),
        ]));
        assert!(d.set_parameters(Vec::new()));

        // Nothing to set means nothing is sent
        assert_eq!(d.transport().calls_to("/commander/set_parameters").len(), 1);
    }

    #[test]
    fn test_move_and_nudge() {
        let mut d = dispatcher(MockTransport::connected());

        d.send_move(&VelocityCmd::new(0.5, 0.0, -0.25, 0.1));
        d.nudge(NudgeDirection::Right);

        let moves = d.transport().published_on("/commander/move_relative");
        assert_eq!(moves.len(), 2);
        assert_eq!(
            *moves[0],
            json!({
                "linear": {"x": 0.5, "y": 0.0, "z": -0.25},
                "angular": {"x": 0.0, "y": 0.0, "z": 0.1}
            })
        );
        assert_eq!(moves[1]["linear"], json!({"x": 0.0, "y": -1.0, "z": 0.0}));
    }

    #[test]
    fn test_move_disconnected_dropped() {
        let mut d = dispatcher(MockTransport::new());
        d.send_move(&VelocityCmd::new(1.0, 0.0, 0.0, 0.0));

        assert!(d.transport().published().is_empty());
    }
}
