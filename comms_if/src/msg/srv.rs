//! # Endpoint Payloads
//!
//! Request and response payloads for the bridge's request/response endpoints.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Empty request for trigger-style endpoints (arm, disarm, quick takeoff, land, start mission).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct TriggerRequest {}

/// Response from a trigger-style endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TriggerResponse {
    pub success: bool,

    #[serde(default)]
    pub message: String,
}

/// Request for the takeoff-with-altitude endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct CommandTolRequest {
    /// Target altitude in meters
    pub altitude: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CommandTolResponse {
    pub success: bool,

    #[serde(default)]
    pub result: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SetModeRequest {
    pub custom_mode: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SetModeResponse {
    /// True if the mode change was accepted for sending, not that the vehicle is now in the mode.
    pub mode_sent: bool,
}

/// A single named parameter.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
}

/// Request for the generic parameter update endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SetParametersRequest {
    pub parameters: Vec<Parameter>,
}

/// Result for one parameter, in the same order as the request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SetParameterResult {
    pub successful: bool,

    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SetParametersResponse {
    pub results: Vec<SetParameterResult>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Typed parameter value.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Parameter {
    pub fn new<S: Into<String>>(name: S, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl SetParametersResponse {
    /// True only if the response holds one successful result for each of the `num_requested`
    /// parameters.
    pub fn all_successful(&self, num_requested: usize) -> bool {
        self.results.len() == num_requested && self.results.iter().all(|r| r.successful)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_value_wire_shape() {
        let p = Parameter::new("orbit_radius", ParamValue::Double(12.5));
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"name": "orbit_radius", "value": {"type": "double", "value": 12.5}})
        );
    }

    #[test]
    fn test_all_successful() {
        let ok = SetParameterResult { successful: true, reason: String::new() };
        let bad = SetParameterResult { successful: false, reason: "read only".into() };

        let rsp = SetParametersResponse { results: vec![ok.clone(), ok.clone()] };
        assert!(rsp.all_successful(2));
        assert!(!rsp.all_successful(3));

        let rsp = SetParametersResponse { results: vec![ok, bad] };
        assert!(!rsp.all_successful(2));
    }
}
