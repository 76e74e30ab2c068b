//! # Bridge Message Interface
//!
//! This module defines the structures which are exchanged with the flight-control bridge, either
//! on publish/subscribe channels or as request/response endpoint payloads.
//!
//! Payloads travel as JSON values. Decoding is done in two steps: a structural decode into one of
//! the types here (which rejects anything with the wrong shape), followed by semantic validation
//! in the component that consumes the message.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod cmd;
pub mod sensor;
pub mod srv;
pub mod telem;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum MsgDecodeError {
    #[error("Payload does not match the expected {0} shape: {1}")]
    InvalidShape(&'static str, serde_json::Error),

    #[error("Could not serialize the {0} payload: {1}")]
    SerializationError(&'static str, serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Decode a payload into the given message type.
///
/// The `kind` string is only used to make the error message readable.
pub fn decode<T>(kind: &'static str, payload: &Value) -> Result<T, MsgDecodeError>
where
    T: DeserializeOwned,
{
    T::deserialize(payload).map_err(|e| MsgDecodeError::InvalidShape(kind, e))
}

/// Encode a message into a payload value.
pub fn encode<T>(kind: &'static str, msg: &T) -> Result<Value, MsgDecodeError>
where
    T: Serialize,
{
    serde_json::to_value(msg).map_err(|e| MsgDecodeError::SerializationError(kind, e))
}
