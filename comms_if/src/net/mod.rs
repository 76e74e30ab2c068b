//! # Network Module
//!
//! This module provides the transport abstraction between the ground station and the
//! flight-control bridge, along with a ZMQ implementation of it and an in-memory mock used for
//! testing.
//!
//! A transport offers two primitives on top of a connection lifecycle:
//!
//! - fire-and-forget publishing to a named channel, and receiving messages from subscribed
//!   channels,
//! - request/response calls against a named endpoint, each of which has exactly one outcome.
//!
//! Everything is driven from a single thread. Inbound messages are pulled with
//! [`Transport::recv`] and connection events with [`Transport::poll_event`], so the caller
//! decides when handlers run.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod socket;
mod tracker;
mod zmq_transport;

pub mod mock;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

// Export zmq
pub use zmq;

pub use socket::{MonitoredSocket, MonitoredSocketError, SocketOptions};
pub use tracker::ConnectionTracker;
pub use zmq_transport::ZmqTransport;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A connection to the flight-control bridge.
pub trait Transport {
    /// Begin connecting to the bridge.
    ///
    /// The outcome of the attempt is reported later by exactly one `Connected` or `Errored`
    /// event from [`Transport::poll_event`]. An `Err` is returned if the attempt could not even
    /// be started, in which case the `Errored` event is still emitted.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// The current state of the connection.
    fn connection_state(&self) -> ConnectionState;

    /// Get the next pending connection event, if any.
    fn poll_event(&mut self) -> Option<ConnectionEvent>;

    /// Start receiving messages published on the given channel.
    fn subscribe(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Stop receiving messages published on the given channel.
    fn unsubscribe(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Get the next inbound message without blocking.
    ///
    /// Messages on the same channel are returned in the order they were published. No ordering
    /// is guaranteed between channels.
    fn recv(&mut self) -> Option<Inbound>;

    /// Publish a payload on a channel.
    ///
    /// This never blocks and gives no delivery guarantee. If the transport is not connected the
    /// payload is silently dropped.
    fn publish(&mut self, channel: &str, payload: &Value);

    /// Make a request to an endpoint and wait for its response.
    ///
    /// Resolves with either the response payload or an error, exactly once. No timeout is
    /// imposed by the transport itself: `timeout` is the caller's choice, with `None` waiting
    /// indefinitely.
    fn call(
        &mut self,
        endpoint: &str,
        request: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value, TransportError>;

    /// Close the connection, dropping all subscriptions.
    fn close(&mut self);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub channel: String,
    pub payload: Value,

    /// When the transport took the message off the link
    pub received: Instant,
}

/// Network parameters of the bridge connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetParams {
    /// Endpoint on which the bridge publishes its channels
    pub bridge_tm_endpoint: String,

    /// Endpoint on which the bridge listens for published commands
    pub bridge_cmd_endpoint: String,

    /// Endpoint of the bridge's request/response service
    pub bridge_call_endpoint: String,

    /// Time allowed for a connection attempt before it is considered failed.
    ///
    /// Units: milliseconds
    pub connect_timeout_ms: u64,

    /// Names of the bridge channels
    pub channels: ChannelNames,

    /// Names of the bridge endpoints
    pub endpoints: EndpointNames,
}

/// Names of the publish/subscribe channels used on the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelNames {
    pub state: String,
    pub battery: String,
    pub pose: String,
    pub velocity: String,
    pub scan: String,
    pub cloud: String,
    pub move_cmd: String,
    pub mission_path: String,
}

/// Names of the request/response endpoints used on the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointNames {
    pub arm: String,
    pub disarm: String,
    pub quick_takeoff: String,
    pub takeoff: String,
    pub land: String,
    pub set_mode: String,
    pub set_parameters: String,
    pub start_mission: String,
}

/// Envelope sent to the bridge's request/response service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallRequest {
    pub endpoint: String,
    pub request: Value,
}

/// Envelope returned by the bridge's request/response service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallReply {
    pub ok: bool,

    #[serde(default)]
    pub response: Value,

    #[serde(default)]
    pub error: Option<String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// State of the connection to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// A change in the connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection attempt succeeded, or a lost link came back
    Connected,

    /// A connection attempt failed
    Errored(String),

    /// An established link was lost or closed
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("The transport is not connected to the bridge")]
    NotConnected,

    #[error("Could not send the request to the bridge: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve a message from the bridge: {0}")]
    RecvError(zmq::Error),

    #[error("No response from {0} within the timeout")]
    Timeout(String),

    #[error("The bridge rejected the call to {endpoint}: {reason}")]
    Rejected { endpoint: String, reason: String },

    #[error("Could not serialize the request: {0}")]
    SerializationError(serde_json::Error),

    #[error("Could not deserialize the response from the bridge: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The bridge responded with a message which was not valid UTF-8")]
    NonUtf8Response,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NetParams {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for NetParams {
    fn default() -> Self {
        Self {
            bridge_tm_endpoint: String::from("tcp://localhost:9090"),
            bridge_cmd_endpoint: String::from("tcp://localhost:9091"),
            bridge_call_endpoint: String::from("tcp://localhost:9092"),
            connect_timeout_ms: 5000,
            channels: ChannelNames::default(),
            endpoints: EndpointNames::default(),
        }
    }
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            state: String::from("/mavros/state"),
            battery: String::from("/mavros/battery"),
            pose: String::from("/mavros/local_position/pose"),
            velocity: String::from("/mavros/local_position/velocity_local"),
            scan: String::from("/scan"),
            cloud: String::from("/slam/cloud"),
            move_cmd: String::from("/commander/move_relative"),
            mission_path: String::from("/commander/mission_path"),
        }
    }
}

impl Default for EndpointNames {
    fn default() -> Self {
        Self {
            arm: String::from("/commander/arm"),
            disarm: String::from("/commander/disarm"),
            quick_takeoff: String::from("/commander/takeoff_5m"),
            takeoff: String::from("/mavros/cmd/takeoff"),
            land: String::from("/commander/land"),
            set_mode: String::from("/mavros/set_mode"),
            set_parameters: String::from("/commander/set_parameters"),
            start_mission: String::from("/commander/start_mission"),
        }
    }
}

impl ChannelNames {
    /// All channels the ground station subscribes to.
    pub fn telemetry(&self) -> [&str; 6] {
        [
            self.state.as_str(),
            self.battery.as_str(),
            self.pose.as_str(),
            self.velocity.as_str(),
            self.scan.as_str(),
            self.cloud.as_str(),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_params_file() {
        let params: NetParams = serde_json::from_value(serde_json::json!({
            "connect_timeout_ms": 250,
            "channels": {"scan": "/lidar/scan"}
        }))
        .unwrap();

        assert_eq!(params.connect_timeout(), Duration::from_millis(250));
        assert_eq!(params.channels.scan, "/lidar/scan");
        assert_eq!(params.channels.pose, "/mavros/local_position/pose");
        assert_eq!(params.endpoints, EndpointNames::default());
    }
}
