//! # ZMQ Transport
//!
//! Implementation of [`Transport`] over three ZMQ sockets connected to the bridge:
//!
//! - a SUB socket on which the bridge publishes channels as `[channel, json]` multipart messages,
//! - a PUB socket on which commands are published in the same format,
//! - a REQ socket for calls, carrying [`CallRequest`] and [`CallReply`] envelopes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace, warn};
use serde_json::Value;
use std::{
    collections::BTreeSet,
    convert::TryFrom,
    time::{Duration, Instant},
};

use super::{
    zmq, CallReply, CallRequest, ConnectionEvent, ConnectionState, ConnectionTracker, Inbound,
    MonitoredSocket, NetParams, SocketOptions, Transport, TransportError,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Transport to the bridge over ZMQ.
pub struct ZmqTransport {
    ctx: zmq::Context,

    params: NetParams,

    /// Sockets of the current connection, `None` while closed
    sockets: Option<BridgeSockets>,

    /// Channels currently subscribed to. Kept across reconnections.
    subscriptions: BTreeSet<String>,

    tracker: ConnectionTracker,
}

struct BridgeSockets {
    tm: MonitoredSocket,
    cmd: MonitoredSocket,
    call: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ZmqTransport {
    /// Create a new transport. No connection is made until [`Transport::connect`] is called.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Self {
        Self {
            ctx: ctx.clone(),
            params: params.clone(),
            sockets: None,
            subscriptions: BTreeSet::new(),
            tracker: ConnectionTracker::new(params.connect_timeout()),
        }
    }

    fn open_sockets(&self) -> Result<BridgeSockets, TransportError> {
        let options = SocketOptions::bridge_client();

        let tm = MonitoredSocket::new(
            &self.ctx,
            zmq::SUB,
            &options,
            &self.params.bridge_tm_endpoint,
        )
        .map_err(TransportError::SocketError)?;

        // Restore any subscriptions made before this connection
        for channel in self.subscriptions.iter() {
            tm.set_subscribe(channel.as_bytes())
                .map_err(TransportError::RecvError)?;
        }

        let cmd = MonitoredSocket::new(
            &self.ctx,
            zmq::PUB,
            &options,
            &self.params.bridge_cmd_endpoint,
        )
        .map_err(TransportError::SocketError)?;

        let call = MonitoredSocket::new(
            &self.ctx,
            zmq::REQ,
            &options,
            &self.params.bridge_call_endpoint,
        )
        .map_err(TransportError::SocketError)?;

        Ok(BridgeSockets { tm, cmd, call })
    }

    /// Feed the current link state of the sockets into the tracker.
    fn refresh(&mut self) {
        let up = match self.sockets {
            Some(ref s) => s.tm.connected() && s.cmd.connected() && s.call.connected(),
            None => false,
        };

        self.tracker.observe_link(up, Instant::now());
    }
}

impl Transport for ZmqTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        // Drop any previous connection first
        self.sockets = None;
        self.tracker.begin_attempt(Instant::now());

        match self.open_sockets() {
            Ok(s) => {
                debug!(
                    "Connecting to bridge at {}, {}, {}",
                    self.params.bridge_tm_endpoint,
                    self.params.bridge_cmd_endpoint,
                    self.params.bridge_call_endpoint
                );
                self.sockets = Some(s);
                Ok(())
            }
            Err(e) => {
                self.tracker.fail_attempt(e.to_string());
                Err(e)
            }
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.tracker.state()
    }

    fn poll_event(&mut self) -> Option<ConnectionEvent> {
        self.refresh();
        self.tracker.next_event()
    }

    fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        if let Some(ref s) = self.sockets {
            s.tm.set_subscribe(channel.as_bytes())
                .map_err(TransportError::RecvError)?;
        }

        self.subscriptions.insert(channel.to_string());

        Ok(())
    }

    fn unsubscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        if !self.subscriptions.remove(channel) {
            return Ok(());
        }

        if let Some(ref s) = self.sockets {
            s.tm.set_unsubscribe(channel.as_bytes())
                .map_err(TransportError::RecvError)?;
        }

        Ok(())
    }

    fn recv(&mut self) -> Option<Inbound> {
        let sockets = self.sockets.as_ref()?;

        loop {
            let parts = match sockets.tm.recv_multipart(zmq::DONTWAIT) {
                Ok(p) => p,
                Err(zmq::Error::EAGAIN) => return None,
                Err(e) => {
                    warn!("Could not recieve a message from the bridge: {}", e);
                    return None;
                }
            };

            if parts.len() != 2 {
                warn!(
                    "Dropping bridge message with {} parts, expected 2",
                    parts.len()
                );
                continue;
            }

            let channel = match std::str::from_utf8(&parts[0]) {
                Ok(c) => c,
                Err(_) => {
                    warn!("Dropping bridge message with a non UTF-8 channel name");
                    continue;
                }
            };

            // Topic filtering in ZMQ is by prefix, so check the channel exactly
            if !self.subscriptions.contains(channel) {
                continue;
            }

            match serde_json::from_slice(&parts[1]) {
                Ok(payload) => {
                    return Some(Inbound {
                        channel: channel.to_string(),
                        payload,
                        received: Instant::now(),
                    })
                }
                Err(e) => warn!("Dropping invalid JSON on {}: {}", channel, e),
            }
        }
    }

    fn publish(&mut self, channel: &str, payload: &Value) {
        let sockets = match (self.tracker.state(), self.sockets.as_ref()) {
            (ConnectionState::Connected, Some(s)) => s,
            _ => {
                trace!("Not connected, dropping publish on {}", channel);
                return;
            }
        };

        let payload_bytes = match serde_json::to_vec(payload) {
            Ok(b) => b,
            Err(e) => {
                warn!("Could not serialize the payload for {}: {}", channel, e);
                return;
            }
        };

        let parts = vec![channel.as_bytes().to_vec(), payload_bytes];
        if let Err(e) = sockets.cmd.send_multipart(parts, zmq::DONTWAIT) {
            warn!("Could not publish on {}: {}", channel, e);
        }
    }

    fn call(
        &mut self,
        endpoint: &str,
        request: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value, TransportError> {
        self.refresh();

        let sockets = match (self.tracker.state(), self.sockets.as_ref()) {
            (ConnectionState::Connected, Some(s)) => s,
            _ => return Err(TransportError::NotConnected),
        };

        let envelope = CallRequest {
            endpoint: endpoint.to_string(),
            request: request.clone(),
        };
        let request_str =
            serde_json::to_string(&envelope).map_err(TransportError::SerializationError)?;

        // -1 blocks until a reply arrives
        let rcvtimeo = match timeout {
            Some(t) => i32::try_from(t.as_millis()).unwrap_or(i32::MAX),
            None => -1,
        };
        sockets
            .call
            .set_rcvtimeo(rcvtimeo)
            .map_err(TransportError::RecvError)?;

        sockets
            .call
            .send(&request_str, 0)
            .map_err(TransportError::SendError)?;

        let reply_str = match sockets.call.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => return Err(TransportError::NonUtf8Response),
            Err(zmq::Error::EAGAIN) => return Err(TransportError::Timeout(endpoint.to_string())),
            Err(e) => return Err(TransportError::RecvError(e)),
        };

        let reply: CallReply =
            serde_json::from_str(&reply_str).map_err(TransportError::DeserializeError)?;

        if reply.ok {
            Ok(reply.response)
        } else {
            Err(TransportError::Rejected {
                endpoint: endpoint.to_string(),
                reason: reply.error.unwrap_or_default(),
            })
        }
    }

    fn close(&mut self) {
        self.sockets = None;
        self.subscriptions.clear();
        self.tracker.close();
    }
}
