//! # Mock Transport
//!
//! An in-memory [`Transport`] which never touches the network. The link state is scripted by the
//! test, inbound messages are injected by hand, and every publish and call is recorded so it can
//! be inspected afterwards. Calls are answered from per-endpoint scripted responses.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde_json::Value;
use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    time::{Duration, Instant},
};

use super::{
    ConnectionEvent, ConnectionState, ConnectionTracker, Inbound, Transport, TransportError,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MockTransport {
    link_up: bool,

    tracker: ConnectionTracker,

    subscriptions: BTreeSet<String>,

    inbound: VecDeque<Inbound>,

    responses: HashMap<String, MockResponse>,

    published: Vec<Published>,

    calls: Vec<Call>,
}

/// A recorded publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub channel: String,
    pub payload: Value,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub endpoint: String,
    pub request: Value,
    pub timeout: Option<Duration>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum MockResponse {
    Respond(Value),
    Fail(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MockTransport {
    /// Create a mock whose bridge is reachable. The mock still has to be connected.
    pub fn new() -> Self {
        Self {
            link_up: true,
            tracker: ConnectionTracker::new(Duration::from_secs(1)),
            subscriptions: BTreeSet::new(),
            inbound: VecDeque::new(),
            responses: HashMap::new(),
            published: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// Create a mock whose bridge cannot be reached, any connection attempt fails.
    pub fn unreachable() -> Self {
        Self {
            link_up: false,
            ..Self::new()
        }
    }

    /// Create a mock which is already connected, with the `Connected` event still pending.
    pub fn connected() -> Self {
        let mut mock = Self::new();
        mock.tracker.begin_attempt(Instant::now());
        mock.tracker.observe_link(true, Instant::now());
        mock
    }

    /// Bring the link up or down.
    pub fn set_link(&mut self, up: bool) {
        self.link_up = up;
        self.tracker.observe_link(up, Instant::now());
    }

    /// Deliver a message from the bridge. Dropped unless the channel is subscribed.
    pub fn inject(&mut self, channel: &str, payload: Value) {
        self.inject_at(channel, payload, Instant::now());
    }

    /// Deliver a message from the bridge as if it had been received at `received`.
    pub fn inject_at(&mut self, channel: &str, payload: Value, received: Instant) {
        if self.subscriptions.contains(channel) {
            self.inbound.push_back(Inbound {
                channel: channel.to_string(),
                payload,
                received,
            });
        }
    }

    /// Answer every call to `endpoint` with `response`.
    pub fn respond(&mut self, endpoint: &str, response: Value) {
        self.responses
            .insert(endpoint.to_string(), MockResponse::Respond(response));
    }

    /// Reject every call to `endpoint`.
    pub fn fail(&mut self, endpoint: &str) {
        self.responses.insert(
            endpoint.to_string(),
            MockResponse::Fail(String::from("rejected by mock")),
        );
    }

    pub fn published(&self) -> &[Published] {
        &self.published
    }

    pub fn published_on(&self, channel: &str) -> Vec<&Value> {
        self.published
            .iter()
            .filter(|p| p.channel == channel)
            .map(|p| &p.payload)
            .collect()
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn calls_to(&self, endpoint: &str) -> Vec<&Call> {
        self.calls.iter().filter(|c| c.endpoint == endpoint).collect()
    }

    pub fn subscriptions(&self) -> Vec<&str> {
        self.subscriptions.iter().map(|s| s.as_str()).collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.tracker.begin_attempt(Instant::now());

        if self.link_up {
            self.tracker.observe_link(true, Instant::now());
        } else {
            self.tracker
                .fail_attempt(String::from("bridge unreachable"));
        }

        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.tracker.state()
    }

    fn poll_event(&mut self) -> Option<ConnectionEvent> {
        self.tracker.next_event()
    }

    fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        self.subscriptions.insert(channel.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        self.subscriptions.remove(channel);
        self.inbound.retain(|m| m.channel != channel);
        Ok(())
    }

    fn recv(&mut self) -> Option<Inbound> {
        self.inbound.pop_front()
    }

    fn publish(&mut self, channel: &str, payload: &Value) {
        if self.tracker.state() != ConnectionState::Connected {
            return;
        }

        self.published.push(Published {
            channel: channel.to_string(),
            payload: payload.clone(),
        });
    }

    fn call(
        &mut self,
        endpoint: &str,
        request: &Value,
        timeout: Option<Duration>,
    ) -> Result<Value, TransportError> {
        if self.tracker.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }

        self.calls.push(Call {
            endpoint: endpoint.to_string(),
            request: request.clone(),
            timeout,
        });

        match self.responses.get(endpoint) {
            Some(MockResponse::Respond(v)) => Ok(v.clone()),
            Some(MockResponse::Fail(reason)) => Err(TransportError::Rejected {
                endpoint: endpoint.to_string(),
                reason: reason.clone(),
            }),
            // Nothing ever answers an unscripted endpoint
            None => Err(TransportError::Timeout(endpoint.to_string())),
        }
    }

    fn close(&mut self) {
        self.subscriptions.clear();
        self.inbound.clear();
        self.tracker.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_events() {
        let mut mock = MockTransport::new();
        mock.connect().unwrap();
        assert_eq!(mock.poll_event(), Some(ConnectionEvent::Connected));
        assert_eq!(mock.poll_event(), None);

        let mut mock = MockTransport::unreachable();
        mock.connect().unwrap();
        assert!(matches!(mock.poll_event(), Some(ConnectionEvent::Errored(_))));
        assert_eq!(mock.connection_state(), ConnectionState::Errored);
    }

    #[test]
    fn test_disconnected_publish_and_call() {
        let mut mock = MockTransport::new();
        mock.respond("/arm", json!({"success": true}));

        mock.publish("/move", &json!({}));
        assert!(matches!(
            mock.call("/arm", &json!({}), None),
            Err(TransportError::NotConnected)
        ));

        assert!(mock.published().is_empty());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_scripted_calls() {
        let mut mock = MockTransport::connected();
        mock.respond("/arm", json!({"success": true}));
        mock.fail("/land");

        assert_eq!(
            mock.call("/arm", &json!({}), None).unwrap(),
            json!({"success": true})
        );
        assert!(matches!(
            mock.call("/land", &json!({}), None),
            Err(TransportError::Rejected { .. })
        ));
        assert!(matches!(
            mock.call("/unknown", &json!({}), Some(Duration::from_millis(5))),
            Err(TransportError::Timeout(_))
        ));

        assert_eq!(mock.calls().len(), 3);
        assert_eq!(mock.calls_to("/land").len(), 1);
    }

    #[test]
    fn test_inject_requires_subscription() {
        let mut mock = MockTransport::connected();
        mock.subscribe("/a").unwrap();

        mock.inject("/a", json!(1));
        mock.inject("/b", json!(2));
        mock.inject("/a", json!(3));

        let received: Vec<Value> = std::iter::from_fn(|| mock.recv())
            .map(|m| m.payload)
            .collect();
        assert_eq!(received, vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_inject_keeps_receive_time() {
        let mut mock = MockTransport::connected();
        mock.subscribe("/a").unwrap();
        let t0 = Instant::now();

        mock.inject_at("/a", json!(1), t0 + Duration::from_millis(20));
        mock.inject_at("/a", json!(2), t0 + Duration::from_millis(10));

        let times: Vec<Instant> = std::iter::from_fn(|| mock.recv()).map(|m| m.received).collect();
        assert_eq!(
            times,
            vec![t0 + Duration::from_millis(20), t0 + Duration::from_millis(10)]
        );
    }
}
