//! # Connection Tracker
//!
//! Turns raw observations of the link (up or down) into connection events, so that every
//! transport reports its lifecycle the same way:
//!
//! - each connection attempt ends in exactly one `Connected` or `Errored` event,
//! - an established link which goes down produces one `Disconnected` event,
//! - no event is ever repeated for the same transition.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use super::{ConnectionEvent, ConnectionState};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    state: ConnectionState,

    /// Time the current attempt started, if one is in progress
    attempt_start: Option<Instant>,

    connect_timeout: Duration,

    pending: VecDeque<ConnectionEvent>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ConnectionTracker {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt_start: None,
            connect_timeout,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Start a new connection attempt.
    pub fn begin_attempt(&mut self, now: Instant) {
        // A live link being replaced counts as lost
        if self.state == ConnectionState::Connected {
            self.transition(ConnectionState::Disconnected, ConnectionEvent::Disconnected);
        }

        self.state = ConnectionState::Connecting;
        self.attempt_start = Some(now);
    }

    /// Fail the attempt in progress.
    pub fn fail_attempt(&mut self, reason: String) {
        if self.state == ConnectionState::Connecting {
            self.attempt_start = None;
            self.transition(ConnectionState::Errored, ConnectionEvent::Errored(reason));
        }
    }

    /// Update the tracker with whether the link is currently up.
    pub fn observe_link(&mut self, up: bool, now: Instant) {
        match (self.state, up) {
            (ConnectionState::Connecting, true) => {
                self.attempt_start = None;
                self.transition(ConnectionState::Connected, ConnectionEvent::Connected);
            }
            (ConnectionState::Connecting, false) => {
                let timed_out = self
                    .attempt_start
                    .map(|s| now.saturating_duration_since(s) >= self.connect_timeout)
                    .unwrap_or(false);

                if timed_out {
                    self.fail_attempt(format!(
                        "not connected within {} ms",
                        self.connect_timeout.as_millis()
                    ));
                }
            }
            (ConnectionState::Connected, false) => {
                self.transition(ConnectionState::Disconnected, ConnectionEvent::Disconnected);
            }
            // The transport re-established a lost link on its own
            (ConnectionState::Disconnected, true) if self.attempt_start.is_none() => {
                self.transition(ConnectionState::Connected, ConnectionEvent::Connected);
            }
            _ => (),
        }
    }

    /// Mark the connection as closed by the user.
    pub fn close(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                self.transition(ConnectionState::Disconnected, ConnectionEvent::Disconnected)
            }
            ConnectionState::Connecting => {
                self.fail_attempt(String::from("closed before connecting"));
                self.state = ConnectionState::Disconnected;
            }
            ConnectionState::Errored | ConnectionState::Disconnected => {
                self.state = ConnectionState::Disconnected
            }
        }

        self.attempt_start = None;
    }

    /// Take the next pending event.
    pub fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.pending.pop_front()
    }

    fn transition(&mut self, state: ConnectionState, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Errored(ref reason) => warn!("Bridge connection failed: {}", reason),
            ref e => info!("Bridge connection {:?}", e),
        }

        self.state = state;
        self.pending.push_back(event);
    }
}
