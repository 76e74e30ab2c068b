//! # Console Session
//!
//! A console session owns the connection to the bridge and every component fed by it. Starting
//! the session connects and subscribes the telemetry channels, each cycle routes whatever has
//! arrived to the component owning the channel and runs the input loop, and tearing it down
//! stops the vehicle, releases every subscription and closes the transport.
//!
//! Teardown also happens when the session is dropped, so a session can't be forgotten with the
//! input loop still commanding the vehicle.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Instant;

use comms_if::{
    msg::{
        self,
        sensor::{CloudFrameMsg, LaserScanMsg},
        telem::{BatteryMsg, PoseStampedMsg, StateMsg, TwistStampedMsg},
    },
    net::{
        ChannelNames, ConnectionEvent, ConnectionState, Inbound, NetParams, Transport,
        TransportError,
    },
};

use crate::{
    cloud::PointCloudAccumulator,
    cmd_dispatch::{CommandDispatcher, VelocityCmd},
    history::RollingHistory,
    input_loop::InputLoop,
    params::GcsExecParams,
    state_agg::{StateAggregator, TelemetrySample, VehicleState},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ConsoleSession<T: Transport> {
    dispatcher: CommandDispatcher<T>,

    channels: ChannelNames,

    aggregator: StateAggregator,

    history: RollingHistory<TelemetrySample>,

    cloud: PointCloudAccumulator,

    input: InputLoop,

    max_messages_per_cycle: usize,

    /// Receive times are measured from this instant
    epoch: Instant,

    torn_down: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: Transport> ConsoleSession<T> {
    pub fn new(transport: T, net_params: &NetParams, params: &GcsExecParams) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(transport, net_params, &params.dispatch),
            channels: net_params.channels.clone(),
            aggregator: StateAggregator::new(),
            history: RollingHistory::new(params.history.capacity),
            cloud: PointCloudAccumulator::new(&params.cloud),
            input: InputLoop::new(&params.input),
            max_messages_per_cycle: params.max_messages_per_cycle,
            epoch: Instant::now(),
            torn_down: false,
        }
    }

    /// Connect to the bridge and subscribe to the telemetry channels.
    ///
    /// The outcome of the connection is reported as an event by a later [`Self::cycle`].
    pub fn start(&mut self) -> Result<(), TransportError> {
        let transport = self.dispatcher.transport_mut();

        transport.connect()?;

        for channel in self.channels.telemetry().iter() {
            transport.subscribe(channel)?;
            debug!("Subscribed to {}", channel);
        }

        self.torn_down = false;

        Ok(())
    }

    /// Run one cycle of the session at time `now`.
    ///
    /// At most `max_messages_per_cycle` inbound messages are routed, anything left is routed by
    /// later cycles in order. Returns the connection events which occurred since the last cycle.
    pub fn cycle(&mut self, now: Instant) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();

        while let Some(event) = self.dispatcher.transport_mut().poll_event() {
            if event != ConnectionEvent::Connected && self.input.is_active() {
                warn!("Bridge connection lost while commanding, stopping the input loop");
                self.input.emergency_stop(&mut self.dispatcher);
            }

            events.push(event);
        }

        let mut num_routed = 0;
        while num_routed < self.max_messages_per_cycle {
            match self.dispatcher.transport_mut().recv() {
                Some(inbound) => self.route(inbound),
                None => break,
            }
            num_routed += 1;
        }
        if num_routed == self.max_messages_per_cycle {
            trace!("Routed {} messages, the rest wait for the next cycle", num_routed);
        }

        self.input.poll(now, &mut self.dispatcher);

        events
    }

    /// Stop the vehicle, release every subscription and close the transport.
    ///
    /// Does nothing if the session has already been torn down.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }

        info!("Tearing down the console session");

        self.input.shutdown(&mut self.dispatcher);

        let transport = self.dispatcher.transport_mut();
        for channel in self.channels.telemetry().iter() {
            if let Err(e) = transport.unsubscribe(channel) {
                warn!("Could not unsubscribe from {}: {}", channel, e);
            }
        }
        transport.close();

        self.torn_down = true;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.dispatcher.transport().connection_state()
    }

    pub fn vehicle_state(&self) -> &VehicleState {
        self.aggregator.state()
    }

    pub fn history(&self) -> &RollingHistory<TelemetrySample> {
        &self.history
    }

    pub fn cloud(&self) -> &PointCloudAccumulator {
        &self.cloud
    }

    pub fn cloud_mut(&mut self) -> &mut PointCloudAccumulator {
        &mut self.cloud
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<T> {
        &self.dispatcher
    }

    /// Access the dispatcher to send commands.
    pub fn dispatcher_mut(&mut self) -> &mut CommandDispatcher<T> {
        &mut self.dispatcher
    }

    pub fn input_loop(&self) -> &InputLoop {
        &self.input
    }

    /// Update the held joystick input.
    pub fn set_input(&mut self, input: VelocityCmd, now: Instant) {
        self.input.set_input(input, now, &mut self.dispatcher);
    }

    pub fn set_speed_scale(&mut self, scale: f64) {
        self.input.set_speed_scale(scale);
    }

    pub fn emergency_stop(&mut self) {
        self.input.emergency_stop(&mut self.dispatcher);
    }

    /// Seconds elapsed between the start of the session and `received`.
    fn receive_time_s(&self, received: Instant) -> f64 {
        received.saturating_duration_since(self.epoch).as_secs_f64()
    }

    /// Pass an inbound message to the component owning its channel.
    fn route(&mut self, inbound: Inbound) {
        let channel = inbound.channel.as_str();
        let payload = &inbound.payload;

        if channel == self.channels.state {
            if let Some(m) = decode::<StateMsg>("state", channel, payload) {
                self.aggregator.handle_state(&m);
            }
        } else if channel == self.channels.battery {
            if let Some(m) = decode::<BatteryMsg>("battery", channel, payload) {
                self.aggregator.handle_battery(&m);
            }
        } else if channel == self.channels.velocity {
            if let Some(m) = decode::<TwistStampedMsg>("velocity", channel, payload) {
                self.aggregator.handle_velocity(&m);
            }
        } else if channel == self.channels.pose {
            if let Some(m) = decode::<PoseStampedMsg>("pose", channel, payload) {
                let now_s = self.receive_time_s(inbound.received);

                if let Some(sample) = self.aggregator.handle_pose(&m, now_s) {
                    self.history.push(sample);
                }
            }
        } else if channel == self.channels.scan {
            if let Some(m) = decode::<LaserScanMsg>("scan", channel, payload) {
                self.cloud.ingest_scan(&m, self.aggregator.state());
            }
        } else if channel == self.channels.cloud {
            if let Some(m) = decode::<CloudFrameMsg>("cloud", channel, payload) {
                self.cloud.ingest_cloud(&m);
            }
        } else {
            trace!("Message on unrouted channel {}", channel);
        }
    }
}

impl<T: Transport> Drop for ConsoleSession<T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn decode<M: DeserializeOwned>(kind: &'static str, channel: &str, payload: &Value) -> Option<M> {
    match msg::decode(kind, payload) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("Dropping message on {}: {}", channel, e);
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::net::mock::MockTransport;
    use serde_json::json;
    use std::time::Duration;

    const MOVE: &str = "/commander/move_relative";

    fn session(mock: MockTransport) -> ConsoleSession<MockTransport> {
        ConsoleSession::new(mock, &NetParams::default(), &GcsExecParams::default())
    }

    fn inject(s: &mut ConsoleSession<MockTransport>, channel: &str, payload: Value) {
        s.dispatcher_mut().transport_mut().inject(channel, payload);
    }

    fn inject_at(
        s: &mut ConsoleSession<MockTransport>,
        channel: &str,
        payload: Value,
        received: Instant,
    ) {
        s.dispatcher_mut()
            .transport_mut()
            .inject_at(channel, payload, received);
    }

    fn pose(z: f64) -> Value {
        json!({
            "pose": {
                "position": {"x": 1.0, "y": 2.0, "z": z},
                "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}
            }
        })
    }

    #[test]
    fn test_start_subscribes_telemetry() {
        let mut s = session(MockTransport::new());
        s.start().unwrap();

        let events = s.cycle(Instant::now());
        assert_eq!(events, vec![ConnectionEvent::Connected]);
        assert_eq!(s.connection_state(), ConnectionState::Connected);
        assert_eq!(s.dispatcher().transport().subscriptions().len(), 6);

        let mut s = session(MockTransport::unreachable());
        s.start().unwrap();
        assert!(matches!(
            s.cycle(Instant::now()).as_slice(),
            [ConnectionEvent::Errored(_)]
        ));
    }

    #[test]
    fn test_routes_telemetry() {
        let mut s = session(MockTransport::new());
        s.start().unwrap();
        let t0 = Instant::now();

        inject(
            &mut s,
            "/mavros/state",
            json!({"connected": true, "armed": true, "mode": "GUIDED"}),
        );
        inject(&mut s, "/mavros/battery", json!({"percentage": 0.5}));
        inject_at(&mut s, "/mavros/local_position/pose", pose(3.0), t0);
        s.cycle(t0);

        let state = s.vehicle_state();
        assert!(state.armed);
        assert_eq!(state.battery_percent, 50);
        assert_eq!(state.altitude_m(), 3.0);

        // No velocity yet so no sample
        assert!(s.history().is_empty());

        inject(
            &mut s,
            "/mavros/local_position/velocity_local",
            json!({"twist": {"linear": {"x": 0.0, "y": 0.0, "z": 1.0},
                             "angular": {"x": 0.0, "y": 0.0, "z": 0.0}}}),
        );
        inject_at(
            &mut s,
            "/mavros/local_position/pose",
            pose(4.0),
            t0 + Duration::from_millis(500),
        );
        s.cycle(t0 + Duration::from_millis(500));

        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history().latest().map(|h| h.altitude_m), Some(4.0));
        assert!((s.vehicle_state().vertical_speed_ms - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_poses_in_one_cycle_use_their_receive_times() {
        let mut s = session(MockTransport::new());
        s.start().unwrap();
        let t0 = Instant::now();

        inject_at(&mut s, "/mavros/local_position/pose", pose(0.0), t0);
        inject_at(
            &mut s,
            "/mavros/local_position/pose",
            pose(1.0),
            t0 + Duration::from_millis(100),
        );
        s.cycle(t0 + Duration::from_millis(200));

        assert!((s.vehicle_state().vertical_speed_ms - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_messages_per_cycle_bounded() {
        let params = GcsExecParams {
            max_messages_per_cycle: 2,
            ..Default::default()
        };
        let mut s = ConsoleSession::new(MockTransport::new(), &NetParams::default(), &params);
        s.start().unwrap();

        for percentage in [0.25, 0.5, 0.75].iter() {
            inject(&mut s, "/mavros/battery", json!({ "percentage": percentage }));
        }

        s.cycle(Instant::now());
        assert_eq!(s.vehicle_state().battery_percent, 50);

        s.cycle(Instant::now());
        assert_eq!(s.vehicle_state().battery_percent, 75);
    }

    #[test]
    fn test_malformed_message_dropped() {
        let mut s = session(MockTransport::new());
        s.start().unwrap();

        inject(&mut s, "/mavros/battery", json!({"percentage": 0.25}));
        inject(&mut s, "/mavros/battery", json!({"percentage": "lots"}));
        inject(&mut s, "/mavros/local_position/pose", json!({"pose": null}));
        inject(&mut s, "/mavros/state", json!({"armed": false, "mode": "RTL"}));
        s.cycle(Instant::now());

        assert_eq!(s.vehicle_state().battery_percent, 25);
        assert_eq!(s.vehicle_state().mode.as_str(), "RTL");
    }

    #[test]
    fn test_scan_uses_current_pose() {
        let mut s = session(MockTransport::new());
        s.start().unwrap();

        inject(&mut s, "/mavros/local_position/pose", pose(10.0));
        inject(&mut s, "/scan", json!({"angle_min": 0.0, "ranges": [2.0, null]}));
        s.cycle(Instant::now());

        let points: Vec<_> = s.cloud().buffer().iter().collect();
        assert_eq!(points.len(), 1);
        assert!((points[0][0] - 3.0).abs() < 1e-5);
        assert!((points[0][2] - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_arm_disconnected_leaves_state() {
        let mut s = session(MockTransport::unreachable());
        s.start().unwrap();
        s.cycle(Instant::now());

        assert!(!s.dispatcher_mut().arm());
        assert!(!s.vehicle_state().armed);
    }

    #[test]
    fn test_input_through_session() {
        let mut s = session(MockTransport::new());
        s.start().unwrap();
        let t0 = Instant::now();
        s.cycle(t0);

        s.set_input(VelocityCmd::new(0.5, 0.0, 0.0, 0.0), t0);
        for t in (0..=100).step_by(25) {
            s.cycle(t0 + Duration::from_millis(t));
        }
        s.set_input(VelocityCmd::STOP, t0 + Duration::from_millis(100));
        s.cycle(t0 + Duration::from_millis(300));

        let moves = s.dispatcher().transport().published_on(MOVE);
        assert_eq!(moves.len(), 3);
        assert_eq!(moves[0]["linear"]["x"], json!(0.5));
        assert_eq!(moves[1]["linear"]["x"], json!(0.5));
        assert_eq!(moves[2]["linear"]["x"], json!(0.0));
    }

    #[test]
    fn test_teardown_stops_once() {
        let mut s = session(MockTransport::new());
        s.start().unwrap();
        let t0 = Instant::now();
        s.cycle(t0);

        s.set_input(VelocityCmd::new(0.0, 1.0, 0.0, 0.0), t0);
        s.teardown();
        s.teardown();

        let mock = s.dispatcher().transport();
        let moves = mock.published_on(MOVE);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0]["linear"], json!({"x": 0.0, "y": 0.0, "z": 0.0}));
        assert!(mock.subscriptions().is_empty());
        assert_eq!(s.connection_state(), ConnectionState::Disconnected);
        assert!(!s.input_loop().is_active());

        // Ticks no longer send anything
        s.cycle(t0 + Duration::from_secs(1));
        assert_eq!(s.dispatcher().transport().published_on(MOVE).len(), 1);
    }

    #[test]
    fn test_link_loss_stops_input() {
        let mut s = session(MockTransport::new());
        s.start().unwrap();
        let t0 = Instant::now();
        s.cycle(t0);

        s.set_input(VelocityCmd::new(1.0, 0.0, 0.0, 0.0), t0);
        s.dispatcher_mut().transport_mut().set_link(false);

        let events = s.cycle(t0 + Duration::from_millis(10));
        assert_eq!(events, vec![ConnectionEvent::Disconnected]);
        assert!(!s.input_loop().is_active());
    }
}
