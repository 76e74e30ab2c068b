//! # Continuous Input Loop
//!
//! Turns held joystick input into a stream of velocity commands at a fixed rate.
//!
//! The loop is `Idle` until the input leaves the deadzone, when it becomes `Active` and schedules
//! its first command one period later. While active every tick sends the latest input, scaled by
//! the speed scale. Ticks missed because `poll` was called late are skipped, never sent in a
//! burst. When the input returns to exactly neutral the loop goes back to `Idle` and sends a
//! single stop command, so the vehicle doesn't keep flying on the last command.
//!
//! There is only ever one schedule. Input arriving while active updates the vector the next tick
//! reads, it does not start a new schedule.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::time::{Duration, Instant};

use crate::{
    cmd_dispatch::{VelocityCmd, VelocitySink},
    params::InputParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct InputLoop {
    params: InputParams,

    period: Duration,

    /// Latest input, written by input events and read by each tick
    input: VelocityCmd,

    speed_scale: f64,

    state: InputState,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Idle,

    Active {
        /// Time at which the next command is due
        next_tick: Instant,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl InputLoop {
    pub fn new(params: &InputParams) -> Self {
        let mut input_loop = Self {
            params: params.clone(),
            period: params.period(),
            input: VelocityCmd::STOP,
            speed_scale: 1.0,
            state: InputState::Idle,
        };
        input_loop.set_speed_scale(params.speed_scale);

        input_loop
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, InputState::Active { .. })
    }

    pub fn input(&self) -> VelocityCmd {
        self.input
    }

    pub fn speed_scale(&self) -> f64 {
        self.speed_scale
    }

    /// Set the speed scale, clamped between 0 and the maximum. Applies from the next tick.
    pub fn set_speed_scale(&mut self, scale: f64) {
        if !scale.is_finite() {
            warn!("Ignoring speed scale {}", scale);
            return;
        }

        self.speed_scale = util::maths::clamp(&scale, &0.0, &self.params.max_speed_scale);
    }

    /// Update the held input at time `now`.
    pub fn set_input<S: VelocitySink>(&mut self, input: VelocityCmd, now: Instant, sink: &mut S) {
        if !input.is_finite() {
            warn!("Ignoring non-finite input {:?}", input);
            return;
        }

        self.input = input;

        match self.state {
            InputState::Idle => {
                if input.max_abs() > self.params.deadzone {
                    debug!("Input active");
                    self.state = InputState::Active {
                        next_tick: now + self.period,
                    };
                }
            }
            InputState::Active { .. } => {
                if input.is_stop() {
                    debug!("Input released");
                    self.state = InputState::Idle;
                    sink.send_velocity(&VelocityCmd::STOP);
                }
            }
        }
    }

    /// Stop immediately, whatever the input is.
    ///
    /// The held input is cleared and a stop command sent, even if the loop was already idle.
    pub fn emergency_stop<S: VelocitySink>(&mut self, sink: &mut S) {
        info!("Emergency stop");
        self.input = VelocityCmd::STOP;
        self.state = InputState::Idle;
        sink.send_velocity(&VelocityCmd::STOP);
    }

    /// Send the command for the current tick if one is due at `now`.
    pub fn poll<S: VelocitySink>(&mut self, now: Instant, sink: &mut S) {
        let next_tick = match self.state {
            InputState::Active { next_tick } => next_tick,
            InputState::Idle => return,
        };

        if now < next_tick {
            return;
        }

        sink.send_velocity(&self.input.scaled(self.speed_scale));

        // Skip any ticks which have already been missed
        let mut next_tick = next_tick + self.period;
        while next_tick <= now {
            next_tick += self.period;
        }

        self.state = InputState::Active { next_tick };
    }

    /// Stop the loop at the end of a session, sending a final stop command.
    pub fn shutdown<S: VelocitySink>(&mut self, sink: &mut S) {
        self.input = VelocityCmd::STOP;
        self.state = InputState::Idle;
        sink.send_velocity(&VelocityCmd::STOP);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    impl VelocitySink for Vec<VelocityCmd> {
        fn send_velocity(&mut self, cmd: &VelocityCmd) {
            self.push(*cmd)
        }
    }

    fn ms(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    #[test]
    fn test_held_input_for_100ms() {
        let mut input_loop = InputLoop::new(&InputParams::default());
        let mut sent = Vec::new();
        let t0 = Instant::now();
        let forward = VelocityCmd::new(0.5, 0.0, 0.0, 0.0);

        input_loop.set_input(forward, t0, &mut sent);
        for t in (0..=100).step_by(10) {
            input_loop.poll(ms(t0, t), &mut sent);
        }
        assert_eq!(sent, vec![forward, forward]);

        input_loop.set_input(VelocityCmd::STOP, ms(t0, 100), &mut sent);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2], VelocityCmd::STOP);
        assert_eq!(input_loop.state(), InputState::Idle);

        // The schedule is gone
        input_loop.poll(ms(t0, 500), &mut sent);
        assert_eq!(sent.len(), 3);
    }

    #[test]
    fn test_deadzone() {
        let mut input_loop = InputLoop::new(&InputParams::default());
        let mut sent = Vec::new();
        let t0 = Instant::now();

        input_loop.set_input(VelocityCmd::new(0.04, 0.0, -0.05, 0.0), t0, &mut sent);
        input_loop.poll(ms(t0, 200), &mut sent);
        assert!(!input_loop.is_active());
        assert!(sent.is_empty());

        // Small but not neutral input keeps an active loop going
        input_loop.set_input(VelocityCmd::new(0.0, 0.0, 0.0, 0.3), t0, &mut sent);
        input_loop.set_input(VelocityCmd::new(0.0, 0.0, 0.0, 0.01), t0, &mut sent);
        assert!(input_loop.is_active());
        input_loop.poll(ms(t0, 50), &mut sent);
        assert_eq!(sent, vec![VelocityCmd::new(0.0, 0.0, 0.0, 0.01)]);
    }

    #[test]
    fn test_no_duplicate_schedule() {
        let mut input_loop = InputLoop::new(&InputParams::default());
        let mut sent = Vec::new();
        let t0 = Instant::now();

        // Repeated input events do not push the first tick back or add ticks
        for t in 0..5 {
            let cmd = VelocityCmd::new((t + 1) as f64, 0.0, 0.0, 0.0);
            input_loop.set_input(cmd, ms(t0, t * 10), &mut sent);
        }
        input_loop.poll(ms(t0, 50), &mut sent);
        input_loop.poll(ms(t0, 50), &mut sent);
        assert_eq!(sent, vec![VelocityCmd::new(5.0, 0.0, 0.0, 0.0)]);

        // Late poll sends once and skips the missed ticks
        input_loop.poll(ms(t0, 330), &mut sent);
        assert_eq!(sent.len(), 2);
        input_loop.poll(ms(t0, 340), &mut sent);
        assert_eq!(sent.len(), 2);
        input_loop.poll(ms(t0, 350), &mut sent);
        assert_eq!(sent.len(), 3);
    }

    #[test]
    fn test_emergency_stop() {
        let mut input_loop = InputLoop::new(&InputParams::default());
        let mut sent = Vec::new();
        let t0 = Instant::now();

        input_loop.set_input(VelocityCmd::new(1.0, 1.0, 0.0, 0.0), t0, &mut sent);
        input_loop.emergency_stop(&mut sent);

        assert_eq!(sent, vec![VelocityCmd::STOP]);
        assert_eq!(input_loop.input(), VelocityCmd::STOP);
        input_loop.poll(ms(t0, 1000), &mut sent);
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn test_speed_scale() {
        let mut input_loop = InputLoop::new(&InputParams::default());
        let mut sent = Vec::new();
        let t0 = Instant::now();

        assert_eq!(input_loop.speed_scale(), 1.0);
        input_loop.set_speed_scale(9.0);
        assert_eq!(input_loop.speed_scale(), 5.0);
        input_loop.set_speed_scale(std::f64::NAN);
        assert_eq!(input_loop.speed_scale(), 5.0);
        input_loop.set_speed_scale(2.0);

        input_loop.set_input(VelocityCmd::new(0.5, 0.0, -0.25, 0.0), t0, &mut sent);
        input_loop.poll(ms(t0, 50), &mut sent);
        assert_eq!(sent, vec![VelocityCmd::new(1.0, 0.0, -0.5, 0.0)]);
    }
}
