//! Main ground control station executable entry point.
//!
//! # Architecture
//!
//! The executable runs the console session headless:
//!
//!     - Initialise the session and logging
//!     - Load the network and executable parameters
//!     - Connect to the bridge and subscribe to the telemetry channels
//!     - Main loop:
//!         - Connection event handling
//!         - Telemetry routing to the state aggregator, history and point cloud
//!         - Input loop processing
//!         - Periodic telemetry summary
//!
//! The session is torn down if the connection to the bridge fails.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

// Internal
use comms_if::net::{zmq, ConnectionEvent, NetParams, Transport, ZmqTransport};
use gcs_lib::{console::ConsoleSession, params::GcsExecParams};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period between two telemetry summaries in the log
const SUMMARY_PERIOD: Duration = Duration::from_secs(1);

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new("gcs_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Ground Control Station Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let exec_params: GcsExecParams =
        util::params::load("gcs_exec.toml").wrap_err("Could not load gcs_exec params")?;
    exec_params
        .validate()
        .wrap_err("Invalid gcs_exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE NETWORK ----

    let zmq_ctx = zmq::Context::new();
    let transport = ZmqTransport::new(&zmq_ctx, &net_params);

    let mut console = ConsoleSession::new(transport, &net_params, &exec_params);
    console
        .start()
        .wrap_err("Failed to start the console session")?;

    info!("Connecting to the bridge at {}", net_params.bridge_tm_endpoint);

    // ---- MAIN LOOP ----

    let cycle_period = exec_params.cycle_period();
    let mut last_summary = Instant::now();

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        for event in console.cycle(cycle_start_instant) {
            if let ConnectionEvent::Errored(reason) = event {
                console.teardown();
                return Err(eyre!("Connection to the bridge failed: {}", reason));
            }
        }

        if cycle_start_instant.saturating_duration_since(last_summary) >= SUMMARY_PERIOD {
            log_summary(&console);
            last_summary = cycle_start_instant;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            ),
        }
    }
}

/// Log a one line summary of the vehicle's state.
fn log_summary<T: Transport>(console: &ConsoleSession<T>) {
    let state = console.vehicle_state();
    let attitude = state.attitude();

    info!(
        "{:?} | {} {} | bat {}% | pos ({:.2}, {:.2}, {:.2}) m | vz {:.2} m/s | \
        rpy ({:.1}, {:.1}, {:.1}) deg | hdg {:.0} {} | {} samples, {} points",
        console.connection_state(),
        if state.armed { "ARMED" } else { "DISARMED" },
        state.mode,
        state.battery_percent,
        state.position_m.x,
        state.position_m.y,
        state.position_m.z,
        state.vertical_speed_ms,
        attitude.roll.to_degrees(),
        attitude.pitch.to_degrees(),
        attitude.yaw.to_degrees(),
        state.heading_deg(),
        state.cardinal(),
        console.history().len(),
        console.cloud().buffer().len_points()
    );
}
