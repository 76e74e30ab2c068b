//! # Ground control station library.
//!
//! This library holds the telemetry and command core of the ground control station, so that it can
//! be driven by the headless executable or embedded in a user interface.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Attitude display damping
pub mod attitude;

/// Point cloud accumulator - builds a world frame map from scans and SLAM clouds
pub mod cloud;

/// Command dispatcher - typed flight commands over the transport
pub mod cmd_dispatch;

/// Console session - owns the transport and routes channels to the components
pub mod console;

/// Rolling history buffer - bounded FIFO of telemetry samples
pub mod history;

/// Continuous input loop - periodic velocity commands from held joystick input
pub mod input_loop;

/// Orientation maths - quaternions, angle wrapping and frame transforms
pub mod orient;

/// Executable parameters
pub mod params;

/// State aggregator - fuses the telemetry channels into the vehicle state
pub mod state_agg;
