//! # Communications interface crate.
//!
//! Provides the communications interfaces between the ground control station and the
//! flight-control bridge: the wire message types and the transport abstraction over which they
//! travel.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Message definitions for the bridge channels and endpoints
pub mod msg;

/// Network module
pub mod net;
