//! # RoverLink
//!
//! `roverlink` is a client for a topic-based publish/subscribe broker
//! reached over WebSockets, built to drive a rover by publishing thrust
//! commands and listening to its telemetry.
//!
//! ## Core Modules
//!
//! - `session`: The broker session state machine, the subscription
//!   registry, and lifecycle watchers.
//! - `topic`: Hierarchical topic filters with `*` and `>` wildcards.
//! - `transport`: The transport contract and its WebSocket implementation.
//! - `rover`: Rover topics and the thrust command payload.
//! - `config`: Loads settings from a config file and the environment.
//! - `utils`: Error types and logging setup.

pub mod config;
pub mod rover;
pub mod session;
pub mod topic;
pub mod transport;
pub mod utils;
