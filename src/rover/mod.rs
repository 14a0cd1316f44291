//! The `rover` module holds the application-level conventions for talking
//! to a rover over the broker: which topics commands and telemetry travel
//! on, and what a thrust command looks like on the wire.
//!
//! The session layer treats these strings as opaque; nothing here affects
//! routing or matching.

pub mod command;
pub mod link;

pub use command::{ThrustCommand, normalize_angle};
pub use link::{RoverLink, commands_topic, telemetry_topic};
