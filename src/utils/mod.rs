//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `roverlink` crate.
//!
//! It centralizes the error types and the logging setup so every other
//! module reports failures and diagnostics the same way.

pub mod error;
pub mod logging;
