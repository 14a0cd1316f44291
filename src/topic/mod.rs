//! The `topic` module decides which subscription filters an inbound topic
//! belongs to.
//!
//! Topics and filters are `/`-delimited level sequences. Inside a filter a
//! level consisting solely of `*` matches exactly one topic level, and a final
//! level consisting solely of `>` matches that level and everything after it.
//! Any other level, including ones that merely contain `*` or `>`, is compared
//! literally and case-sensitively.

pub mod filter;

pub use filter::{Level, TopicFilter, matches, validate_topic};
