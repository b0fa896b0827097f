//! Progress reporting module
//!
//! Shows the current upload phase and a byte bar with throughput and ETA.

mod reporter;

pub use reporter::*;
