//! BSP-Simulation: deterministic synthetic biosignals
//!
//! Seeded pulse trains with known event locations, used as fixtures for
//! detection tests and benchmarks.

pub mod pulse_train;
pub mod signal_patterns;

pub use pulse_train::*;
pub use signal_patterns::*;
