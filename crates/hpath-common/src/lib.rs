//! Shared types used across the histopathology lab simulation workspace.
//!
//! - [`error`]: error enums returned at each crate boundary.
//! - [`time`]: time-unit conversion to the simulation's internal hour scale.

pub mod error;
pub mod time;

pub use error::{ConfigError, KernelError, SimError};
pub use time::TimeUnit;
