//! Error enums returned at each crate boundary.
//!
//! The three kinds mirror spec §7: configuration errors are caught at load
//! time, kernel errors are fatal invariant violations inside a running
//! simulation, and [`SimError`] is the top-level enum the CLI matches on to
//! choose an exit code.

use thiserror::Error;

/// Schema or range violation discovered while loading or validating a
/// [`Config`](crate). Fatal at load time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// A three-point distribution had `low > mode` or `mode > high`.
    #[error("distribution {name} is not ordered: low={low} mode={mode} high={high}")]
    DistributionNotOrdered {
        /// Field name the distribution was declared under.
        name: String,
        low: f64,
        mode: f64,
        high: f64,
    },

    /// A group of probabilities that are sampled as a CDF summed to more
    /// than 1.
    #[error("probability group {name} sums to {sum} (must be <= 1)")]
    ProbabilityGroupExceedsOne {
        /// Name of the probability group (e.g. `"booking_in_investigation"`).
        name: String,
        sum: f64,
    },

    /// A single probability field fell outside `[0, 1]`.
    #[error("probability {name} = {value} is out of range [0, 1]")]
    ProbabilityOutOfRange {
        name: String,
        value: f64,
    },

    /// `sim_hours` or `num_reps` was negative or otherwise nonsensical.
    #[error("{field} must be >= {min}, got {value}")]
    OutOfRange {
        field: String,
        min: f64,
        value: f64,
    },

    /// The config file could not be parsed as JSON.
    #[error("failed to parse config: {reason}")]
    ParseError { reason: String },

    /// The config file could not be read from disk.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// A fixed-length sequence (e.g. a 168-entry arrival schedule) had the
    /// wrong number of entries.
    #[error("{field} must have length {expected}, got {actual}")]
    WrongLength {
        field: String,
        expected: usize,
        actual: usize,
    },

    /// A catch-all for a field failing a validation rule not covered by the
    /// other variants.
    #[error("{field} is invalid: {reason}")]
    Invalid { field: String, reason: String },
}

/// A fatal invariant violation inside a running kernel.
///
/// Per spec §7 these always abort the run; there is no recovery path.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// A process tried to release a resource it does not hold.
    #[error("process {process} attempted to release unheld resource {resource}")]
    ReleaseUnheld { process: String, resource: String },

    /// `set_capacity` was called with a negative value.
    #[error("resource {resource} was set to negative capacity {capacity}")]
    NegativeCapacity { resource: String, capacity: i64 },

    /// A [`CollationProcess`](crate) saw more children arrive for a parent
    /// than its counter field specified.
    #[error(
        "collator {collator} received more children for parent {parent} than counter {counter} allows"
    )]
    CollatorOvercount {
        collator: String,
        parent: String,
        counter: String,
    },

    /// A distribution was constructed with `high < low`.
    #[error("distribution {name} has high ({high}) < low ({low})")]
    InvalidDistributionRange { name: String, low: f64, high: f64 },
}

/// Top-level error returned by `Model::run` and surfaced at the CLI / job
/// interface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Wraps a [`ConfigError`] encountered while building a `Model`.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Wraps a [`KernelError`] raised during a run.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let e = ConfigError::ProbabilityGroupExceedsOne {
            name: "cutup_type".into(),
            sum: 1.2,
        };
        assert_eq!(
            e.to_string(),
            "probability group cutup_type sums to 1.2 (must be <= 1)"
        );
    }

    #[test]
    fn sim_error_wraps_config_and_kernel() {
        let c: SimError = ConfigError::FileNotFound {
            path: "x.json".into(),
        }
        .into();
        assert!(matches!(c, SimError::Config(_)));

        let k: SimError = KernelError::NegativeCapacity {
            resource: "bms".into(),
            capacity: -1,
        }
        .into();
        assert!(matches!(k, SimError::Kernel(_)));
    }
}
