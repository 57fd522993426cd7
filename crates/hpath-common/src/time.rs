//! Conversion of distribution samples to the simulation's internal hour
//! scale.
//!
//! Every distribution in the config carries a [`TimeUnit`] fixed at
//! construction (spec §3: "Distribution samples are multiplied by a
//! time-unit factor ... chosen at distribution construction").

use serde::{Deserialize, Serialize};

/// The unit a raw distribution sample is expressed in, before conversion to
/// simulated hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Multiplier converting a value in this unit to hours.
    pub const fn factor(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0 / 3600.0,
            TimeUnit::Minutes => 1.0 / 60.0,
            TimeUnit::Hours => 1.0,
        }
    }

    /// Convert a raw sample expressed in this unit to hours.
    pub fn to_hours(self, value: f64) -> f64 {
        value * self.factor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_to_hours() {
        assert!((TimeUnit::Seconds.to_hours(3600.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn minutes_to_hours() {
        assert!((TimeUnit::Minutes.to_hours(60.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn hours_passthrough() {
        assert_eq!(TimeUnit::Hours.to_hours(2.5), 2.5);
    }
}
