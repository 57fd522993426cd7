//! Level monitors: time-stamped `(t, value)` logs used for WIP, capacity,
//! claimed-quantity, and queue-length series (spec §3 "Monitor (level)").

/// An append-only log of `(t, value)` samples, each holding until the next.
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    samples: Vec<(f64, f64)>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new level at time `t`. Samples must arrive in
    /// non-decreasing time order.
    pub fn record(&mut self, t: f64, value: f64) {
        debug_assert!(
            self.samples.last().map_or(true, |(pt, _)| t + 1e-9 >= *pt),
            "monitor samples must be time-ordered"
        );
        self.samples.push((t, value));
    }

    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The value of the step function at `t` (the last sample at or before
    /// `t`), or `None` before the first sample.
    pub fn value_at(&self, t: f64) -> Option<f64> {
        self.samples
            .iter()
            .rev()
            .find(|(st, _)| *st <= t)
            .map(|(_, v)| *v)
    }

    /// Time-weighted mean over `[t0, t1]`. `NaN` if there are no samples
    /// (an empty set has no mean; spec §8 "means over empty sets").
    pub fn mean(&self, t0: f64, t1: f64) -> f64 {
        if self.samples.is_empty() || t1 <= t0 {
            return f64::NAN;
        }
        let mut total = 0.0;
        let mut last_t = t0;
        let mut last_v = self
            .value_at(t0)
            .unwrap_or_else(|| self.samples[0].1);
        for &(t, v) in &self.samples {
            if t <= t0 {
                last_v = v;
                continue;
            }
            if t >= t1 {
                break;
            }
            total += last_v * (t - last_t);
            last_t = t;
            last_v = v;
        }
        total += last_v * (t1 - last_t);
        total / (t1 - t0)
    }

    /// Resample into one value per hour over `[0, sim_length]`: for each
    /// hour-interval, the time-weighted mean of the step function over that
    /// hour, forward-filling when the interval holds no sample.
    pub fn resample_hourly(&self, sim_length: f64) -> Vec<f64> {
        let hours = sim_length.ceil().max(0.0) as usize;
        (0..hours)
            .map(|h| {
                let t0 = h as f64;
                let t1 = ((h + 1) as f64).min(sim_length);
                if t1 <= t0 {
                    return f64::NAN;
                }
                self.mean(t0, t1)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mean_of_constant_level() {
        let mut m = Monitor::new();
        m.record(0.0, 5.0);
        assert_eq!(m.mean(0.0, 10.0), 5.0);
    }

    #[test]
    fn mean_weights_by_duration() {
        let mut m = Monitor::new();
        m.record(0.0, 0.0);
        m.record(1.0, 10.0);
        // level 0 for [0,1), level 10 for [1,2) -> mean over [0,2] = 5.0
        assert_eq!(m.mean(0.0, 2.0), 5.0);
    }

    #[test]
    fn empty_monitor_mean_is_nan() {
        let m = Monitor::new();
        assert!(m.mean(0.0, 1.0).is_nan());
    }

    #[test]
    fn hourly_resample_forward_fills() {
        let mut m = Monitor::new();
        m.record(0.0, 1.0);
        m.record(2.5, 3.0);
        let hourly = m.resample_hourly(4.0);
        assert_eq!(hourly.len(), 4);
        assert_eq!(hourly[0], 1.0);
        assert_eq!(hourly[1], 1.0);
        // hour [2,3): 0.5 at level 1, 0.5 at level 3 -> mean 2.0
        assert!((hourly[2] - 2.0).abs() < 1e-9);
        assert_eq!(hourly[3], 3.0);
    }

    proptest! {
        /// A time-weighted mean of a step function is a convex combination
        /// of the recorded levels, so it can never fall outside their range
        /// (spec §3 "Monitor (level): mean() ... is the time-weighted mean").
        #[test]
        fn mean_never_exceeds_the_range_of_recorded_values(
            values in prop::collection::vec(-1000.0f64..1000.0, 1..20),
            gaps in prop::collection::vec(0.01f64..5.0, 1..20),
        ) {
            let n = values.len().min(gaps.len());
            let mut monitor = Monitor::new();
            let mut t = 0.0;
            for i in 0..n {
                monitor.record(t, values[i]);
                t += gaps[i];
            }
            let min_v = values[..n].iter().cloned().fold(f64::INFINITY, f64::min);
            let max_v = values[..n].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let result = monitor.mean(0.0, t + 1.0);
            prop_assert!(result >= min_v - 1e-6 && result <= max_v + 1e-6);
        }
    }
}
