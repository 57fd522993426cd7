//! RNG service: seeded pseudo-random streams and the distribution family
//! spec §4.7 requires (Uniform, Exponential, Constant, Triangular, PERT,
//! discretised PERT), each returning a value already converted to hours.

use hpath_common::error::KernelError;
use hpath_common::time::TimeUnit;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution as _, Exp};

/// One seeded RNG stream per `Model` run (spec §4.7, §5 "Determinism").
pub struct RngService {
    rng: StdRng,
}

impl RngService {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `Uniform(0, 1)`, used for all branching probabilities.
    pub fn uniform01(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// `Exponential(rate)` — `rate` in events/hour, returns an inter-arrival
    /// time in hours.
    pub fn exponential_hours(&mut self, rate: f64) -> f64 {
        debug_assert!(rate > 0.0, "exponential rate must be positive");
        Exp::new(rate)
            .expect("exponential rate must be finite and positive")
            .sample(&mut self.rng)
    }

    fn beta01(&mut self, alpha: f64, beta: f64) -> f64 {
        Beta::new(alpha, beta)
            .expect("PERT shape parameters must be positive")
            .sample(&mut self.rng)
    }
}

/// A continuous three-point (or degenerate) duration distribution, carrying
/// the time-unit factor fixed at construction (spec §3 "Time").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distribution {
    Constant(f64),
    Triangular { low: f64, mode: f64, high: f64 },
    Pert { low: f64, mode: f64, high: f64, shape: f64 },
}

/// Concentration parameter used for every PERT distribution in this model
/// (spec §4.7).
pub const PERT_SHAPE: f64 = 4.0;

impl Distribution {
    pub fn constant(value: f64) -> Self {
        Distribution::Constant(value)
    }

    pub fn triangular(low: f64, mode: f64, high: f64) -> Result<Self, KernelError> {
        Self::validate("triangular", low, mode, high)?;
        if low == high {
            return Ok(Distribution::Constant(mode));
        }
        Ok(Distribution::Triangular { low, mode, high })
    }

    pub fn pert(low: f64, mode: f64, high: f64) -> Result<Self, KernelError> {
        Self::validate("pert", low, mode, high)?;
        if low == high {
            return Ok(Distribution::Constant(mode));
        }
        Ok(Distribution::Pert {
            low,
            mode,
            high,
            shape: PERT_SHAPE,
        })
    }

    fn validate(name: &str, low: f64, mode: f64, high: f64) -> Result<(), KernelError> {
        if high < low {
            return Err(KernelError::InvalidDistributionRange {
                name: name.to_string(),
                low,
                high,
            });
        }
        debug_assert!(low <= mode && mode <= high, "{name}: low <= mode <= high required");
        Ok(())
    }

    /// Sample a raw value in the distribution's native unit.
    pub fn sample(&self, rng: &mut RngService) -> f64 {
        match *self {
            Distribution::Constant(v) => v,
            Distribution::Triangular { low, mode, high } => sample_triangular(rng, low, mode, high),
            Distribution::Pert { low, mode, high, shape } => {
                if mode == low && mode == high {
                    return mode;
                }
                let alpha = 1.0 + shape * (mode - low) / (high - low);
                let beta = 1.0 + shape * (high - mode) / (high - low);
                low + rng.beta01(alpha, beta) * (high - low)
            }
        }
    }

    /// The distribution's analytic mean (spec §4.7).
    pub fn mean(&self) -> f64 {
        match *self {
            Distribution::Constant(v) => v,
            Distribution::Triangular { low, mode, high } => (low + mode + high) / 3.0,
            Distribution::Pert { low, mode, high, shape } => {
                (low + shape * mode + high) / (shape + 2.0)
            }
        }
    }
}

fn sample_triangular(rng: &mut RngService, low: f64, mode: f64, high: f64) -> f64 {
    if low == high {
        return mode;
    }
    let u = rng.uniform01();
    let fc = (mode - low) / (high - low);
    if u < fc {
        low + (u * (high - low) * (mode - low)).sqrt()
    } else {
        high - ((1.0 - u) * (high - low) * (high - mode)).sqrt()
    }
}

/// A duration distribution paired with the time unit its raw samples are
/// expressed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Duration {
    pub distribution: Distribution,
    pub unit: TimeUnit,
}

impl Duration {
    pub fn new(distribution: Distribution, unit: TimeUnit) -> Self {
        Self { distribution, unit }
    }

    pub fn sample_hours(&self, rng: &mut RngService) -> f64 {
        self.unit.to_hours(self.distribution.sample(rng))
    }

    pub fn mean_hours(&self) -> f64 {
        self.unit.to_hours(self.distribution.mean())
    }
}

/// An integer-valued three-point distribution over counts (no time unit —
/// spec §4.7 "IntPERT").
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntDistribution {
    Constant(i64),
    Triangular { low: i64, mode: i64, high: i64 },
    Pert { low: i64, mode: i64, high: i64 },
}

impl IntDistribution {
    pub fn constant(value: i64) -> Self {
        IntDistribution::Constant(value)
    }

    pub fn triangular(low: i64, mode: i64, high: i64) -> Result<Self, KernelError> {
        Self::validate("int_triangular", low, mode, high)?;
        Ok(IntDistribution::Triangular { low, mode, high })
    }

    pub fn pert(low: i64, mode: i64, high: i64) -> Result<Self, KernelError> {
        Self::validate("int_pert", low, mode, high)?;
        Ok(IntDistribution::Pert { low, mode, high })
    }

    fn validate(name: &str, low: i64, mode: i64, high: i64) -> Result<(), KernelError> {
        if high < low {
            return Err(KernelError::InvalidDistributionRange {
                name: name.to_string(),
                low: low as f64,
                high: high as f64,
            });
        }
        debug_assert!(low <= mode && mode <= high, "{name}: low <= mode <= high required");
        Ok(())
    }

    /// Sample a shifted continuous distribution centred on 0, truncate
    /// toward zero, then re-add `mode`; the result always falls in
    /// `[low, high]` (spec §4.7).
    pub fn sample(&self, rng: &mut RngService) -> i64 {
        let (low, mode, high, shifted) = match *self {
            IntDistribution::Constant(v) => return v,
            IntDistribution::Triangular { low, mode, high } => {
                let lo = low as f64 - mode as f64 - 0.5;
                let hi = high as f64 - mode as f64 + 0.5;
                (low, mode, high, sample_triangular(rng, lo, 0.0, hi))
            }
            IntDistribution::Pert { low, mode, high } => {
                let lo = low as f64 - mode as f64 - 0.5;
                let hi = high as f64 - mode as f64 + 0.5;
                let shape = PERT_SHAPE;
                let v = if lo == hi {
                    0.0
                } else {
                    let alpha = 1.0 + shape * (0.0 - lo) / (hi - lo);
                    let beta = 1.0 + shape * (hi - 0.0) / (hi - lo);
                    lo + rng.beta01(alpha, beta) * (hi - lo)
                };
                (low, mode, high, v)
            }
        };
        let truncated = shifted.trunc() as i64 + mode;
        truncated.clamp(low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_always_returns_mode() {
        let d = Distribution::constant(3.0);
        let mut rng = RngService::new(1);
        for _ in 0..10 {
            assert_eq!(d.sample(&mut rng), 3.0);
        }
    }

    #[test]
    fn triangular_stays_in_range() {
        let d = Distribution::triangular(1.0, 2.0, 5.0).unwrap();
        let mut rng = RngService::new(42);
        for _ in 0..1000 {
            let v = d.sample(&mut rng);
            assert!((1.0..=5.0).contains(&v), "{v} out of range");
        }
    }

    #[test]
    fn pert_stays_in_range_and_weights_mode() {
        let d = Distribution::pert(0.0, 1.0, 10.0).unwrap();
        let mut rng = RngService::new(7);
        let n = 5000;
        let mut sum = 0.0;
        for _ in 0..n {
            let v = d.sample(&mut rng);
            assert!((0.0..=10.0).contains(&v));
            sum += v;
        }
        let empirical_mean = sum / n as f64;
        assert!((empirical_mean - d.mean()).abs() < 0.3, "empirical={empirical_mean} analytic={}", d.mean());
    }

    #[test]
    fn degenerate_three_point_collapses_to_constant() {
        let d = Distribution::triangular(4.0, 4.0, 4.0).unwrap();
        assert!(matches!(d, Distribution::Constant(v) if v == 4.0));
    }

    #[test]
    fn invalid_range_is_rejected() {
        let err = Distribution::triangular(5.0, 6.0, 1.0).unwrap_err();
        assert!(matches!(err, KernelError::InvalidDistributionRange { .. }));
    }

    #[test]
    fn int_pert_stays_in_range() {
        let d = IntDistribution::pert(1, 3, 10).unwrap();
        let mut rng = RngService::new(99);
        for _ in 0..1000 {
            let v = d.sample(&mut rng);
            assert!((1..=10).contains(&v), "{v} out of range");
        }
    }

    #[test]
    fn duration_converts_to_hours() {
        let d = Duration::new(Distribution::constant(90.0), TimeUnit::Minutes);
        let mut rng = RngService::new(1);
        assert!((d.sample_hours(&mut rng) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn seeded_streams_are_deterministic() {
        let mut a = RngService::new(123);
        let mut b = RngService::new(123);
        let xs: Vec<f64> = (0..20).map(|_| a.uniform01()).collect();
        let ys: Vec<f64> = (0..20).map(|_| b.uniform01()).collect();
        assert_eq!(xs, ys);
    }
}
