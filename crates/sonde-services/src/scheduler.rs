//! Initiator access scheduling.
//!
//! Every node in range runs an initiator, and two nodes polling at the same
//! moment collide on air. Each attempt is therefore preceded by a randomized
//! wait whose mean tracks the configured polling rate. A polling rate of 0
//! turns the initiator off entirely.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sonde_core::config::BackoffKind;

/// Spread of the uniform jitter window above the polling rate.
pub const UNIFORM_SPREAD: u32 = 50;
/// Rate-to-lambda divisor of the exponential law.
pub const EXPONENTIAL_SHAPE: f64 = 5.0;
/// Minimum exponential wait.
pub const EXPONENTIAL_FLOOR: u32 = 10;

/// Source of randomness for backoff draws.
pub trait RandomSource: Send + Sync {
    /// Uniform integer in `[low, high]`, both inclusive.
    fn in_range(&mut self, low: u32, high: u32) -> u32;
    /// Uniform float in `[0, 1)`.
    fn unit(&mut self) -> f64;
}

/// Default random source backed by `StdRng`.
pub struct Entropy {
    rng: StdRng,
}

impl Entropy {
    pub fn from_os() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence, for tests and bench runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `seed == 0` means OS entropy.
    pub fn from_seed_setting(seed: u64) -> Self {
        if seed == 0 {
            Self::from_os()
        } else {
            Self::seeded(seed)
        }
    }
}

impl RandomSource for Entropy {
    fn in_range(&mut self, low: u32, high: u32) -> u32 {
        self.rng.gen_range(low..=high)
    }

    fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Outcome of one scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Polling rate is 0; the initiator must not attempt.
    Disabled,
    /// Wait this many ticks, then attempt.
    Wait(u32),
}

/// Delay law for a non-zero polling rate.
pub trait BackoffPolicy: Send + Sync {
    fn delay(&self, rate: u32, random: &mut dyn RandomSource) -> u32;
}

/// Uniform in `[rate, rate + spread]`.
#[derive(Debug, Clone, Copy)]
pub struct UniformJitter {
    pub spread: u32,
}

impl Default for UniformJitter {
    fn default() -> Self {
        Self {
            spread: UNIFORM_SPREAD,
        }
    }
}

impl BackoffPolicy for UniformJitter {
    fn delay(&self, rate: u32, random: &mut dyn RandomSource) -> u32 {
        random.in_range(rate, rate.saturating_add(self.spread))
    }
}

/// Exponential inter-arrival with `lambda = shape / rate`, plus a floor.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub shape: f64,
    pub floor: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            shape: EXPONENTIAL_SHAPE,
            floor: EXPONENTIAL_FLOOR,
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, rate: u32, random: &mut dyn RandomSource) -> u32 {
        let lambda = self.shape / rate as f64;
        let u = random.unit();
        // 1 - u is in (0, 1], so the log term is finite and non-negative.
        let wait = -(1.0 - u).ln() / lambda;
        (wait as u32).saturating_add(self.floor)
    }
}

pub struct AccessScheduler {
    policy: Box<dyn BackoffPolicy>,
    random: Box<dyn RandomSource>,
}

impl AccessScheduler {
    pub fn new(policy: Box<dyn BackoffPolicy>, random: Box<dyn RandomSource>) -> Self {
        Self { policy, random }
    }

    /// Scheduler using the configured delay law with its default shape.
    pub fn from_kind(kind: BackoffKind, random: Box<dyn RandomSource>) -> Self {
        let policy: Box<dyn BackoffPolicy> = match kind {
            BackoffKind::Uniform => Box::new(UniformJitter::default()),
            BackoffKind::Exponential => Box::new(ExponentialBackoff::default()),
        };
        Self::new(policy, random)
    }

    /// Wait before the next initiator attempt at polling rate `rate`.
    pub fn next_delay(&mut self, rate: u32) -> Backoff {
        if rate == 0 {
            return Backoff::Disabled;
        }
        Backoff::Wait(self.policy.delay(rate, self.random.as_mut()))
    }
}
