//! Exponential backoff with jitter for reconnect attempts.
//!
//! The base delay grows by [`BACKOFF_FACTOR`] per attempt and is capped at
//! `max_delay_ms`; a uniform perturbation of `±base * jitter` is then added and
//! the result clamped at zero.
//!
//! ```text
//! attempt   base (min=500, max=30000)
//!   0         500
//!   1         750
//!   2        1125
//!  ...
//!  11       30000 (capped)
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::options::ChannelConfig;

// ============================================================================
// Constants
// ============================================================================

/// Growth factor of the base delay per attempt.
pub const BACKOFF_FACTOR: f64 = 1.5;

// ============================================================================
// RandomSource
// ============================================================================

/// Source of uniform samples for jitter.
///
/// Injected into the channel so delay sequences can be reproduced in tests.
pub trait RandomSource: Send {
    /// Returns a sample uniformly distributed in `[0, 1)`.
    fn next_unit(&mut self) -> f64;
}

/// Entropy-seeded [`RandomSource`].
#[derive(Debug, Clone)]
pub struct SystemRandom(StdRng);

impl SystemRandom {
    /// Creates a generator seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self(StdRng::from_entropy())
    }

    /// Creates a generator with a fixed seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.r#gen::<f64>()
    }
}

/// [`RandomSource`] that always returns the same sample.
///
/// `FixedRandom(0.5)` yields zero jitter; `0.0` the lower bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_unit(&mut self) -> f64 {
        self.0
    }
}

// ============================================================================
// Delay Calculation
// ============================================================================

/// Returns the un-jittered delay for `attempt`, capped at `max_delay_ms`.
#[must_use]
pub fn base_delay_ms(attempt: u32, config: &ChannelConfig) -> f64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.min_delay_ms as f64 * BACKOFF_FACTOR.powi(exponent);
    base.min(config.max_delay_ms as f64)
}

/// Computes the delay before reconnect attempt number `attempt`.
///
/// Does not mutate any retry state; the caller increments its own counter.
#[must_use]
pub fn next_delay(attempt: u32, config: &ChannelConfig, random: &mut dyn RandomSource) -> Duration {
    let base = base_delay_ms(attempt, config);
    let spread = base * config.jitter * (random.next_unit() * 2.0 - 1.0);
    let millis = (base + spread).round().max(0.0);

    Duration::from_millis(millis as u64)
}

// ============================================================================
// Tests
// ============================================================================
