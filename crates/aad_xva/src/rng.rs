//! Seeded random number generation for path simulation.
//!
//! Every run is driven by a single `u64` seed so that a simulation can be
//! reproduced exactly, which the per-trade replay relies on.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// Deterministic random source for generating market paths.
#[derive(Debug, Clone)]
pub struct PathRng {
    inner: StdRng,
    seed: u64,
}

impl PathRng {
    /// Creates a new generator from an explicit seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws a single standard normal variate.
    pub fn gen_normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.inner)
    }

    /// Draws a single uniform variate in `[0, 1)`.
    pub fn gen_uniform(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// Fills a buffer with independent standard normal variates.
    pub fn fill_normal(&mut self, buffer: &mut [f64]) {
        for slot in buffer.iter_mut() {
            *slot = self.gen_normal();
        }
    }
}
