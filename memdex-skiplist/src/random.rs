use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};

/// Seed of the source a list gets when none is supplied.
pub const DEFAULT_SEED: u64 = 0xdeadbeef;

/// Randomness used to pick node heights.
pub trait RandomSource {
    fn next_u32(&mut self) -> u32;

    /// Uniformly distributed in `[0, bound)`. `bound` must be positive.
    fn uniform(&mut self, bound: u32) -> u32;
}

impl<R: RngCore> RandomSource for R {
    fn next_u32(&mut self) -> u32 {
        RngCore::next_u32(self)
    }

    fn uniform(&mut self, bound: u32) -> u32 {
        assert!(bound > 0, "uniform bound must be positive");
        self.random_range(0..bound)
    }
}

pub fn seeded_source(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn default_source() -> StdRng {
    seeded_source(DEFAULT_SEED)
}
