// src/seed.rs
//
// =============================================================================
// SDFORGE: SEED POLICY
// =============================================================================
//
// Pure per-image seed assignment, explicitly decoupled from the
// Enumerator's selection RNG -- two PRNG streams, never crossed. No
// upstream shape to borrow here -- this is plain arithmetic over an
// index and a policy.

use crate::document::SeedMode;

/// Server-picks sentinel for `seed_mode: random`: every variant gets -1,
/// and the server-chosen seed that comes back is recorded in the
/// manifest.
pub const RANDOM_SEED_SENTINEL: i64 = -1;

pub fn seed_for(index: u64, policy: SeedMode, base_seed: i64) -> i64 {
    match policy {
        SeedMode::Fixed => base_seed,
        SeedMode::Progressive => base_seed + index as i64,
        SeedMode::Random => RANDOM_SEED_SENTINEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_seed_is_constant() {
        assert_eq!(seed_for(0, SeedMode::Fixed, 42), 42);
        assert_eq!(seed_for(5, SeedMode::Fixed, 42), 42);
    }

    #[test]
    fn progressive_seed_is_monotonic_unit_step() {
        let seeds: Vec<i64> = (0..5).map(|i| seed_for(i, SeedMode::Progressive, 1000)).collect();
        for w in seeds.windows(2) {
            assert!(w[0] < w[1]);
            assert_eq!(w[1] - w[0], 1);
        }
        assert_eq!(seeds[0], 1000);
    }

    #[test]
    fn random_seed_is_sentinel() {
        assert_eq!(seed_for(0, SeedMode::Random, 7), RANDOM_SEED_SENTINEL);
        assert_eq!(seed_for(99, SeedMode::Random, 7), RANDOM_SEED_SENTINEL);
    }

    #[test]
    fn progressive_seed_worked_example() {
        // seed=1000, progressive -> 1000, 1001.
        assert_eq!(seed_for(0, SeedMode::Progressive, 1000), 1000);
        assert_eq!(seed_for(1, SeedMode::Progressive, 1000), 1001);
    }
}
