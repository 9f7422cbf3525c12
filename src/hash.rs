//! Id-keyed pseudo random numbers.
//!
//! Pure functions of the particle id, so colours and force jitter do not
//! depend on thread scheduling.

/// PCG-style integer permutation.
#[inline]
pub fn pcg(seed: u32) -> u32 {
    let state = seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Hash of `seed` mapped to `[0, 1)`.
///
/// Only the top 24 bits are kept so the conversion to `f32` is exact and can
/// never round up to `1.0`.
#[inline]
pub fn hash01(seed: u32) -> f32 {
    (pcg(seed) >> 8) as f32 * (1.0 / 16_777_216.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_in_unit_interval() {
        for seed in (0..200_000u32).chain([u32::MAX, u32::MAX - 1]) {
            let h = hash01(seed);
            assert!((0.0..1.0).contains(&h), "seed {seed} -> {h}");
        }
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash01(42), hash01(42));
        assert_eq!(pcg(7), pcg(7));
    }

    #[test]
    fn hash_spreads_neighbouring_ids() {
        let values: Vec<f32> = (0..1000).map(hash01).collect();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        assert!((0.4..0.6).contains(&mean), "mean {mean}");
        assert_ne!(hash01(0), hash01(1));
    }
}
