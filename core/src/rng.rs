use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Construct a deterministic RNG from a fixed seed.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Draw `count` independent samples from N(0, 1).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<f32> {
    (0..count).map(|_| rng.sample(StandardNormal)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_samples() {
        let a = standard_normal(&mut seeded_rng(42), 16);
        let b = standard_normal(&mut seeded_rng(42), 16);
        assert_eq!(a, b);
        assert_ne!(a, standard_normal(&mut seeded_rng(43), 16));
    }

    #[test]
    fn samples_are_roughly_standard() {
        let samples = standard_normal(&mut seeded_rng(1), 20_000);
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / samples.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }
}
