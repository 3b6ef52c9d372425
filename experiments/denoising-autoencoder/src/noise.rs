use dae_core::standard_normal;
use rand::Rng;

/// Corrupt `batch` with additive Gaussian noise of standard deviation `noise_scale`.
///
/// Values are not clamped, so the result may leave [0, 1].
pub fn add_noise<R: Rng + ?Sized>(batch: &[f32], noise_scale: f32, rng: &mut R) -> Vec<f32> {
    let noise = standard_normal(rng, batch.len());
    batch
        .iter()
        .zip(noise)
        .map(|(&pixel, sample)| pixel + noise_scale * sample)
        .collect()
}
