//! MNIST preprocessing and batching.

use anyhow::{anyhow, bail, Result};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use burn_dataset::{vision::MnistItem, Dataset};
use rand::{seq::SliceRandom, Rng};

pub const IMAGE_SIDE: usize = 28;
pub const INPUT_DIM: usize = IMAGE_SIDE * IMAGE_SIDE;

/// Linearly rescale `pixels` so the smallest value maps to `min_value` and the
/// largest to `max_value`.
///
/// An image without dynamic range comes back as a constant `min_value` image
/// rather than the NaNs a plain division would produce.
pub fn min_max_normalize(pixels: &[f32], min_value: f32, max_value: f32) -> Vec<f32> {
    let min = pixels.iter().copied().fold(f32::INFINITY, f32::min);
    let range = pixels.iter().map(|&p| p - min).fold(f32::NEG_INFINITY, f32::max);

    if !(range.is_finite() && range > 0.0) {
        return vec![min_value; pixels.len()];
    }

    let span = max_value - min_value;
    pixels
        .iter()
        .map(|&p| (p - min) / range * span + min_value)
        .collect()
}

/// Round every element to the nearest integer, ties to even.
pub fn binarize(pixels: &[f32]) -> Vec<f32> {
    pixels.iter().map(|p| p.round_ties_even()).collect()
}

/// Flatten an MNIST item into 784 values in {0, 1}.
pub fn preprocess_item(item: &MnistItem) -> Vec<f32> {
    let scaled: Vec<f32> = item
        .image
        .iter()
        .flat_map(|row| row.iter().map(|&pixel| pixel / 255.0))
        .collect();

    binarize(&min_max_normalize(&scaled, 0.0, 1.0))
}

/// A fresh visiting order over `len` samples.
pub fn shuffled_indices<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

/// Preprocessed images for one training step, flattened row-major.
#[derive(Clone, Debug)]
pub struct CleanBatch {
    pub pixels: Vec<f32>,
    pub len: usize,
}

impl CleanBatch {
    pub fn from_indices<D: Dataset<MnistItem>>(dataset: &D, indices: &[usize]) -> Result<Self> {
        if indices.is_empty() {
            bail!("cannot build an empty batch");
        }

        let mut pixels = Vec::with_capacity(indices.len() * INPUT_DIM);
        for &index in indices {
            let item = dataset
                .get(index)
                .ok_or_else(|| anyhow!("dataset index {} out of bounds", index))?;
            pixels.extend(preprocess_item(&item));
        }

        Ok(Self {
            pixels,
            len: indices.len(),
        })
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        batch_tensor(self.pixels.clone(), self.len, device)
    }
}

/// Wrap `len` flattened images as a `[len, 784]` tensor.
pub fn batch_tensor<B: Backend>(pixels: Vec<f32>, len: usize, device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 2>::from_floats(TensorData::new(pixels, [len, INPUT_DIM]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_dataset::InMemDataset;
    use dae_core::seeded_rng;

    fn item_from_fn(f: impl Fn(usize, usize) -> f32) -> MnistItem {
        let mut image = [[0.0f32; IMAGE_SIDE]; IMAGE_SIDE];
        for (r, row) in image.iter_mut().enumerate() {
            for (c, pixel) in row.iter_mut().enumerate() {
                *pixel = f(r, c);
            }
        }
        MnistItem { image, label: 3 }
    }

    #[test]
    fn preprocessed_pixels_are_binary() {
        let items = [
            item_from_fn(|r, c| ((r * 31 + c * 17) % 256) as f32),
            item_from_fn(|r, _| if r < 14 { 12.0 } else { 200.0 }),
            item_from_fn(|r, c| (r + c) as f32 * 4.0 + 30.0),
        ];

        for item in &items {
            let pixels = preprocess_item(item);
            assert_eq!(pixels.len(), INPUT_DIM);
            assert!(pixels.iter().all(|&p| p == 0.0 || p == 1.0));
        }
    }

    #[test]
    fn normalization_spans_requested_range() {
        let normalized = min_max_normalize(&[2.0, 4.0, 6.0], 0.0, 1.0);
        assert_eq!(normalized, vec![0.0, 0.5, 1.0]);

        let widened = min_max_normalize(&[2.0, 4.0, 6.0], -1.0, 1.0);
        assert_eq!(widened, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn zero_variance_image_stays_finite() {
        let flat = item_from_fn(|_, _| 128.0);
        let pixels = preprocess_item(&flat);
        assert!(pixels.iter().all(|p| p.is_finite()));
        assert!(pixels.iter().all(|&p| p == 0.0));

        assert_eq!(min_max_normalize(&[0.0; 4], 0.0, 1.0), vec![0.0; 4]);
        assert!(min_max_normalize(&[], 0.0, 1.0).is_empty());
    }

    #[test]
    fn rounding_ties_go_to_even() {
        assert_eq!(binarize(&[0.49, 0.5, 0.51, 1.0]), vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn shuffle_is_a_seeded_permutation() {
        let a = shuffled_indices(50, &mut seeded_rng(9));
        let b = shuffled_indices(50, &mut seeded_rng(9));
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn batch_rejects_missing_items() {
        let dataset = InMemDataset::new(vec![item_from_fn(|_, _| 0.0)]);
        assert!(CleanBatch::from_indices(&dataset, &[0, 4]).is_err());
        assert!(CleanBatch::from_indices(&dataset, &[]).is_err());

        let batch = CleanBatch::from_indices(&dataset, &[0, 0]).unwrap();
        assert_eq!(batch.len, 2);
        assert_eq!(batch.pixels.len(), 2 * INPUT_DIM);
    }
}
