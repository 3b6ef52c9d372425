use anyhow::{anyhow, bail, Result};
use burn::{
    nn::loss::{MseLoss, Reduction},
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    tensor::{
        activation::{relu, sigmoid},
        backend::{AutodiffBackend, Backend},
        ElementConversion, Tensor,
    },
};
use burn_autodiff::Autodiff;
use burn_candle::Candle;
use burn_dataset::{vision::MnistItem, Dataset};
use dae_core::{seeded_rng, EpochAccumulator, EpochMetrics};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    artifacts::{log_line, ArtifactWriter, Snapshot},
    data::{batch_tensor, shuffled_indices, CleanBatch, INPUT_DIM},
    model::{tensor_values, Autoencoder},
    noise::add_noise,
};

pub type TrainingBackend = Autodiff<Candle<f32, i64>>;

const TEST_EPOCHS: usize = 2;
const TEST_BATCHES_PER_EPOCH: usize = 20;
const ADAM_EPSILON: f32 = 1e-8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub noise_scale: f32,
    pub weight_decay: f32,
    pub snapshot_interval: usize,
    pub max_batches_per_epoch: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 1337,
            num_epochs: 200,
            batch_size: 128,
            learning_rate: 1e-3,
            noise_scale: 0.4,
            weight_decay: 1e-5,
            snapshot_interval: 10,
            max_batches_per_epoch: None,
        }
    }
}

impl TrainingConfig {
    /// Shrink the schedule to a quick smoke run.
    pub fn with_test_budget(self) -> Self {
        Self {
            num_epochs: TEST_EPOCHS,
            max_batches_per_epoch: Some(TEST_BATCHES_PER_EPOCH),
            ..self
        }
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }
        if self.max_batches_per_epoch == Some(0) {
            bail!("max_batches_per_epoch must be positive when set");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            bail!("learning_rate must be a positive number, got {}", self.learning_rate);
        }
        if self.snapshot_interval == 0 {
            bail!("snapshot_interval must be positive");
        }
        if !self.noise_scale.is_finite() || self.noise_scale < 0.0 {
            bail!("noise_scale must be non-negative, got {}", self.noise_scale);
        }
        Ok(())
    }

    fn optimizer(&self) -> AdamConfig {
        let decay = (self.weight_decay > 0.0).then(|| WeightDecayConfig::new(self.weight_decay));
        AdamConfig::new()
            .with_epsilon(ADAM_EPSILON)
            .with_weight_decay(decay)
    }
}

/// First image of the final batch, for the report.
#[derive(Clone, Debug)]
pub struct SamplePanel {
    pub clean: Vec<f32>,
    pub noisy: Vec<f32>,
    pub reconstructed: Vec<f32>,
}

pub struct TrainingOutcome<B: Backend> {
    pub model: Autoencoder<B>,
    pub history: Vec<EpochMetrics>,
    pub final_sample: Option<SamplePanel>,
}

struct LastBatch<B: Backend> {
    clean: CleanBatch,
    noisy: Vec<f32>,
    outputs: Tensor<B, 2>,
}

impl<B: Backend> LastBatch<B> {
    fn snapshot(
        &self,
        epoch: usize,
        total_epochs: usize,
        model: &Autoencoder<B>,
        metrics: EpochMetrics,
    ) -> Result<Snapshot> {
        Ok(Snapshot {
            epoch,
            total_epochs,
            clean: self.clean.pixels.clone(),
            reconstructed: tensor_values(self.outputs.clone())?,
            noisy: self.noisy.clone(),
            filters: tensor_values(model.encoder_filters())?,
            metrics,
        })
    }

    fn first_sample(&self) -> Result<SamplePanel> {
        let reconstructed = tensor_values(self.outputs.clone().narrow(0, 0, 1))?;
        Ok(SamplePanel {
            clean: self.clean.pixels[..INPUT_DIM].to_vec(),
            noisy: self.noisy[..INPUT_DIM].to_vec(),
            reconstructed,
        })
    }
}

/// Binary cross-entropy of `sigmoid(logits)` against `targets`, averaged over
/// every element.
///
/// Computed as `max(z, 0) - z * t + ln(1 + exp(-|z|))`, whose value and gradient
/// stay finite however far the sigmoid saturates.
pub fn binary_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let positive_part = relu(logits.clone());
    let tail = logits.clone().abs().neg().exp().log1p();

    (positive_part - logits * targets + tail).mean()
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

/// Train a fresh autoencoder on `dataset`.
///
/// Every epoch visits a new shuffle of the dataset, corrupts each batch with
/// Gaussian noise and fits the reconstruction of the clean batch. When a writer
/// is given, epochs on its cadence dump the last batch of the epoch.
pub fn train<B, D>(
    config: &TrainingConfig,
    dataset: &D,
    device: &B::Device,
    artifacts: Option<&ArtifactWriter>,
) -> Result<TrainingOutcome<B>>
where
    B: AutodiffBackend,
    D: Dataset<MnistItem>,
{
    config.validate()?;
    if dataset.is_empty() {
        bail!("training dataset is empty");
    }

    let mut rng = seeded_rng(config.seed);
    let mut model = Autoencoder::<B>::init(device, &mut rng);
    let mut optimizer = config.optimizer().init();
    let batch_limit = config.max_batches_per_epoch.unwrap_or(usize::MAX);

    let mut history = Vec::with_capacity(config.num_epochs);
    let mut last_batch: Option<LastBatch<B>> = None;

    for epoch in 0..config.num_epochs {
        let order = shuffled_indices(dataset.len(), &mut rng);
        let mut accumulator = EpochAccumulator::default();

        for indices in order.chunks(config.batch_size).take(batch_limit) {
            let clean = CleanBatch::from_indices(dataset, indices)?;
            let noisy = add_noise(&clean.pixels, config.noise_scale, &mut rng);
            let targets = clean.to_tensor::<B>(device);
            let inputs = batch_tensor::<B>(noisy.clone(), clean.len, device);

            let logits = model.forward_logits(inputs);
            let outputs = sigmoid(logits.clone());
            let loss = binary_cross_entropy_with_logits(logits, targets.clone());
            let mse_loss = MseLoss::new().forward(outputs.clone(), targets, Reduction::Mean);
            accumulator.record(scalar(loss.clone()), scalar(mse_loss));

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            last_batch = Some(LastBatch {
                clean,
                noisy,
                outputs: outputs.detach(),
            });
        }

        let metrics = accumulator
            .finish(epoch + 1)
            .ok_or_else(|| anyhow!("epoch {} saw no batches", epoch + 1))?;
        debug!(epoch = epoch + 1, batches = accumulator.batches(), "epoch finished");
        info!("{}", log_line(epoch + 1, config.num_epochs, &metrics));
        if !(metrics.loss.is_finite() && metrics.mean_loss.is_finite()) {
            bail!("training diverged at epoch {}: loss is {}", epoch + 1, metrics.loss);
        }

        if let (Some(writer), Some(batch)) = (artifacts, last_batch.as_ref()) {
            writer.maybe_write(epoch, || {
                batch.snapshot(epoch, config.num_epochs, &model, metrics.clone())
            })?;
        }

        history.push(metrics);
    }

    model.ensure_finite()?;
    let final_sample = last_batch.as_ref().map(LastBatch::first_sample).transpose()?;

    Ok(TrainingOutcome {
        model,
        history,
        final_sample,
    })
}
