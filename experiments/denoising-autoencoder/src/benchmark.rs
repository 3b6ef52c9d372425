use anyhow::{anyhow, Result};
use dae_core::EpochMetrics;
use serde::{Deserialize, Serialize};

pub const BENCHMARK_TOLERANCE: f32 = 5e-3;

/// Final metrics of a test-mode run, pinned to catch numeric drift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSnapshot {
    pub final_epoch: EpochMetrics,
}

impl BenchmarkSnapshot {
    pub fn from_history(history: &[EpochMetrics]) -> Result<Self> {
        let final_epoch = history
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("training history is empty"))?;
        Ok(Self { final_epoch })
    }

    pub fn validate_against(&self, reference: &Self) -> Result<()> {
        let (actual, expected) = (&self.final_epoch, &reference.final_epoch);
        if actual.epoch != expected.epoch {
            return Err(anyhow!(
                "epoch count changed from {} to {}; delete the benchmark if this is intentional",
                expected.epoch,
                actual.epoch
            ));
        }

        ensure_close(actual.loss, expected.loss, "final loss")?;
        ensure_close(actual.mse_loss, expected.mse_loss, "final MSE loss")?;
        ensure_close(actual.mean_loss, expected.mean_loss, "final epoch mean loss")?;
        ensure_close(actual.mean_mse_loss, expected.mean_mse_loss, "final epoch mean MSE loss")
    }
}

fn ensure_close(actual: f32, expected: f32, label: &str) -> Result<()> {
    if (actual - expected).abs() > BENCHMARK_TOLERANCE {
        Err(anyhow!(
            "{} deviated from benchmark (actual {:.4} vs expected {:.4}, tol {:.4})",
            label,
            actual,
            expected,
            BENCHMARK_TOLERANCE
        ))
    } else {
        Ok(())
    }
}
