use serde::{Deserialize, Serialize};

/// Losses recorded at the end of one training epoch.
///
/// `loss` and `mse_loss` come from the final batch of the epoch, the `mean_*`
/// fields average every batch seen during that epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub mse_loss: f32,
    pub mean_loss: f32,
    pub mean_mse_loss: f32,
}

/// Running sums used to build [`EpochMetrics`].
#[derive(Clone, Debug, Default)]
pub struct EpochAccumulator {
    loss_sum: f64,
    mse_sum: f64,
    last: Option<(f32, f32)>,
    batches: usize,
}

impl EpochAccumulator {
    pub fn record(&mut self, loss: f32, mse_loss: f32) {
        self.loss_sum += f64::from(loss);
        self.mse_sum += f64::from(mse_loss);
        self.last = Some((loss, mse_loss));
        self.batches += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Returns `None` if no batch was recorded.
    pub fn finish(&self, epoch: usize) -> Option<EpochMetrics> {
        let (loss, mse_loss) = self.last?;
        let count = self.batches as f64;
        Some(EpochMetrics {
            epoch,
            loss,
            mse_loss,
            mean_loss: (self.loss_sum / count) as f32,
            mean_mse_loss: (self.mse_sum / count) as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_batch_and_averages() {
        let mut acc = EpochAccumulator::default();
        acc.record(0.5, 0.2);
        acc.record(0.3, 0.1);

        let metrics = acc.finish(4).unwrap();
        assert_eq!(metrics.epoch, 4);
        assert_eq!(metrics.loss, 0.3);
        assert_eq!(metrics.mse_loss, 0.1);
        assert!((metrics.mean_loss - 0.4).abs() < 1e-6);
        assert!((metrics.mean_mse_loss - 0.15).abs() < 1e-6);
    }

    #[test]
    fn empty_epoch_has_no_metrics() {
        assert!(EpochAccumulator::default().finish(1).is_none());
    }
}
