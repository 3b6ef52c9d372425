use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use dae_core::{EpochMetrics, LumaImage, GRID_COLUMNS, GRID_PADDING};
use tracing::info;

use crate::data::IMAGE_SIDE;

pub const LOSS_LOG: &str = "losses.log";

/// Row-major pixel stacks captured from the last batch of an epoch.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Zero-based epoch index.
    pub epoch: usize,
    pub total_epochs: usize,
    pub clean: Vec<f32>,
    pub reconstructed: Vec<f32>,
    pub noisy: Vec<f32>,
    pub filters: Vec<f32>,
    pub metrics: EpochMetrics,
}

/// Writes periodic image grids and the loss log into one directory.
#[derive(Clone, Debug)]
pub struct ArtifactWriter {
    dir: PathBuf,
    interval: usize,
}

impl ArtifactWriter {
    pub fn create(dir: &Path, interval: usize) -> Result<Self> {
        if interval == 0 {
            bail!("snapshot interval must be positive");
        }
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create artifact directory {}", dir.display()))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            interval,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn should_snapshot(&self, epoch: usize) -> bool {
        epoch % self.interval == 0
    }

    /// Builds and writes a snapshot if `epoch` is on the cadence; returns whether it did.
    ///
    /// `build` only runs for epochs that are written.
    pub fn maybe_write<F>(&self, epoch: usize, build: F) -> Result<bool>
    where
        F: FnOnce() -> Result<Snapshot>,
    {
        if !self.should_snapshot(epoch) {
            return Ok(false);
        }
        self.write_snapshot(&build()?)?;
        Ok(true)
    }

    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let epoch = snapshot.epoch;
        let grids = [
            (format!("x_{epoch}.png"), &snapshot.clean),
            (format!("x_hat_{epoch}.png"), &snapshot.reconstructed),
            (format!("x_noisy_{epoch}.png"), &snapshot.noisy),
            (format!("filters_epoch_{epoch}.png"), &snapshot.filters),
        ];

        for (name, pixels) in grids {
            let grid = LumaImage::grid(pixels, IMAGE_SIDE, IMAGE_SIDE, GRID_COLUMNS, GRID_PADDING)
                .with_context(|| format!("failed to tile {name}"))?;
            grid.save_png(&self.dir.join(&name))?;
        }

        self.append_log_line(snapshot)?;
        info!(epoch, dir = %self.dir.display(), "wrote snapshot images");
        Ok(())
    }

    fn append_log_line(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.dir.join(LOSS_LOG);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        writeln!(file, "{}", log_line(snapshot.epoch + 1, snapshot.total_epochs, &snapshot.metrics))
            .with_context(|| format!("failed to append to {}", path.display()))
    }
}

/// `epoch [e/N], loss:…, MSE_loss:…` followed by the epoch means.
pub fn log_line(epoch: usize, total_epochs: usize, metrics: &EpochMetrics) -> String {
    format!(
        "epoch [{}/{}], loss:{:.4}, MSE_loss:{:.4} (epoch mean loss:{:.4}, MSE_loss:{:.4})",
        epoch, total_epochs, metrics.loss, metrics.mse_loss, metrics.mean_loss, metrics.mean_mse_loss
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::INPUT_DIM;

    fn snapshot(epoch: usize) -> Snapshot {
        Snapshot {
            epoch,
            total_epochs: 20,
            clean: vec![1.0; 4 * INPUT_DIM],
            reconstructed: vec![0.5; 4 * INPUT_DIM],
            noisy: vec![1.3; 4 * INPUT_DIM],
            filters: vec![-0.02; 16 * INPUT_DIM],
            metrics: EpochMetrics {
                epoch: epoch + 1,
                loss: 0.25,
                mse_loss: 0.05,
                mean_loss: 0.3,
                mean_mse_loss: 0.06,
            },
        }
    }

    fn png_count(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().path().extension().is_some_and(|e| e == "png"))
            .count()
    }

    fn log_lines(dir: &Path) -> Vec<String> {
        match fs::read_to_string(dir.join(LOSS_LOG)) {
            Ok(text) => text.lines().map(str::to_owned).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[test]
    fn writes_on_interval_epochs_only() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::create(&dir.path().join("out"), 10).unwrap();

        assert!(writer.maybe_write(0, || Ok(snapshot(0))).unwrap());
        assert_eq!(png_count(writer.dir()), 4);
        assert_eq!(log_lines(writer.dir()).len(), 1);

        let mut built = false;
        let written = writer
            .maybe_write(5, || {
                built = true;
                Ok(snapshot(5))
            })
            .unwrap();
        assert!(!written);
        assert!(!built, "off-cadence epochs must not build a snapshot");
        assert_eq!(png_count(writer.dir()), 4);
        assert_eq!(log_lines(writer.dir()).len(), 1);

        assert!(writer.maybe_write(10, || Ok(snapshot(10))).unwrap());
        assert_eq!(png_count(writer.dir()), 8);
        assert_eq!(log_lines(writer.dir()).len(), 2);

        for name in ["x_10.png", "x_hat_10.png", "x_noisy_10.png", "filters_epoch_10.png"] {
            assert!(writer.dir().join(name).exists(), "{name} missing");
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactWriter::create(dir.path(), 0).unwrap_err();
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn snapshot_build_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::create(dir.path(), 1).unwrap();
        assert!(writer.maybe_write(3, || bail!("tensor read failed")).is_err());
        assert_eq!(png_count(writer.dir()), 0);
    }

    #[test]
    fn grid_images_have_expected_size() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::create(dir.path(), 10).unwrap();
        writer.write_snapshot(&snapshot(0)).unwrap();

        let filters = image::open(dir.path().join("filters_epoch_0.png")).unwrap();
        assert_eq!(filters.width(), 8 * 30 + 2);
        assert_eq!(filters.height(), 2 * 30 + 2);

        let clean = image::open(dir.path().join("x_0.png")).unwrap();
        assert_eq!(clean.width(), 4 * 30 + 2);
        assert_eq!(clean.height(), 30 + 2);
    }

    #[test]
    fn log_line_reports_last_batch_losses() {
        let line = log_line(1, 20, &snapshot(0).metrics);
        assert!(line.starts_with("epoch [1/20], loss:0.2500, MSE_loss:0.0500"));
    }
}
