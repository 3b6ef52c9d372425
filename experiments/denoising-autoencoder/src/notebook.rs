//! Rendering of the run notebook sections.

use std::fmt::Write;

use anyhow::Result;
use dae_core::{encode_luma_png_data_url, EpochMetrics, LumaImage, ReportSection, GRID_PADDING};

use crate::{
    data::{min_max_normalize, IMAGE_SIDE, INPUT_DIM},
    training::{SamplePanel, TrainingConfig},
};

const FILTER_PREVIEWS: usize = 16;
const SIDE: u32 = IMAGE_SIDE as u32;

pub fn sections(
    config: &TrainingConfig,
    mode_label: &str,
    history: &[EpochMetrics],
    sample: Option<&SamplePanel>,
    filters: &[f32],
) -> Result<Vec<ReportSection>> {
    Ok(vec![
        ReportSection::new("configuration", render_configuration(config, mode_label)),
        ReportSection::new("metrics", render_metrics(history)),
        ReportSection::new("samples-primary", render_reconstruction(sample)?),
        ReportSection::new("samples-secondary", render_filters(filters)?),
    ])
}

fn render_configuration(config: &TrainingConfig, mode_label: &str) -> String {
    let batches = config
        .max_batches_per_epoch
        .map_or_else(|| "all".to_string(), |max| max.to_string());
    format!(
        "- Mode: {}\n- Seed: {}\n- Epochs: {}\n- Batch size: {}\n- Batches per epoch: {}\n- Learning rate: {:.4}\n- Weight decay: {:.0e}\n- Noise scale: {:.2}\n- Snapshot interval: {} epochs\n",
        mode_label,
        config.seed,
        config.num_epochs,
        config.batch_size,
        batches,
        config.learning_rate,
        config.weight_decay,
        config.noise_scale,
        config.snapshot_interval
    )
}

fn render_metrics(history: &[EpochMetrics]) -> String {
    let Some(last) = history.last() else {
        return "No epochs completed.".to_string();
    };

    let mut output = String::new();
    let _ = writeln!(
        &mut output,
        "- Final BCE loss (last batch): {:.4}\n- Final MSE loss (last batch): {:.4}\n- Final epoch mean BCE loss: {:.4}\n- Final epoch mean MSE loss: {:.4}\n",
        last.loss, last.mse_loss, last.mean_loss, last.mean_mse_loss
    );

    let _ = writeln!(&mut output, "| Epoch | BCE (last batch) | MSE (last batch) | BCE (mean) | MSE (mean) |");
    let _ = writeln!(&mut output, "| --- | --- | --- | --- | --- |");
    for metrics in summarize_history(history) {
        let _ = writeln!(
            &mut output,
            "| {} | {:.4} | {:.4} | {:.4} | {:.4} |",
            metrics.epoch, metrics.loss, metrics.mse_loss, metrics.mean_loss, metrics.mean_mse_loss
        );
    }

    output
}

/// Rows at fixed checkpoint epochs plus the final epoch.
fn summarize_history(history: &[EpochMetrics]) -> Vec<&EpochMetrics> {
    let Some(last) = history.last() else {
        return Vec::new();
    };

    let mut summary: Vec<&EpochMetrics> = history
        .iter()
        .filter(|m| matches!(m.epoch, 1 | 10 | 25 | 50 | 100 | 150))
        .collect();
    if summary.last().map(|m| m.epoch) != Some(last.epoch) {
        summary.push(last);
    }
    summary
}

fn render_reconstruction(sample: Option<&SamplePanel>) -> Result<String> {
    let Some(sample) = sample else {
        return Ok("No samples available for this run.".to_string());
    };

    let mut output = String::new();
    let _ = writeln!(&mut output, "| Clean | Noisy | Reconstructed |\n| --- | --- | --- |");
    let _ = writeln!(
        &mut output,
        "| ![clean]({}) | ![noisy]({}) | ![reconstructed]({}) |",
        encode_luma_png_data_url(SIDE, SIDE, &sample.clean)?,
        encode_luma_png_data_url(SIDE, SIDE, &sample.noisy)?,
        encode_luma_png_data_url(SIDE, SIDE, &sample.reconstructed)?
    );
    Ok(output)
}

/// First encoder filters, each stretched to its own [0, 1] range for display.
fn render_filters(filters: &[f32]) -> Result<String> {
    let stretched: Vec<f32> = filters
        .chunks_exact(INPUT_DIM)
        .take(FILTER_PREVIEWS)
        .flat_map(|filter| min_max_normalize(filter, 0.0, 1.0))
        .collect();
    if stretched.is_empty() {
        return Ok("No filters available for this run.".to_string());
    }

    let grid = LumaImage::grid(&stretched, IMAGE_SIDE, IMAGE_SIDE, FILTER_PREVIEWS / 2, GRID_PADDING)?;
    Ok(format!(
        "First {} hidden units of the encoder input layer, contrast-stretched per filter.\n\n![encoder filters]({})\n",
        stretched.len() / INPUT_DIM,
        grid.png_data_url()?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(epochs: usize) -> Vec<EpochMetrics> {
        (1..=epochs)
            .map(|epoch| EpochMetrics {
                epoch,
                loss: 1.0 / epoch as f32,
                mse_loss: 0.1,
                mean_loss: 1.0 / epoch as f32,
                mean_mse_loss: 0.1,
            })
            .collect()
    }

    #[test]
    fn summary_picks_checkpoints_and_final_epoch() {
        let full = history(200);
        let epochs: Vec<usize> = summarize_history(&full).iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![1, 10, 25, 50, 100, 150, 200]);

        let short = history(2);
        let epochs: Vec<usize> = summarize_history(&short).iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![1, 2]);

        assert!(summarize_history(&[]).is_empty());
    }

    #[test]
    fn renders_all_sections() {
        let sample = SamplePanel {
            clean: vec![1.0; INPUT_DIM],
            noisy: vec![1.2; INPUT_DIM],
            reconstructed: vec![0.9; INPUT_DIM],
        };
        let filters: Vec<f32> = (0..4 * INPUT_DIM).map(|i| (i % 7) as f32 * 0.01).collect();

        let sections = sections(&TrainingConfig::default(), "test", &history(3), Some(&sample), &filters).unwrap();
        assert_eq!(sections.len(), 4);

        let filters_text = render_filters(&filters).unwrap();
        assert!(filters_text.starts_with("First 4 hidden units"));
        assert!(render_metrics(&history(3)).contains("| 3 | 0.3333"));
        assert!(render_configuration(&TrainingConfig::default(), "full").contains("- Epochs: 200"));
    }
}
