use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use burn_candle::CandleDevice;
use burn_dataset::vision::MnistDataset;
use dae_core::{
    ensure_report_file, init_tracing, load_json_if_exists, load_or_init, save_json, update_sections,
    ExperimentMode, ExperimentModeArgs, DEFAULT_REPORT_TEMPLATE,
};
use dae_experiment_denoising::{
    benchmark::{BenchmarkSnapshot, BENCHMARK_TOLERANCE},
    model::tensor_values,
    notebook, save_model, train, ArtifactWriter, TrainingBackend, TrainingConfig,
};
use tracing::{info, warn};

struct ExperimentPaths {
    config: PathBuf,
    report: PathBuf,
    benchmark: PathBuf,
    artifacts: PathBuf,
    model: PathBuf,
}

fn main() -> Result<()> {
    init_tracing();

    let args = ExperimentModeArgs::parse_from_env()?;
    if args.help_requested() {
        print_usage();
        return Ok(());
    }
    let mode = args.mode();

    let paths = initialize_paths()?;
    let stored: TrainingConfig = load_or_init(&paths.config, TrainingConfig::default)?;
    let config = mode.select(stored.clone(), stored.with_test_budget());
    ensure_report_file(&paths.report, DEFAULT_REPORT_TEMPLATE)?;
    let benchmark: Option<BenchmarkSnapshot> = load_json_if_exists(&paths.benchmark)?;

    info!(
        mode = mode.label(),
        epochs = config.num_epochs,
        batch_size = config.batch_size,
        noise_scale = config.noise_scale,
        "training denoising autoencoder"
    );

    let device = CandleDevice::Cpu;
    let dataset = MnistDataset::train();
    let writer = ArtifactWriter::create(&paths.artifacts, config.snapshot_interval)?;
    let outcome = train::<TrainingBackend, _>(&config, &dataset, &device, Some(&writer))?;

    save_model(&outcome.model, &paths.model)?;
    info!(path = %paths.model.display(), "saved model parameters");

    let filters = tensor_values(outcome.model.encoder_filters())?;
    let sections = notebook::sections(
        &config,
        mode.label(),
        &outcome.history,
        outcome.final_sample.as_ref(),
        &filters,
    )?;
    update_sections(&paths.report, &sections)?;

    if mode == ExperimentMode::Test {
        let snapshot = BenchmarkSnapshot::from_history(&outcome.history)?;
        match benchmark {
            Some(reference) => {
                snapshot.validate_against(&reference)?;
                info!("benchmark check passed (tolerance {:.1e})", BENCHMARK_TOLERANCE);
            }
            None => {
                save_json(&paths.benchmark, &snapshot)?;
                info!(path = %paths.benchmark.display(), "saved new benchmark snapshot");
            }
        }
    } else if benchmark.is_none() {
        warn!("no benchmark snapshot recorded yet; run with --mode test to capture one");
    }

    Ok(())
}

fn print_usage() {
    println!("Usage: cargo run --release -p dae-experiment-denoising -- [--mode full|test]");
}

fn initialize_paths() -> Result<ExperimentPaths> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("runs/denoising");
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create experiment directory {}", dir.display()))?;

    Ok(ExperimentPaths {
        config: dir.join("config.json"),
        report: dir.join("report.md"),
        benchmark: dir.join("benchmark.json"),
        artifacts: dir.join("de_auto_output"),
        model: dir.join("sim_dautoencoder"),
    })
}
