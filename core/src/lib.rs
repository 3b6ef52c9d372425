pub mod config;
pub mod experiment;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod rng;
pub mod visualization;

pub use config::{load_json_if_exists, load_or_init, save_json};
pub use experiment::{ExperimentMode, ExperimentModeArgs};
pub use logging::init_tracing;
pub use metrics::{EpochAccumulator, EpochMetrics};
pub use report::{ensure_report_file, update_sections, ReportSection, DEFAULT_REPORT_TEMPLATE};
pub use rng::{seeded_rng, standard_normal};
pub use visualization::{encode_luma_png_data_url, LumaImage, GRID_COLUMNS, GRID_PADDING};
