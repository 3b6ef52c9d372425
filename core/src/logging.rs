use std::{io::IsTerminal, sync::OnceLock};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Install the global fmt subscriber once per process.
///
/// Verbosity follows `RUST_LOG` and falls back to `info`. Later calls are no-ops,
/// as is a call made after another subscriber was installed.
pub fn init_tracing() {
    INITIALISED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(std::io::stdout().is_terminal());

        if let Err(err) = Registry::default().with(filter).with(fmt_layer).try_init() {
            eprintln!("tracing subscriber already installed: {err}");
        }
    });
}
