//! PureDrop - water delivery ordering and admin client.
//!
//! The library owns every piece of client behaviour: session and route
//! guard, order composition with geofencing, the admin console and its
//! dashboard watcher, performance aggregation, user management and live
//! tracking. The `puredrop` binary is a thin command line over it.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub mod analytics;
pub mod api;
pub mod auth;
pub mod cli;
mod commands;
pub mod composer;
pub mod config;
pub mod console;
mod data_helpers;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod geo;
pub mod orders;
pub mod session;
pub mod tracking;
pub mod users;

pub use data_helpers::is_valid_mobile;

use api::BackendClient;
use config::AppConfig;
use db::DbState;
use error::AppResult;

const DEFAULT_LOG_FILTER: &str = "info,puredrop_lib=debug";
const DEFAULT_CONSOLE_FILTER: &str = "warn";
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Everything a command needs: configuration, the local database and the
/// backend client.
pub struct AppState {
    pub config: AppConfig,
    pub db: DbState,
    pub backend: Arc<BackendClient>,
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn init(data_dir: &Path, config: AppConfig) -> AppResult<Self> {
        let db = db::init(data_dir)?;
        let backend = Arc::new(BackendClient::new(&config)?);
        Ok(Self {
            config,
            db,
            backend,
            data_dir: data_dir.to_path_buf(),
        })
    }
}

/// Console output goes to stderr so stdout stays clean for command output.
/// The daily file under `<data_dir>/logs` always records at the default
/// filter (or `RUST_LOG`).
fn init_logging(log_dir: &Path, console_level: Option<&str>, json: bool) -> Option<WorkerGuard> {
    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = || {
        console_level
            .and_then(|level| EnvFilter::try_new(level).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_CONSOLE_FILTER))
    };

    diagnostics::prune_old_logs(log_dir);

    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            let file_appender =
                tracing_appender::rolling::daily(log_dir, diagnostics::LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_filter(file_filter);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Log directory {} unavailable: {e}", log_dir.display());
            (None, None)
        }
    };

    let console_text = (!json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter())
    });
    let console_json = json.then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter())
    });

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_text)
        .with(console_json)
        .try_init();

    guard
}

/// Parse the command line, set up state and run the chosen command.
pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(config::default_data_dir);

    let config = AppConfig::load(&data_dir, cli.config.as_deref())?;
    let json_logs = config.log_format.eq_ignore_ascii_case("json");
    // Dropping the guard flushes the file log, so it lives until return.
    let _log_guard = init_logging(
        &diagnostics::get_log_dir(&data_dir),
        cli.log_level.as_deref(),
        json_logs,
    );

    info!(
        "Starting PureDrop v{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_GIT_SHA")
    );

    let state = AppState::init(&data_dir, config)?;
    let output = commands::Output::new(cli.json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(commands::dispatch(&state, cli.command, &output));
    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result?;
    Ok(())
}
