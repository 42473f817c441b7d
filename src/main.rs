//! CLI entry point for the GTFS converter.
//!
//! Reads every feed subdirectory of the feeds root, validates it, and merges
//! valid feeds into json output with global ids for the map generator.

use std::ffi::OsStr;
use std::path::Path;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use gtfs_converter::config::ConverterArgs;
use gtfs_converter::driver::run_conversion;
use tracing::{error, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

fn main() -> ExitCode {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing();

    let args = ConverterArgs::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Some of the required options are not present or not valid");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match run_conversion(&config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Conversion aborted");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Colored stderr logging plus a JSON rolling log file.
fn init_tracing() -> WorkerGuard {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_converter.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_converter.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(LevelFilter::INFO.into()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(LevelFilter::DEBUG.into()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    file_guard
}

fn print_usage() {
    let mut command = ConverterArgs::command();
    if command.print_help().is_err() {
        eprintln!("{}", command.render_usage());
    }
}
