use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use eve_bot::Cli;
use eve_core::config::{AppConfig, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

const EVE_TARGETS: [&str; 4] = ["eve", "eve_bot", "eve_core", "eve_mattermost"];

/// `RUST_LOG` wins when set; otherwise our crates log at the configured level
/// and dependencies only at `warn`.
fn log_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(logging)))
}

fn default_directives(logging: &LoggingConfig) -> String {
    let level = logging.level.trim().to_ascii_lowercase();
    EVE_TARGETS.iter().fold("warn".to_owned(), |directives, target| {
        format!("{directives},{target}={level}")
    })
}

fn init_logging(logging: &LoggingConfig) {
    let builder = tracing_subscriber::fmt().with_env_filter(log_filter(logging));

    match logging.format {
        LogFormat::Compact => builder.with_target(false).compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().flatten_event(true).init(),
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    AppConfig::load(cli.load_options()).context("failed to load configuration")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return if error.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    // Logging is not up yet, so config failures go straight to stderr.
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("eve: {error:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);

    match eve_bot::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
