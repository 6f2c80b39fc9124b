pub mod bluegreen;
pub mod cli;
pub mod config;
pub mod courier;
pub mod deployment;
pub mod error;
pub mod error_finder;
pub mod events;
pub mod fetcher;
pub mod manifest;
pub mod pipeline;
pub mod prechecker;

pub use error::CutoverError;

use anyhow::{Context, Result};
use tracing_subscriber::{FmtSubscriber, filter::LevelFilter};

pub fn init_logging(log_level: cli::LogLevel) -> Result<()> {
    let filter = match log_level {
        cli::LogLevel::Trace => LevelFilter::TRACE,
        cli::LogLevel::Debug => LevelFilter::DEBUG,
        cli::LogLevel::Info => LevelFilter::INFO,
        cli::LogLevel::Warn => LevelFilter::WARN,
        cli::LogLevel::Error => LevelFilter::ERROR,
    };

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(filter).finish(),
    )
    .context("failed to set global default tracing subscriber")
}
