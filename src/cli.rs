//! Command-line interface definitions for cutover.
//!
//! This module defines the CLI structure using the `clap` crate. The CLI is
//! a thin shim over the deployment pipeline: it assembles a deploy request
//! from flags and files, runs the pipeline, and streams the response to
//! stdout.

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::Shell;

/// Top-level CLI structure that serves as the entry point for parsing
/// command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    /// The subcommand to execute, defining the primary operation.
    #[command(subcommand)]
    pub command: Commands,
}

/// The available subcommands in the application.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy an application to every foundation of an environment.
    ///
    /// Performs a blue-green push: the existing production instance stays up
    /// until the new one is verified, then the cutover happens on every
    /// foundation or on none.
    Deploy(DeployArgs),

    /// Stop an application on every foundation of an environment.
    Stop(LifecycleArgs),

    /// Start an application on every foundation of an environment.
    Start(LifecycleArgs),

    /// Validate the given configuration file.
    ///
    /// Performs syntax and schema validation on the YAML configuration
    /// without touching any foundation.
    Validate(ValidateArgs),

    /// Generate shell completion scripts.
    ///
    /// The generated script should be sourced in your shell's configuration
    /// file or saved to your shell's completion directory.
    Completions(CompletionsArgs),
}

/// Common arguments shared across commands.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the YAML service configuration.
    #[arg(short, long, default_value = "cutover.yaml", value_hint = ValueHint::FilePath)]
    pub config: Utf8PathBuf,

    /// Set the log level for controlling verbosity of output.
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
}

/// Which application, and where.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Environment name from the configuration.
    pub environment: String,

    /// Platform organization.
    pub org: String,

    /// Platform space.
    pub space: String,

    /// Application name.
    pub app_name: String,

    /// Platform username. Falls back to the configured default unless the
    /// environment requires authentication.
    #[arg(short, long)]
    pub username: Option<String>,

    /// Platform password.
    #[arg(short, long)]
    pub password: Option<String>,
}

/// Arguments for the `deploy` command.
#[derive(Args, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    /// URL of the artifact to deploy (zip archive in an artifact store).
    #[arg(long, conflicts_with = "archive")]
    pub artifact_url: Option<String>,

    /// Local zip archive to deploy instead of a remote artifact.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub archive: Option<Utf8PathBuf>,

    /// Platform manifest file to deploy with.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub manifest: Option<Utf8PathBuf>,

    /// Environment variables merged into the manifest before the push.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub environment_variables: Vec<String>,
}

/// Arguments for the `stop` and `start` commands.
#[derive(Args, Debug)]
pub struct LifecycleArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the `completions` command.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Log levels for controlling the verbosity of logging output, mapping
/// directly to the levels of the `tracing` crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Parses command-line arguments into a structured `Cli` instance.
pub fn parse_args() -> Result<Cli> {
    Ok(Cli::parse())
}
