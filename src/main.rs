use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::Utf8Path;
use clap::CommandFactory;
use clap_complete::generate;
use tracing::info;

use cutover::bluegreen::ActionKind;
use cutover::cli;
use cutover::config::load_config;
use cutover::courier::CfCourierFactory;
use cutover::deployment::{Authorization, CfContext, DeployRequest};
use cutover::events::health_checker::HealthChecker;
use cutover::events::route_mapper::RouteMapper;
use cutover::events::{EventKind, EventManager};
use cutover::fetcher::ArtifactFetcher;
use cutover::pipeline::DeploymentPipeline;

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    // Handle completions before setting up logging so the generated script
    // stays clean.
    if let cli::Commands::Completions(opts) = &args.command {
        let mut cmd = cli::Cli::command();
        generate(opts.shell, &mut cmd, "cutover", &mut io::stdout());
        return Ok(());
    }

    let log_level = match &args.command {
        cli::Commands::Deploy(opts) => opts.common.log_level,
        cli::Commands::Stop(opts) | cli::Commands::Start(opts) => opts.common.log_level,
        cli::Commands::Validate(opts) => opts.common.log_level,
        cli::Commands::Completions(_) => unreachable!("completions handled above"),
    };
    cutover::init_logging(log_level)?;

    match &args.command {
        cli::Commands::Deploy(opts) => run_deploy(opts),
        cli::Commands::Stop(opts) => run_lifecycle(opts, ActionKind::Stop),
        cli::Commands::Start(opts) => run_lifecycle(opts, ActionKind::Start),
        cli::Commands::Validate(opts) => run_validate(opts),
        cli::Commands::Completions(_) => unreachable!("completions handled above"),
    }
}

fn build_pipeline(config_path: &Utf8Path) -> Result<DeploymentPipeline> {
    let config = load_config(config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;
    config.validate().context("configuration validation failed")?;

    let couriers = Arc::new(CfCourierFactory::new().context("platform CLI is required")?);
    let fetcher = Arc::new(ArtifactFetcher);

    let mut events = EventManager::new();
    // The new build must answer its health endpoint before its final routes
    // are mapped.
    events.register(EventKind::PushFinished, Box::new(HealthChecker::with_ureq()));
    events.register(EventKind::PushFinished, Box::new(RouteMapper));

    DeploymentPipeline::new(config, Arc::new(events), couriers, fetcher)
}

fn target_context(target: &cli::TargetArgs) -> CfContext {
    CfContext {
        environment: target.environment.clone(),
        organization: target.org.clone(),
        space: target.space.clone(),
        application: target.app_name.clone(),
    }
}

fn target_authorization(target: &cli::TargetArgs) -> Option<Authorization> {
    match (&target.username, &target.password) {
        (Some(username), Some(password)) => Some(Authorization {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    }
}

fn run_deploy(opts: &cli::DeployArgs) -> Result<()> {
    let pipeline = build_pipeline(&opts.common.config)?;
    let context = target_context(&opts.target);
    let authorization = target_authorization(&opts.target);

    let request = if let Some(archive) = &opts.archive {
        DeployRequest {
            content_type: "application/zip".to_string(),
            authorization,
            body: fs::read(archive)
                .with_context(|| format!("failed to read archive: {}", archive))?,
        }
    } else {
        let artifact_url = opts
            .artifact_url
            .clone()
            .context("either --artifact-url or --archive is required")?;
        let manifest = match &opts.manifest {
            Some(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("failed to read manifest: {}", path))?;
                BASE64.encode(bytes)
            }
            None => String::new(),
        };
        let body = serde_json::json!({
            "artifact_url": artifact_url,
            "manifest": manifest,
            "environment_variables": parse_environment_variables(&opts.environment_variables)?,
        });
        DeployRequest {
            content_type: "application/json".to_string(),
            authorization,
            body: serde_json::to_vec(&body).context("failed to encode deploy request")?,
        }
    };

    let mut response = Vec::new();
    let outcome = pipeline.deploy(request, &context, &mut response);
    io::stdout().write_all(&response)?;

    if outcome.status >= 400 {
        process::exit(1);
    }
    Ok(())
}

fn run_lifecycle(opts: &cli::LifecycleArgs, kind: ActionKind) -> Result<()> {
    let pipeline = build_pipeline(&opts.common.config)?;
    let context = target_context(&opts.target);
    let authorization = target_authorization(&opts.target);

    let mut response = Vec::new();
    let outcome = match kind {
        ActionKind::Stop => pipeline.stop(&context, authorization, BTreeMap::new(), &mut response),
        _ => pipeline.start(&context, authorization, BTreeMap::new(), &mut response),
    };
    io::stdout().write_all(&response)?;

    if outcome.status >= 400 {
        process::exit(1);
    }
    Ok(())
}

fn run_validate(opts: &cli::ValidateArgs) -> Result<()> {
    let config = load_config(&opts.common.config)
        .with_context(|| format!("failed to load configuration from {}", opts.common.config))?;
    config.validate().context("configuration validation failed")?;
    info!("validation successful: {} environment(s) configured", config.environments.len());
    Ok(())
}

fn parse_environment_variables(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut variables = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("environment variable must be KEY=VALUE: {}", pair))?;
        variables.insert(key.to_string(), value.to_string());
    }
    Ok(variables)
}
