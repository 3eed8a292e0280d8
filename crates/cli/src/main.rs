use crate::{
    env::EnvManager,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::Commands;
use engine_config::settings::{
    RunMode, RunnerSettings, SALT_ENV, validated::ValidatedSettings,
    validator::SettingsValidator,
};
use engine_processing::{
    redaction::CallerIdentity,
    transform::salt::{plain_hash, salted_hash},
};
use engine_runtime::execution::{executor, stores::Stores};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "saltmerge",
    version = "0.1.0",
    about = "Pseudonymize device telemetry and merge it into a deduplicated table"
)]
struct Cli {
    #[arg(long, global = true, help = "JSON settings file")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Load environment variables from this file")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let code = match dispatch(cli, &shutdown).await {
        Ok(()) if shutdown.is_shutdown_requested() => ExitCode::ShutdownRequested,
        Ok(()) => ExitCode::Success,
        Err(err) => {
            error!(error = %err, "saltmerge failed");
            eprintln!("Error: {err}");
            ExitCode::GeneralError
        }
    };

    std::process::exit(code.as_i32());
}

async fn dispatch(cli: Cli, shutdown: &ShutdownCoordinator) -> Result<(), CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = &cli.env_file {
        env.load_from_file(path)?;
    }

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Hash { key, salt } => {
            let salt = salt
                .or_else(|| env.get(SALT_ENV))
                .ok_or_else(|| CliError::Config(format!("--salt or {SALT_ENV} is required")))?;
            println!("salted   {}", salted_hash(key, &salt));
            println!("unsalted {}", plain_hash(key));
        }
        Commands::Init => {
            let (_, stores) = open(config, &env, None)?;
            executor::init_target(&stores).await?;
        }
        Commands::Ingest { csv } => {
            let (_, stores) = open(config, &env, None)?;
            let offsets = executor::ingest_csv(&stores, &csv).await?;
            println!("Ingested {} records", offsets.len());
        }
        Commands::Run { continuous, output } => {
            let mode = continuous.then_some(RunMode::Continuous);
            let (settings, stores) = open(config, &env, mode)?;
            info!(
                runner = %settings.runner_id,
                source = %settings.source,
                target_table = %settings.target,
                mode = ?settings.mode,
                "Starting run"
            );

            let summary = executor::run_with(&stores, &settings, shutdown.cancel_token()).await?;
            match output {
                Some(path) => output::write_summary(&summary, &path).await?,
                None => output::print_summary(&summary)?,
            }
        }
        Commands::Progress { json } => {
            let (settings, stores) = open(config, &env, None)?;
            let status = executor::progress(&stores, &settings).await?;
            if json {
                output::print_json(&status)?;
            } else {
                output::print_progress_table(&status);
            }
        }
        Commands::View {
            groups,
            user,
            limit,
            json,
        } => {
            let (settings, stores) = open(config, &env, None)?;
            let caller = CallerIdentity::new(user, groups);
            let rows = executor::redacted_view(&stores, &settings, &caller, limit).await?;
            if json {
                output::print_json(&rows)?;
            } else {
                output::print_view_table(&rows);
            }
        }
        Commands::Target { json } => {
            let (_, stores) = open(config, &env, None)?;
            let rows = executor::target_rows(&stores).await?;
            if json {
                output::print_json(&rows)?;
            } else {
                output::print_target_table(&rows);
            }
        }
    }

    Ok(())
}

/// Load the settings file and apply overrides. A `mode` override is applied
/// before validation.
fn load_settings(
    path: Option<&Path>,
    env: &EnvManager,
    mode: Option<RunMode>,
) -> Result<ValidatedSettings, CliError> {
    let path =
        path.ok_or_else(|| CliError::Config("--config is required for this command".into()))?;
    let mut raw = RunnerSettings::load(path)?;
    raw.apply_env(|key| env.get(key));
    if let Some(mode) = mode {
        raw = raw.with_mode(mode);
    }

    Ok(SettingsValidator::validate(&raw)?)
}

fn open(
    path: Option<&Path>,
    env: &EnvManager,
    mode: Option<RunMode>,
) -> Result<(ValidatedSettings, Stores), CliError> {
    let settings = load_settings(path, env, mode)?;
    let stores = Stores::open(&settings)?;
    Ok((settings, stores))
}
