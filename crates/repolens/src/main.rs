mod config;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use config::{Config, ConfigError, ServeArgs};
use lens_core::cache::{CacheStore, MemoryCache};
use lens_core::error::{StoreError, TaskError};
use lens_core::fetcher::Fetcher;
use lens_core::tasks::{MemoryTaskStore, TaskStore};
use lens_core::{Gateway, LocalQueue, Worker};
use lens_db::{DbCache, DbTaskStore};
use lens_remote::{ClientBuildError, GitHubConfig, GitHubSource, OpenAiClient, OpenAiConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "repolens=info,lens_core=info,lens_serve=info,tower_http=info";

#[derive(Parser)]
#[command(name = "repolens", version, about = "Fetch GitHub repositories and analyze them")]
struct Cli {
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Print the OpenAPI document.
    Openapi,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Client(#[from] ClientBuildError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            init_tracing(cli.log_format);
            match serve(&args).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    error!(error = %err, "repolens stopped");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Openapi => {
            println!("{}", lens_serve::openapi::generate_spec());
            ExitCode::SUCCESS
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn serve(args: &ServeArgs) -> Result<(), StartupError> {
    let config = Config::resolve(args)?;
    let (cache, tasks) = open_stores(&config)?;

    let source = GitHubSource::new(GitHubConfig {
        api_url: config.github_api_url.clone(),
        token: config.github_token.clone(),
        timeout: config.http_timeout,
    })?;
    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; analysis tasks will fail");
    }
    let inference = OpenAiClient::new(OpenAiConfig {
        base_url: config.openai_base_url.clone(),
        api_key: config.openai_api_key.clone(),
        model: config.model.clone(),
        timeout: config.http_timeout,
    })?;

    let worker = Worker::new(
        Fetcher::new(Arc::new(source), config.max_in_flight),
        Arc::new(inference),
        cache.clone(),
    )
    .with_cache_ttl(config.cache_ttl);
    let queue = LocalQueue::new(worker, tasks, config.workers);
    let gateway = Gateway::new(Arc::new(queue), cache);
    let state = lens_serve::AppState::new(Arc::new(gateway));

    info!(
        port = config.port,
        in_memory = config.in_memory,
        workers = config.workers,
        max_in_flight = config.max_in_flight,
        model = %config.model,
        "starting repolens"
    );
    lens_serve::serve(state, SocketAddr::new(config.host, config.port)).await?;
    Ok(())
}

fn open_stores(
    config: &Config,
) -> Result<(Arc<dyn CacheStore>, Arc<dyn TaskStore>), StartupError> {
    if config.in_memory {
        return Ok((Arc::new(MemoryCache::new()), Arc::new(MemoryTaskStore::new())));
    }

    if let Some(parent) = Path::new(&config.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let cache = DbCache::open(&config.db_path)?;
    let tasks = DbTaskStore::open(&config.db_path)?;

    let now = Utc::now();
    let abandoned = tasks.fail_abandoned()?;
    let expired = cache.cleanup(now)?;
    let removed = tasks.cleanup(retention_cutoff(now, config.task_retention_hours))?;
    info!(db_path = %config.db_path, abandoned, expired, removed, "startup cleanup finished");

    Ok((Arc::new(cache), Arc::new(tasks)))
}

fn retention_cutoff(now: DateTime<Utc>, hours: u64) -> DateTime<Utc> {
    i64::try_from(hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .and_then(|retention| now.checked_sub_signed(retention))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
