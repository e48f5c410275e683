use clap::Args;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },
    #[error("invalid config {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Flags for `repolens serve`. Each one can also come from its env var.
#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// TOML file with settings; flags and env vars take precedence.
    #[arg(long, env = "REPOLENS_CONFIG")]
    pub config: Option<PathBuf>,
    #[arg(long, env = "REPOLENS_HOST")]
    pub host: Option<IpAddr>,
    #[arg(long, env = "REPOLENS_PORT")]
    pub port: Option<u16>,
    #[arg(long, env = "REPOLENS_DB_PATH")]
    pub db_path: Option<String>,
    /// Keep cache and tasks in process memory instead of SQLite.
    #[arg(long, env = "REPOLENS_IN_MEMORY", num_args = 0..=1, default_missing_value = "true")]
    pub in_memory: Option<bool>,
    #[arg(long, env = "GITHUB_API_URL")]
    pub github_api_url: Option<String>,
    #[arg(long, env = "GITHUB_API_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    #[arg(long, env = "REPOLENS_MODEL")]
    pub model: Option<String>,
    #[arg(long, env = "REPOLENS_CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,
    #[arg(long, env = "REPOLENS_MAX_IN_FLIGHT")]
    pub max_in_flight: Option<usize>,
    #[arg(long, env = "REPOLENS_WORKERS")]
    pub workers: Option<usize>,
    #[arg(long, env = "REPOLENS_TASK_RETENTION_HOURS")]
    pub task_retention_hours: Option<u64>,
    #[arg(long, env = "REPOLENS_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    host: Option<IpAddr>,
    port: Option<u16>,
    db_path: Option<String>,
    in_memory: Option<bool>,
    github_api_url: Option<String>,
    github_token: Option<String>,
    openai_base_url: Option<String>,
    openai_api_key: Option<String>,
    model: Option<String>,
    cache_ttl_secs: Option<u64>,
    max_in_flight: Option<usize>,
    workers: Option<usize>,
    task_retention_hours: Option<u64>,
    http_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub db_path: String,
    pub in_memory: bool,
    pub github_api_url: String,
    pub github_token: Option<String>,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub cache_ttl: Duration,
    pub max_in_flight: usize,
    pub workers: usize,
    pub task_retention_hours: u64,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 4830,
            db_path: ".repolens/lens.db".to_string(),
            in_memory: false,
            github_api_url: lens_remote::github::DEFAULT_API_URL.to_string(),
            github_token: None,
            openai_base_url: lens_remote::openai::DEFAULT_BASE_URL.to_string(),
            openai_api_key: None,
            model: lens_remote::openai::DEFAULT_MODEL.to_string(),
            cache_ttl: lens_core::cache::DEFAULT_TTL,
            max_in_flight: lens_core::fetcher::DEFAULT_MAX_IN_FLIGHT,
            workers: lens_core::queue::DEFAULT_WORKERS,
            task_retention_hours: 168,
            http_timeout: Duration::from_secs(30),
        }
    }
}

fn set<T: Clone>(target: &mut T, value: Option<&T>) {
    if let Some(value) = value {
        target.clone_from(value);
    }
}

fn set_secs(target: &mut Duration, value: Option<u64>) {
    if let Some(secs) = value {
        *target = Duration::from_secs(secs);
    }
}

impl Config {
    /// Defaults, then the TOML file named by `--config`, then flags/env.
    pub fn resolve(args: &ServeArgs) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = &args.config {
            config.apply_file(&load_file(path)?);
        }
        config.apply_args(args);
        Ok(config)
    }

    fn apply_file(&mut self, file: &FileConfig) {
        set(&mut self.host, file.host.as_ref());
        set(&mut self.port, file.port.as_ref());
        set(&mut self.db_path, file.db_path.as_ref());
        set(&mut self.in_memory, file.in_memory.as_ref());
        set(&mut self.github_api_url, file.github_api_url.as_ref());
        set(&mut self.openai_base_url, file.openai_base_url.as_ref());
        set(&mut self.model, file.model.as_ref());
        set(&mut self.max_in_flight, file.max_in_flight.as_ref());
        set(&mut self.workers, file.workers.as_ref());
        set(&mut self.task_retention_hours, file.task_retention_hours.as_ref());
        if file.github_token.is_some() {
            self.github_token.clone_from(&file.github_token);
        }
        if file.openai_api_key.is_some() {
            self.openai_api_key.clone_from(&file.openai_api_key);
        }
        set_secs(&mut self.cache_ttl, file.cache_ttl_secs);
        set_secs(&mut self.http_timeout, file.http_timeout_secs);
    }

    fn apply_args(&mut self, args: &ServeArgs) {
        set(&mut self.host, args.host.as_ref());
        set(&mut self.port, args.port.as_ref());
        set(&mut self.db_path, args.db_path.as_ref());
        set(&mut self.in_memory, args.in_memory.as_ref());
        set(&mut self.github_api_url, args.github_api_url.as_ref());
        set(&mut self.openai_base_url, args.openai_base_url.as_ref());
        set(&mut self.model, args.model.as_ref());
        set(&mut self.max_in_flight, args.max_in_flight.as_ref());
        set(&mut self.workers, args.workers.as_ref());
        set(&mut self.task_retention_hours, args.task_retention_hours.as_ref());
        if args.github_token.is_some() {
            self.github_token.clone_from(&args.github_token);
        }
        if args.openai_api_key.is_some() {
            self.openai_api_key.clone_from(&args.openai_api_key);
        }
        set_secs(&mut self.cache_ttl, args.cache_ttl_secs);
        set_secs(&mut self.http_timeout, args.http_timeout_secs);
    }
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    toml::from_str(&content).map_err(|err| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}
