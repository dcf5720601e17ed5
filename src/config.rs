use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::{Error, Result};
use crate::file_utils::{self, ArtifactPaths};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
pub const PREDICT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Args)]
pub struct ServeArgs {
    /// Directory holding the model, scaler, metadata and reference dataset
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Request worker threads, defaults to the number of CPUs
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub artifacts: ArtifactPaths,
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    /// Command-line values win over `HOST`, `PORT`, `RUL_WORKERS` and
    /// `RUL_ARTIFACT_DIR`, which win over built-in defaults.
    pub fn resolve(args: ServeArgs, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let artifact_dir = artifact_dir(args.artifact_dir, &env)?;

        let host = args
            .host
            .or_else(|| env("HOST"))
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match args.port {
            Some(port) => port,
            None => match env("PORT") {
                Some(raw) => raw.parse::<u16>().map_err(|_| {
                    Error::config(format!("PORT must be a port number, got {raw:?}"))
                })?,
                None => DEFAULT_PORT,
            },
        };

        let workers = match args.workers {
            Some(workers) => workers as usize,
            None => match env("RUL_WORKERS") {
                Some(raw) => match raw.parse::<usize>() {
                    Ok(workers) if workers > 0 => workers,
                    _ => {
                        return Err(Error::config(format!(
                            "RUL_WORKERS must be a positive number, got {raw:?}"
                        )))
                    }
                },
                None => num_cpus::get(),
            },
        };

        Ok(Self {
            artifacts: ArtifactPaths::in_dir(&artifact_dir),
            host,
            port,
            workers,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct ClientArgs {
    /// Base URL of the prediction server
    #[arg(long)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub health_timeout: Duration,
    pub predict_timeout: Duration,
}

impl ClientConfig {
    pub fn resolve(args: ClientArgs, env: impl Fn(&str) -> Option<String>) -> Self {
        let api_url = args
            .api_url
            .or_else(|| env("RUL_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            health_timeout: HEALTH_TIMEOUT,
            predict_timeout: PREDICT_TIMEOUT,
        }
    }
}

/// Explicit directory, else `RUL_ARTIFACT_DIR`, else the platform data directory.
pub fn artifact_dir(
    explicit: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf> {
    match explicit.or_else(|| env("RUL_ARTIFACT_DIR").map(PathBuf::from)) {
        Some(dir) => Ok(dir),
        None => file_utils::data_directory(),
    }
}

/// Reads an environment variable, treating blank values as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
