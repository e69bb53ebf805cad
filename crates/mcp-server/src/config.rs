//! Server configuration: CLI options plus environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::{ErrorCode, ServerError};

/// Command line interface of the `zettel-memory` binary.
#[derive(Debug, Parser)]
#[command(name = "zettel-memory", version, about = "MCP server for a Markdown note vault")]
pub struct Cli {
    #[command(flatten)]
    pub opts: RootOpts,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Root options, inherited by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct RootOpts {
    /// Path to the vault root directory
    #[arg(long, value_name = "path")]
    pub vault: Option<PathBuf>,

    /// Path to the search index database
    #[arg(long, value_name = "path")]
    pub index: Option<PathBuf>,

    /// Runtime mode
    #[arg(long, value_enum, default_value_t = Mode::Prod)]
    pub mode: Mode,

    /// Per-tool execution deadline in milliseconds
    #[arg(long, value_name = "ms", default_value_t = 5000)]
    pub timeout: u64,

    /// Per-tool retry count
    #[arg(long, value_name = "count", default_value_t = 2)]
    pub retries: u32,

    /// Verbose logging (debug level)
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the MCP server on stdio (the default)
    Server,
    /// Print the version and exit
    Version,
    /// Check that the vault and index are reachable
    Healthcheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Dev,
    Prod,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Dev => "dev",
            Mode::Prod => "prod",
        })
    }
}

/// Recovery-queue tuning, overridable through the environment.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub worker_interval: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            worker_interval: Duration::from_secs(2),
        }
    }
}

impl RecoveryConfig {
    /// Apply `RECOVERY_*` environment overrides on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(value) = env_parse::<u32>("RECOVERY_MAX_RETRIES") {
            config.max_retries = value;
        }
        if let Some(value) = env_parse::<u64>("RECOVERY_BASE_DELAY_MS") {
            config.base_delay = Duration::from_millis(value);
        }
        if let Some(value) = env_parse::<u64>("RECOVERY_WORKER_INTERVAL_MS") {
            config.worker_interval = Duration::from_millis(value);
        }
        config
    }
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub vault_path: PathBuf,
    pub index_path: PathBuf,
    pub mode: Mode,
    pub tool_timeout: Duration,
    pub tool_retries: u32,
    pub verbose: bool,
    pub recovery: RecoveryConfig,
    pub search_default_limit: usize,
}

impl Config {
    /// Resolve the effective configuration from root options and
    /// environment fallbacks.
    pub fn resolve(opts: &RootOpts) -> Result<Self, ServerError> {
        let vault_path = opts
            .vault
            .clone()
            .or_else(|| std::env::var("ZETTEL_VAULT_PATH").ok().map(PathBuf::from))
            .ok_or_else(|| {
                ServerError::new(
                    ErrorCode::VaultPathError,
                    "no vault path: pass --vault or set ZETTEL_VAULT_PATH",
                )
            })?;
        let vault_path = expand_tilde(&vault_path);

        let index_path = opts
            .index
            .clone()
            .map(|p| expand_tilde(&p))
            .unwrap_or_else(|| vault_path.join(".zettel").join("index.db"));

        let search_default_limit = env_parse::<usize>("SEARCH_DEFAULT_LIMIT")
            .filter(|limit| *limit > 0 && *limit <= 100)
            .unwrap_or(10);

        Ok(Self {
            vault_path,
            index_path,
            mode: opts.mode,
            tool_timeout: Duration::from_millis(opts.timeout),
            tool_retries: opts.retries,
            verbose: opts.verbose,
            recovery: RecoveryConfig::from_env(),
            search_default_limit,
        })
    }

    /// A configuration rooted at the given vault, with the index in
    /// its default sidecar location. Used by tests.
    pub fn for_vault(vault_path: PathBuf) -> Self {
        let index_path = vault_path.join(".zettel").join("index.db");
        Self {
            vault_path,
            index_path,
            mode: Mode::Dev,
            tool_timeout: Duration::from_millis(5000),
            tool_retries: 2,
            verbose: false,
            recovery: RecoveryConfig::default(),
            search_default_limit: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}

/// Expand a `~` or `~/` prefix to the user's home directory.
fn expand_tilde(path: &PathBuf) -> PathBuf {
    let Some(text) = path.to_str() else {
        return path.clone();
    };
    if text == "~" {
        dirs::home_dir().unwrap_or_else(|| path.clone())
    } else if let Some(rest) = text.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.clone())
    } else {
        path.clone()
    }
}
