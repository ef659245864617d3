//! Configuration module - environment variable parsing

mod balance;

pub use balance::{BalanceConfig, Growth, ItemSpec, RoleProfile, SkillEffect, SkillSpec};

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Supabase connection for the durable store
#[derive(Clone, Debug)]
pub struct SupabaseSettings {
    pub url: String,
    /// Service role key (bypasses RLS - server only!)
    pub service_role_key: String,
    /// Upper bound on any single durable write
    pub request_timeout: Duration,
}

/// Output format of the tracing subscriber
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid("LOG_FORMAT")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// `pretty` (default) or `json`
    pub log_format: LogFormat,

    /// Soft deadline for each declaration round
    pub round_deadline: Duration,
    /// Retention of live snapshots and in-flight declarations
    pub snapshot_ttl: Duration,
    /// How often expired ephemeral entries are swept
    pub store_sweep_interval: Duration,
    /// Write a durable checkpoint every N rounds (0 disables)
    pub checkpoint_every_rounds: u32,

    /// Optional JSON balance table; defaults are used when unset
    pub balance_path: Option<PathBuf>,
    /// Durable store; falls back to in-process storage when unset
    pub supabase: Option<SupabaseSettings>,
    /// Allowed client origins for CORS (comma separated)
    pub client_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let supabase = match (env::var("SUPABASE_URL"), env::var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Ok(url), Ok(service_role_key)) => Some(SupabaseSettings {
                url,
                service_role_key,
                request_timeout: Duration::from_secs(parse_env("SUPABASE_TIMEOUT_SECS", 10)?),
            }),
            (Ok(_), Err(_)) => return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY")),
            _ => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: match env::var("LOG_FORMAT") {
                Ok(raw) => raw.parse()?,
                Err(_) => LogFormat::default(),
            },

            round_deadline: Duration::from_secs(parse_env("ROUND_DEADLINE_SECS", 30)?),
            snapshot_ttl: Duration::from_secs(parse_env("SNAPSHOT_TTL_SECS", 3600)?),
            store_sweep_interval: Duration::from_secs(parse_env("STORE_SWEEP_SECS", 60)?),
            checkpoint_every_rounds: parse_env("CHECKPOINT_EVERY_ROUNDS", 0)?,

            balance_path: env::var("BALANCE_CONFIG_PATH").ok().map(PathBuf::from),
            supabase,
            client_origin: env::var("CLIENT_ORIGIN").ok(),
        })
    }

    /// Load the balance table named by the environment, or the built-in defaults
    pub fn load_balance(&self) -> Result<BalanceConfig, ConfigError> {
        match &self.balance_path {
            Some(path) => BalanceConfig::from_path(path),
            None => Ok(BalanceConfig::default()),
        }
    }
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Failed to read balance file {path}: {source}")]
    BalanceFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse balance file: {0}")]
    BalanceParse(#[from] serde_json::Error),

    #[error("Invalid balance table: {0}")]
    Balance(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(ConfigError::Invalid("LOG_FORMAT"))
        ));
    }
}
