use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use obr_util::errors::{ObrError, ObrResult};

/// User configuration loaded from `~/.obr/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObrConfig {
    /// Repository URIs registered at startup.
    #[serde(default)]
    pub repositories: Vec<String>,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Network settings from `[fetch]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout", rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout", rename = "read-timeout-secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_user_agent", rename = "user-agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            retries: default_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    60
}

fn default_retries() -> u32 {
    2
}

fn default_user_agent() -> String {
    format!("obr/{}", env!("CARGO_PKG_VERSION"))
}

/// Refresh policy from `[refresh]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// A cached snapshot is refetched only when the source is newer by more than this.
    #[serde(default = "default_staleness", rename = "staleness-secs")]
    pub staleness_secs: u64,
    #[serde(default = "default_referral_depth", rename = "max-referral-depth")]
    pub max_referral_depth: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness(),
            max_referral_depth: default_referral_depth(),
        }
    }
}

impl RefreshConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }
}

fn default_staleness() -> u64 {
    300
}

fn default_referral_depth() -> u32 {
    4
}

/// Resolver defaults from `[resolver]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default, rename = "skip-optional")]
    pub skip_optional: bool,
    /// Provider cap for multiple-cardinality requirements; `0` is unbounded.
    #[serde(default, rename = "max-multiple-providers")]
    pub max_multiple_providers: usize,
}

impl ObrConfig {
    /// Load the configuration from `~/.obr/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> ObrResult<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> ObrResult<Self> {
        if !path.is_file() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ObrError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::parse(&content).map_err(|e| match e {
            ObrError::Config { message } => ObrError::Config {
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> ObrResult<Self> {
        toml::from_str(content).map_err(|e| ObrError::Config {
            message: format!("Failed to parse config: {e}"),
        })
    }

    /// Returns the default path to the config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the OBR data directory (`~/.obr/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".obr")
}
