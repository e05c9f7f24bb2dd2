//! Configuration models for the distributor.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The operator resolves these unknowns at runtime via config file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

/// Top-level configuration for the distributor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node connection settings
    pub node: NodeConfig,

    /// Signing key settings
    #[serde(default)]
    pub signer: SignerConfig,

    /// What to mint and how to batch it
    pub distribution: DistributionConfig,

    /// Input, log and checkpoint locations
    #[serde(default)]
    pub files: FilesConfig,
}

/// Remote node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// WebSocket RPC endpoint
    pub url: String,

    /// Connection attempts before giving up
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Initial backoff between connection attempts, doubled each attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Maximum wait for a terminal status after submission (0 waits forever)
    #[serde(default = "default_finality_timeout")]
    pub finality_timeout_secs: u64,
}

fn default_connect_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_finality_timeout() -> u64 {
    600
}

impl NodeConfig {
    /// Finality wait bound, `None` when disabled.
    pub fn finality_timeout(&self) -> Option<Duration> {
        (self.finality_timeout_secs > 0).then(|| Duration::from_secs(self.finality_timeout_secs))
    }
}

/// Signer configuration.
///
/// K_i: The seed is a 32-byte sr25519 mini secret, hex encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Seed (may contain ${ENV_VAR} placeholders)
    #[serde(default)]
    pub seed: Option<String>,

    /// Environment variable holding the seed
    #[serde(default = "default_seed_env")]
    pub seed_env: String,
}

fn default_seed_env() -> String {
    "PRIVATE_KEY".to_string()
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            seed: None,
            seed_env: default_seed_env(),
        }
    }
}

/// Distribution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Asset to mint
    pub asset_id: u32,

    /// Records per batch transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Factor applied to each record's total before minting
    #[serde(default = "default_amount_multiplier")]
    pub amount_multiplier: u128,

    /// Freeze each beneficiary after minting
    #[serde(default = "default_true")]
    pub freeze: bool,

    /// Marker remark is "<prefix> <batch number>"
    #[serde(default = "default_remark_prefix")]
    pub remark_prefix: String,
}

fn default_batch_size() -> usize {
    300
}

fn default_amount_multiplier() -> u128 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_remark_prefix() -> String {
    "Asset".to_string()
}

/// File locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Newline-delimited JSON snapshot
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,

    /// Append-only submission log
    #[serde(default = "default_log")]
    pub log: PathBuf,

    /// Checkpoint: last processed line
    #[serde(default = "default_last_line")]
    pub last_line: PathBuf,

    /// Checkpoint: current batch number
    #[serde(default = "default_current_batch")]
    pub current_batch: PathBuf,

    /// Marker for the batch currently on the wire
    #[serde(default = "default_inflight")]
    pub inflight: PathBuf,
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("snapshot.jsonl")
}

fn default_log() -> PathBuf {
    PathBuf::from("logs/distribution.log")
}

fn default_last_line() -> PathBuf {
    PathBuf::from("lastKeyAsset.txt")
}

fn default_current_batch() -> PathBuf {
    PathBuf::from("currentBatchAsset.txt")
}

fn default_inflight() -> PathBuf {
    PathBuf::from("inflightBatchAsset.json")
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot(),
            log: default_log(),
            last_line: default_last_line(),
            current_batch: default_current_batch(),
            inflight: default_inflight(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.node.url = expand_env_vars(&config.node.url);
        config.validate()?;
        Ok(config)
    }

    /// Reject values the batch loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.url.trim().is_empty() {
            return Err(ConfigError::Invalid("node.url must not be empty".to_string()));
        }
        if self.distribution.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "distribution.batch_size must be at least 1".to_string(),
            ));
        }
        if self.distribution.amount_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "distribution.amount_multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the signer seed from config or environment.
    ///
    /// B_i(seed available) → Result
    /// B_i(seed is 32 bytes of hex) → Result
    pub fn resolve_seed(&self) -> Result<[u8; 32], ConfigError> {
        let raw = match &self.signer.seed {
            Some(seed) => expand_env_vars(seed),
            None => std::env::var(&self.signer.seed_env).map_err(|_| ConfigError::MissingSeed {
                env_var: self.signer.seed_env.clone(),
            })?,
        };
        parse_seed(&raw)
    }
}

/// Decode a hex seed, with or without a `0x` prefix.
pub fn parse_seed(raw: &str) -> Result<[u8; 32], ConfigError> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(hex_part).map_err(|e| ConfigError::InvalidSeed(e.to_string()))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| ConfigError::InvalidSeed(format!("expected 32 bytes, got {}", bytes.len())))
}

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error, out-of-range value
/// - I^B materialized: Missing signer seed
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing signer seed: set {env_var} env var or signer.seed in config")]
    MissingSeed { env_var: String },

    #[error("Invalid signer seed: {0}")]
    InvalidSeed(String),
}
