//! Makora Configuration
//!
//! Shared configuration crate for the privacy layer and its tooling.
//!
//! Handles loading configuration from:
//! 1. MK_CONFIG env var (explicit path)
//! 2. ./config.toml (current directory)
//! 3. ~/.makora/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".makora";

// ============================================================================
// Default Constants
// ============================================================================

/// Default Merkle tree depth (2^20 leaves)
pub const DEFAULT_TREE_DEPTH: usize = 20;

const DEFAULT_SNARKJS_BIN: &str = "snarkjs";
const DEFAULT_WASM_PATH: &str = "./circuits/build/transfer_js/transfer.wasm";
const DEFAULT_ZKEY_PATH: &str = "./circuits/build/transfer_final.zkey";
const DEFAULT_VKEY_PATH: &str = "./circuits/build/verification_key.json";
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";
const DEFAULT_PRIVACY_PROGRAM: &str = "C1qXFsB6oJgZLQnXwRi9mwrm3QshKMU8kGGUZTAa9xcM";
const DEFAULT_COMMITMENT: &str = "confirmed";

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MakoraConfig {
    #[serde(default)]
    pub privacy: PrivacyTomlConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
}

/// `[privacy]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyTomlConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_tree_depth")]
    pub tree_depth: usize,
}

impl Default for PrivacyTomlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tree_depth: DEFAULT_TREE_DEPTH,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}

/// `[prover]` section: locations of the circuit artifacts and the proving backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverConfig {
    #[serde(default = "default_snarkjs_bin")]
    pub snarkjs_bin: String,
    #[serde(default = "default_wasm_path")]
    pub wasm_path: PathBuf,
    #[serde(default = "default_zkey_path")]
    pub zkey_path: PathBuf,
    #[serde(default = "default_vkey_path")]
    pub vkey_path: PathBuf,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            snarkjs_bin: DEFAULT_SNARKJS_BIN.into(),
            wasm_path: DEFAULT_WASM_PATH.into(),
            zkey_path: DEFAULT_ZKEY_PATH.into(),
            vkey_path: DEFAULT_VKEY_PATH.into(),
        }
    }
}

fn default_snarkjs_bin() -> String {
    DEFAULT_SNARKJS_BIN.into()
}
fn default_wasm_path() -> PathBuf {
    DEFAULT_WASM_PATH.into()
}
fn default_zkey_path() -> PathBuf {
    DEFAULT_ZKEY_PATH.into()
}
fn default_vkey_path() -> PathBuf {
    DEFAULT_VKEY_PATH.into()
}

/// `[solana]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_privacy_program")]
    pub privacy_program_id: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.into(),
            privacy_program_id: DEFAULT_PRIVACY_PROGRAM.into(),
            commitment: DEFAULT_COMMITMENT.into(),
        }
    }
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.into()
}
fn default_privacy_program() -> String {
    DEFAULT_PRIVACY_PROGRAM.into()
}
fn default_commitment() -> String {
    DEFAULT_COMMITMENT.into()
}

/// Configuration handed to the privacy manager.
///
/// Fixed at manager construction; the manager never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyConfig {
    pub enabled: bool,
    pub tree_depth: usize,
    pub prover: ProverConfig,
    pub solana: SolanaConfig,
}

impl PrivacyConfig {
    /// Enabled config with default depth and artifact locations
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Disabled config; every gated operation will refuse to run
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_tree_depth(mut self, depth: usize) -> Self {
        self.tree_depth = depth;
        self
    }

    pub fn with_prover(mut self, prover: ProverConfig) -> Self {
        self.prover = prover;
        self
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tree_depth: DEFAULT_TREE_DEPTH,
            prover: ProverConfig::default(),
            solana: SolanaConfig::default(),
        }
    }
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set path field from env var if present
fn env_path(key: &str, field: &mut PathBuf) {
    if let Ok(v) = env::var(key) {
        *field = PathBuf::from(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        }
    }
}

/// Check if env var is set to a truthy value ("1" or "true")
fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

// ============================================================================
// Implementation
// ============================================================================

impl MakoraConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::parse_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check MK_CONFIG env var
        if let Ok(path) = env::var("MK_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check ./config.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.makora/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("MK_PRIVACY_ENABLED") {
            self.privacy.enabled = v;
        }
        env_parse("MK_TREE_DEPTH", &mut self.privacy.tree_depth);

        env_string("MK_SNARKJS_BIN", &mut self.prover.snarkjs_bin);
        env_path("MK_CIRCUIT_WASM", &mut self.prover.wasm_path);
        env_path("MK_CIRCUIT_ZKEY", &mut self.prover.zkey_path);
        env_path("MK_VERIFICATION_KEY", &mut self.prover.vkey_path);

        env_string("SOLANA_RPC_URL", &mut self.solana.rpc_url);
        env_string("MK_PRIVACY_PROGRAM_ID", &mut self.solana.privacy_program_id);
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// Flatten into the manager-facing config
    pub fn privacy_config(&self) -> PrivacyConfig {
        PrivacyConfig {
            enabled: self.privacy.enabled,
            tree_depth: self.privacy.tree_depth,
            prover: self.prover.clone(),
            solana: self.solana.clone(),
        }
    }
}
