//! Configuration module for the token-checkout system.
//!
//! Configuration is a single TOML file deserialized into typed structs
//! and validated before anything is constructed from it. The operator's
//! private key never lives in the file; it is read from the
//! `CHECKOUT_PRIVATE_KEY` environment variable on demand.

use checkout_types::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable holding the operator's signing key.
pub const PRIVATE_KEY_ENV: &str = "CHECKOUT_PRIVATE_KEY";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("parse error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration for the checkout services.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	/// Deployment environment name (dev, pre, prd).
	#[serde(default = "default_env")]
	pub env: String,
	/// HTTP RPC endpoint of the chain node.
	pub eth_url: String,
	/// Address operating the service (fee payer for operator-side
	/// transactions).
	pub owner: String,
	/// Token contract settings.
	pub token: TokenConfig,
	/// Order store settings.
	pub store: StoreConfig,
	/// Reconciliation settings.
	#[serde(default)]
	pub monitor: MonitorConfig,
}

/// Token contract configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
	/// Path to the JSON interface description of the token contract.
	pub abi_path: PathBuf,
	/// Contract address.
	pub address: String,
	/// Display symbol.
	pub symbol: String,
	/// Decimal exponent relating base units to human amounts.
	pub decimals: u8,
}

/// Order store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
	/// Which backend to use.
	pub backend: StoreBackend,
	/// Root directory for the file backend.
	pub path: Option<PathBuf>,
	/// Logical table orders are stored under.
	#[serde(default = "default_table")]
	pub table: String,
}

/// Supported storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
	Memory,
	File,
}

/// Reconciliation worker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
	/// Bound on how long one reconciliation attempt may wait for the
	/// transaction to appear.
	#[serde(default = "default_monitor_timeout_secs")]
	pub timeout_secs: u64,
	/// Reorg safety margin subtracted from the chain tip when monitoring
	/// starts.
	#[serde(default = "default_rollback_blocks")]
	pub rollback_blocks: u64,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			timeout_secs: default_monitor_timeout_secs(),
			rollback_blocks: default_rollback_blocks(),
		}
	}
}

fn default_env() -> String {
	"dev".to_string()
}

fn default_table() -> String {
	"checkout".to_string()
}

fn default_monitor_timeout_secs() -> u64 {
	180
}

fn default_rollback_blocks() -> u64 {
	5
}

fn is_hex_address(value: &str) -> bool {
	let hex_part = value.strip_prefix("0x").unwrap_or(value);
	hex_part.len() == 40 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

impl Config {
	/// Loads and validates configuration from a TOML file.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path)?;
		let config: Config = toml::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks cross-field invariants that serde cannot express.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.eth_url.starts_with("http://") && !self.eth_url.starts_with("https://") {
			return Err(ConfigError::Validation(format!(
				"eth_url must be an http(s) endpoint, got {}",
				self.eth_url
			)));
		}
		if !is_hex_address(&self.owner) {
			return Err(ConfigError::Validation(format!(
				"owner is not a 20-byte hex address: {}",
				self.owner
			)));
		}
		if !is_hex_address(&self.token.address) {
			return Err(ConfigError::Validation(format!(
				"token.address is not a 20-byte hex address: {}",
				self.token.address
			)));
		}
		if self.token.decimals > 28 {
			return Err(ConfigError::Validation(format!(
				"token.decimals must be at most 28, got {}",
				self.token.decimals
			)));
		}
		if self.store.table.is_empty() {
			return Err(ConfigError::Validation("store.table must not be empty".into()));
		}
		if self.store.backend == StoreBackend::File && self.store.path.is_none() {
			return Err(ConfigError::Validation(
				"store.path is required for the file backend".into(),
			));
		}
		Ok(())
	}

	/// Reads the operator's private key from the environment.
	pub fn operator_key(&self) -> Option<SecretString> {
		std::env::var(PRIVATE_KEY_ENV)
			.ok()
			.filter(|key| !key.is_empty())
			.map(SecretString::new)
	}

	pub fn is_dev(&self) -> bool {
		self.env == "dev"
	}
}
