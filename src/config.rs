//! Service configuration.
//!
//! Read from a JSON file named by the first command-line argument or `LEDGER_CONFIG`. The
//! environment variables `RPC_URL`, `CHANNEL_URL`, `DATA_DIR` and `OPERATOR_ADDRESS` override the
//! matching file values.

use crate::ledger::tree_cache::MIN_TREE_CACHE_SIZE;
use crate::merkle::worker::{DEFAULT_MAX_WORKERS, DEFAULT_WORKER_THRESHOLD};
use crate::operator::OperatorConfig;
use crate::utils::parse_address;
use crate::watcher::WatcherConfig;

use ethereum_types::Address;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "LEDGER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
	pub rpc_url: String,
	/// WebSocket URL of the join/part channel; an in-process channel is used when absent.
	#[serde(default)]
	pub channel_url: Option<String>,
	#[serde(default = "default_data_dir")]
	pub data_dir: PathBuf,
	/// Node-managed account that signs commits.
	#[serde(default)]
	pub operator_address: Option<Address>,
	#[serde(default = "default_max_workers")]
	pub max_workers: usize,
	pub units: Vec<UnitConfig>,
}

/// One watched ledger contract.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
	pub name: String,
	pub contract_address: Address,
	#[serde(default)]
	pub start_block: u64,
	#[serde(default = "default_min_interval_blocks")]
	pub min_interval_blocks: u64,
	#[serde(default)]
	pub finality_wait_seconds: u64,
	#[serde(default = "default_tree_cache_size")]
	pub tree_cache_size: usize,
	#[serde(default = "default_worker_threshold")]
	pub worker_threshold: usize,
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
	/// Commit blocks on chain; watch only when false.
	#[serde(default = "default_operate")]
	pub operate: bool,
	#[serde(default)]
	pub commit_aux: String,
}

fn default_data_dir() -> PathBuf {
	PathBuf::from("data")
}

fn default_max_workers() -> usize {
	DEFAULT_MAX_WORKERS
}

fn default_min_interval_blocks() -> u64 {
	1
}

fn default_tree_cache_size() -> usize {
	MIN_TREE_CACHE_SIZE
}

fn default_worker_threshold() -> usize {
	DEFAULT_WORKER_THRESHOLD
}

fn default_poll_interval_seconds() -> u64 {
	5
}

fn default_operate() -> bool {
	true
}

/// Error types for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("No config file given; pass a path or set {CONFIG_PATH_VAR}")]
	MissingPath,

	#[error("IO error reading {path}: {source}")]
	IoError {
		path: String,
		source: std::io::Error,
	},

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Invalid configuration: {0}")]
	InvalidValue(String),
}

impl AppConfig {
	/// Load from `path`, or from `LEDGER_CONFIG` when no path is given, then apply environment
	/// overrides.
	pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
		let path = path
			.or_else(|| std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from))
			.ok_or(ConfigError::MissingPath)?;
		let mut config = Self::from_file(&path)?;
		config.apply_overrides(|key| std::env::var(key).ok())?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
			path: path.display().to_string(),
			source,
		})?;
		Ok(serde_json::from_str(&text)?)
	}

	/// Replace file values with whatever `lookup` returns for the override variables.
	pub fn apply_overrides(
		&mut self,
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<(), ConfigError> {
		if let Some(url) = lookup("RPC_URL") {
			self.rpc_url = url;
		}
		if let Some(url) = lookup("CHANNEL_URL") {
			self.channel_url = Some(url);
		}
		if let Some(dir) = lookup("DATA_DIR") {
			self.data_dir = PathBuf::from(dir);
		}
		if let Some(text) = lookup("OPERATOR_ADDRESS") {
			let address = parse_address(&text).ok_or_else(|| {
				ConfigError::InvalidValue(format!("OPERATOR_ADDRESS {} is not an address", text))
			})?;
			self.operator_address = Some(address);
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.units.is_empty() {
			return Err(ConfigError::InvalidValue("no units configured".to_string()));
		}
		let mut names = HashSet::new();
		for unit in &self.units {
			if !names.insert(unit.name.as_str()) {
				return Err(ConfigError::InvalidValue(format!(
					"unit name {} is used twice",
					unit.name
				)));
			}
			if unit.tree_cache_size < MIN_TREE_CACHE_SIZE {
				return Err(ConfigError::InvalidValue(format!(
					"unit {}: tree_cache_size must be at least {}",
					unit.name, MIN_TREE_CACHE_SIZE
				)));
			}
			if unit.operate && self.operator_address.is_none() {
				return Err(ConfigError::InvalidValue(format!(
					"unit {} operates but no operator_address is set",
					unit.name
				)));
			}
		}
		Ok(())
	}

	/// Each unit persists under its own directory.
	pub fn unit_data_dir(&self, unit: &UnitConfig) -> PathBuf {
		self.data_dir.join(&unit.name)
	}
}

impl UnitConfig {
	pub fn watcher_config(&self) -> WatcherConfig {
		WatcherConfig {
			name: self.name.clone(),
			contract_address: self.contract_address,
			start_block: self.start_block,
			tree_cache_size: self.tree_cache_size,
		}
	}

	pub fn operator_config(&self) -> OperatorConfig {
		OperatorConfig {
			min_interval_blocks: self.min_interval_blocks,
			finality_wait: Duration::from_secs(self.finality_wait_seconds),
			commit_aux: self.commit_aux.clone(),
			poll_interval: Duration::from_secs(self.poll_interval_seconds.max(1)),
			publish_enabled: self.operate,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;

	const MINIMAL: &str = r#"{
		"rpc_url": "http://localhost:8545",
		"operator_address": "0x00000000000000000000000000000000000000aa",
		"units": [
			{ "name": "alpha", "contract_address": "0x0000000000000000000000000000000000000001" }
		]
	}"#;

	#[test]
	fn fills_defaults() {
		let config: AppConfig = serde_json::from_str(MINIMAL).unwrap();
		config.validate().unwrap();
		assert_eq!(config.data_dir, PathBuf::from("data"));
		assert_eq!(config.max_workers, DEFAULT_MAX_WORKERS);

		let unit = &config.units[0];
		assert_eq!(unit.min_interval_blocks, 1);
		assert_eq!(unit.tree_cache_size, 2);
		assert_eq!(unit.worker_threshold, 1000);
		assert!(unit.operate);

		let operator = unit.operator_config();
		assert_eq!(operator.poll_interval, Duration::from_secs(5));
		assert_eq!(operator.finality_wait, Duration::ZERO);
		assert_eq!(config.unit_data_dir(unit), PathBuf::from("data/alpha"));
	}

	#[test]
	fn environment_overrides_file() {
		let mut config: AppConfig = serde_json::from_str(MINIMAL).unwrap();
		let env: HashMap<&str, &str> = [
			("RPC_URL", "http://node:8545"),
			("CHANNEL_URL", "ws://channel:9000"),
			("DATA_DIR", "/var/lib/ledger"),
			("OPERATOR_ADDRESS", "0x00000000000000000000000000000000000000bb"),
		]
		.into_iter()
		.collect();
		config
			.apply_overrides(|key| env.get(key).map(|v| v.to_string()))
			.unwrap();
		assert_eq!(config.rpc_url, "http://node:8545");
		assert_eq!(config.channel_url.as_deref(), Some("ws://channel:9000"));
		assert_eq!(config.data_dir, PathBuf::from("/var/lib/ledger"));
		assert_eq!(config.operator_address, Some(Address::from_low_u64_be(0xbb)));

		let bad = config.apply_overrides(|key| (key == "OPERATOR_ADDRESS").then(|| "nope".to_string()));
		assert!(matches!(bad, Err(ConfigError::InvalidValue(_))));
	}

	#[test]
	fn rejects_bad_units() {
		let mut config: AppConfig = serde_json::from_str(MINIMAL).unwrap();
		config.units[0].tree_cache_size = 1;
		assert!(config.validate().is_err());

		let mut config: AppConfig = serde_json::from_str(MINIMAL).unwrap();
		config.units.push(config.units[0].clone());
		assert!(config.validate().is_err());

		let mut config: AppConfig = serde_json::from_str(MINIMAL).unwrap();
		config.operator_address = None;
		assert!(config.validate().is_err());
		config.units[0].operate = false;
		assert!(config.validate().is_ok());
	}

	#[test]
	fn reads_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(MINIMAL.as_bytes()).unwrap();
		let config = AppConfig::from_file(file.path()).unwrap();
		assert_eq!(config.units[0].name, "alpha");
		assert!(matches!(
			AppConfig::from_file(Path::new("/nonexistent/ledger.json")),
			Err(ConfigError::IoError { .. })
		));
	}
}
