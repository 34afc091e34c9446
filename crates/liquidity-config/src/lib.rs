use std::env;
use std::path::Path;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "RELAYER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let Some(file_path) = &self.file_path else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};
		if !Path::new(file_path).exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}
		let content = tokio::fs::read_to_string(file_path).await?;
		self.parse(&content)
	}

	/// Parses configuration text, applying substitution, overrides and validation.
	pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;
		let mut config: Config =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;

		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;
		Ok(config)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
			.map_err(|e| ConfigError::ParseError(e.to_string()))?;

		let mut result = content.to_string();
		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.relayer.log_level = log_level;
		}

		if let Ok(interval) = env::var(format!("{}POLL_INTERVAL_MS", self.env_prefix)) {
			config.relayer.poll_interval_ms = interval.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid poll interval: {}", e))
			})?;
		}

		Ok(())
	}
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
	let invalid = |message: &str| Err(ConfigError::ValidationError(message.to_string()));

	if config.relayer.name.trim().is_empty() {
		return invalid("relayer.name must not be empty");
	}
	if config.relayer.poll_interval_ms == 0 {
		return invalid("relayer.poll_interval_ms must be positive");
	}
	if config.relayer.execute_attempts == 0 {
		return invalid("relayer.execute_attempts must be at least 1");
	}
	if config.relayer.event_capacity == 0 {
		return invalid("relayer.event_capacity must be positive");
	}
	if config.delivery.max_attempts == 0 {
		return invalid("delivery.max_attempts must be at least 1");
	}
	if config.attestation.poll_interval_ms == 0 {
		return invalid("attestation.poll_interval_ms must be positive");
	}
	if config.delivery.providers.is_empty() {
		return invalid("At least one delivery provider must be configured");
	}
	if config.discovery.sources.is_empty() {
		return invalid("At least one discovery source must be configured");
	}
	if config.order.markets.is_empty() {
		return invalid("At least one market must be serviced");
	}

	let host_chain = i64::from(config.relayer.host_chain);
	let host_served = config
		.delivery
		.providers
		.values()
		.any(|provider| provider.get("chain_id").and_then(|v| v.as_integer()) == Some(host_chain));
	if !host_served {
		return Err(ConfigError::ValidationError(format!(
			"No delivery provider for host chain {}",
			config.relayer.host_chain
		)));
	}

	Ok(())
}
