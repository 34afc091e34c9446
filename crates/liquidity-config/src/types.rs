//! Configuration file layout.

use std::collections::HashMap;

use liquidity_types::ChainId;
use serde::{Deserialize, Serialize};

/// Complete relayer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub relayer: RelayerSettings,
	pub account: PluginConfig,
	/// The chain hosting auctions. Only the in-process engine is available.
	pub engine: PluginConfig,
	pub delivery: DeliveryConfig,
	pub discovery: DiscoveryConfig,
	pub order: OrderConfig,
	pub attestation: AttestationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayerSettings {
	pub name: String,
	/// Chain the auctions run on; must have a delivery provider.
	pub host_chain: ChainId,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Interval between auction state polls while contesting.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Attempts at executing a won auction before escalating.
	#[serde(default = "default_execute_attempts")]
	pub execute_attempts: u32,
	#[serde(default = "default_execute_backoff_ms")]
	pub execute_backoff_ms: u64,
	/// Times a rejected bid is re-evaluated before the order is abandoned.
	#[serde(default = "default_max_reevaluations")]
	pub max_reevaluations: u32,
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,
}

/// A pluggable component: which implementation, and its own settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
	pub implementation: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	#[serde(default = "default_delivery_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_retry_delay_ms")]
	pub retry_delay_ms: u64,
	/// Provider implementation name to its settings.
	pub providers: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
	/// Source implementation name to its settings.
	pub sources: HashMap<String, toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderConfig {
	pub markets: Vec<MarketConfig>,
	pub strategy: PluginConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
	pub chain: ChainId,
	pub emitter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttestationConfig {
	#[serde(default = "default_attestation_poll_ms")]
	pub poll_interval_ms: u64,
	/// Signing network the slow-path deposit is fetched from.
	pub messages: PluginConfig,
	/// Secondary-bridge attestor.
	pub burns: PluginConfig,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_poll_interval_ms() -> u64 {
	400
}

fn default_execute_attempts() -> u32 {
	5
}

fn default_execute_backoff_ms() -> u64 {
	2_000
}

fn default_max_reevaluations() -> u32 {
	3
}

fn default_event_capacity() -> usize {
	1_024
}

fn default_delivery_attempts() -> u32 {
	3
}

fn default_retry_delay_ms() -> u64 {
	1_000
}

fn default_attestation_poll_ms() -> u64 {
	2_000
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}
