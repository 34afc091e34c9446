//! In-memory host chain.
//!
//! Every transaction takes the same lock, which gives the single total order
//! a real chain would impose. Suitable for devnets and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use liquidity_messages::LiquidityMessage;
use liquidity_types::{
	parse_universal_address, Auction, AuctionId, AuctionParameters, ConfigSchema, Field,
	FieldType, RouterEndpoint, Schema, UniversalAddress, ValidationError,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::{Clock, WallClock};
use crate::state::{EngineConfig, EngineState};
use crate::{AuctionEngineInterface, AuctionError, InstructionOutcome};

pub struct MemoryAuctionEngine {
	state: Mutex<EngineState>,
	clock: Arc<dyn Clock>,
}

impl MemoryAuctionEngine {
	pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, AuctionError> {
		Ok(Self {
			state: Mutex::new(EngineState::new(config)?),
			clock,
		})
	}

	/// Read access to the full state, for assertions and diagnostics.
	pub async fn inspect<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
		let state = self.state.lock().await;
		f(&state)
	}

	fn log_rejection<T>(
		operation: &str,
		result: Result<T, AuctionError>,
	) -> Result<T, AuctionError> {
		if let Err(e) = &result {
			warn!(operation, error = %e, "Transaction rejected");
		}
		result
	}
}

#[async_trait]
impl AuctionEngineInterface for MemoryAuctionEngine {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryEngineSchema)
	}

	async fn auction(&self, auction_id: &AuctionId) -> Auction {
		self.state.lock().await.auction(auction_id)
	}

	async fn balance_of(&self, account: &UniversalAddress) -> u64 {
		self.state.lock().await.balance_of(account)
	}

	async fn current_block(&self) -> u64 {
		self.clock.now().block
	}

	async fn current_time(&self) -> u64 {
		self.clock.now().time
	}

	async fn parameters(&self) -> AuctionParameters {
		self.state.lock().await.parameters().clone()
	}

	async fn place_initial_bid(
		&self,
		caller: UniversalAddress,
		fast_message: &[u8],
		fee_bid: u64,
	) -> Result<InstructionOutcome, AuctionError> {
		let mut state = self.state.lock().await;
		let ctx = self.clock.now();
		Self::log_rejection(
			"place_initial_bid",
			state.place_initial_bid(caller, fast_message, fee_bid, ctx),
		)
	}

	async fn improve_bid(
		&self,
		caller: UniversalAddress,
		auction_id: AuctionId,
		bid_price: u64,
	) -> Result<InstructionOutcome, AuctionError> {
		let mut state = self.state.lock().await;
		let ctx = self.clock.now();
		Self::log_rejection(
			"improve_bid",
			state.improve_bid(caller, auction_id, bid_price, ctx),
		)
	}

	async fn execute_fast_order(
		&self,
		caller: UniversalAddress,
		fast_message: &[u8],
	) -> Result<InstructionOutcome, AuctionError> {
		let mut state = self.state.lock().await;
		let ctx = self.clock.now();
		Self::log_rejection(
			"execute_fast_order",
			state.execute_fast_order(caller, fast_message, ctx),
		)
	}

	async fn settle_slow_order(
		&self,
		caller: UniversalAddress,
		fast_message: &[u8],
		slow_message: &[u8],
		attestation: &[u8],
	) -> Result<InstructionOutcome, AuctionError> {
		let mut state = self.state.lock().await;
		let ctx = self.clock.now();
		Self::log_rejection(
			"settle_slow_order",
			state.settle_slow_order(caller, fast_message, slow_message, attestation, ctx),
		)
	}

	async fn fund(&self, account: UniversalAddress, amount: u64) -> Result<(), AuctionError> {
		debug!(account = %account, amount, "Funding account");
		self.state.lock().await.fund(account, amount)
	}

	async fn emitted_messages(&self) -> Vec<LiquidityMessage> {
		self.state.lock().await.emitted().to_vec()
	}
}

pub struct MemoryEngineSchema;

impl ConfigSchema for MemoryEngineSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let bps = || FieldType::unsigned(Some(1_000_000));
		let schema = Schema::new(
			vec![
				Field::new("chain_id", FieldType::unsigned(Some(u16::MAX as i64))),
				Field::new("domain", FieldType::unsigned(Some(u32::MAX as i64))),
				Field::new("custody_address", FieldType::Address),
				Field::new("fee_recipient", FieldType::Address),
				Field::new(
					"routers",
					FieldType::Array(Box::new(FieldType::Table(Schema::new(
						vec![
							Field::new("chain", FieldType::unsigned(Some(u16::MAX as i64))),
							Field::new("router", FieldType::Address),
							Field::new("domain", FieldType::unsigned(Some(u32::MAX as i64))),
						],
						vec![],
					)))),
				),
			],
			vec![
				Field::new("block_time_ms", FieldType::Integer {
					min: Some(1),
					max: None,
				}),
				Field::new(
					"auction",
					FieldType::Table(Schema::new(
						vec![],
						vec![
							Field::new("user_penalty_reward_bps", bps()),
							Field::new("initial_penalty_bps", bps()),
							Field::new("duration", FieldType::Integer {
								min: Some(1),
								max: None,
							}),
							Field::new("grace_period", FieldType::unsigned(None)),
							Field::new("penalty_period", FieldType::unsigned(None)),
							Field::new("security_deposit_base", FieldType::unsigned(None)),
							Field::new("security_deposit_bps", bps()),
						],
					)),
				),
				Field::new(
					"accounts",
					FieldType::Array(Box::new(FieldType::Table(Schema::new(
						vec![
							Field::new("address", FieldType::Address),
							Field::new("balance", FieldType::unsigned(None)),
						],
						vec![],
					)))),
				),
			],
		);
		schema.validate(config)
	}
}

fn int(config: &toml::Value, key: &str) -> Option<u64> {
	config
		.get(key)
		.and_then(|v| v.as_integer())
		.and_then(|v| u64::try_from(v).ok())
}

fn address(config: &toml::Value, key: &str) -> Result<UniversalAddress, AuctionError> {
	let text = config
		.get(key)
		.and_then(|v| v.as_str())
		.ok_or_else(|| AuctionError::InvalidConfig(format!("{} is required", key)))?;
	parse_universal_address(text)
		.map_err(|e| AuctionError::InvalidConfig(format!("{}: {}", key, e)))
}

fn parameters(config: Option<&toml::Value>) -> AuctionParameters {
	let defaults = AuctionParameters::default();
	let Some(config) = config else {
		return defaults;
	};
	AuctionParameters {
		user_penalty_reward_bps: int(config, "user_penalty_reward_bps")
			.map(|v| v as u32)
			.unwrap_or(defaults.user_penalty_reward_bps),
		initial_penalty_bps: int(config, "initial_penalty_bps")
			.map(|v| v as u32)
			.unwrap_or(defaults.initial_penalty_bps),
		duration: int(config, "duration").unwrap_or(defaults.duration),
		grace_period: int(config, "grace_period").unwrap_or(defaults.grace_period),
		penalty_period: int(config, "penalty_period").unwrap_or(defaults.penalty_period),
		security_deposit_base: int(config, "security_deposit_base")
			.unwrap_or(defaults.security_deposit_base),
		security_deposit_bps: int(config, "security_deposit_bps")
			.map(|v| v as u32)
			.unwrap_or(defaults.security_deposit_bps),
	}
}

/// Parses the engine section into its configuration and the devnet accounts
/// to fund at startup.
pub fn parse_engine_config(
	config: &toml::Value,
) -> Result<(EngineConfig, Vec<(UniversalAddress, u64)>), AuctionError> {
	MemoryEngineSchema
		.validate(config)
		.map_err(|e| AuctionError::InvalidConfig(e.to_string()))?;

	let mut routers = HashMap::new();
	for entry in config
		.get("routers")
		.and_then(|v| v.as_array())
		.into_iter()
		.flatten()
	{
		let chain = int(entry, "chain").unwrap_or_default() as u16;
		routers.insert(
			chain,
			RouterEndpoint {
				router: address(entry, "router")?,
				domain: int(entry, "domain").unwrap_or_default() as u32,
			},
		);
	}

	let mut accounts = Vec::new();
	for entry in config
		.get("accounts")
		.and_then(|v| v.as_array())
		.into_iter()
		.flatten()
	{
		accounts.push((
			address(entry, "address")?,
			int(entry, "balance").unwrap_or_default(),
		));
	}

	let engine_config = EngineConfig {
		chain_id: int(config, "chain_id").unwrap_or_default() as u16,
		domain: int(config, "domain").unwrap_or_default() as u32,
		custody_address: address(config, "custody_address")?,
		fee_recipient: address(config, "fee_recipient")?,
		parameters: parameters(config.get("auction")),
		routers,
	};
	Ok((engine_config, accounts))
}

/// Creates an in-memory host chain producing blocks on the wall clock and
/// funds the configured devnet accounts.
pub async fn create_engine(
	config: &toml::Value,
) -> Result<Arc<dyn AuctionEngineInterface>, AuctionError> {
	let (engine_config, accounts) = parse_engine_config(config)?;
	let block_time = Duration::from_millis(int(config, "block_time_ms").unwrap_or(400));
	let engine = MemoryAuctionEngine::new(engine_config, Arc::new(WallClock::new(block_time)))?;
	for (account, balance) in accounts {
		engine.fund(account, balance).await?;
	}
	Ok(Arc::new(engine))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::ManualClock;
	use alloy_primitives::B256;
	use liquidity_messages::{FastMarketOrder, RedeemerMessage, SignedMessage};
	use liquidity_types::AuctionStatus;

	const CONFIG: &str = r#"
		chain_id = 1
		domain = 5
		block_time_ms = 200
		custody_address = "0x00000000000000000000000000000000000000cc"
		fee_recipient = "0x00000000000000000000000000000000000000fe"

		[auction]
		duration = 3
		grace_period = 5

		[[routers]]
		chain = 6
		router = "0x0000000000000000000000000000000000000066"
		domain = 3

		[[accounts]]
		address = "0x00000000000000000000000000000000000000aa"
		balance = 5000000
	"#;

	#[test]
	fn test_parse_engine_config() {
		let value: toml::Value = toml::from_str(CONFIG).unwrap();
		let (config, accounts) = parse_engine_config(&value).unwrap();
		assert_eq!(config.chain_id, 1);
		assert_eq!(config.parameters.duration, 3);
		assert_eq!(config.parameters.grace_period, 5);
		// Unset parameters keep their defaults
		assert_eq!(
			config.parameters.penalty_period,
			AuctionParameters::default().penalty_period
		);
		assert_eq!(config.routers[&6].domain, 3);
		assert_eq!(accounts.len(), 1);
		assert_eq!(accounts[0].1, 5_000_000);
	}

	#[test]
	fn test_rejects_invalid_config() {
		let value: toml::Value = toml::from_str(
			r#"
			chain_id = 1
			domain = 5
			custody_address = "0xcc"
			fee_recipient = "0x00000000000000000000000000000000000000fe"
			routers = []
			"#,
		)
		.unwrap();
		assert!(matches!(
			parse_engine_config(&value),
			Err(AuctionError::InvalidConfig(_))
		));
	}

	#[tokio::test]
	async fn test_engine_serializes_transactions() {
		let value: toml::Value = toml::from_str(CONFIG).unwrap();
		let (config, _) = parse_engine_config(&value).unwrap();
		let clock = Arc::new(ManualClock::new(10, 1_000));
		let engine = Arc::new(MemoryAuctionEngine::new(config, clock.clone()).unwrap());

		let order = FastMarketOrder {
			amount_in: 1_000_000,
			min_amount_out: 0,
			target_chain: 6,
			redeemer: B256::repeat_byte(0x01),
			sender: B256::repeat_byte(0x02),
			refund_address: B256::repeat_byte(0x02),
			max_fee: 50_000,
			init_auction_fee: 100,
			deadline: 0,
			redeemer_message: RedeemerMessage::default(),
		};
		let fast = SignedMessage::unsigned(
			2,
			B256::repeat_byte(0xee),
			4,
			0,
			LiquidityMessage::from(order).encode(),
		)
		.encode();
		let auction_id = SignedMessage::decode(&fast).unwrap().digest();

		let bidders: Vec<UniversalAddress> = (1..=4u8).map(B256::repeat_byte).collect();
		for bidder in &bidders {
			engine.fund(*bidder, 10_000_000).await.unwrap();
		}

		// Concurrent initial bids: exactly one wins, the rest see a started auction
		let mut handles = Vec::new();
		for bidder in bidders.clone() {
			let engine = engine.clone();
			let fast = fast.clone();
			handles.push(tokio::spawn(async move {
				engine.place_initial_bid(bidder, &fast, 50_000).await
			}));
		}
		let mut placed = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(InstructionOutcome::BidPlaced { .. }) => placed += 1,
				Err(AuctionError::AuctionAlreadyStarted) => {}
				other => panic!("unexpected result: {:?}", other),
			}
		}
		assert_eq!(placed, 1);
		assert_eq!(engine.auction(&auction_id).await.status, AuctionStatus::Active);

		let custody = engine.inspect(|state| state.ledger().custody()).await;
		let info = engine.auction(&auction_id).await.info.unwrap();
		assert_eq!(custody, info.escrow());
	}
}
