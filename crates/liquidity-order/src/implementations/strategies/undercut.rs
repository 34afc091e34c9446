//! Undercutting bid strategy.
//!
//! Opens every auction at the order's max fee and answers each outbid by
//! undercutting the current price by a fixed step, never going below a
//! configured floor.

use async_trait::async_trait;
use liquidity_messages::FastMarketOrder;
use liquidity_types::{AuctionInfo, ConfigSchema, Field, FieldType, Schema, ValidationError};

use crate::{BidDecision, BidStrategy, OrderError};

pub struct UndercutStrategy {
	/// Amount taken off the current price on each improvement.
	step: u64,
	/// Lowest fee we accept.
	min_fee: u64,
}

impl UndercutStrategy {
	pub fn new(step: u64, min_fee: u64) -> Self {
		Self {
			step: step.max(1),
			min_fee,
		}
	}
}

pub struct UndercutStrategySchema;

impl ConfigSchema for UndercutStrategySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("step", FieldType::Integer {
					min: Some(1),
					max: None,
				}),
				Field::new("min_fee", FieldType::unsigned(None)),
			],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl BidStrategy for UndercutStrategy {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(UndercutStrategySchema)
	}

	async fn initial_bid(&self, order: &FastMarketOrder) -> BidDecision {
		if order.max_fee < self.min_fee {
			return BidDecision::Pass(format!(
				"max fee {} below floor {}",
				order.max_fee, self.min_fee
			));
		}
		BidDecision::Bid(order.max_fee)
	}

	async fn improve_bid(&self, _order: &FastMarketOrder, current: &AuctionInfo) -> BidDecision {
		if current.bid_price <= self.min_fee {
			return BidDecision::Pass(format!(
				"current price {} at or below floor {}",
				current.bid_price, self.min_fee
			));
		}
		BidDecision::Bid(current.bid_price.saturating_sub(self.step).max(self.min_fee))
	}
}

/// Creates the undercut strategy.
///
/// Configuration parameters:
/// - `step`: undercut per improvement (default: 1)
/// - `min_fee`: floor below which we stop contesting (default: 0)
pub fn create_strategy(config: &toml::Value) -> Result<Box<dyn BidStrategy>, OrderError> {
	UndercutStrategySchema
		.validate(config)
		.map_err(|e| OrderError::InvalidConfig(e.to_string()))?;
	let step = config
		.get("step")
		.and_then(|v| v.as_integer())
		.unwrap_or(1) as u64;
	let min_fee = config
		.get("min_fee")
		.and_then(|v| v.as_integer())
		.unwrap_or(0) as u64;
	Ok(Box::new(UndercutStrategy::new(step, min_fee)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use liquidity_messages::RedeemerMessage;
	use liquidity_types::B256;

	fn order(max_fee: u64) -> FastMarketOrder {
		FastMarketOrder {
			amount_in: 1_000,
			min_amount_out: 0,
			target_chain: 6,
			redeemer: B256::ZERO,
			sender: B256::ZERO,
			refund_address: B256::ZERO,
			max_fee,
			init_auction_fee: 0,
			deadline: 0,
			redeemer_message: RedeemerMessage::default(),
		}
	}

	fn at(bid_price: u64) -> AuctionInfo {
		AuctionInfo {
			start_block: 0,
			amount_in: 1_000,
			security_deposit: 100,
			bid_price,
			init_auction_fee: 0,
			source_chain: 2,
			target_chain: 6,
			initial_bidder: B256::ZERO,
			highest_bidder: B256::ZERO,
		}
	}

	#[tokio::test]
	async fn test_opens_at_max_fee() {
		let strategy = UndercutStrategy::new(1, 5);
		assert_eq!(strategy.initial_bid(&order(10)).await, BidDecision::Bid(10));
		assert!(matches!(
			strategy.initial_bid(&order(4)).await,
			BidDecision::Pass(_)
		));
	}

	#[tokio::test]
	async fn test_undercuts_down_to_floor() {
		let strategy = UndercutStrategy::new(3, 5);
		let order = order(10);
		assert_eq!(strategy.improve_bid(&order, &at(10)).await, BidDecision::Bid(7));
		assert_eq!(strategy.improve_bid(&order, &at(7)).await, BidDecision::Bid(5));
		assert!(matches!(
			strategy.improve_bid(&order, &at(5)).await,
			BidDecision::Pass(_)
		));
	}

	#[tokio::test]
	async fn test_default_is_one_unit() {
		let config: toml::Value = toml::from_str("").unwrap();
		let strategy = create_strategy(&config).unwrap();
		assert_eq!(strategy.improve_bid(&order(10), &at(10)).await, BidDecision::Bid(9));
		assert_eq!(strategy.improve_bid(&order(10), &at(1)).await, BidDecision::Bid(0));
		assert!(matches!(
			strategy.improve_bid(&order(10), &at(0)).await,
			BidDecision::Pass(_)
		));

		let bad: toml::Value = toml::from_str("step = 0").unwrap();
		assert!(create_strategy(&bad).is_err());
	}
}
