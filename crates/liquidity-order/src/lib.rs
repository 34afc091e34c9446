//! Order triage and bidding policy.
//!
//! Turns observed signed messages into [`FastOrder`]s for the markets the
//! relayer services, and asks the configured [`BidStrategy`] what to bid.

use async_trait::async_trait;
use liquidity_messages::{FastMarketOrder, LiquidityMessage, MalformedMessage, SignedMessage};
use liquidity_types::{
	parse_universal_address, AuctionId, AuctionInfo, ChainId, ConfigSchema, ObservedMessage,
	UniversalAddress,
};
use thiserror::Error;
use tracing::debug;

pub mod implementations {
	pub mod strategies {
		pub mod undercut;
	}
}

#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Malformed message: {0}")]
	Malformed(#[from] MalformedMessage),
	#[error("Market not serviced: chain {chain}, emitter {emitter}")]
	UnservicedMarket {
		chain: ChainId,
		emitter: UniversalAddress,
	},
	#[error("Not a fast market order: {0}")]
	NotAnOrder(&'static str),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

/// A source chain and the emitter publishing orders on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Market {
	pub chain: ChainId,
	pub emitter: UniversalAddress,
}

impl Market {
	pub fn parse(chain: ChainId, emitter: &str) -> Result<Self, OrderError> {
		let emitter = parse_universal_address(emitter)
			.map_err(|e| OrderError::InvalidConfig(format!("market emitter: {}", e)))?;
		Ok(Self { chain, emitter })
	}
}

/// A decoded fast market order together with the signed bytes it came in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastOrder {
	pub auction_id: AuctionId,
	/// Encoded signed message, as submitted to the auction engine.
	pub fast_message: Vec<u8>,
	pub envelope: SignedMessage,
	pub order: FastMarketOrder,
}

impl FastOrder {
	pub fn from_signed_bytes(fast_message: Vec<u8>) -> Result<Self, OrderError> {
		let envelope = SignedMessage::decode(&fast_message)?;
		let order = match envelope.message()? {
			LiquidityMessage::FastMarketOrder(order) => order,
			other => return Err(OrderError::NotAnOrder(other.name())),
		};
		Ok(Self {
			auction_id: envelope.digest(),
			fast_message,
			envelope,
			order,
		})
	}

	pub fn source_chain(&self) -> ChainId {
		self.envelope.emitter_chain
	}

	pub fn sequence(&self) -> u64 {
		self.envelope.sequence
	}

	/// Sequence of the slow-path deposit published just before this order.
	pub fn slow_sequence(&self) -> Option<u64> {
		self.envelope.sequence.checked_sub(1)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidDecision {
	Bid(u64),
	Pass(String),
}

#[async_trait]
pub trait BidStrategy: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Fee to open an auction with.
	async fn initial_bid(&self, order: &FastMarketOrder) -> BidDecision;

	/// Fee to undercut the current best bid with. Must be below `current.bid_price`.
	async fn improve_bid(&self, order: &FastMarketOrder, current: &AuctionInfo) -> BidDecision;
}

pub struct OrderService {
	markets: Vec<Market>,
	strategy: Box<dyn BidStrategy>,
}

impl OrderService {
	pub fn new(markets: Vec<Market>, strategy: Box<dyn BidStrategy>) -> Self {
		Self { markets, strategy }
	}

	pub fn markets(&self) -> &[Market] {
		&self.markets
	}

	/// Accepts fast market orders published by a serviced market.
	pub fn triage(&self, message: ObservedMessage) -> Result<FastOrder, OrderError> {
		let envelope = SignedMessage::decode(&message.bytes)?;
		let market = Market {
			chain: envelope.emitter_chain,
			emitter: envelope.emitter_address,
		};
		if !self.markets.contains(&market) {
			return Err(OrderError::UnservicedMarket {
				chain: market.chain,
				emitter: market.emitter,
			});
		}
		FastOrder::from_signed_bytes(message.bytes)
	}

	pub async fn initial_bid(&self, order: &FastMarketOrder) -> BidDecision {
		let decision = self.strategy.initial_bid(order).await;
		if let BidDecision::Pass(reason) = &decision {
			debug!(max_fee = order.max_fee, reason = %reason, "Passing on initial bid");
		}
		decision
	}

	/// Asks the strategy for a better price; anything that is not strictly
	/// lower than the current bid becomes a pass.
	pub async fn improve_bid(&self, order: &FastMarketOrder, current: &AuctionInfo) -> BidDecision {
		let decision = match self.strategy.improve_bid(order, current).await {
			BidDecision::Bid(price) if price >= current.bid_price => BidDecision::Pass(format!(
				"strategy bid {} does not improve on {}",
				price, current.bid_price
			)),
			other => other,
		};
		match &decision {
			BidDecision::Bid(price) => {
				debug!(current = current.bid_price, bid_price = price, "Improving bid")
			}
			BidDecision::Pass(reason) => {
				debug!(current = current.bid_price, reason = %reason, "Passing on improvement")
			}
		}
		decision
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::strategies::undercut::UndercutStrategy;
	use liquidity_messages::{Deposit, DepositPayload, RedeemerMessage, SlowOrderResponse};
	use liquidity_types::{B256, U256};

	fn emitter() -> UniversalAddress {
		B256::repeat_byte(0xee)
	}

	fn order() -> FastMarketOrder {
		FastMarketOrder {
			amount_in: 1_000,
			min_amount_out: 0,
			target_chain: 6,
			redeemer: B256::repeat_byte(0x77),
			sender: B256::repeat_byte(0x55),
			refund_address: B256::repeat_byte(0x55),
			max_fee: 10,
			init_auction_fee: 1,
			deadline: 0,
			redeemer_message: RedeemerMessage::default(),
		}
	}

	fn observed(chain: ChainId, emitter: UniversalAddress, payload: Vec<u8>) -> ObservedMessage {
		let bytes = SignedMessage::unsigned(chain, emitter, 4, 0, payload).encode();
		ObservedMessage {
			source_chain: chain,
			emitter,
			sequence: 4,
			bytes,
		}
	}

	fn service_with(strategy: UndercutStrategy) -> OrderService {
		OrderService::new(
			vec![Market {
				chain: 2,
				emitter: emitter(),
			}],
			Box::new(strategy),
		)
	}

	fn service() -> OrderService {
		service_with(UndercutStrategy::new(1, 0))
	}

	#[test]
	fn test_triage_accepts_serviced_orders() {
		let message = observed(2, emitter(), LiquidityMessage::from(order()).encode());
		let expected_id = SignedMessage::decode(&message.bytes).unwrap().digest();

		let fast = service().triage(message).unwrap();
		assert_eq!(fast.auction_id, expected_id);
		assert_eq!(fast.order, order());
		assert_eq!(fast.source_chain(), 2);
		assert_eq!(fast.sequence(), 4);
		assert_eq!(fast.slow_sequence(), Some(3));
	}

	#[test]
	fn test_triage_filters() {
		let service = service();

		let foreign = observed(3, emitter(), LiquidityMessage::from(order()).encode());
		assert!(matches!(
			service.triage(foreign),
			Err(OrderError::UnservicedMarket { chain: 3, .. })
		));

		let deposit = Deposit {
			token_address: B256::ZERO,
			amount: U256::from(1),
			source_domain: 0,
			destination_domain: 5,
			nonce: 0,
			burn_source: B256::ZERO,
			mint_recipient: B256::ZERO,
			payload: DepositPayload::SlowOrderResponse(SlowOrderResponse { base_fee: 1 }),
		};
		let slow = observed(2, emitter(), LiquidityMessage::from(deposit).encode());
		assert!(matches!(
			service.triage(slow),
			Err(OrderError::NotAnOrder("Deposit"))
		));

		let garbage = observed(2, emitter(), vec![11, 0, 0]);
		assert!(matches!(service.triage(garbage), Err(OrderError::Malformed(_))));

		let mut truncated = observed(2, emitter(), vec![]);
		truncated.bytes.truncate(10);
		assert!(matches!(service.triage(truncated), Err(OrderError::Malformed(_))));
	}

	/// Always offers the current price back.
	struct MatchingStrategy;

	#[async_trait]
	impl BidStrategy for MatchingStrategy {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(implementations::strategies::undercut::UndercutStrategySchema)
		}

		async fn initial_bid(&self, order: &FastMarketOrder) -> BidDecision {
			BidDecision::Bid(order.max_fee)
		}

		async fn improve_bid(&self, _order: &FastMarketOrder, current: &AuctionInfo) -> BidDecision {
			BidDecision::Bid(current.bid_price)
		}
	}

	fn auction_at(bid_price: u64) -> AuctionInfo {
		AuctionInfo {
			start_block: 100,
			amount_in: 1_000,
			security_deposit: 10,
			bid_price,
			init_auction_fee: 1,
			source_chain: 2,
			target_chain: 6,
			initial_bidder: B256::repeat_byte(0x01),
			highest_bidder: B256::repeat_byte(0x01),
		}
	}

	#[tokio::test]
	async fn test_non_improving_bid_is_passed() {
		let service = OrderService::new(Vec::new(), Box::new(MatchingStrategy));
		assert_eq!(
			service.improve_bid(&order(), &auction_at(7)).await,
			BidDecision::Pass("strategy bid 7 does not improve on 7".to_string())
		);

		let service = service_with(UndercutStrategy::new(2, 0));
		assert_eq!(
			service.improve_bid(&order(), &auction_at(7)).await,
			BidDecision::Bid(5)
		);
		assert!(matches!(
			service_with(UndercutStrategy::new(1, 7))
				.improve_bid(&order(), &auction_at(7))
				.await,
			BidDecision::Pass(_)
		));
	}

	#[test]
	fn test_market_parse() {
		let market = Market::parse(2, "0x000000000000000000000000000000000000eeee").unwrap();
		assert_eq!(market.chain, 2);
		assert!(Market::parse(2, "0xzz").is_err());
	}
}
