//! Relayer events and the broadcast bus carrying them.
//!
//! Events are informational: the relayer never drives control flow off the
//! bus, so a publish without subscribers is not an error worth surfacing.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{AuctionId, ChainId, TransactionHash};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelayerEvent {
	Order(OrderEvent),
	Auction(AuctionEvent),
	Settlement(SettlementEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A fast market order for a serviced market was observed.
	Observed {
		auction_id: AuctionId,
		source_chain: ChainId,
		sequence: u64,
	},
	/// A signed message could not be turned into an order.
	Dropped { sequence: u64, reason: String },
	/// The relayer stopped working on an order without settling it.
	Abandoned { auction_id: AuctionId, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuctionEvent {
	BidPlaced { auction_id: AuctionId, bid_price: u64 },
	BidImproved { auction_id: AuctionId, bid_price: u64 },
	/// Another relayer holds the auction and we no longer contest it.
	Ceded { auction_id: AuctionId, reason: String },
	Won { auction_id: AuctionId, bid_price: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettlementEvent {
	Executed {
		auction_id: AuctionId,
		tx_hash: TransactionHash,
	},
	/// Execution retries were exhausted; needs operator attention.
	ExecutionFailed { auction_id: AuctionId, error: String },
	Redeemed {
		auction_id: AuctionId,
		tx_hash: TransactionHash,
	},
	/// The fill was funded but reimbursement could not be driven through.
	RedemptionFailed { auction_id: AuctionId, error: String },
}

/// Broadcast bus for relayer events.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<RelayerEvent>,
}

impl EventBus {
	/// Creates a bus buffering at most `capacity` events per lagging subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<RelayerEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event, returning the number of subscribers reached.
	pub fn publish(&self, event: RelayerEvent) -> usize {
		self.sender.send(event).unwrap_or(0)
	}
}
