//! Auction engine for fast market orders.
//!
//! Relayers compete for the right to pre-fund a fast transfer by bidding the
//! fee they are willing to accept. The engine owns the auction records and
//! the ledger, and every transition either applies fully or is rejected with
//! an [`AuctionError`] and no side effects.

use async_trait::async_trait;
use liquidity_messages::{LiquidityMessage, MalformedMessage};
use liquidity_types::{
	Auction, AuctionId, AuctionParameters, ChainId, ConfigSchema, UniversalAddress,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod clock;
pub mod ledger;
pub mod penalty;
pub mod state;

pub mod implementations {
	pub mod memory;
}

pub use clock::{BlockContext, Clock, ManualClock, WallClock};
pub use penalty::{compute_penalty, PenaltyAmounts};
pub use state::{EngineConfig, EngineState};

/// Reasons a transition is rejected. None of them mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
	#[error("Malformed message: {0}")]
	Malformed(#[from] MalformedMessage),
	#[error("Order deadline has passed")]
	DeadlineExceeded,
	#[error("Bid {bid} too high (limit {limit})")]
	BidTooHigh { bid: u64, limit: u64 },
	#[error("Auction period expired")]
	AuctionPeriodExpired,
	#[error("Auction period not expired")]
	AuctionPeriodNotExpired,
	#[error("Auction not active")]
	AuctionNotActive,
	#[error("Auction already started")]
	AuctionAlreadyStarted,
	#[error("Auction not completed")]
	AuctionNotCompleted,
	#[error("Only the highest bidder may execute during the grace period")]
	NotHighestBidder,
	#[error("No router registered for chain {0}")]
	UnknownTargetChain(ChainId),
	#[error("Fees exceed order amount")]
	FeeExceedsAmount,
	#[error("Insufficient balance: needed {needed}, available {available}")]
	InsufficientBalance { needed: u64, available: u64 },
	#[error("Slow order does not match fast order: {0}")]
	MismatchedSlowOrder(String),
	#[error("Missing secondary-bridge attestation")]
	MissingAttestation,
	#[error("Deposit amount out of range")]
	AmountOutOfRange,
	#[error("Custody shortfall: needed {needed}, available {available}")]
	CustodyShortfall { needed: u64, available: u64 },
	#[error("Ledger overflow")]
	LedgerOverflow,
	#[error("Invalid engine configuration: {0}")]
	InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutKind {
	/// Fee bid plus the (possibly reduced) security deposit.
	BidderReimbursement,
	InitAuctionFee,
	/// Share of a late-execution penalty paid to the executor.
	ExecutorPenalty,
	/// Flat fee taken when no auction completed.
	BaseFee,
	/// Slow-path mint repaying the bidder who pre-funded the user.
	SlowReimbursement,
}

/// A credit to a host-chain account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
	pub recipient: UniversalAddress,
	pub amount: u64,
	pub kind: PayoutKind,
}

/// Effects of settling an auction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
	pub auction_id: AuctionId,
	pub payouts: Vec<Payout>,
	/// Amount sent on to the redeemer, if any.
	pub fill_amount: u64,
	/// Message emitted for the redeemer, if any.
	pub message: Option<LiquidityMessage>,
	pub penalty: PenaltyAmounts,
}

impl Settlement {
	pub fn paid_to(&self, recipient: &UniversalAddress) -> u64 {
		self.payouts
			.iter()
			.filter(|p| &p.recipient == recipient)
			.map(|p| p.amount)
			.sum()
	}
}

/// Result of an accepted instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionOutcome {
	BidPlaced {
		auction_id: AuctionId,
		bid_price: u64,
	},
	BidImproved {
		auction_id: AuctionId,
		bid_price: u64,
		refunded: UniversalAddress,
	},
	/// The caller already holds the best bid; nothing changed.
	AlreadyHighestBidder { auction_id: AuctionId },
	Executed(Settlement),
	SlowOrderSettled(Settlement),
	/// Settlement was already applied; nothing changed.
	AlreadyCompleted { auction_id: AuctionId },
}

/// Request/response boundary of the chain hosting auctions.
#[async_trait]
pub trait AuctionEngineInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn auction(&self, auction_id: &AuctionId) -> Auction;

	async fn balance_of(&self, account: &UniversalAddress) -> u64;

	async fn current_block(&self) -> u64;

	/// Unix seconds as seen by the host chain.
	async fn current_time(&self) -> u64;

	async fn parameters(&self) -> AuctionParameters;

	/// Starts the auction for a signed fast market order.
	async fn place_initial_bid(
		&self,
		caller: UniversalAddress,
		fast_message: &[u8],
		fee_bid: u64,
	) -> Result<InstructionOutcome, AuctionError>;

	async fn improve_bid(
		&self,
		caller: UniversalAddress,
		auction_id: AuctionId,
		bid_price: u64,
	) -> Result<InstructionOutcome, AuctionError>;

	/// Settles a closed auction, with a penalty once the grace period ended.
	async fn execute_fast_order(
		&self,
		caller: UniversalAddress,
		fast_message: &[u8],
	) -> Result<InstructionOutcome, AuctionError>;

	/// Redeems the slow-path deposit answering a fast order.
	async fn settle_slow_order(
		&self,
		caller: UniversalAddress,
		fast_message: &[u8],
		slow_message: &[u8],
		attestation: &[u8],
	) -> Result<InstructionOutcome, AuctionError>;

	/// Credits an account outside of any auction.
	async fn fund(&self, account: UniversalAddress, amount: u64) -> Result<(), AuctionError>;

	/// Every message emitted for redeemers, oldest first.
	async fn emitted_messages(&self) -> Vec<LiquidityMessage>;
}
