//! Auction records and parameters.
//!
//! These are the host-chain view of an auction as exposed to relayers. The
//! authoritative transitions live in `liquidity-auction`; everything here is
//! plain data plus the arithmetic both sides must agree on.

use serde::{Deserialize, Serialize};

use crate::{ChainId, Domain, UniversalAddress};

/// Denominator for every parts-per-million quantity.
pub const FEE_PRECISION_MAX: u32 = 1_000_000;

/// Lifecycle of an auction. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
	#[default]
	NotStarted,
	Active,
	Completed,
}

/// Host-chain auction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionParameters {
	/// Share of the penalty paid to the user, in parts per million.
	pub user_penalty_reward_bps: u32,
	/// Penalty charged on the first late block, in parts per million.
	pub initial_penalty_bps: u32,
	/// Number of blocks bids may be improved for.
	pub duration: u64,
	/// Blocks after `duration` in which only the winner may execute.
	pub grace_period: u64,
	/// Blocks over which the penalty grows to the full security deposit.
	pub penalty_period: u64,
	/// Fixed part of the notional security deposit.
	pub security_deposit_base: u64,
	/// Part of the notional security deposit proportional to the order amount.
	pub security_deposit_bps: u32,
}

impl Default for AuctionParameters {
	fn default() -> Self {
		Self {
			user_penalty_reward_bps: 250_000,
			initial_penalty_bps: 250_000,
			duration: 2,
			grace_period: 5,
			penalty_period: 10,
			security_deposit_base: 4_200_000,
			security_deposit_bps: 5_000,
		}
	}
}

impl AuctionParameters {
	/// Checks the parameters describe a usable auction.
	pub fn validate(&self) -> Result<(), String> {
		if self.duration == 0 {
			return Err("duration must be at least one block".to_string());
		}
		for (name, value) in [
			("user_penalty_reward_bps", self.user_penalty_reward_bps),
			("initial_penalty_bps", self.initial_penalty_bps),
			("security_deposit_bps", self.security_deposit_bps),
		] {
			if value > FEE_PRECISION_MAX {
				return Err(format!("{} exceeds {}", name, FEE_PRECISION_MAX));
			}
		}
		Ok(())
	}

	/// Deposit proportional to the order size, on top of `maxFee`.
	pub fn notional_deposit(&self, amount_in: u64) -> u64 {
		let proportional =
			amount_in as u128 * self.security_deposit_bps as u128 / FEE_PRECISION_MAX as u128;
		(self.security_deposit_base as u128 + proportional).min(u64::MAX as u128) as u64
	}

	/// Collateral a bidder escrows in addition to `amountIn`.
	pub fn security_deposit(&self, max_fee: u64, amount_in: u64) -> u64 {
		max_fee.saturating_add(self.notional_deposit(amount_in))
	}

	/// Where an auction started at `start_block` stands at `current_block`.
	pub fn phase(&self, start_block: u64, current_block: u64) -> AuctionPhase {
		let elapsed = current_block.saturating_sub(start_block);
		if elapsed <= self.duration {
			AuctionPhase::Open
		} else if elapsed <= self.duration.saturating_add(self.grace_period) {
			AuctionPhase::GracePeriod
		} else {
			AuctionPhase::Penalty {
				late_blocks: elapsed - self.duration - self.grace_period,
			}
		}
	}
}

/// Position of an auction relative to its bidding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionPhase {
	/// Bids may still be improved.
	Open,
	/// Closed; only the highest bidder may execute.
	GracePeriod,
	/// Anyone may execute, at a cost to the highest bidder.
	Penalty { late_blocks: u64 },
}

impl AuctionPhase {
	pub fn is_open(&self) -> bool {
		matches!(self, AuctionPhase::Open)
	}
}

/// Bid state of an auction that received at least one bid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionInfo {
	pub start_block: u64,
	pub amount_in: u64,
	pub security_deposit: u64,
	pub bid_price: u64,
	pub init_auction_fee: u64,
	pub source_chain: ChainId,
	pub target_chain: ChainId,
	pub initial_bidder: UniversalAddress,
	pub highest_bidder: UniversalAddress,
}

impl AuctionInfo {
	/// Funds held in custody for the current highest bid.
	pub fn escrow(&self) -> u64 {
		self.amount_in.saturating_add(self.security_deposit)
	}
}

/// An auction as stored by the host chain.
///
/// `info` is `None` for auctions that never received a bid, including those
/// completed directly through the slow path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
	pub status: AuctionStatus,
	pub info: Option<AuctionInfo>,
	/// Whether the slow-path reimbursement has been paid out.
	pub slow_settled: bool,
}

impl Auction {
	pub fn highest_bidder(&self) -> Option<UniversalAddress> {
		self.info.as_ref().map(|info| info.highest_bidder)
	}
}

/// Router registered for a target chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterEndpoint {
	pub router: UniversalAddress,
	/// Secondary-bridge domain of the chain.
	pub domain: Domain,
}
