//! Auction state machine.
//!
//! [`EngineState`] is the whole host-chain state: auction records, the
//! ledger, consumed slow-path messages and emitted fills. Each transition
//! validates first and then applies its ledger batch atomically, so a
//! rejected call leaves the state untouched.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{B256, U256};
use liquidity_messages::{
	Deposit, DepositPayload, FastFill, FastMarketOrder, Fill, LiquidityMessage, SignedMessage,
};
use liquidity_types::{
	truncate_id, Auction, AuctionId, AuctionInfo, AuctionParameters, AuctionPhase, AuctionStatus,
	ChainId, Domain, RouterEndpoint, UniversalAddress,
};
use tracing::info;

use crate::clock::BlockContext;
use crate::ledger::{Ledger, Transfer};
use crate::penalty::{compute_penalty, PenaltyAmounts};
use crate::{AuctionError, InstructionOutcome, Payout, PayoutKind, Settlement};

/// Static configuration of the host chain.
#[derive(Debug, Clone)]
pub struct EngineConfig {
	pub chain_id: ChainId,
	/// Secondary-bridge domain of the host chain.
	pub domain: Domain,
	/// Account outbound deposits are burned from.
	pub custody_address: UniversalAddress,
	/// Receives the base fee of orders settled without an auction.
	pub fee_recipient: UniversalAddress,
	pub parameters: AuctionParameters,
	pub routers: HashMap<ChainId, RouterEndpoint>,
}

impl EngineConfig {
	pub fn validate(&self) -> Result<(), AuctionError> {
		self.parameters
			.validate()
			.map_err(AuctionError::InvalidConfig)
	}
}

struct FastOrder {
	auction_id: AuctionId,
	envelope: SignedMessage,
	order: FastMarketOrder,
}

fn parse_fast_order(bytes: &[u8]) -> Result<FastOrder, AuctionError> {
	let envelope = SignedMessage::decode(bytes)?;
	let order = envelope.message()?.into_fast_market_order()?;
	Ok(FastOrder {
		auction_id: envelope.digest(),
		envelope,
		order,
	})
}

pub struct EngineState {
	config: EngineConfig,
	auctions: HashMap<AuctionId, Auction>,
	consumed_slow_messages: HashSet<B256>,
	ledger: Ledger,
	emitted: Vec<LiquidityMessage>,
	outbound_nonce: u64,
}

impl EngineState {
	pub fn new(config: EngineConfig) -> Result<Self, AuctionError> {
		config.validate()?;
		Ok(Self {
			config,
			auctions: HashMap::new(),
			consumed_slow_messages: HashSet::new(),
			ledger: Ledger::new(),
			emitted: Vec::new(),
			outbound_nonce: 0,
		})
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	pub fn parameters(&self) -> &AuctionParameters {
		&self.config.parameters
	}

	/// Auction record, `NotStarted` for unknown ids.
	pub fn auction(&self, auction_id: &AuctionId) -> Auction {
		self.auctions.get(auction_id).cloned().unwrap_or_default()
	}

	pub fn ledger(&self) -> &Ledger {
		&self.ledger
	}

	pub fn balance_of(&self, account: &UniversalAddress) -> u64 {
		self.ledger.balance_of(account)
	}

	pub fn fund(&mut self, account: UniversalAddress, amount: u64) -> Result<(), AuctionError> {
		self.ledger.fund(account, amount)
	}

	pub fn emitted(&self) -> &[LiquidityMessage] {
		&self.emitted
	}

	pub fn place_initial_bid(
		&mut self,
		caller: UniversalAddress,
		fast_message: &[u8],
		fee_bid: u64,
		ctx: BlockContext,
	) -> Result<InstructionOutcome, AuctionError> {
		let FastOrder {
			auction_id,
			envelope,
			order,
		} = parse_fast_order(fast_message)?;

		if order.deadline_elapsed(ctx.time) {
			return Err(AuctionError::DeadlineExceeded);
		}
		if self.auction(&auction_id).status != AuctionStatus::NotStarted {
			return Err(AuctionError::AuctionAlreadyStarted);
		}
		if !self.config.routers.contains_key(&order.target_chain) {
			return Err(AuctionError::UnknownTargetChain(order.target_chain));
		}
		let fees_fit = order
			.max_fee
			.checked_add(order.init_auction_fee)
			.is_some_and(|fees| fees <= order.amount_in);
		if !fees_fit {
			return Err(AuctionError::FeeExceedsAmount);
		}
		if fee_bid > order.max_fee {
			return Err(AuctionError::BidTooHigh {
				bid: fee_bid,
				limit: order.max_fee,
			});
		}

		let security_deposit = self
			.config
			.parameters
			.security_deposit(order.max_fee, order.amount_in);
		let info = AuctionInfo {
			start_block: ctx.block,
			amount_in: order.amount_in,
			security_deposit,
			bid_price: fee_bid,
			init_auction_fee: order.init_auction_fee,
			source_chain: envelope.emitter_chain,
			target_chain: order.target_chain,
			initial_bidder: caller,
			highest_bidder: caller,
		};
		let escrow = order
			.amount_in
			.checked_add(security_deposit)
			.ok_or(AuctionError::LedgerOverflow)?;
		self.ledger.apply(&[Transfer::Escrow {
			from: caller,
			amount: escrow,
		}])?;

		self.auctions.insert(
			auction_id,
			Auction {
				status: AuctionStatus::Active,
				info: Some(info),
				slow_settled: false,
			},
		);
		info!(
			auction_id = %truncate_id(&auction_id),
			bidder = %truncate_id(&caller),
			bid_price = fee_bid,
			block = ctx.block,
			"Auction started"
		);

		Ok(InstructionOutcome::BidPlaced {
			auction_id,
			bid_price: fee_bid,
		})
	}

	pub fn improve_bid(
		&mut self,
		caller: UniversalAddress,
		auction_id: AuctionId,
		bid_price: u64,
		ctx: BlockContext,
	) -> Result<InstructionOutcome, AuctionError> {
		let mut auction = self.auction(&auction_id);
		if auction.status != AuctionStatus::Active {
			return Err(AuctionError::AuctionNotActive);
		}
		let info = auction.info.as_mut().ok_or(AuctionError::AuctionNotActive)?;

		if !self
			.config
			.parameters
			.phase(info.start_block, ctx.block)
			.is_open()
		{
			return Err(AuctionError::AuctionPeriodExpired);
		}
		if info.highest_bidder == caller {
			return Ok(InstructionOutcome::AlreadyHighestBidder { auction_id });
		}
		if bid_price >= info.bid_price {
			return Err(AuctionError::BidTooHigh {
				bid: bid_price,
				limit: info.bid_price,
			});
		}

		let escrow = info.escrow();
		let previous = info.highest_bidder;
		self.ledger.apply(&[
			Transfer::Escrow {
				from: caller,
				amount: escrow,
			},
			Transfer::Release {
				to: previous,
				amount: escrow,
			},
		])?;

		info.bid_price = bid_price;
		info.highest_bidder = caller;
		self.auctions.insert(auction_id, auction);
		info!(
			auction_id = %truncate_id(&auction_id),
			bidder = %truncate_id(&caller),
			bid_price,
			"Bid improved"
		);

		Ok(InstructionOutcome::BidImproved {
			auction_id,
			bid_price,
			refunded: previous,
		})
	}

	pub fn execute_fast_order(
		&mut self,
		caller: UniversalAddress,
		fast_message: &[u8],
		ctx: BlockContext,
	) -> Result<InstructionOutcome, AuctionError> {
		let FastOrder {
			auction_id,
			envelope,
			order,
		} = parse_fast_order(fast_message)?;

		let mut auction = self.auction(&auction_id);
		match auction.status {
			AuctionStatus::NotStarted => return Err(AuctionError::AuctionNotActive),
			AuctionStatus::Completed => {
				return Ok(InstructionOutcome::AlreadyCompleted { auction_id })
			}
			AuctionStatus::Active => {}
		}
		let info = auction.info.clone().ok_or(AuctionError::AuctionNotActive)?;

		let phase = self.config.parameters.phase(info.start_block, ctx.block);
		match phase {
			AuctionPhase::Open => return Err(AuctionError::AuctionPeriodNotExpired),
			AuctionPhase::GracePeriod if caller != info.highest_bidder => {
				return Err(AuctionError::NotHighestBidder)
			}
			_ => {}
		}

		let penalty = compute_penalty(&self.config.parameters, info.security_deposit, phase);
		let reimbursement = info
			.bid_price
			.saturating_add(info.security_deposit)
			.saturating_sub(penalty.total());
		let fill_amount = info
			.amount_in
			.saturating_sub(info.bid_price)
			.saturating_sub(info.init_auction_fee)
			.saturating_add(penalty.user_reward);

		let payouts: Vec<Payout> = [
			Payout {
				recipient: info.highest_bidder,
				amount: reimbursement,
				kind: PayoutKind::BidderReimbursement,
			},
			Payout {
				recipient: info.initial_bidder,
				amount: info.init_auction_fee,
				kind: PayoutKind::InitAuctionFee,
			},
			Payout {
				recipient: caller,
				amount: penalty.penalty,
				kind: PayoutKind::ExecutorPenalty,
			},
		]
		.into_iter()
		.filter(|payout| payout.amount > 0)
		.collect();

		let mut transfers: Vec<Transfer> = payouts
			.iter()
			.map(|payout| Transfer::Release {
				to: payout.recipient,
				amount: payout.amount,
			})
			.collect();
		transfers.push(Transfer::Burn {
			amount: fill_amount,
		});
		self.ledger.apply(&transfers)?;

		let message = LiquidityMessage::FastFill(FastFill {
			fill_amount,
			source_chain: envelope.emitter_chain,
			order_sender: order.sender,
			redeemer: order.redeemer,
			redeemer_message: order.redeemer_message,
		});
		self.emitted.push(message.clone());
		auction.status = AuctionStatus::Completed;
		self.auctions.insert(auction_id, auction);

		info!(
			auction_id = %truncate_id(&auction_id),
			executor = %truncate_id(&caller),
			fill_amount,
			penalty = penalty.penalty,
			user_reward = penalty.user_reward,
			"Fast order executed"
		);

		Ok(InstructionOutcome::Executed(Settlement {
			auction_id,
			payouts,
			fill_amount,
			message: Some(message),
			penalty,
		}))
	}

	pub fn settle_slow_order(
		&mut self,
		caller: UniversalAddress,
		fast_message: &[u8],
		slow_message: &[u8],
		attestation: &[u8],
		ctx: BlockContext,
	) -> Result<InstructionOutcome, AuctionError> {
		if attestation.is_empty() {
			return Err(AuctionError::MissingAttestation);
		}
		let FastOrder {
			auction_id,
			envelope: fast,
			order,
		} = parse_fast_order(fast_message)?;
		let slow = SignedMessage::decode(slow_message)?;
		let deposit = slow.message()?.into_deposit()?;

		let base_fee = match &deposit.payload {
			DepositPayload::SlowOrderResponse(response) => response.base_fee,
			DepositPayload::Fill(_) => {
				return Err(AuctionError::MismatchedSlowOrder(
					"deposit carries a fill".to_string(),
				))
			}
		};
		if slow.emitter_chain != fast.emitter_chain || slow.emitter_address != fast.emitter_address
		{
			return Err(AuctionError::MismatchedSlowOrder(
				"emitted by a different source".to_string(),
			));
		}
		if fast.sequence.checked_sub(1) != Some(slow.sequence) {
			return Err(AuctionError::MismatchedSlowOrder(format!(
				"sequence {} does not precede {}",
				slow.sequence, fast.sequence
			)));
		}

		let slow_digest = slow.digest();
		if self.consumed_slow_messages.contains(&slow_digest) {
			return Ok(InstructionOutcome::AlreadyCompleted { auction_id });
		}
		let amount =
			u64::try_from(deposit.amount).map_err(|_| AuctionError::AmountOutOfRange)?;

		let mut auction = self.auction(&auction_id);
		let settlement = match auction.status {
			AuctionStatus::Active => return Err(AuctionError::AuctionNotCompleted),
			AuctionStatus::Completed => {
				let info = match (&auction.info, auction.slow_settled) {
					(Some(info), false) => info.clone(),
					_ => return Ok(InstructionOutcome::AlreadyCompleted { auction_id }),
				};
				let payout = Payout {
					recipient: info.highest_bidder,
					amount,
					kind: PayoutKind::SlowReimbursement,
				};
				self.ledger.apply(&[
					Transfer::Mint { amount },
					Transfer::Release {
						to: payout.recipient,
						amount,
					},
				])?;
				Settlement {
					auction_id,
					payouts: vec![payout],
					fill_amount: 0,
					message: None,
					penalty: PenaltyAmounts::default(),
				}
			}
			AuctionStatus::NotStarted => {
				let router = *self
					.config
					.routers
					.get(&order.target_chain)
					.ok_or(AuctionError::UnknownTargetChain(order.target_chain))?;
				let fee = base_fee.min(amount);
				let remainder = amount - fee;

				let payouts: Vec<Payout> = (fee > 0)
					.then_some(Payout {
						recipient: self.config.fee_recipient,
						amount: fee,
						kind: PayoutKind::BaseFee,
					})
					.into_iter()
					.collect();
				let mut transfers = vec![Transfer::Mint { amount }];
				transfers.extend(payouts.iter().map(|payout| Transfer::Release {
					to: payout.recipient,
					amount: payout.amount,
				}));
				transfers.push(Transfer::Burn { amount: remainder });
				self.ledger.apply(&transfers)?;

				let message = LiquidityMessage::Deposit(Deposit {
					token_address: deposit.token_address,
					amount: U256::from(remainder),
					source_domain: self.config.domain,
					destination_domain: router.domain,
					nonce: self.outbound_nonce,
					burn_source: self.config.custody_address,
					mint_recipient: router.router,
					payload: DepositPayload::Fill(Fill {
						source_chain: fast.emitter_chain,
						order_sender: order.sender,
						redeemer: order.redeemer,
						redeemer_message: order.redeemer_message,
					}),
				});
				self.outbound_nonce += 1;
				self.emitted.push(message.clone());
				Settlement {
					auction_id,
					payouts,
					fill_amount: remainder,
					message: Some(message),
					penalty: PenaltyAmounts::default(),
				}
			}
		};

		auction.status = AuctionStatus::Completed;
		auction.slow_settled = true;
		self.auctions.insert(auction_id, auction);
		self.consumed_slow_messages.insert(slow_digest);

		info!(
			auction_id = %truncate_id(&auction_id),
			caller = %truncate_id(&caller),
			amount,
			block = ctx.block,
			"Slow order settled"
		);

		Ok(InstructionOutcome::SlowOrderSettled(settlement))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use liquidity_messages::{RedeemerMessage, SlowOrderResponse};

	const SOURCE_CHAIN: ChainId = 2;
	const TARGET_CHAIN: ChainId = 6;
	const START: u64 = 100;

	fn x() -> UniversalAddress {
		B256::repeat_byte(0x0a)
	}
	fn y() -> UniversalAddress {
		B256::repeat_byte(0x0b)
	}
	fn z() -> UniversalAddress {
		B256::repeat_byte(0x0c)
	}
	fn fee_recipient() -> UniversalAddress {
		B256::repeat_byte(0xfe)
	}
	fn redeemer() -> UniversalAddress {
		B256::repeat_byte(0x77)
	}
	fn emitter() -> UniversalAddress {
		B256::repeat_byte(0xee)
	}

	fn config() -> EngineConfig {
		let mut routers = HashMap::new();
		routers.insert(
			TARGET_CHAIN,
			RouterEndpoint {
				router: B256::repeat_byte(0x66),
				domain: 3,
			},
		);
		EngineConfig {
			chain_id: 1,
			domain: 5,
			custody_address: B256::repeat_byte(0xcc),
			fee_recipient: fee_recipient(),
			parameters: AuctionParameters {
				user_penalty_reward_bps: 250_000,
				initial_penalty_bps: 250_000,
				duration: 2,
				grace_period: 4,
				penalty_period: 20,
				security_deposit_base: 100,
				security_deposit_bps: 10_000,
			},
			routers,
		}
	}

	fn engine() -> EngineState {
		let mut state = EngineState::new(config()).unwrap();
		for account in [x(), y(), z()] {
			state.fund(account, 10_000).unwrap();
		}
		state
	}

	fn at(block: u64) -> BlockContext {
		BlockContext {
			block,
			time: 1_000,
		}
	}

	fn order(deadline: u32) -> FastMarketOrder {
		FastMarketOrder {
			amount_in: 1_000,
			min_amount_out: 0,
			target_chain: TARGET_CHAIN,
			redeemer: redeemer(),
			sender: B256::repeat_byte(0x55),
			refund_address: B256::repeat_byte(0x55),
			max_fee: 10,
			init_auction_fee: 1,
			deadline,
			redeemer_message: RedeemerMessage::new(b"memo".to_vec()).unwrap(),
		}
	}

	fn fast_message(order: FastMarketOrder) -> Vec<u8> {
		SignedMessage::unsigned(
			SOURCE_CHAIN,
			emitter(),
			8,
			900,
			LiquidityMessage::from(order).encode(),
		)
		.encode()
	}

	fn slow_message(sequence: u64, amount: u64, base_fee: u64) -> Vec<u8> {
		let deposit = Deposit {
			token_address: B256::repeat_byte(0x70),
			amount: U256::from(amount),
			source_domain: 0,
			destination_domain: 5,
			nonce: 1,
			burn_source: B256::repeat_byte(0x71),
			mint_recipient: B256::repeat_byte(0xcc),
			payload: DepositPayload::SlowOrderResponse(SlowOrderResponse { base_fee }),
		};
		SignedMessage::unsigned(
			SOURCE_CHAIN,
			emitter(),
			sequence,
			900,
			LiquidityMessage::from(deposit).encode(),
		)
		.encode()
	}

	fn auction_id(message: &[u8]) -> AuctionId {
		SignedMessage::decode(message).unwrap().digest()
	}

	fn info(state: &EngineState, id: &AuctionId) -> AuctionInfo {
		state.auction(id).info.unwrap()
	}

	/// X opens at max fee, Y undercuts to 9.
	fn contested(state: &mut EngineState) -> (Vec<u8>, AuctionId) {
		let fast = fast_message(order(0));
		let id = auction_id(&fast);
		state.place_initial_bid(x(), &fast, 10, at(START)).unwrap();
		state.improve_bid(y(), id, 9, at(START + 1)).unwrap();
		(fast, id)
	}

	#[test]
	fn test_scenario_a_execute_within_grace_period() {
		let mut state = engine();
		let fast = fast_message(order(0));
		let id = auction_id(&fast);

		state.place_initial_bid(x(), &fast, 10, at(START)).unwrap();
		let auction = state.auction(&id);
		assert_eq!(auction.status, AuctionStatus::Active);
		let opened = auction.info.unwrap();
		assert_eq!(opened.bid_price, 10);
		assert_eq!(opened.highest_bidder, x());
		// 10 + 100 + 1% of 1000
		assert_eq!(opened.security_deposit, 120);
		assert_eq!(state.balance_of(&x()), 10_000 - 1_120);

		state.improve_bid(y(), id, 9, at(START + 1)).unwrap();
		let improved = info(&state, &id);
		assert_eq!(improved.bid_price, 9);
		assert_eq!(improved.highest_bidder, y());
		assert_eq!(state.balance_of(&x()), 10_000);

		let outcome = state.execute_fast_order(y(), &fast, at(START + 3)).unwrap();
		let settlement = match outcome {
			InstructionOutcome::Executed(settlement) => settlement,
			other => panic!("unexpected outcome: {:?}", other),
		};
		assert_eq!(settlement.paid_to(&y()), 9 + 120);
		assert_eq!(settlement.paid_to(&x()), 1);
		assert_eq!(settlement.fill_amount, 1_000 - 9 - 1);
		assert_eq!(settlement.penalty, PenaltyAmounts::default());
		match settlement.message {
			Some(LiquidityMessage::FastFill(fill)) => {
				assert_eq!(fill.fill_amount, 990);
				assert_eq!(fill.redeemer, redeemer());
				assert_eq!(fill.source_chain, SOURCE_CHAIN);
				assert_eq!(fill.redeemer_message.as_slice(), b"memo");
			}
			other => panic!("unexpected message: {:?}", other),
		}

		assert_eq!(state.auction(&id).status, AuctionStatus::Completed);
		assert_eq!(state.balance_of(&y()), 10_000 - 1_120 + 129);
		assert_eq!(state.balance_of(&x()), 10_001);
		assert_eq!(state.ledger().custody(), 0);
	}

	#[test]
	fn test_scenario_b_slow_settlement_without_auction() {
		let mut state = engine();
		let fast = fast_message(order(500));
		let id = auction_id(&fast);

		// Deadline passed before anyone bid
		assert_eq!(
			state.place_initial_bid(x(), &fast, 10, at(START)),
			Err(AuctionError::DeadlineExceeded)
		);
		assert_eq!(state.auction(&id), Auction::default());

		let slow = slow_message(7, 1_000, 5);
		let outcome = state
			.settle_slow_order(z(), &fast, &slow, b"attested", at(START))
			.unwrap();
		let settlement = match outcome {
			InstructionOutcome::SlowOrderSettled(settlement) => settlement,
			other => panic!("unexpected outcome: {:?}", other),
		};
		assert_eq!(settlement.paid_to(&fee_recipient()), 5);
		assert_eq!(settlement.fill_amount, 995);
		match settlement.message {
			Some(LiquidityMessage::Deposit(deposit)) => {
				assert_eq!(deposit.amount, U256::from(995u64));
				assert_eq!(deposit.mint_recipient, B256::repeat_byte(0x66));
				assert_eq!(deposit.destination_domain, 3);
				match deposit.payload {
					DepositPayload::Fill(fill) => assert_eq!(fill.redeemer, redeemer()),
					other => panic!("unexpected payload: {:?}", other),
				}
			}
			other => panic!("unexpected message: {:?}", other),
		}

		let auction = state.auction(&id);
		assert_eq!(auction.status, AuctionStatus::Completed);
		assert!(auction.info.is_none());
		assert_eq!(state.balance_of(&fee_recipient()), 5);

		// Nobody can start the auction afterwards, even before the deadline
		assert_eq!(
			state.place_initial_bid(x(), &fast, 10, BlockContext { block: START, time: 0 }),
			Err(AuctionError::AuctionAlreadyStarted)
		);
	}

	#[test]
	fn test_scenario_c_liquidation_during_penalty_period() {
		let mut reference = engine();
		let (fast, _) = contested(&mut reference);
		let on_time = match reference.execute_fast_order(y(), &fast, at(START + 3)).unwrap() {
			InstructionOutcome::Executed(settlement) => settlement.paid_to(&y()),
			other => panic!("unexpected outcome: {:?}", other),
		};

		let mut state = engine();
		let (fast, id) = contested(&mut state);
		// duration + grace + half of the penalty period
		let late_block = START + 2 + 4 + 10;
		assert_eq!(
			state.execute_fast_order(z(), &fast, at(START + 5)),
			Err(AuctionError::NotHighestBidder)
		);

		let settlement = match state.execute_fast_order(z(), &fast, at(late_block)).unwrap() {
			InstructionOutcome::Executed(settlement) => settlement,
			other => panic!("unexpected outcome: {:?}", other),
		};
		let total = settlement.penalty.total();
		assert!(total > 0);
		assert!(total < info(&reference, &id).security_deposit);
		// base 30, then (120 - 30) * 10 / 20
		assert_eq!(total, 75);
		assert_eq!(settlement.penalty.user_reward, 18);
		assert_eq!(settlement.paid_to(&z()), 57);
		assert_eq!(settlement.paid_to(&y()), on_time - total);
		assert_eq!(settlement.fill_amount, 990 + 18);
		assert_eq!(state.ledger().custody(), 0);
	}

	#[test]
	fn test_bid_price_is_monotonic_and_single_escrow() {
		let mut state = engine();
		let fast = fast_message(order(0));
		let id = auction_id(&fast);
		state.place_initial_bid(x(), &fast, 10, at(START)).unwrap();

		let attempts = [(y(), 9), (x(), 9), (z(), 12), (x(), 7), (y(), 7), (z(), 3)];
		let mut last_price = 10;
		for (bidder, price) in attempts {
			let _ = state.improve_bid(bidder, id, price, at(START + 1));
			let current = info(&state, &id);
			assert!(current.bid_price <= last_price);
			last_price = current.bid_price;
			// Only the current highest bid is escrowed
			assert_eq!(state.ledger().custody(), current.escrow());
			assert_eq!(state.balance_of(&current.highest_bidder), 10_000 - current.escrow());
		}
		assert_eq!(last_price, 3);
		assert_eq!(info(&state, &id).highest_bidder, z());
		assert_eq!(info(&state, &id).initial_bidder, x());
	}

	#[test]
	fn test_improve_bid_rejections() {
		let mut state = engine();
		let fast = fast_message(order(0));
		let id = auction_id(&fast);

		assert_eq!(
			state.improve_bid(y(), id, 9, at(START)),
			Err(AuctionError::AuctionNotActive)
		);
		state.place_initial_bid(x(), &fast, 10, at(START)).unwrap();

		assert_eq!(
			state.improve_bid(y(), id, 10, at(START + 1)),
			Err(AuctionError::BidTooHigh { bid: 10, limit: 10 })
		);
		assert_eq!(
			state.improve_bid(x(), id, 5, at(START + 1)),
			Ok(InstructionOutcome::AlreadyHighestBidder { auction_id: id })
		);
		assert_eq!(info(&state, &id).bid_price, 10);

		let poor = B256::repeat_byte(0x99);
		state.fund(poor, 50).unwrap();
		assert_eq!(
			state.improve_bid(poor, id, 8, at(START + 1)),
			Err(AuctionError::InsufficientBalance {
				needed: 1_120,
				available: 50,
			})
		);
		assert_eq!(info(&state, &id).highest_bidder, x());
		assert_eq!(state.balance_of(&x()), 10_000 - 1_120);

		assert_eq!(
			state.improve_bid(y(), id, 8, at(START + 3)),
			Err(AuctionError::AuctionPeriodExpired)
		);
	}

	#[test]
	fn test_initial_bid_rejections() {
		let mut state = engine();

		let mut expensive = order(0);
		expensive.max_fee = 1_000;
		assert_eq!(
			state.place_initial_bid(x(), &fast_message(expensive), 10, at(START)),
			Err(AuctionError::FeeExceedsAmount)
		);

		let mut elsewhere = order(0);
		elsewhere.target_chain = 42;
		assert_eq!(
			state.place_initial_bid(x(), &fast_message(elsewhere), 10, at(START)),
			Err(AuctionError::UnknownTargetChain(42))
		);

		let fast = fast_message(order(0));
		assert_eq!(
			state.place_initial_bid(x(), &fast, 11, at(START)),
			Err(AuctionError::BidTooHigh { bid: 11, limit: 10 })
		);

		let poor = B256::repeat_byte(0x99);
		assert!(matches!(
			state.place_initial_bid(poor, &fast, 10, at(START)),
			Err(AuctionError::InsufficientBalance { .. })
		));

		state.place_initial_bid(x(), &fast, 10, at(START)).unwrap();
		assert_eq!(
			state.place_initial_bid(y(), &fast, 9, at(START)),
			Err(AuctionError::AuctionAlreadyStarted)
		);

		let not_an_order = slow_message(7, 1_000, 5);
		assert!(matches!(
			state.place_initial_bid(x(), &not_an_order, 10, at(START)),
			Err(AuctionError::Malformed(_))
		));
	}

	#[test]
	fn test_deadline_enforced_at_boundary() {
		let mut state = engine();
		let fast = fast_message(order(1_000));
		let id = auction_id(&fast);

		// at(..) is exactly the deadline
		assert_eq!(
			state.place_initial_bid(x(), &fast, 10, at(START)),
			Err(AuctionError::DeadlineExceeded)
		);
		assert_eq!(state.auction(&id).status, AuctionStatus::NotStarted);
		assert_eq!(state.balance_of(&x()), 10_000);

		let before = BlockContext {
			block: START,
			time: 999,
		};
		assert!(state.place_initial_bid(x(), &fast, 10, before).is_ok());
	}

	#[test]
	fn test_execute_is_idempotent() {
		let mut state = engine();
		let (fast, id) = contested(&mut state);

		assert_eq!(
			state.execute_fast_order(y(), &fast, at(START + 2)),
			Err(AuctionError::AuctionPeriodNotExpired)
		);
		state.execute_fast_order(y(), &fast, at(START + 3)).unwrap();
		let balances: Vec<u64> = [x(), y(), z()].iter().map(|a| state.balance_of(a)).collect();
		let emitted = state.emitted().len();

		for block in [START + 4, START + 100] {
			assert_eq!(
				state.execute_fast_order(z(), &fast, at(block)),
				Ok(InstructionOutcome::AlreadyCompleted { auction_id: id })
			);
		}
		let after: Vec<u64> = [x(), y(), z()].iter().map(|a| state.balance_of(a)).collect();
		assert_eq!(balances, after);
		assert_eq!(state.emitted().len(), emitted);
	}

	#[test]
	fn test_slow_reimbursement_after_fast_execution() {
		let mut state = engine();
		let (fast, id) = contested(&mut state);
		let slow = slow_message(7, 1_000, 5);

		assert_eq!(
			state.settle_slow_order(z(), &fast, &slow, b"attested", at(START + 1)),
			Err(AuctionError::AuctionNotCompleted)
		);

		state.execute_fast_order(y(), &fast, at(START + 3)).unwrap();
		let before = state.balance_of(&y());
		let supply = state.ledger().total_supply();

		let outcome = state
			.settle_slow_order(z(), &fast, &slow, b"attested", at(START + 10))
			.unwrap();
		assert!(matches!(outcome, InstructionOutcome::SlowOrderSettled(_)));
		assert_eq!(state.balance_of(&y()), before + 1_000);
		assert_eq!(state.ledger().total_supply(), supply + 1_000);
		assert!(state.auction(&id).slow_settled);

		// Replaying the same slow message is a no-op
		assert_eq!(
			state.settle_slow_order(z(), &fast, &slow, b"attested", at(START + 11)),
			Ok(InstructionOutcome::AlreadyCompleted { auction_id: id })
		);
		assert_eq!(state.balance_of(&y()), before + 1_000);
	}

	#[test]
	fn test_slow_order_must_pair_with_fast_order() {
		let mut state = engine();
		let fast = fast_message(order(0));

		assert_eq!(
			state.settle_slow_order(z(), &fast, &slow_message(7, 1_000, 5), b"", at(START)),
			Err(AuctionError::MissingAttestation)
		);
		assert!(matches!(
			state.settle_slow_order(z(), &fast, &slow_message(6, 1_000, 5), b"ok", at(START)),
			Err(AuctionError::MismatchedSlowOrder(_))
		));

		let other_emitter = {
			let mut envelope = SignedMessage::decode(&slow_message(7, 1_000, 5)).unwrap();
			envelope.emitter_address = B256::repeat_byte(0x01);
			envelope.encode()
		};
		assert!(matches!(
			state.settle_slow_order(z(), &fast, &other_emitter, b"ok", at(START)),
			Err(AuctionError::MismatchedSlowOrder(_))
		));
		assert_eq!(state.ledger().total_supply(), 30_000);
	}

	#[test]
	fn test_base_fee_capped_at_amount() {
		let mut state = engine();
		let fast = fast_message(order(0));
		let outcome = state
			.settle_slow_order(z(), &fast, &slow_message(7, 3, 5), b"ok", at(START))
			.unwrap();
		match outcome {
			InstructionOutcome::SlowOrderSettled(settlement) => {
				assert_eq!(settlement.paid_to(&fee_recipient()), 3);
				assert_eq!(settlement.fill_amount, 0);
			}
			other => panic!("unexpected outcome: {:?}", other),
		}
	}
}
