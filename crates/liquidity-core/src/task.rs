//! Per-order state machine.
//!
//! One [`OrderTask`] runs for every fast order the relayer takes on. It moves
//! through [`Stage`]s until the auction is settled, ceded or abandoned. Every
//! wait is a suspension point raced against the shutdown signal; submissions
//! already in flight are always awaited to completion.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use liquidity_attestation::{AttestationError, AttestationService};
use liquidity_auction::{AuctionError, InstructionOutcome};
use liquidity_delivery::{DeliveryError, DeliveryService, RetryPolicy};
use liquidity_messages::{Instruction, MalformedMessage, SignedMessage};
use liquidity_order::{BidDecision, FastOrder, OrderService};
use liquidity_types::{
	truncate_id, Auction, AuctionEvent, AuctionInfo, AuctionParameters, AuctionStatus, ChainId,
	EventBus, OrderEvent, RelayerEvent, SettlementEvent, UniversalAddress,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Log target for failures that need an operator.
pub const ESCALATION_TARGET: &str = "liquidity::escalation";

#[derive(Debug, Error)]
pub enum TaskError {
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
	#[error("Attestation error: {0}")]
	Attestation(#[from] AttestationError),
	#[error("Malformed message: {0}")]
	Malformed(#[from] MalformedMessage),
}

/// Timing and retry bounds shared by every task.
#[derive(Debug, Clone)]
pub struct TaskSettings {
	pub host_chain: ChainId,
	pub poll_interval: Duration,
	/// Bounds both fast-order execution and slow-order redemption.
	pub execute: RetryPolicy,
	pub max_reevaluations: u32,
}

/// Services a task needs. Cheap to clone; one copy per task.
#[derive(Clone)]
pub struct RelayerContext {
	pub delivery: Arc<DeliveryService>,
	pub order: Arc<OrderService>,
	pub attestation: Arc<AttestationService>,
	pub event_bus: EventBus,
	pub settings: TaskSettings,
}

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
	/// Won, executed and reimbursed through the slow path.
	Redeemed,
	/// The auction needs nothing further from us.
	Settled,
	/// Another relayer holds or won the auction.
	Ceded(String),
	/// We stopped before holding any bid.
	Abandoned(String),
	ExecutionFailed(String),
	RedemptionFailed(String),
	Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stage {
	/// Fetch the auction and decide whether to open, improve or settle.
	Evaluate,
	/// Hold the best bid until the window closes.
	Contest,
	Settle,
	Redeem,
	Done(TaskOutcome),
}

impl Stage {
	fn name(&self) -> &'static str {
		match self {
			Stage::Evaluate => "evaluate",
			Stage::Contest => "contest",
			Stage::Settle => "settle",
			Stage::Redeem => "redeem",
			Stage::Done(_) => "done",
		}
	}
}

pub struct OrderTask {
	context: RelayerContext,
	fast: FastOrder,
	identity: UniversalAddress,
	shutdown: watch::Receiver<bool>,
	parameters: Option<AuctionParameters>,
	reevaluations: u32,
	announced_win: bool,
}

impl OrderTask {
	pub fn new(context: RelayerContext, fast: FastOrder, shutdown: watch::Receiver<bool>) -> Self {
		let identity = context.delivery.identity().address();
		Self {
			context,
			fast,
			identity,
			shutdown,
			parameters: None,
			reevaluations: 0,
			announced_win: false,
		}
	}

	/// Drives the order from triage to completion.
	pub async fn run(self) -> TaskOutcome {
		self.drive(Stage::Evaluate).await
	}

	/// Picks up slow-path redemption for an auction this relayer already
	/// executed. Everything is re-derived from the fast order.
	pub async fn resume_redemption(self) -> TaskOutcome {
		self.drive(Stage::Redeem).await
	}

	async fn drive(mut self, mut stage: Stage) -> TaskOutcome {
		loop {
			if let Stage::Done(outcome) = stage {
				return self.finish(outcome);
			}
			debug!(
				auction_id = %truncate_id(&self.fast.auction_id),
				stage = stage.name(),
				"Entering stage"
			);
			let result = match stage {
				Stage::Evaluate => self.evaluate().await,
				Stage::Contest => self.contest().await,
				Stage::Settle => self.settle().await,
				Stage::Redeem => self.redeem().await,
				Stage::Done(_) => continue,
			};
			stage = match result {
				Ok(next) => next,
				Err(e) => self.recover(stage, e).await,
			};
		}
	}

	/// Retries a stage that failed on a query. Before we hold a bid the
	/// retries count against the re-evaluation bound; afterwards we keep
	/// trying, since giving up would strand escrowed funds.
	async fn recover(&mut self, stage: Stage, e: TaskError) -> Stage {
		if stage == Stage::Evaluate {
			if self.reevaluations >= self.context.settings.max_reevaluations {
				return Stage::Done(TaskOutcome::Abandoned(format!(
					"gave up after {} re-evaluations: {}",
					self.reevaluations, e
				)));
			}
			self.reevaluations += 1;
		}
		warn!(
			auction_id = %truncate_id(&self.fast.auction_id),
			stage = stage.name(),
			error = %e,
			"Stage failed, retrying"
		);
		if !self.pause(self.context.settings.poll_interval).await {
			return Stage::Done(TaskOutcome::Cancelled);
		}
		stage
	}

	fn finish(&self, outcome: TaskOutcome) -> TaskOutcome {
		let auction_id = self.fast.auction_id;
		let id = truncate_id(&auction_id);
		match &outcome {
			TaskOutcome::Redeemed => info!(auction_id = %id, "Order complete"),
			TaskOutcome::Settled => info!(auction_id = %id, "Nothing left to do for auction"),
			TaskOutcome::Ceded(reason) => {
				info!(auction_id = %id, reason = %reason, "Auction ceded");
				self.publish(RelayerEvent::Auction(AuctionEvent::Ceded {
					auction_id,
					reason: reason.clone(),
				}));
			}
			TaskOutcome::Abandoned(reason) => {
				warn!(auction_id = %id, reason = %reason, "Order abandoned");
				self.publish(RelayerEvent::Order(OrderEvent::Abandoned {
					auction_id,
					reason: reason.clone(),
				}));
			}
			TaskOutcome::ExecutionFailed(_) | TaskOutcome::RedemptionFailed(_) => {}
			TaskOutcome::Cancelled => info!(auction_id = %id, "Order task cancelled"),
		}
		outcome
	}

	fn publish(&self, event: RelayerEvent) {
		self.context.event_bus.publish(event);
	}

	/// Sleeps unless shutdown is requested first. Returns false on shutdown.
	async fn pause(&mut self, duration: Duration) -> bool {
		if *self.shutdown.borrow() {
			return false;
		}
		tokio::select! {
			_ = tokio::time::sleep(duration) => true,
			changed = self.shutdown.changed() => changed.is_ok() && !*self.shutdown.borrow(),
		}
	}

	fn host(&self) -> ChainId {
		self.context.settings.host_chain
	}

	async fn parameters(&mut self) -> Result<AuctionParameters, TaskError> {
		if let Some(parameters) = &self.parameters {
			return Ok(parameters.clone());
		}
		let parameters = self.context.delivery.parameters(self.host()).await?;
		self.parameters = Some(parameters.clone());
		Ok(parameters)
	}

	async fn fetch_auction(&self) -> Result<Auction, TaskError> {
		Ok(self
			.context
			.delivery
			.auction(self.host(), &self.fast.auction_id)
			.await?)
	}

	async fn window_open(&mut self, info: &AuctionInfo) -> Result<bool, TaskError> {
		let parameters = self.parameters().await?;
		let block = self.context.delivery.block_number(self.host()).await?;
		Ok(parameters.phase(info.start_block, block).is_open())
	}

	async fn evaluate(&mut self) -> Result<Stage, TaskError> {
		let Auction {
			status,
			info,
			slow_settled,
		} = self.fetch_auction().await?;

		match (status, info) {
			(AuctionStatus::NotStarted, _) => self.open_auction().await,
			(AuctionStatus::Active, Some(info)) => {
				if !self.window_open(&info).await? {
					return Ok(Stage::Settle);
				}
				if info.highest_bidder == self.identity {
					return Ok(Stage::Contest);
				}
				self.improve(&info).await
			}
			(AuctionStatus::Active, None) => Ok(Stage::Done(TaskOutcome::Abandoned(
				"active auction has no bid record".to_string(),
			))),
			(AuctionStatus::Completed, Some(info))
				if info.highest_bidder == self.identity && !slow_settled =>
			{
				Ok(Stage::Redeem)
			}
			(AuctionStatus::Completed, _) => Ok(Stage::Done(TaskOutcome::Settled)),
		}
	}

	async fn open_auction(&mut self) -> Result<Stage, TaskError> {
		let parameters = self.parameters().await?;
		let order = &self.fast.order;
		let needed = order
			.amount_in
			.saturating_add(parameters.security_deposit(order.max_fee, order.amount_in));
		let available = self.context.delivery.balance(self.host()).await?;
		if available < needed {
			return Ok(Stage::Done(TaskOutcome::Abandoned(format!(
				"insufficient balance: needed {}, available {}",
				needed, available
			))));
		}

		let fee_bid = match self.context.order.initial_bid(&self.fast.order).await {
			BidDecision::Bid(price) => price,
			BidDecision::Pass(reason) => return Ok(Stage::Done(TaskOutcome::Abandoned(reason))),
		};
		let instruction = Instruction::PlaceInitialBid {
			fee_bid,
			fast_message: self.fast.fast_message.clone(),
		};
		match self
			.context
			.delivery
			.submit_with_retry(self.host(), &instruction)
			.await
		{
			Ok(submission) => {
				if let InstructionOutcome::BidPlaced {
					auction_id,
					bid_price,
				} = submission.outcome
				{
					info!(
						auction_id = %truncate_id(&auction_id),
						bid_price,
						"Initial bid placed"
					);
					self.publish(RelayerEvent::Auction(AuctionEvent::BidPlaced {
						auction_id,
						bid_price,
					}));
				}
				Ok(Stage::Contest)
			}
			Err(e) => Ok(self.handle_rejection(e)),
		}
	}

	async fn improve(&mut self, info: &AuctionInfo) -> Result<Stage, TaskError> {
		let needed = info.escrow();
		let available = self.context.delivery.balance(self.host()).await?;
		if available < needed {
			return Ok(Stage::Done(TaskOutcome::Ceded(format!(
				"insufficient balance to improve: needed {}, available {}",
				needed, available
			))));
		}

		let bid_price = match self.context.order.improve_bid(&self.fast.order, info).await {
			BidDecision::Bid(price) => price,
			BidDecision::Pass(reason) => return Ok(Stage::Done(TaskOutcome::Ceded(reason))),
		};
		let instruction = Instruction::ImproveBid {
			auction_id: self.fast.auction_id,
			bid_price,
		};
		match self
			.context
			.delivery
			.submit_with_retry(self.host(), &instruction)
			.await
		{
			Ok(submission) => {
				if let InstructionOutcome::BidImproved {
					auction_id,
					bid_price,
					..
				} = submission.outcome
				{
					info!(
						auction_id = %truncate_id(&auction_id),
						bid_price,
						outbid = info.bid_price,
						"Bid improved"
					);
					self.publish(RelayerEvent::Auction(AuctionEvent::BidImproved {
						auction_id,
						bid_price,
					}));
				}
				Ok(Stage::Contest)
			}
			Err(e) => Ok(self.handle_rejection(e)),
		}
	}

	/// A start or improve attempt failed: re-evaluate from the top, within bounds.
	fn handle_rejection(&mut self, e: DeliveryError) -> Stage {
		match e.rejection() {
			Some(AuctionError::DeadlineExceeded) => {
				return Stage::Done(TaskOutcome::Abandoned("order deadline has passed".to_string()))
			}
			Some(AuctionError::AuctionPeriodExpired) => return Stage::Settle,
			Some(AuctionError::InsufficientBalance { .. }) => {
				return Stage::Done(TaskOutcome::Abandoned(e.to_string()))
			}
			_ => {}
		}
		if self.reevaluations >= self.context.settings.max_reevaluations {
			return Stage::Done(TaskOutcome::Abandoned(format!(
				"bid rejected after {} re-evaluations: {}",
				self.reevaluations, e
			)));
		}
		self.reevaluations += 1;
		warn!(
			auction_id = %truncate_id(&self.fast.auction_id),
			reevaluation = self.reevaluations,
			error = %e,
			"Bid not accepted, re-evaluating"
		);
		Stage::Evaluate
	}

	async fn contest(&mut self) -> Result<Stage, TaskError> {
		if !self.pause(self.context.settings.poll_interval).await {
			return Ok(Stage::Done(TaskOutcome::Cancelled));
		}
		let auction = self.fetch_auction().await?;
		match (auction.status, auction.info) {
			(AuctionStatus::Active, Some(info)) => {
				if !self.window_open(&info).await? {
					return Ok(Stage::Settle);
				}
				if info.highest_bidder != self.identity {
					debug!(
						auction_id = %truncate_id(&self.fast.auction_id),
						bid_price = info.bid_price,
						"Outbid"
					);
					return Ok(Stage::Evaluate);
				}
				Ok(Stage::Contest)
			}
			(AuctionStatus::Completed, _) => Ok(Stage::Settle),
			_ => Ok(Stage::Evaluate),
		}
	}

	async fn settle(&mut self) -> Result<Stage, TaskError> {
		let Auction {
			status,
			info,
			slow_settled,
		} = self.fetch_auction().await?;

		match (status, info) {
			(AuctionStatus::Completed, Some(info)) if info.highest_bidder == self.identity => {
				if slow_settled {
					Ok(Stage::Done(TaskOutcome::Settled))
				} else {
					Ok(Stage::Redeem)
				}
			}
			(AuctionStatus::Completed, _) => Ok(Stage::Done(TaskOutcome::Ceded(
				"auction settled by another relayer".to_string(),
			))),
			(AuctionStatus::Active, Some(info)) if info.highest_bidder != self.identity => {
				Ok(Stage::Done(TaskOutcome::Ceded(format!(
					"outbid at {}",
					info.bid_price
				))))
			}
			(AuctionStatus::Active, Some(info)) => {
				if !self.announced_win {
					self.announced_win = true;
					info!(
						auction_id = %truncate_id(&self.fast.auction_id),
						bid_price = info.bid_price,
						"Auction won"
					);
					self.publish(RelayerEvent::Auction(AuctionEvent::Won {
						auction_id: self.fast.auction_id,
						bid_price: info.bid_price,
					}));
				}
				Ok(self.execute().await)
			}
			_ => Ok(Stage::Evaluate),
		}
	}

	async fn execute(&mut self) -> Stage {
		let auction_id = self.fast.auction_id;
		let policy = self.context.settings.execute.clone();
		let instruction = Instruction::ExecuteFastOrder {
			fast_message: self.fast.fast_message.clone(),
		};

		let mut schedule = policy.schedule();
		let mut last_error = String::new();
		for attempt in 1..=policy.max_attempts {
			match self.context.delivery.submit(self.host(), &instruction).await {
				Ok(submission) => {
					match submission.outcome {
						InstructionOutcome::Executed(settlement) => {
							info!(
								auction_id = %truncate_id(&auction_id),
								tx_hash = %submission.receipt.hash,
								fill_amount = settlement.fill_amount,
								reimbursed = settlement.paid_to(&self.identity),
								"Fast order executed"
							);
							self.publish(RelayerEvent::Settlement(SettlementEvent::Executed {
								auction_id,
								tx_hash: submission.receipt.hash,
							}));
						}
						other => debug!(
							auction_id = %truncate_id(&auction_id),
							outcome = ?other,
							"Fast order already executed"
						),
					}
					return Stage::Redeem;
				}
				Err(e) => match e.rejection() {
					// Our view of the block height ran ahead of the chain
					Some(AuctionError::AuctionPeriodNotExpired) => return Stage::Contest,
					Some(AuctionError::NotHighestBidder) => {
						return Stage::Done(TaskOutcome::Ceded(
							"no longer the highest bidder".to_string(),
						))
					}
					_ => {
						warn!(
							auction_id = %truncate_id(&auction_id),
							attempt,
							max_attempts = policy.max_attempts,
							error = %e,
							"Execution failed"
						);
						last_error = e.to_string();
						if !policy.should_retry(attempt) {
							break;
						}
						let Some(delay) = schedule.next_backoff() else {
							break;
						};
						if !self.pause(delay).await {
							return Stage::Done(TaskOutcome::Cancelled);
						}
					}
				},
			}
		}

		error!(
			target: ESCALATION_TARGET,
			auction_id = %truncate_id(&auction_id),
			attempts = policy.max_attempts,
			error = %last_error,
			"Fast order execution failed, operator action required"
		);
		self.publish(RelayerEvent::Settlement(SettlementEvent::ExecutionFailed {
			auction_id,
			error: last_error.clone(),
		}));
		Stage::Done(TaskOutcome::ExecutionFailed(last_error))
	}

	async fn redeem(&mut self) -> Result<Stage, TaskError> {
		let auction_id = self.fast.auction_id;
		let Some(slow_sequence) = self.fast.slow_sequence() else {
			return Ok(self.redemption_failed(
				"fast order has no preceding slow-path sequence".to_string(),
			));
		};
		let source_chain = self.fast.source_chain();
		let emitter = self.fast.envelope.emitter_address;

		info!(
			auction_id = %truncate_id(&auction_id),
			chain = source_chain,
			sequence = slow_sequence,
			"Waiting for slow-path deposit"
		);
		let slow_message = match self
			.context
			.attestation
			.wait_for_signed_message(source_chain, &emitter, slow_sequence, &mut self.shutdown)
			.await
		{
			Ok(bytes) => bytes,
			Err(AttestationError::Cancelled) => return Ok(Stage::Done(TaskOutcome::Cancelled)),
			Err(e) => return Err(e.into()),
		};

		let deposit = match SignedMessage::decode(&slow_message)
			.and_then(|envelope| envelope.message())
			.and_then(|message| message.into_deposit())
		{
			Ok(deposit) => deposit,
			Err(e) => {
				return Ok(self.redemption_failed(format!("malformed slow-path message: {}", e)))
			}
		};

		let burn_hash = deposit.burn_message_hash();
		debug!(
			auction_id = %truncate_id(&auction_id),
			burn_hash = %truncate_id(&burn_hash),
			"Waiting for burn attestation"
		);
		let attestation = match self
			.context
			.attestation
			.wait_for_attestation(&burn_hash, &mut self.shutdown)
			.await
		{
			Ok(bytes) => bytes,
			Err(AttestationError::Cancelled) => return Ok(Stage::Done(TaskOutcome::Cancelled)),
			Err(e) => return Err(e.into()),
		};

		let instruction = Instruction::SettleSlowOrder {
			fast_message: self.fast.fast_message.clone(),
			slow_message,
			attestation,
		};
		let policy = self.context.settings.execute.clone();
		match self
			.context
			.delivery
			.submit_with_policy(self.host(), &instruction, &policy)
			.await
		{
			Ok(submission) => {
				let reimbursed = match &submission.outcome {
					InstructionOutcome::SlowOrderSettled(settlement) => {
						settlement.paid_to(&self.identity)
					}
					_ => 0,
				};
				info!(
					auction_id = %truncate_id(&auction_id),
					tx_hash = %submission.receipt.hash,
					reimbursed,
					"Slow order redeemed"
				);
				self.publish(RelayerEvent::Settlement(SettlementEvent::Redeemed {
					auction_id,
					tx_hash: submission.receipt.hash,
				}));
				Ok(Stage::Done(TaskOutcome::Redeemed))
			}
			Err(e) => Ok(self.redemption_failed(e.to_string())),
		}
	}

	/// The fill is already funded, so any failure here leaves us owed.
	fn redemption_failed(&self, reason: String) -> Stage {
		error!(
			target: ESCALATION_TARGET,
			auction_id = %truncate_id(&self.fast.auction_id),
			error = %reason,
			"Slow order redemption failed, operator action required"
		);
		self.publish(RelayerEvent::Settlement(SettlementEvent::RedemptionFailed {
			auction_id: self.fast.auction_id,
			error: reason.clone(),
		}));
		Stage::Done(TaskOutcome::RedemptionFailed(reason))
	}
}
