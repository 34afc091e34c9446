//! Transaction delivery to the chain hosting auctions.
//!
//! Instructions are encoded, signed with the relayer's identity and handed
//! to a per-chain [`DeliveryInterface`]. Submissions for one chain are
//! serialized so that two order tasks never race each other's transactions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::{Backoff, Constant};
use liquidity_account::{AccountError, SigningIdentity};
use liquidity_auction::{AuctionError, InstructionOutcome};
use liquidity_messages::Instruction;
use liquidity_types::{
	Auction, AuctionId, AuctionParameters, ChainId, ConfigSchema, Signature, Transaction,
	TransactionReceipt, UniversalAddress,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum DeliveryError {
	/// The transaction may not have reached the chain; safe to resubmit.
	#[error("Network error: {0}")]
	Network(String),
	/// The chain validated the transaction and refused it.
	#[error("Transaction rejected: {0}")]
	Rejected(#[from] AuctionError),
	#[error("Signing failed: {0}")]
	Signing(#[from] AccountError),
	#[error("Invalid transaction: {0}")]
	InvalidTransaction(String),
	#[error("No delivery provider for chain {0}")]
	UnsupportedChain(ChainId),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

impl DeliveryError {
	pub fn is_retryable(&self) -> bool {
		matches!(self, DeliveryError::Network(_))
	}

	/// The validation failure reported by the chain, if that is what this is.
	pub fn rejection(&self) -> Option<&AuctionError> {
		match self {
			DeliveryError::Rejected(e) => Some(e),
			_ => None,
		}
	}
}

/// An included transaction and what the chain did with it.
#[derive(Debug, Clone)]
pub struct Submission {
	pub receipt: TransactionReceipt,
	pub outcome: InstructionOutcome,
}

#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	fn chain_id(&self) -> ChainId;

	/// Submits a signed transaction and waits for its inclusion.
	async fn submit(
		&self,
		tx: Transaction,
		signature: Signature,
	) -> Result<Submission, DeliveryError>;

	async fn auction(&self, auction_id: &AuctionId) -> Result<Auction, DeliveryError>;

	async fn balance_of(&self, account: &UniversalAddress) -> Result<u64, DeliveryError>;

	async fn block_number(&self) -> Result<u64, DeliveryError>;

	async fn current_time(&self) -> Result<u64, DeliveryError>;

	async fn parameters(&self) -> Result<AuctionParameters, DeliveryError>;
}

/// Bounded resubmission of transactions that failed in transit.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Total attempts, including the first.
	pub max_attempts: u32,
	/// Fixed wait between attempts.
	pub backoff: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			backoff: Duration::from_secs(2),
		}
	}
}

impl RetryPolicy {
	/// Whether another attempt is allowed after `attempt` (1-indexed) failed.
	pub fn should_retry(&self, attempt: u32) -> bool {
		attempt < self.max_attempts
	}

	/// Delay schedule between attempts; the attempt cap is enforced by the caller.
	pub fn schedule(&self) -> Constant {
		Constant::new(self.backoff)
	}
}

pub struct DeliveryService {
	providers: HashMap<ChainId, Arc<dyn DeliveryInterface>>,
	locks: HashMap<ChainId, Arc<Mutex<()>>>,
	identity: SigningIdentity,
	retry: RetryPolicy,
}

impl DeliveryService {
	pub fn new(
		providers: Vec<Box<dyn DeliveryInterface>>,
		identity: SigningIdentity,
		retry: RetryPolicy,
	) -> Self {
		let mut by_chain: HashMap<ChainId, Arc<dyn DeliveryInterface>> = HashMap::new();
		let mut locks = HashMap::new();
		for provider in providers {
			let chain = provider.chain_id();
			locks.insert(chain, Arc::new(Mutex::new(())));
			by_chain.insert(chain, Arc::from(provider));
		}
		Self {
			providers: by_chain,
			locks,
			identity,
			retry,
		}
	}

	pub fn identity(&self) -> &SigningIdentity {
		&self.identity
	}

	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.retry
	}

	fn provider(&self, chain: ChainId) -> Result<&Arc<dyn DeliveryInterface>, DeliveryError> {
		self.providers
			.get(&chain)
			.ok_or(DeliveryError::UnsupportedChain(chain))
	}

	/// Signs and submits one instruction from the relayer's identity.
	pub async fn submit(
		&self,
		chain: ChainId,
		instruction: &Instruction,
	) -> Result<Submission, DeliveryError> {
		let provider = self.provider(chain)?;
		let lock = self
			.locks
			.get(&chain)
			.ok_or(DeliveryError::UnsupportedChain(chain))?;

		let tx = Transaction {
			chain_id: chain,
			sender: self.identity.address(),
			data: instruction.encode(),
		};
		let signature = self.identity.sign(&tx).await?;

		let _guard = lock.lock().await;
		let submission = provider.submit(tx, signature).await?;
		debug!(
			chain,
			instruction = instruction.name(),
			tx_hash = %submission.receipt.hash,
			block = submission.receipt.block_number,
			"Transaction included"
		);
		Ok(submission)
	}

	/// Submits with the service's default retry policy.
	pub async fn submit_with_retry(
		&self,
		chain: ChainId,
		instruction: &Instruction,
	) -> Result<Submission, DeliveryError> {
		self.submit_with_policy(chain, instruction, &self.retry)
			.await
	}

	/// Resubmits after network failures until `policy` is exhausted.
	/// Rejections are returned immediately.
	pub async fn submit_with_policy(
		&self,
		chain: ChainId,
		instruction: &Instruction,
		policy: &RetryPolicy,
	) -> Result<Submission, DeliveryError> {
		let mut schedule = policy.schedule();
		let mut attempt = 0;
		loop {
			attempt += 1;
			match self.submit(chain, instruction).await {
				Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
					let Some(delay) = schedule.next_backoff() else {
						return Err(e);
					};
					warn!(
						chain,
						instruction = instruction.name(),
						attempt,
						max_attempts = policy.max_attempts,
						error = %e,
						"Submission failed, retrying"
					);
					tokio::time::sleep(delay).await;
				}
				result => return result,
			}
		}
	}

	pub async fn auction(
		&self,
		chain: ChainId,
		auction_id: &AuctionId,
	) -> Result<Auction, DeliveryError> {
		self.provider(chain)?.auction(auction_id).await
	}

	/// Balance of the relayer's own account.
	pub async fn balance(&self, chain: ChainId) -> Result<u64, DeliveryError> {
		self.provider(chain)?
			.balance_of(&self.identity.address())
			.await
	}

	pub async fn block_number(&self, chain: ChainId) -> Result<u64, DeliveryError> {
		self.provider(chain)?.block_number().await
	}

	pub async fn current_time(&self, chain: ChainId) -> Result<u64, DeliveryError> {
		self.provider(chain)?.current_time().await
	}

	pub async fn parameters(&self, chain: ChainId) -> Result<AuctionParameters, DeliveryError> {
		self.provider(chain)?.parameters().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::local::LocalChain;
	use liquidity_account::implementations::local::LocalWallet;
	use liquidity_account::AccountService;
	use liquidity_auction::implementations::memory::MemoryAuctionEngine;
	use liquidity_auction::{AuctionEngineInterface, EngineConfig, ManualClock};
	use liquidity_messages::{FastMarketOrder, LiquidityMessage, RedeemerMessage, SignedMessage};
	use liquidity_types::{AuctionStatus, RouterEndpoint, B256};
	use std::sync::atomic::{AtomicU32, Ordering};

	const HOST_CHAIN: ChainId = 1;
	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	/// Drops the first `failures` submissions on the floor.
	struct FlakyChain {
		inner: LocalChain,
		failures: AtomicU32,
		calls: AtomicU32,
	}

	#[async_trait]
	impl DeliveryInterface for FlakyChain {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}

		fn chain_id(&self) -> ChainId {
			self.inner.chain_id()
		}

		async fn submit(
			&self,
			tx: Transaction,
			signature: Signature,
		) -> Result<Submission, DeliveryError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let remaining = self.failures.load(Ordering::SeqCst);
			if remaining > 0 {
				self.failures.store(remaining - 1, Ordering::SeqCst);
				return Err(DeliveryError::Network("connection reset".into()));
			}
			self.inner.submit(tx, signature).await
		}

		async fn auction(&self, auction_id: &AuctionId) -> Result<Auction, DeliveryError> {
			self.inner.auction(auction_id).await
		}

		async fn balance_of(&self, account: &UniversalAddress) -> Result<u64, DeliveryError> {
			self.inner.balance_of(account).await
		}

		async fn block_number(&self) -> Result<u64, DeliveryError> {
			self.inner.block_number().await
		}

		async fn current_time(&self) -> Result<u64, DeliveryError> {
			self.inner.current_time().await
		}

		async fn parameters(&self) -> Result<AuctionParameters, DeliveryError> {
			self.inner.parameters().await
		}
	}

	fn engine() -> Arc<dyn AuctionEngineInterface> {
		let mut routers = HashMap::new();
		routers.insert(
			6,
			RouterEndpoint {
				router: B256::repeat_byte(0x66),
				domain: 3,
			},
		);
		let config = EngineConfig {
			chain_id: HOST_CHAIN,
			domain: 5,
			custody_address: B256::repeat_byte(0xcc),
			fee_recipient: B256::repeat_byte(0xfe),
			parameters: AuctionParameters::default(),
			routers,
		};
		Arc::new(MemoryAuctionEngine::new(config, Arc::new(ManualClock::new(10, 1_000))).unwrap())
	}

	async fn identity() -> SigningIdentity {
		let wallet = LocalWallet::new(KEY).unwrap();
		SigningIdentity::load(Arc::new(AccountService::new(Box::new(wallet))))
			.await
			.unwrap()
	}

	fn fast_message() -> Vec<u8> {
		let order = FastMarketOrder {
			amount_in: 1_000_000,
			min_amount_out: 0,
			target_chain: 6,
			redeemer: B256::repeat_byte(0x77),
			sender: B256::repeat_byte(0x55),
			refund_address: B256::repeat_byte(0x55),
			max_fee: 10_000,
			init_auction_fee: 100,
			deadline: 0,
			redeemer_message: RedeemerMessage::default(),
		};
		SignedMessage::unsigned(
			2,
			B256::repeat_byte(0xee),
			3,
			900,
			LiquidityMessage::from(order).encode(),
		)
		.encode()
	}

	async fn service(
		failures: u32,
		policy: RetryPolicy,
	) -> (
		DeliveryService,
		Arc<FlakyChain>,
		Arc<dyn AuctionEngineInterface>,
	) {
		let engine = engine();
		let identity = identity().await;
		engine.fund(identity.address(), 100_000_000).await.unwrap();
		let chain = Arc::new(FlakyChain {
			inner: LocalChain::new(HOST_CHAIN, engine.clone()),
			failures: AtomicU32::new(failures),
			calls: AtomicU32::new(0),
		});
		let provider: Box<dyn DeliveryInterface> = Box::new(SharedChain(chain.clone()));
		(
			DeliveryService::new(vec![provider], identity, policy),
			chain,
			engine,
		)
	}

	/// Lets a test keep a handle on the provider it hands to the service.
	struct SharedChain(Arc<FlakyChain>);

	#[async_trait]
	impl DeliveryInterface for SharedChain {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.0.config_schema()
		}

		fn chain_id(&self) -> ChainId {
			self.0.chain_id()
		}

		async fn submit(
			&self,
			tx: Transaction,
			signature: Signature,
		) -> Result<Submission, DeliveryError> {
			self.0.submit(tx, signature).await
		}

		async fn auction(&self, auction_id: &AuctionId) -> Result<Auction, DeliveryError> {
			self.0.auction(auction_id).await
		}

		async fn balance_of(&self, account: &UniversalAddress) -> Result<u64, DeliveryError> {
			self.0.balance_of(account).await
		}

		async fn block_number(&self) -> Result<u64, DeliveryError> {
			self.0.block_number().await
		}

		async fn current_time(&self) -> Result<u64, DeliveryError> {
			self.0.current_time().await
		}

		async fn parameters(&self) -> Result<AuctionParameters, DeliveryError> {
			self.0.parameters().await
		}
	}

	fn policy(max_attempts: u32) -> RetryPolicy {
		RetryPolicy {
			max_attempts,
			backoff: Duration::from_millis(500),
		}
	}

	#[tokio::test]
	async fn test_submission_is_attributed_to_identity() {
		let (service, _, _) = service(0, policy(1)).await;
		let fast_message = fast_message();
		let auction_id = SignedMessage::decode(&fast_message).unwrap().digest();

		let submission = service
			.submit(
				HOST_CHAIN,
				&Instruction::PlaceInitialBid {
					fee_bid: 10_000,
					fast_message,
				},
			)
			.await
			.unwrap();
		assert!(submission.receipt.success);
		assert_eq!(submission.receipt.block_number, 10);

		let auction = service.auction(HOST_CHAIN, &auction_id).await.unwrap();
		assert_eq!(auction.status, AuctionStatus::Active);
		assert_eq!(
			auction.highest_bidder(),
			Some(service.identity().address())
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_network_failures_are_retried() {
		let (service, chain, _) = service(2, policy(3)).await;
		let instruction = Instruction::PlaceInitialBid {
			fee_bid: 10_000,
			fast_message: fast_message(),
		};

		let result = service.submit_with_retry(HOST_CHAIN, &instruction).await;
		assert!(matches!(
			result.unwrap().outcome,
			InstructionOutcome::BidPlaced { bid_price: 10_000, .. }
		));
		assert_eq!(chain.calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_retries_are_bounded() {
		let (service, chain, engine) = service(5, policy(3)).await;
		let fast_message = fast_message();
		let auction_id = SignedMessage::decode(&fast_message).unwrap().digest();
		let instruction = Instruction::PlaceInitialBid {
			fee_bid: 10_000,
			fast_message,
		};

		let result = service.submit_with_retry(HOST_CHAIN, &instruction).await;
		assert!(matches!(result, Err(DeliveryError::Network(_))));
		assert_eq!(chain.calls.load(Ordering::SeqCst), 3);
		assert_eq!(
			engine.auction(&auction_id).await.status,
			AuctionStatus::NotStarted
		);
	}

	#[test]
	fn test_schedule_is_fixed() {
		let mut schedule = policy(3).schedule();
		for _ in 0..5 {
			assert_eq!(schedule.next_backoff(), Some(Duration::from_millis(500)));
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_retries_wait_fixed_backoff() {
		let (service, chain, _) = service(2, policy(3)).await;
		let instruction = Instruction::PlaceInitialBid {
			fee_bid: 10_000,
			fast_message: fast_message(),
		};

		let started = tokio::time::Instant::now();
		service
			.submit_with_retry(HOST_CHAIN, &instruction)
			.await
			.unwrap();
		assert_eq!(started.elapsed(), Duration::from_millis(1_000));
		assert_eq!(chain.calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_rejections_are_not_retried() {
		let (service, chain, _) = service(0, policy(3)).await;
		let instruction = Instruction::ImproveBid {
			auction_id: B256::repeat_byte(0x01),
			bid_price: 5,
		};

		let err = service
			.submit_with_retry(HOST_CHAIN, &instruction)
			.await
			.unwrap_err();
		assert_eq!(err.rejection(), Some(&AuctionError::AuctionNotActive));
		assert!(!err.is_retryable());
		assert_eq!(chain.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_unknown_chain() {
		let (service, _, _) = service(0, policy(1)).await;
		assert!(matches!(
			service.block_number(99).await,
			Err(DeliveryError::UnsupportedChain(99))
		));
		assert!(matches!(
			service
				.submit(99, &Instruction::ExecuteFastOrder { fast_message: vec![] })
				.await,
			Err(DeliveryError::UnsupportedChain(99))
		));
	}

	#[tokio::test]
	async fn test_balance_queries_own_account() {
		let (service, _, _) = service(0, policy(1)).await;
		assert_eq!(service.balance(HOST_CHAIN).await.unwrap(), 100_000_000);
		assert_eq!(service.current_time(HOST_CHAIN).await.unwrap(), 1_000);
		assert_eq!(
			service.parameters(HOST_CHAIN).await.unwrap(),
			AuctionParameters::default()
		);
	}
}
