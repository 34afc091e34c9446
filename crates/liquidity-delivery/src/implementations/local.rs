//! Delivery to an auction engine running in the same process.
//!
//! Plays the part of the host chain's transaction pipeline: the signature is
//! checked against the declared sender, the instruction decoded and the
//! engine called on the sender's behalf.

use std::sync::Arc;

use async_trait::async_trait;
use liquidity_account::recover_signer;
use liquidity_auction::AuctionEngineInterface;
use liquidity_messages::Instruction;
use liquidity_types::{
	Auction, AuctionId, AuctionParameters, ChainId, ConfigSchema, Field, FieldType, Schema,
	Signature, Transaction, TransactionHash, TransactionReceipt, UniversalAddress,
	ValidationError,
};

use crate::{DeliveryError, DeliveryInterface, Submission};

pub struct LocalChain {
	chain_id: ChainId,
	engine: Arc<dyn AuctionEngineInterface>,
}

impl LocalChain {
	pub fn new(chain_id: ChainId, engine: Arc<dyn AuctionEngineInterface>) -> Self {
		Self { chain_id, engine }
	}
}

pub struct LocalChainSchema;

impl ConfigSchema for LocalChainSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new(
				"chain_id",
				FieldType::unsigned(Some(u16::MAX as i64)),
			)],
			vec![],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl DeliveryInterface for LocalChain {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalChainSchema)
	}

	fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	async fn submit(
		&self,
		tx: Transaction,
		signature: Signature,
	) -> Result<Submission, DeliveryError> {
		if tx.chain_id != self.chain_id {
			return Err(DeliveryError::InvalidTransaction(format!(
				"transaction for chain {} sent to chain {}",
				tx.chain_id, self.chain_id
			)));
		}
		let signer = recover_signer(&tx, &signature)
			.map_err(|e| DeliveryError::InvalidTransaction(e.to_string()))?;
		if signer != tx.sender {
			return Err(DeliveryError::InvalidTransaction(
				"signature does not match sender".to_string(),
			));
		}

		let instruction = Instruction::decode(&tx.data)
			.map_err(|e| DeliveryError::InvalidTransaction(e.to_string()))?;
		let caller = tx.sender;
		let outcome = match instruction {
			Instruction::PlaceInitialBid {
				fee_bid,
				fast_message,
			} => {
				self.engine
					.place_initial_bid(caller, &fast_message, fee_bid)
					.await?
			}
			Instruction::ImproveBid {
				auction_id,
				bid_price,
			} => self.engine.improve_bid(caller, auction_id, bid_price).await?,
			Instruction::ExecuteFastOrder { fast_message } => {
				self.engine.execute_fast_order(caller, &fast_message).await?
			}
			Instruction::SettleSlowOrder {
				fast_message,
				slow_message,
				attestation,
			} => {
				self.engine
					.settle_slow_order(caller, &fast_message, &slow_message, &attestation)
					.await?
			}
		};

		let receipt = TransactionReceipt {
			hash: TransactionHash(tx.signing_hash()),
			block_number: self.engine.current_block().await,
			success: true,
		};
		Ok(Submission { receipt, outcome })
	}

	async fn auction(&self, auction_id: &AuctionId) -> Result<Auction, DeliveryError> {
		Ok(self.engine.auction(auction_id).await)
	}

	async fn balance_of(&self, account: &UniversalAddress) -> Result<u64, DeliveryError> {
		Ok(self.engine.balance_of(account).await)
	}

	async fn block_number(&self) -> Result<u64, DeliveryError> {
		Ok(self.engine.current_block().await)
	}

	async fn current_time(&self) -> Result<u64, DeliveryError> {
		Ok(self.engine.current_time().await)
	}

	async fn parameters(&self) -> Result<AuctionParameters, DeliveryError> {
		Ok(self.engine.parameters().await)
	}
}

/// Creates a local delivery provider from its `[delivery.providers]` entry.
pub fn create_delivery(
	config: &toml::Value,
	engine: Arc<dyn AuctionEngineInterface>,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	LocalChainSchema
		.validate(config)
		.map_err(|e| DeliveryError::InvalidConfig(e.to_string()))?;
	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| DeliveryError::InvalidConfig("chain_id is required".to_string()))?;
	Ok(Box::new(LocalChain::new(chain_id as ChainId, engine)))
}
