use std::sync::Arc;

use alloy_primitives::PrimitiveSignature;
use async_trait::async_trait;
use liquidity_types::{
	universal_from_evm, ConfigSchema, Signature, Transaction, UniversalAddress,
};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Host-chain account controlled by this key.
	async fn address(&self) -> Result<UniversalAddress, AccountError>;

	async fn sign_transaction(&self, tx: &Transaction) -> Result<Signature, AccountError>;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_address(&self) -> Result<UniversalAddress, AccountError> {
		self.provider.address().await
	}

	pub async fn sign(&self, tx: &Transaction) -> Result<Signature, AccountError> {
		self.provider.sign_transaction(tx).await
	}
}

/// The relayer's identity: its signer and the address it bids from.
///
/// The address is resolved once so tasks can compare it against auction
/// records without going back to the signer.
#[derive(Clone)]
pub struct SigningIdentity {
	account: Arc<AccountService>,
	address: UniversalAddress,
}

impl SigningIdentity {
	pub async fn load(account: Arc<AccountService>) -> Result<Self, AccountError> {
		let address = account.get_address().await?;
		Ok(Self { account, address })
	}

	pub fn address(&self) -> UniversalAddress {
		self.address
	}

	pub async fn sign(&self, tx: &Transaction) -> Result<Signature, AccountError> {
		self.account.sign(tx).await
	}
}

/// Recovers the account that signed `tx`.
pub fn recover_signer(
	tx: &Transaction,
	signature: &Signature,
) -> Result<UniversalAddress, AccountError> {
	let signature = PrimitiveSignature::try_from(signature.0.as_slice())
		.map_err(|e| AccountError::InvalidSignature(e.to_string()))?;
	let address = signature
		.recover_address_from_prehash(&tx.signing_hash())
		.map_err(|e| AccountError::InvalidSignature(e.to_string()))?;
	let mut evm = [0u8; 20];
	evm.copy_from_slice(address.as_slice());
	Ok(universal_from_evm(&evm))
}
