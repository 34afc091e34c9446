//! Local private-key wallet.

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use liquidity_types::{
	universal_from_evm, ConfigSchema, Field, FieldType, Schema, Signature, Transaction,
	UniversalAddress, ValidationError,
};

use crate::{AccountError, AccountInterface};

/// Signs host-chain transactions with a key held in memory.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Parses a hex private key, with or without `0x`.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;
		Ok(Self { signer })
	}
}

pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap_or_default();
					let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);

					if key_without_prefix.len() != 64 {
						return Err("Private key must be 64 hex characters (32 bytes)".to_string());
					}
					if hex::decode(key_without_prefix).is_err() {
						return Err("Private key must be valid hexadecimal".to_string());
					}
					Ok(())
				}),
			],
			vec![],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalWalletSchema)
	}

	async fn address(&self) -> Result<UniversalAddress, AccountError> {
		let mut evm = [0u8; 20];
		evm.copy_from_slice(self.signer.address().as_slice());
		Ok(universal_from_evm(&evm))
	}

	async fn sign_transaction(&self, tx: &Transaction) -> Result<Signature, AccountError> {
		let signature = self
			.signer
			.sign_hash(&tx.signing_hash())
			.await
			.map_err(|e| {
				AccountError::SigningFailed(format!("Failed to sign transaction: {}", e))
			})?;
		Ok(signature.into())
	}
}

/// Creates a local wallet from its `[account.config]` table.
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;
	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;
	Ok(Box::new(LocalWallet::new(private_key)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{recover_signer, AccountService, SigningIdentity};
	use liquidity_types::{parse_universal_address, B256};
	use std::sync::Arc;

	// Well-known development key
	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

	#[tokio::test]
	async fn test_address_is_left_padded() {
		let wallet = LocalWallet::new(KEY).unwrap();
		assert_eq!(
			wallet.address().await.unwrap(),
			parse_universal_address(ADDRESS).unwrap()
		);
	}

	#[tokio::test]
	async fn test_signature_recovers_to_wallet() {
		let config: toml::Value = toml::from_str(&format!("private_key = \"{}\"", KEY)).unwrap();
		let account = Arc::new(AccountService::new(create_account(&config).unwrap()));
		let identity = SigningIdentity::load(account).await.unwrap();

		let tx = Transaction {
			chain_id: 1,
			sender: identity.address(),
			data: vec![1, 2, 3],
		};
		let signature = identity.sign(&tx).await.unwrap();
		assert_eq!(signature.0.len(), 65);
		assert_eq!(recover_signer(&tx, &signature).unwrap(), identity.address());

		let mut tampered = tx.clone();
		tampered.data.push(4);
		assert_ne!(recover_signer(&tampered, &signature).unwrap(), identity.address());

		let forged = Transaction {
			sender: B256::repeat_byte(0x42),
			..tx
		};
		assert_ne!(recover_signer(&forged, &signature).unwrap(), forged.sender);
	}

	#[test]
	fn test_schema_rejects_bad_keys() {
		for config in ["private_key = \"0x1234\"", "private_key = 7", "other = 1"] {
			let value: toml::Value = toml::from_str(config).unwrap();
			assert!(LocalWalletSchema.validate(&value).is_err());
			assert!(create_account(&value).is_err());
		}
	}
}
