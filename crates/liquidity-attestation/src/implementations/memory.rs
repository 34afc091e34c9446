//! In-process attestation sources for devnets and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use liquidity_types::{ChainId, ConfigSchema, Schema, UniversalAddress, ValidationError, B256};
use tokio::sync::RwLock;

use crate::{AttestationError, BurnAttestationSource, SignedMessageSource};

/// Accepts an empty table.
pub struct MemorySourceSchema;

impl ConfigSchema for MemorySourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

type MessageKey = (ChainId, UniversalAddress, u64);

#[derive(Default)]
pub struct MemorySignedMessages {
	messages: RwLock<HashMap<MessageKey, Vec<u8>>>,
}

impl MemorySignedMessages {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn publish(
		&self,
		chain: ChainId,
		emitter: UniversalAddress,
		sequence: u64,
		bytes: Vec<u8>,
	) {
		self.messages
			.write()
			.await
			.insert((chain, emitter, sequence), bytes);
	}
}

#[async_trait]
impl SignedMessageSource for MemorySignedMessages {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemorySourceSchema)
	}

	async fn fetch_signed_message(
		&self,
		chain: ChainId,
		emitter: &UniversalAddress,
		sequence: u64,
	) -> Result<Option<Vec<u8>>, AttestationError> {
		Ok(self
			.messages
			.read()
			.await
			.get(&(chain, *emitter, sequence))
			.cloned())
	}
}

#[derive(Default)]
pub struct MemoryBurnAttestations {
	attestations: RwLock<HashMap<B256, Vec<u8>>>,
}

impl MemoryBurnAttestations {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn publish(&self, message_hash: B256, attestation: Vec<u8>) {
		self.attestations
			.write()
			.await
			.insert(message_hash, attestation);
	}
}

#[async_trait]
impl BurnAttestationSource for MemoryBurnAttestations {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemorySourceSchema)
	}

	async fn fetch_attestation(
		&self,
		message_hash: &B256,
	) -> Result<Option<Vec<u8>>, AttestationError> {
		Ok(self.attestations.read().await.get(message_hash).cloned())
	}
}

pub fn create_memory_message_source(
	config: &toml::Value,
) -> Result<Box<dyn SignedMessageSource>, AttestationError> {
	MemorySourceSchema
		.validate(config)
		.map_err(|e| AttestationError::InvalidConfig(e.to_string()))?;
	Ok(Box::new(MemorySignedMessages::new()))
}

pub fn create_memory_attestation_source(
	config: &toml::Value,
) -> Result<Box<dyn BurnAttestationSource>, AttestationError> {
	MemorySourceSchema
		.validate(config)
		.map_err(|e| AttestationError::InvalidConfig(e.to_string()))?;
	Ok(Box::new(MemoryBurnAttestations::new()))
}
