//! Polling adapters for the two attestation services settlement waits on.
//!
//! The message-signing network publishes signed messages keyed by emitter
//! and sequence; the secondary-bridge attestor publishes attestations keyed
//! by burn message hash. Neither pushes, so [`AttestationService`] polls on a
//! fixed interval until the artifact appears or shutdown is signalled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use liquidity_types::{ChainId, ConfigSchema, UniversalAddress, B256};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

pub mod implementations {
	pub mod http;
	pub mod memory;
}

#[derive(Debug, Error)]
pub enum AttestationError {
	#[error("Transport error: {0}")]
	Transport(String),
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("Polling cancelled")]
	Cancelled,
}

/// Source of signed messages. `Ok(None)` means not yet signed.
#[async_trait]
pub trait SignedMessageSource: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn fetch_signed_message(
		&self,
		chain: ChainId,
		emitter: &UniversalAddress,
		sequence: u64,
	) -> Result<Option<Vec<u8>>, AttestationError>;
}

/// Source of secondary-bridge attestations. `Ok(None)` means not yet attested.
#[async_trait]
pub trait BurnAttestationSource: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn fetch_attestation(
		&self,
		message_hash: &B256,
	) -> Result<Option<Vec<u8>>, AttestationError>;
}

pub struct AttestationService {
	messages: Arc<dyn SignedMessageSource>,
	attestations: Arc<dyn BurnAttestationSource>,
	poll_interval: Duration,
}

impl AttestationService {
	pub fn new(
		messages: Arc<dyn SignedMessageSource>,
		attestations: Arc<dyn BurnAttestationSource>,
		poll_interval: Duration,
	) -> Self {
		Self {
			messages,
			attestations,
			poll_interval,
		}
	}

	pub fn message_source(&self) -> Arc<dyn SignedMessageSource> {
		self.messages.clone()
	}

	/// Polls until the signed message at `sequence` is available.
	pub async fn wait_for_signed_message(
		&self,
		chain: ChainId,
		emitter: &UniversalAddress,
		sequence: u64,
		shutdown: &mut watch::Receiver<bool>,
	) -> Result<Vec<u8>, AttestationError> {
		self.poll("signed_message", shutdown, || {
			self.messages.fetch_signed_message(chain, emitter, sequence)
		})
		.await
	}

	/// Polls until the attestor has signed the burn identified by `message_hash`.
	pub async fn wait_for_attestation(
		&self,
		message_hash: &B256,
		shutdown: &mut watch::Receiver<bool>,
	) -> Result<Vec<u8>, AttestationError> {
		self.poll("burn_attestation", shutdown, || {
			self.attestations.fetch_attestation(message_hash)
		})
		.await
	}

	/// Fixed-interval schedule with no elapsed-time cap; polling only ends on
	/// success or shutdown.
	fn schedule(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.poll_interval)
			.with_max_interval(self.poll_interval)
			.with_multiplier(1.0)
			.with_randomization_factor(0.0)
			.with_max_elapsed_time(None)
			.build()
	}

	async fn poll<F, Fut>(
		&self,
		artifact: &'static str,
		shutdown: &mut watch::Receiver<bool>,
		mut fetch: F,
	) -> Result<Vec<u8>, AttestationError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<Option<Vec<u8>>, AttestationError>>,
	{
		let mut schedule = self.schedule();
		let mut attempt: u64 = 0;
		loop {
			if *shutdown.borrow() {
				return Err(AttestationError::Cancelled);
			}
			attempt += 1;
			match fetch().await {
				Ok(Some(bytes)) => return Ok(bytes),
				Ok(None) => debug!(artifact, attempt, "Not yet available"),
				Err(e) => warn!(artifact, attempt, error = %e, "Poll failed"),
			}
			let delay = schedule.next_backoff().unwrap_or(self.poll_interval);
			tokio::select! {
				_ = tokio::time::sleep(delay) => {}
				changed = shutdown.changed() => {
					if changed.is_err() {
						return Err(AttestationError::Cancelled);
					}
				}
			}
		}
	}
}
