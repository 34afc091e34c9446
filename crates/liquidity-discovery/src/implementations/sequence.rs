//! Discovery by walking emitter sequence numbers.
//!
//! Each watched emitter publishes messages under consecutive sequences, so
//! the next message to look for is always `last + 1`. On every tick the
//! monitor drains each emitter until the signing network reports a gap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use liquidity_attestation::SignedMessageSource;
use liquidity_types::{
	parse_universal_address, ChainId, ConfigSchema, Field, FieldType, ObservedMessage, Schema,
	UniversalAddress, ValidationError,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::{DiscoveryError, DiscoveryInterface};

const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Cursor over one emitter's sequence space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEmitter {
	pub chain: ChainId,
	pub emitter: UniversalAddress,
	/// Next sequence to fetch.
	pub next_sequence: u64,
}

pub struct SequenceDiscovery {
	source: Arc<dyn SignedMessageSource>,
	emitters: Arc<Mutex<Vec<WatchedEmitter>>>,
	poll_interval: Duration,
	is_monitoring: Arc<AtomicBool>,
	stop_signal: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl SequenceDiscovery {
	pub fn new(
		source: Arc<dyn SignedMessageSource>,
		emitters: Vec<WatchedEmitter>,
		poll_interval: Duration,
	) -> Self {
		Self {
			source,
			emitters: Arc::new(Mutex::new(emitters)),
			poll_interval,
			is_monitoring: Arc::new(AtomicBool::new(false)),
			stop_signal: Arc::new(Mutex::new(None)),
		}
	}

	/// Current cursors, for diagnostics.
	pub async fn cursors(&self) -> Vec<WatchedEmitter> {
		self.emitters.lock().await.clone()
	}

	/// Fetches every consecutive message available for `cursor`.
	/// Returns false once the receiving side has gone away.
	async fn drain(
		source: &dyn SignedMessageSource,
		cursor: &mut WatchedEmitter,
		sender: &mpsc::UnboundedSender<ObservedMessage>,
	) -> bool {
		loop {
			match source
				.fetch_signed_message(cursor.chain, &cursor.emitter, cursor.next_sequence)
				.await
			{
				Ok(Some(bytes)) => {
					debug!(
						chain = cursor.chain,
						sequence = cursor.next_sequence,
						"Observed signed message"
					);
					let message = ObservedMessage {
						source_chain: cursor.chain,
						emitter: cursor.emitter,
						sequence: cursor.next_sequence,
						bytes,
					};
					if sender.send(message).is_err() {
						return false;
					}
					cursor.next_sequence += 1;
				}
				Ok(None) => return true,
				Err(e) => {
					warn!(
						chain = cursor.chain,
						sequence = cursor.next_sequence,
						error = %e,
						"Failed to fetch signed message"
					);
					return true;
				}
			}
		}
	}

	async fn monitoring_loop(
		source: Arc<dyn SignedMessageSource>,
		emitters: Arc<Mutex<Vec<WatchedEmitter>>>,
		poll_interval: Duration,
		sender: mpsc::UnboundedSender<ObservedMessage>,
		is_monitoring: Arc<AtomicBool>,
		mut stop_rx: mpsc::Receiver<()>,
	) {
		let mut interval = tokio::time::interval(poll_interval);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let mut cursors = emitters.lock().await;
					for cursor in cursors.iter_mut() {
						if !Self::drain(source.as_ref(), cursor, &sender).await {
							info!("Message receiver closed, stopping discovery");
							is_monitoring.store(false, Ordering::SeqCst);
							return;
						}
					}
				}
				_ = stop_rx.recv() => break,
			}
		}
		is_monitoring.store(false, Ordering::SeqCst);
	}
}

pub struct SequenceDiscoverySchema;

impl ConfigSchema for SequenceDiscoverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new(
				"emitters",
				FieldType::Array(Box::new(FieldType::Table(Schema::new(
					vec![
						Field::new("chain", FieldType::unsigned(Some(u16::MAX as i64))),
						Field::new("emitter", FieldType::Address),
					],
					vec![Field::new("start_sequence", FieldType::unsigned(None))],
				)))),
			)],
			vec![Field::new("poll_interval_ms", FieldType::Integer {
				min: Some(1),
				max: None,
			})],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl DiscoveryInterface for SequenceDiscovery {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SequenceDiscoverySchema)
	}

	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<ObservedMessage>,
	) -> Result<(), DiscoveryError> {
		if self.is_monitoring.swap(true, Ordering::SeqCst) {
			return Err(DiscoveryError::AlreadyMonitoring);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		*self.stop_signal.lock().await = Some(stop_tx);

		let source = self.source.clone();
		let emitters = self.emitters.clone();
		let poll_interval = self.poll_interval;
		let is_monitoring = self.is_monitoring.clone();
		tokio::spawn(async move {
			Self::monitoring_loop(source, emitters, poll_interval, sender, is_monitoring, stop_rx)
				.await;
		});

		let emitter_count = self.emitters.lock().await.len();
		info!(emitters = emitter_count, "Sequence discovery started");
		Ok(())
	}

	async fn stop_monitoring(&self) -> Result<(), DiscoveryError> {
		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(()).await;
		}
		self.is_monitoring.store(false, Ordering::SeqCst);
		Ok(())
	}
}

/// Creates a sequence-walking discovery source over `source`.
///
/// Configuration:
/// - `emitters`: `[{ chain, emitter, start_sequence }]` to watch
/// - `poll_interval_ms`: tick interval, default 1000
pub fn create_discovery(
	config: &toml::Value,
	source: Arc<dyn SignedMessageSource>,
) -> Result<Box<dyn DiscoveryInterface>, DiscoveryError> {
	SequenceDiscoverySchema
		.validate(config)
		.map_err(|e| DiscoveryError::InvalidConfig(e.to_string()))?;

	let mut emitters = Vec::new();
	for entry in config
		.get("emitters")
		.and_then(|v| v.as_array())
		.into_iter()
		.flatten()
	{
		let chain = entry
			.get("chain")
			.and_then(|v| v.as_integer())
			.unwrap_or_default() as ChainId;
		let emitter = entry
			.get("emitter")
			.and_then(|v| v.as_str())
			.ok_or_else(|| DiscoveryError::InvalidConfig("emitter is required".to_string()))
			.and_then(|s| parse_universal_address(s).map_err(DiscoveryError::InvalidConfig))?;
		let next_sequence = entry
			.get("start_sequence")
			.and_then(|v| v.as_integer())
			.unwrap_or_default() as u64;
		emitters.push(WatchedEmitter {
			chain,
			emitter,
			next_sequence,
		});
	}

	let poll_interval_ms = config
		.get("poll_interval_ms")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_POLL_INTERVAL_MS);

	Ok(Box::new(SequenceDiscovery::new(
		source,
		emitters,
		Duration::from_millis(poll_interval_ms),
	)))
}
