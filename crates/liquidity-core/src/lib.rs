//! Relayer control loop.
//!
//! [`RelayerEngine`] consumes signed messages from discovery, triages them
//! into fast orders and runs one [`OrderTask`] per order until its auction is
//! settled or given up. [`RelayerBuilder`] wires the engine from
//! configuration and named factories.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use liquidity_account::{AccountError, AccountInterface, AccountService, SigningIdentity};
use liquidity_attestation::{
	AttestationError, AttestationService, BurnAttestationSource, SignedMessageSource,
};
use liquidity_config::Config;
use liquidity_delivery::{DeliveryError, DeliveryInterface, DeliveryService, RetryPolicy};
use liquidity_discovery::{DiscoveryError, DiscoveryInterface, DiscoveryService};
use liquidity_order::{BidStrategy, FastOrder, Market, OrderError, OrderService};
use liquidity_types::{
	truncate_id, AuctionId, EventBus, ObservedMessage, OrderEvent, RelayerEvent,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

pub mod task;

pub use task::{
	OrderTask, RelayerContext, TaskError, TaskOutcome, TaskSettings, ESCALATION_TARGET,
};

#[derive(Debug, Error)]
pub enum RelayerError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

pub struct RelayerEngine {
	context: RelayerContext,
	discovery: Arc<DiscoveryService>,
	shutdown: watch::Sender<bool>,
}

impl RelayerEngine {
	pub fn new(context: RelayerContext, discovery: Arc<DiscoveryService>) -> Self {
		let (shutdown, _) = watch::channel(false);
		Self {
			context,
			discovery,
			shutdown,
		}
	}

	/// Runs until [`RelayerEngine::shutdown`] is called, then waits for the
	/// order tasks to wind down.
	pub async fn run(&self) -> Result<(), RelayerError> {
		let (message_tx, mut message_rx) = mpsc::unbounded_channel();
		self.discovery
			.start_all(message_tx)
			.await
			.map_err(|e| RelayerError::Service(e.to_string()))?;

		let mut shutdown = self.shutdown.subscribe();
		let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
		let mut in_flight: HashMap<Id, AuctionId> = HashMap::new();

		info!(
			relayer = %truncate_id(&self.context.delivery.identity().address()),
			host_chain = self.context.settings.host_chain,
			markets = self.context.order.markets().len(),
			"Relayer started"
		);

		while !*shutdown.borrow() {
			tokio::select! {
				Some(message) = message_rx.recv() => {
					self.handle_message(message, &mut tasks, &mut in_flight);
				}

				Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
					Self::record_completion(joined, &mut in_flight);
				}

				_ = shutdown.changed() => {
					info!("Shutting down relayer");
					break;
				}
			}
		}

		self.discovery
			.stop_all()
			.await
			.map_err(|e| RelayerError::Service(e.to_string()))?;

		if !tasks.is_empty() {
			info!(in_flight = tasks.len(), "Waiting for order tasks to stop");
		}
		while let Some(joined) = tasks.join_next_with_id().await {
			Self::record_completion(joined, &mut in_flight);
		}

		Ok(())
	}

	fn handle_message(
		&self,
		message: ObservedMessage,
		tasks: &mut JoinSet<TaskOutcome>,
		in_flight: &mut HashMap<Id, AuctionId>,
	) {
		let sequence = message.sequence;
		let chain = message.source_chain;
		let fast = match self.context.order.triage(message) {
			Ok(fast) => fast,
			Err(e) => {
				match &e {
					OrderError::Malformed(_) => {
						warn!(chain, sequence, error = %e, "Dropping malformed message")
					}
					_ => debug!(chain, sequence, reason = %e, "Ignoring message"),
				}
				self.context
					.event_bus
					.publish(RelayerEvent::Order(OrderEvent::Dropped {
						sequence,
						reason: e.to_string(),
					}));
				return;
			}
		};

		let auction_id = fast.auction_id;
		if in_flight.values().any(|id| *id == auction_id) {
			debug!(auction_id = %truncate_id(&auction_id), "Order already in flight");
			return;
		}

		info!(
			auction_id = %truncate_id(&auction_id),
			chain,
			sequence,
			amount_in = fast.order.amount_in,
			max_fee = fast.order.max_fee,
			"Fast order observed"
		);
		self.context
			.event_bus
			.publish(RelayerEvent::Order(OrderEvent::Observed {
				auction_id,
				source_chain: chain,
				sequence,
			}));

		let task = OrderTask::new(self.context.clone(), fast, self.shutdown.subscribe());
		let handle = tasks.spawn(task.run());
		in_flight.insert(handle.id(), auction_id);
	}

	/// Releases the auction of a finished task, panicked or not, so a later
	/// observation of the same order can start over.
	fn record_completion(
		joined: Result<(Id, TaskOutcome), JoinError>,
		in_flight: &mut HashMap<Id, AuctionId>,
	) {
		let (id, result) = match joined {
			Ok((id, outcome)) => (id, Ok(outcome)),
			Err(e) => (e.id(), Err(e)),
		};
		let Some(auction_id) = in_flight.remove(&id) else {
			return;
		};
		match result {
			Ok(outcome) => debug!(
				auction_id = %truncate_id(&auction_id),
				outcome = ?outcome,
				"Order task finished"
			),
			Err(e) => error!(
				auction_id = %truncate_id(&auction_id),
				error = %e,
				"Order task panicked"
			),
		}
	}

	/// Redeems the slow path of an auction this relayer already executed,
	/// given only the signed fast order.
	pub async fn resume_redemption(
		&self,
		fast_message: Vec<u8>,
	) -> Result<TaskOutcome, RelayerError> {
		let fast = FastOrder::from_signed_bytes(fast_message)
			.map_err(|e| RelayerError::Service(e.to_string()))?;
		info!(
			auction_id = %truncate_id(&fast.auction_id),
			"Resuming slow-path redemption"
		);
		let task = OrderTask::new(self.context.clone(), fast, self.shutdown.subscribe());
		Ok(task.resume_redemption().await)
	}

	/// Signals the run loop and every order task to stop.
	pub fn shutdown(&self) {
		self.shutdown.send_replace(true);
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.context.event_bus
	}

	pub fn context(&self) -> &RelayerContext {
		&self.context
	}
}

// Type aliases for factory functions
type AccountFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send>;
type DeliveryFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError> + Send>;
type DiscoveryFactory = Box<
	dyn Fn(
			&toml::Value,
			Arc<dyn SignedMessageSource>,
		) -> Result<Box<dyn DiscoveryInterface>, DiscoveryError>
		+ Send,
>;
type StrategyFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn BidStrategy>, OrderError> + Send>;
type MessageSourceFactory = Box<
	dyn Fn(&toml::Value) -> Result<Box<dyn SignedMessageSource>, AttestationError> + Send,
>;
type BurnSourceFactory = Box<
	dyn Fn(&toml::Value) -> Result<Box<dyn BurnAttestationSource>, AttestationError> + Send,
>;

/// Assembles a [`RelayerEngine`] from configuration. Each pluggable section
/// names an implementation, resolved against the factories registered here.
pub struct RelayerBuilder {
	config: Config,
	account_factories: HashMap<String, AccountFactory>,
	delivery_factories: HashMap<String, DeliveryFactory>,
	discovery_factories: HashMap<String, DiscoveryFactory>,
	strategy_factories: HashMap<String, StrategyFactory>,
	message_source_factories: HashMap<String, MessageSourceFactory>,
	burn_source_factories: HashMap<String, BurnSourceFactory>,
}

impl RelayerBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			account_factories: HashMap::new(),
			delivery_factories: HashMap::new(),
			discovery_factories: HashMap::new(),
			strategy_factories: HashMap::new(),
			message_source_factories: HashMap::new(),
			burn_source_factories: HashMap::new(),
		}
	}

	pub fn with_account_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send + 'static,
	{
		self.account_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_delivery_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError> + Send + 'static,
	{
		self.delivery_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_discovery_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(
				&toml::Value,
				Arc<dyn SignedMessageSource>,
			) -> Result<Box<dyn DiscoveryInterface>, DiscoveryError>
			+ Send
			+ 'static,
	{
		self.discovery_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_strategy_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn BidStrategy>, OrderError> + Send + 'static,
	{
		self.strategy_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_message_source_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn SignedMessageSource>, AttestationError>
			+ Send
			+ 'static,
	{
		self.message_source_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_burn_source_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn BurnAttestationSource>, AttestationError>
			+ Send
			+ 'static,
	{
		self.burn_source_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub async fn build(self) -> Result<RelayerEngine, RelayerError> {
		let config = &self.config;

		// Signing identity
		let account_provider = lookup(
			&self.account_factories,
			"account",
			&config.account.implementation,
		)?(&config.account.config)
		.map_err(|e| RelayerError::Config(e.to_string()))?;
		let account = Arc::new(AccountService::new(account_provider));
		let identity = SigningIdentity::load(account)
			.await
			.map_err(|e| RelayerError::Config(e.to_string()))?;

		// Delivery providers
		let mut delivery_providers = Vec::new();
		for (name, provider_config) in &config.delivery.providers {
			let factory = lookup(&self.delivery_factories, "delivery provider", name)?;
			delivery_providers
				.push(factory(provider_config).map_err(|e| RelayerError::Config(e.to_string()))?);
		}
		if delivery_providers.is_empty() {
			return Err(RelayerError::Config(
				"No delivery providers configured".into(),
			));
		}
		let retry = RetryPolicy {
			max_attempts: config.delivery.max_attempts,
			backoff: Duration::from_millis(config.delivery.retry_delay_ms),
		};
		let delivery = Arc::new(DeliveryService::new(
			delivery_providers,
			identity.clone(),
			retry,
		));

		// Attestation sources
		let messages: Arc<dyn SignedMessageSource> = Arc::from(
			lookup(
				&self.message_source_factories,
				"message source",
				&config.attestation.messages.implementation,
			)?(&config.attestation.messages.config)
			.map_err(|e| RelayerError::Config(e.to_string()))?,
		);
		let burns: Arc<dyn BurnAttestationSource> = Arc::from(
			lookup(
				&self.burn_source_factories,
				"burn attestation source",
				&config.attestation.burns.implementation,
			)?(&config.attestation.burns.config)
			.map_err(|e| RelayerError::Config(e.to_string()))?,
		);
		let attestation = Arc::new(AttestationService::new(
			messages.clone(),
			burns,
			Duration::from_millis(config.attestation.poll_interval_ms),
		));

		// Discovery sources share the signing-network client
		let mut discovery_sources = Vec::new();
		for (name, source_config) in &config.discovery.sources {
			let factory = lookup(&self.discovery_factories, "discovery source", name)?;
			discovery_sources.push(
				factory(source_config, messages.clone())
					.map_err(|e| RelayerError::Config(e.to_string()))?,
			);
		}
		let discovery = Arc::new(DiscoveryService::new(discovery_sources));

		// Markets and bidding policy
		let markets = config
			.order
			.markets
			.iter()
			.map(|market| Market::parse(market.chain, &market.emitter))
			.collect::<Result<Vec<_>, _>>()
			.map_err(|e| RelayerError::Config(e.to_string()))?;
		let strategy = lookup(
			&self.strategy_factories,
			"strategy",
			&config.order.strategy.implementation,
		)?(&config.order.strategy.config)
		.map_err(|e| RelayerError::Config(e.to_string()))?;
		let order = Arc::new(OrderService::new(markets, strategy));

		let settings = TaskSettings {
			host_chain: config.relayer.host_chain,
			poll_interval: Duration::from_millis(config.relayer.poll_interval_ms),
			execute: RetryPolicy {
				max_attempts: config.relayer.execute_attempts,
				backoff: Duration::from_millis(config.relayer.execute_backoff_ms),
			},
			max_reevaluations: config.relayer.max_reevaluations,
		};

		let context = RelayerContext {
			delivery,
			order,
			attestation,
			event_bus: EventBus::new(config.relayer.event_capacity),
			settings,
		};
		info!(
			name = %config.relayer.name,
			relayer = %truncate_id(&identity.address()),
			"Relayer assembled"
		);
		Ok(RelayerEngine::new(context, discovery))
	}
}

fn lookup<'a, F>(
	factories: &'a HashMap<String, F>,
	kind: &str,
	name: &str,
) -> Result<&'a F, RelayerError> {
	factories
		.get(name)
		.ok_or_else(|| RelayerError::Config(format!("Unknown {} implementation: {}", kind, name)))
}
