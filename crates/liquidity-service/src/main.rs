use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use liquidity_account::implementations::local::create_account;
use liquidity_attestation::implementations::http::{
	create_http_attestation_source, create_http_message_source,
};
use liquidity_attestation::implementations::memory::{
	create_memory_attestation_source, create_memory_message_source,
};
use liquidity_auction::implementations::memory::create_engine;
use liquidity_config::{Config, ConfigLoader};
use liquidity_core::{RelayerBuilder, RelayerEngine, TaskOutcome};
use liquidity_delivery::implementations::local::create_delivery;
use liquidity_discovery::implementations::sequence::create_discovery;
use liquidity_order::implementations::strategies::undercut::create_strategy;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "fast-relayer")]
#[command(about = "Fast-transfer auction relayer", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/devnet.toml")]
	config: PathBuf,

	#[arg(long, env = "RELAYER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the relayer
	Start,
	/// Validate the configuration file
	Validate,
	/// Redeem the slow path of an auction this relayer already executed
	Redeem {
		/// Signed fast market order, hex encoded
		#[arg(long, value_name = "HEX")]
		fast_message: String,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match &cli.command {
		Some(Commands::Start) | None => start_relayer(&cli).await,
		Some(Commands::Validate) => validate_config(&cli).await,
		Some(Commands::Redeem { fast_message }) => redeem(&cli, fast_message).await,
	}
}

async fn load_config(cli: &Cli) -> Result<Config> {
	info!("Loading configuration from: {:?}", cli.config);
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")
}

/// Registers every shipped implementation and assembles the relayer.
async fn build_relayer(config: Config) -> Result<RelayerEngine> {
	if config.engine.implementation != "memory" {
		bail!(
			"Unknown engine implementation: {}",
			config.engine.implementation
		);
	}
	let engine = create_engine(&config.engine.config)
		.await
		.context("Failed to create auction engine")?;

	RelayerBuilder::new(config)
		.with_account_factory("local", create_account)
		.with_delivery_factory("local", move |config| {
			create_delivery(config, engine.clone())
		})
		.with_discovery_factory("sequence", create_discovery)
		.with_strategy_factory("undercut", create_strategy)
		.with_message_source_factory("http", create_http_message_source)
		.with_message_source_factory("memory", create_memory_message_source)
		.with_burn_source_factory("http", create_http_attestation_source)
		.with_burn_source_factory("memory", create_memory_attestation_source)
		.build()
		.await
		.context("Failed to build relayer")
}

async fn start_relayer(cli: &Cli) -> Result<()> {
	let config = load_config(cli).await?;
	info!(
		name = %config.relayer.name,
		host_chain = config.relayer.host_chain,
		"Starting relayer"
	);

	let relayer = Arc::new(build_relayer(config).await?);
	let mut runner = {
		let relayer = relayer.clone();
		tokio::spawn(async move { relayer.run().await })
	};

	let joined = tokio::select! {
		joined = &mut runner => joined,
		_ = shutdown_signal() => {
			info!("Shutdown signal received, stopping relayer...");
			relayer.shutdown();
			(&mut runner).await
		}
	};
	joined
		.context("Relayer task failed")?
		.context("Relayer stopped with an error")?;

	info!("Relayer stopped");
	Ok(())
}

async fn redeem(cli: &Cli, fast_message: &str) -> Result<()> {
	let fast_message = hex::decode(fast_message.trim_start_matches("0x"))
		.context("Fast message is not valid hex")?;
	let config = load_config(cli).await?;

	let relayer = Arc::new(build_relayer(config).await?);
	let mut redemption = {
		let relayer = relayer.clone();
		tokio::spawn(async move { relayer.resume_redemption(fast_message).await })
	};

	let joined = tokio::select! {
		joined = &mut redemption => joined,
		_ = shutdown_signal() => {
			info!("Shutdown signal received, cancelling redemption...");
			relayer.shutdown();
			(&mut redemption).await
		}
	};
	let outcome = joined
		.context("Redemption task failed")?
		.context("Redemption could not start")?;

	match outcome {
		TaskOutcome::Redeemed | TaskOutcome::Settled => {
			info!(outcome = ?outcome, "Redemption finished");
			Ok(())
		}
		other => bail!("Redemption did not complete: {:?}", other),
	}
}

async fn validate_config(cli: &Cli) -> Result<()> {
	let config = load_config(cli).await?;

	info!("Configuration is valid");
	info!("Relayer name: {}", config.relayer.name);
	info!("Host chain: {}", config.relayer.host_chain);
	info!("Account: {}", config.account.implementation);
	info!("Engine: {}", config.engine.implementation);
	for name in config.delivery.providers.keys() {
		info!("  Delivery: {}", name);
	}
	for name in config.discovery.sources.keys() {
		info!("  Discovery: {}", name);
	}
	for market in &config.order.markets {
		info!("  Market: chain {} emitter {}", market.chain, market.emitter);
	}
	info!("Strategy: {}", config.order.strategy.implementation);
	info!(
		"Attestation: messages via {}, burns via {}",
		config.attestation.messages.implementation, config.attestation.burns.implementation
	);

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to install tracing subscriber")?;

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "Failed to install Ctrl+C handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				error!(error = %e, "Failed to install signal handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
