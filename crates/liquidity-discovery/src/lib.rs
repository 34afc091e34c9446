use async_trait::async_trait;
use liquidity_types::{ConfigSchema, ObservedMessage};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod implementations {
	pub mod sequence;
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error("Already monitoring")]
	AlreadyMonitoring,
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

#[async_trait]
pub trait DiscoveryInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Starts pushing observed messages into `sender` until stopped.
	async fn start_monitoring(
		&self,
		sender: mpsc::UnboundedSender<ObservedMessage>,
	) -> Result<(), DiscoveryError>;

	async fn stop_monitoring(&self) -> Result<(), DiscoveryError>;
}

pub struct DiscoveryService {
	sources: Vec<Box<dyn DiscoveryInterface>>,
}

impl DiscoveryService {
	pub fn new(sources: Vec<Box<dyn DiscoveryInterface>>) -> Self {
		Self { sources }
	}

	pub async fn start_all(
		&self,
		sender: mpsc::UnboundedSender<ObservedMessage>,
	) -> Result<(), DiscoveryError> {
		for source in &self.sources {
			source.start_monitoring(sender.clone()).await?;
		}
		Ok(())
	}

	pub async fn stop_all(&self) -> Result<(), DiscoveryError> {
		for source in &self.sources {
			source.stop_monitoring().await?;
		}
		Ok(())
	}
}
