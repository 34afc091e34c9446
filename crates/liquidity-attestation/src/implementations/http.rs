//! REST clients for the public signing-network and attestor APIs.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use liquidity_types::{
	ChainId, ConfigSchema, Field, FieldType, Schema, UniversalAddress, ValidationError, B256,
};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::{AttestationError, BurnAttestationSource, SignedMessageSource};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub struct HttpSourceSchema;

impl ConfigSchema for HttpSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("base_url", FieldType::Url)],
			vec![Field::new("timeout_ms", FieldType::Integer {
				min: Some(1),
				max: None,
			})],
		);
		schema.validate(config)
	}
}

fn client(timeout: Duration) -> Result<reqwest::Client, AttestationError> {
	reqwest::Client::builder()
		.timeout(timeout)
		.build()
		.map_err(|e| AttestationError::InvalidConfig(format!("Failed to build client: {}", e)))
}

/// GETs `url`, mapping 404 to `None`.
async fn get_json<T: for<'de> Deserialize<'de>>(
	client: &reqwest::Client,
	url: &str,
) -> Result<Option<T>, AttestationError> {
	let response = client
		.get(url)
		.send()
		.await
		.map_err(|e| AttestationError::Transport(e.to_string()))?;
	if response.status() == StatusCode::NOT_FOUND {
		return Ok(None);
	}
	if !response.status().is_success() {
		return Err(AttestationError::Transport(format!(
			"{} returned {}",
			url,
			response.status()
		)));
	}
	let body = response
		.json::<T>()
		.await
		.map_err(|e| AttestationError::InvalidResponse(e.to_string()))?;
	Ok(Some(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedMessageResponse {
	vaa_bytes: String,
}

pub struct HttpSignedMessages {
	client: reqwest::Client,
	base_url: String,
}

impl HttpSignedMessages {
	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AttestationError> {
		Ok(Self {
			client: client(timeout)?,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}
}

#[async_trait]
impl SignedMessageSource for HttpSignedMessages {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpSourceSchema)
	}

	async fn fetch_signed_message(
		&self,
		chain: ChainId,
		emitter: &UniversalAddress,
		sequence: u64,
	) -> Result<Option<Vec<u8>>, AttestationError> {
		let url = format!(
			"{}/v1/signed_vaa/{}/{}/{}",
			self.base_url,
			chain,
			hex::encode(emitter),
			sequence
		);
		let Some(body) = get_json::<SignedMessageResponse>(&self.client, &url).await? else {
			return Ok(None);
		};
		let bytes = STANDARD
			.decode(body.vaa_bytes)
			.map_err(|e| AttestationError::InvalidResponse(format!("vaaBytes: {}", e)))?;
		Ok(Some(bytes))
	}
}

#[derive(Debug, Deserialize)]
struct AttestationResponse {
	status: String,
	attestation: Option<String>,
}

pub struct HttpBurnAttestations {
	client: reqwest::Client,
	base_url: String,
}

impl HttpBurnAttestations {
	const COMPLETE: &'static str = "complete";

	pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AttestationError> {
		Ok(Self {
			client: client(timeout)?,
			base_url: base_url.trim_end_matches('/').to_string(),
		})
	}
}

#[async_trait]
impl BurnAttestationSource for HttpBurnAttestations {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpSourceSchema)
	}

	async fn fetch_attestation(
		&self,
		message_hash: &B256,
	) -> Result<Option<Vec<u8>>, AttestationError> {
		let url = format!("{}/v1/attestations/{}", self.base_url, message_hash);
		let Some(body) = get_json::<AttestationResponse>(&self.client, &url).await? else {
			return Ok(None);
		};
		if body.status != Self::COMPLETE {
			return Ok(None);
		}
		let attestation = body.attestation.ok_or_else(|| {
			AttestationError::InvalidResponse("complete attestation without payload".to_string())
		})?;
		let hex_part = attestation.strip_prefix("0x").unwrap_or(&attestation);
		let bytes = hex::decode(hex_part)
			.map_err(|e| AttestationError::InvalidResponse(format!("attestation: {}", e)))?;
		Ok(Some(bytes))
	}
}

fn settings(config: &toml::Value) -> Result<(&str, Duration), AttestationError> {
	HttpSourceSchema
		.validate(config)
		.map_err(|e| AttestationError::InvalidConfig(e.to_string()))?;
	let base_url = config
		.get("base_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AttestationError::InvalidConfig("base_url is required".to_string()))?;
	let timeout_ms = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.map(|v| v as u64)
		.unwrap_or(DEFAULT_TIMEOUT_MS);
	Ok((base_url, Duration::from_millis(timeout_ms)))
}

pub fn create_http_message_source(
	config: &toml::Value,
) -> Result<Box<dyn SignedMessageSource>, AttestationError> {
	let (base_url, timeout) = settings(config)?;
	Ok(Box::new(HttpSignedMessages::new(base_url, timeout)?))
}

pub fn create_http_attestation_source(
	config: &toml::Value,
) -> Result<Box<dyn BurnAttestationSource>, AttestationError> {
	let (base_url, timeout) = settings(config)?;
	Ok(Box::new(HttpBurnAttestations::new(base_url, timeout)?))
}
