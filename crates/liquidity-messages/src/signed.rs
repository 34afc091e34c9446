//! Envelope of a message attested by the message-signing network.
//!
//! Signatures are carried but never verified here; quorum verification is
//! the job of whoever hands the envelope to us.

use alloy_primitives::{keccak256, FixedBytes, B256};
use liquidity_types::{ChainId, UniversalAddress};
use serde::{Deserialize, Serialize};

use crate::wire::{Reader, Writer};
use crate::{LiquidityMessage, MalformedMessage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSignature {
	pub index: u8,
	/// r (32) || s (32) || v (1)
	pub signature: FixedBytes<65>,
}

impl GuardianSignature {
	pub const SIGNATURE_LEN: usize = 65;
}

/// Signatures on an envelope; the count travels as a single byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSignatures(Vec<GuardianSignature>);

impl GuardianSignatures {
	pub const MAX_LEN: usize = u8::MAX as usize;

	pub fn new(signatures: Vec<GuardianSignature>) -> Result<Self, MalformedMessage> {
		if signatures.len() > Self::MAX_LEN {
			return Err(MalformedMessage::Oversized {
				field: "signatures",
				len: signatures.len(),
				max: Self::MAX_LEN,
			});
		}
		Ok(Self(signatures))
	}

	pub fn as_slice(&self) -> &[GuardianSignature] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	fn write(&self, w: &mut Writer) {
		w.put_u8(self.0.len() as u8);
		for sig in &self.0 {
			w.put_u8(sig.index);
			w.put_raw(sig.signature.as_slice());
		}
	}

	fn read(r: &mut Reader<'_>) -> Result<Self, MalformedMessage> {
		let count = r.read_u8("signature count")?;
		let mut signatures = Vec::with_capacity(count as usize);
		for _ in 0..count {
			let index = r.read_u8("signature index")?;
			let mut signature = FixedBytes::<65>::ZERO;
			r.read_into("signature", &mut signature.0)?;
			signatures.push(GuardianSignature { index, signature });
		}
		Ok(Self(signatures))
	}
}

impl TryFrom<Vec<GuardianSignature>> for GuardianSignatures {
	type Error = MalformedMessage;

	fn try_from(signatures: Vec<GuardianSignature>) -> Result<Self, Self::Error> {
		Self::new(signatures)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
	pub guardian_set_index: u32,
	pub signatures: GuardianSignatures,
	pub timestamp: u32,
	pub nonce: u32,
	pub emitter_chain: ChainId,
	pub emitter_address: UniversalAddress,
	pub sequence: u64,
	pub consistency_level: u8,
	pub payload: Vec<u8>,
}

impl SignedMessage {
	pub const VERSION: u8 = 1;

	/// Wraps a payload in an unsigned envelope.
	pub fn unsigned(
		emitter_chain: ChainId,
		emitter_address: UniversalAddress,
		sequence: u64,
		timestamp: u32,
		payload: Vec<u8>,
	) -> Self {
		Self {
			guardian_set_index: 0,
			signatures: GuardianSignatures::default(),
			timestamp,
			nonce: 0,
			emitter_chain,
			emitter_address,
			sequence,
			consistency_level: 1,
			payload,
		}
	}

	/// The signed portion of the envelope.
	pub fn body(&self) -> Vec<u8> {
		let mut w = Writer::new();
		self.write_body(&mut w);
		w.into_vec()
	}

	/// Double keccak of the body. Identifies the message (and its auction).
	pub fn digest(&self) -> B256 {
		keccak256(keccak256(self.body()))
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut w = Writer::new();
		w.put_u8(Self::VERSION);
		w.put_u32(self.guardian_set_index);
		self.signatures.write(&mut w);
		self.write_body(&mut w);
		w.into_vec()
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessage> {
		let mut r = Reader::new(bytes);
		let version = r.read_u8("version")?;
		if version != Self::VERSION {
			return Err(MalformedMessage::UnsupportedVersion(version));
		}
		let guardian_set_index = r.read_u32("guardian_set_index")?;
		let signatures = GuardianSignatures::read(&mut r)?;

		Ok(Self {
			guardian_set_index,
			signatures,
			timestamp: r.read_u32("timestamp")?,
			nonce: r.read_u32("nonce")?,
			emitter_chain: r.read_u16("emitter_chain")?,
			emitter_address: r.read_address("emitter_address")?,
			sequence: r.read_u64("sequence")?,
			consistency_level: r.read_u8("consistency_level")?,
			payload: r.rest().to_vec(),
		})
	}

	/// Decodes the carried liquidity message.
	pub fn message(&self) -> Result<LiquidityMessage, MalformedMessage> {
		LiquidityMessage::decode(&self.payload)
	}

	fn write_body(&self, w: &mut Writer) {
		w.put_u32(self.timestamp);
		w.put_u32(self.nonce);
		w.put_u16(self.emitter_chain);
		w.put_address(&self.emitter_address);
		w.put_u64(self.sequence);
		w.put_u8(self.consistency_level);
		w.put_raw(&self.payload);
	}
}
