//! Wire format of the fast-transfer liquidity layer.
//!
//! Every cross-chain message starts with a one-byte discriminator followed by
//! fixed-width big-endian integers, 32-byte addresses and length-prefixed byte
//! strings. The same bytes are produced and accepted on every chain, so
//! decoding is strict: unknown discriminators, truncation and trailing bytes
//! are all rejected.

use thiserror::Error;

pub mod instruction;
pub mod messages;
pub mod signed;
pub mod wire;

pub use instruction::Instruction;
pub use messages::*;
pub use signed::{GuardianSignature, GuardianSignatures, SignedMessage};

/// Reasons a byte string is not a valid message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
	#[error("Unknown {context} discriminator: {id}")]
	UnknownDiscriminator { context: &'static str, id: u8 },
	#[error("Truncated {field}: needed {needed} bytes, {remaining} remaining")]
	Truncated {
		field: &'static str,
		needed: usize,
		remaining: usize,
	},
	#[error("{count} trailing bytes after {context}")]
	TrailingBytes { context: &'static str, count: usize },
	#[error("{field} is {len} bytes, maximum is {max}")]
	Oversized {
		field: &'static str,
		len: usize,
		max: usize,
	},
	#[error("Unsupported signed message version: {0}")]
	UnsupportedVersion(u8),
	#[error("Expected {expected} message, got {actual}")]
	UnexpectedVariant {
		expected: &'static str,
		actual: &'static str,
	},
}
