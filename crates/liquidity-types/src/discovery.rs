//! Messages as they come off the signing network.

use serde::{Deserialize, Serialize};

use crate::{ChainId, UniversalAddress};

/// A signed message published by a watched emitter, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedMessage {
	pub source_chain: ChainId,
	pub emitter: UniversalAddress,
	pub sequence: u64,
	/// Encoded signed message.
	pub bytes: Vec<u8>,
}
