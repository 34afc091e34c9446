//! Settlement-chain transactions and their signatures.

use alloy_primitives::{keccak256, PrimitiveSignature, B256};

use crate::{ChainId, UniversalAddress};

/// Signature over a transaction's signing hash, as 65 bytes (r, s, v).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl From<PrimitiveSignature> for Signature {
	fn from(sig: PrimitiveSignature) -> Self {
		let mut bytes = Vec::with_capacity(65);
		bytes.extend_from_slice(&sig.r().to_be_bytes::<32>());
		bytes.extend_from_slice(&sig.s().to_be_bytes::<32>());
		bytes.push(if sig.v() { 28 } else { 27 });
		Signature(bytes)
	}
}

/// An instruction addressed to the chain hosting auctions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	/// Chain the transaction is submitted to.
	pub chain_id: ChainId,
	/// Account the transaction acts on behalf of.
	pub sender: UniversalAddress,
	/// Encoded instruction.
	pub data: Vec<u8>,
}

impl Transaction {
	/// Hash committed to by the sender's signature.
	pub fn signing_hash(&self) -> B256 {
		let mut preimage = Vec::with_capacity(2 + 32 + self.data.len());
		preimage.extend_from_slice(&self.chain_id.to_be_bytes());
		preimage.extend_from_slice(self.sender.as_slice());
		preimage.extend_from_slice(&self.data);
		keccak256(preimage)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_signing_hash_commits_to_every_field() {
		let tx = Transaction {
			chain_id: 1,
			sender: B256::repeat_byte(0x11),
			data: vec![1, 2, 3],
		};
		let mut other_chain = tx.clone();
		other_chain.chain_id = 2;
		let mut other_data = tx.clone();
		other_data.data.push(4);

		assert_ne!(tx.signing_hash(), other_chain.signing_hash());
		assert_ne!(tx.signing_hash(), other_data.signing_hash());
		assert_eq!(tx.signing_hash(), tx.clone().signing_hash());
	}
}
