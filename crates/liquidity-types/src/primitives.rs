//! Primitive identifiers shared across chains.
//!
//! Addresses are always carried as 32 bytes regardless of the native width of
//! the chain they originate from. Narrower addresses are left-padded with
//! zeroes before they enter the system.

pub use alloy_primitives::{keccak256, B256, U256};

/// Protocol-level chain identifier (not an EVM chain id).
pub type ChainId = u16;

/// Secondary-bridge domain identifier.
pub type Domain = u32;

/// 32-byte chain-agnostic address.
pub type UniversalAddress = B256;

/// Identifier of an auction: the digest of the signed fast market order.
pub type AuctionId = B256;

/// Left-pads a 20-byte EVM address into a universal address.
pub fn universal_from_evm(address: &[u8; 20]) -> UniversalAddress {
	let mut bytes = [0u8; 32];
	bytes[12..].copy_from_slice(address);
	B256::from(bytes)
}

/// Returns the 20-byte EVM address held in a universal address, if the
/// leading 12 bytes are zero.
pub fn evm_from_universal(address: &UniversalAddress) -> Option<[u8; 20]> {
	if address[..12].iter().any(|b| *b != 0) {
		return None;
	}
	let mut bytes = [0u8; 20];
	bytes.copy_from_slice(&address[12..]);
	Some(bytes)
}

/// Parses a universal address from hex, accepting either a full 32-byte
/// value or a 20-byte EVM address (which is left-padded).
pub fn parse_universal_address(value: &str) -> Result<UniversalAddress, String> {
	let stripped = value.strip_prefix("0x").unwrap_or(value);
	let bytes = hex::decode(stripped).map_err(|e| format!("invalid hex: {}", e))?;
	match bytes.len() {
		32 => Ok(B256::from_slice(&bytes)),
		20 => {
			let mut evm = [0u8; 20];
			evm.copy_from_slice(&bytes);
			Ok(universal_from_evm(&evm))
		}
		other => Err(format!("expected 20 or 32 bytes, got {}", other)),
	}
}
