//! Formatting helpers for log output.

use crate::B256;

/// Shortens a long hex identifier to `prefix...suffix`.
///
/// Strings of 12 characters or fewer are returned unchanged.
pub fn truncate_hash(hash: &str) -> String {
	if hash.len() <= 12 {
		hash.to_string()
	} else {
		format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
	}
}

/// Shortened hex form of an auction id or address, e.g. `0xa096...a0b4`.
pub fn truncate_id(id: &B256) -> String {
	truncate_hash(&id.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_hash() {
		let hash = "0xa096c418fd1192ba7f5b506beea682a633f9ab82911fa3d7a249b8d80889a0b4";
		assert_eq!(truncate_hash(hash), "0xa096...a0b4");
		assert_eq!(truncate_hash("0x12345"), "0x12345");
		assert_eq!(truncate_hash("0x1234567890"), "0x1234567890");
	}

	#[test]
	fn test_truncate_id() {
		let id = B256::repeat_byte(0xab);
		assert_eq!(truncate_id(&id), "0xabab...abab");
	}
}
