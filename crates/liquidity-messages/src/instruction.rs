//! Instructions accepted by the chain hosting auctions.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::wire::{Reader, Writer};
use crate::MalformedMessage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
	/// Starts the auction for a signed fast market order.
	PlaceInitialBid { fee_bid: u64, fast_message: Vec<u8> },
	ImproveBid { auction_id: B256, bid_price: u64 },
	/// Settles a closed auction and emits the fast fill.
	ExecuteFastOrder { fast_message: Vec<u8> },
	/// Redeems the slow-path deposit paired with a fast order.
	SettleSlowOrder {
		fast_message: Vec<u8>,
		slow_message: Vec<u8>,
		attestation: Vec<u8>,
	},
}

impl Instruction {
	const PLACE_INITIAL_BID: u8 = 1;
	const IMPROVE_BID: u8 = 2;
	const EXECUTE_FAST_ORDER: u8 = 3;
	const SETTLE_SLOW_ORDER: u8 = 4;

	pub fn name(&self) -> &'static str {
		match self {
			Instruction::PlaceInitialBid { .. } => "place_initial_bid",
			Instruction::ImproveBid { .. } => "improve_bid",
			Instruction::ExecuteFastOrder { .. } => "execute_fast_order",
			Instruction::SettleSlowOrder { .. } => "settle_slow_order",
		}
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut w = Writer::new();
		match self {
			Instruction::PlaceInitialBid {
				fee_bid,
				fast_message,
			} => {
				w.put_u8(Self::PLACE_INITIAL_BID);
				w.put_u64(*fee_bid);
				w.put_prefixed_u32(fast_message);
			}
			Instruction::ImproveBid {
				auction_id,
				bid_price,
			} => {
				w.put_u8(Self::IMPROVE_BID);
				w.put_address(auction_id);
				w.put_u64(*bid_price);
			}
			Instruction::ExecuteFastOrder { fast_message } => {
				w.put_u8(Self::EXECUTE_FAST_ORDER);
				w.put_prefixed_u32(fast_message);
			}
			Instruction::SettleSlowOrder {
				fast_message,
				slow_message,
				attestation,
			} => {
				w.put_u8(Self::SETTLE_SLOW_ORDER);
				w.put_prefixed_u32(fast_message);
				w.put_prefixed_u32(slow_message);
				w.put_prefixed_u32(attestation);
			}
		}
		w.into_vec()
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessage> {
		let mut r = Reader::new(bytes);
		let instruction = match r.read_u8("instruction selector")? {
			Self::PLACE_INITIAL_BID => Instruction::PlaceInitialBid {
				fee_bid: r.read_u64("fee_bid")?,
				fast_message: r.read_prefixed_u32("fast_message")?.to_vec(),
			},
			Self::IMPROVE_BID => Instruction::ImproveBid {
				auction_id: r.read_address("auction_id")?,
				bid_price: r.read_u64("bid_price")?,
			},
			Self::EXECUTE_FAST_ORDER => Instruction::ExecuteFastOrder {
				fast_message: r.read_prefixed_u32("fast_message")?.to_vec(),
			},
			Self::SETTLE_SLOW_ORDER => Instruction::SettleSlowOrder {
				fast_message: r.read_prefixed_u32("fast_message")?.to_vec(),
				slow_message: r.read_prefixed_u32("slow_message")?.to_vec(),
				attestation: r.read_prefixed_u32("attestation")?.to_vec(),
			},
			id => {
				return Err(MalformedMessage::UnknownDiscriminator {
					context: "instruction",
					id,
				})
			}
		};
		r.finish("instruction")?;
		Ok(instruction)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_instruction_round_trip() {
		let instructions = vec![
			Instruction::PlaceInitialBid {
				fee_bid: 10,
				fast_message: vec![1, 2, 3],
			},
			Instruction::ImproveBid {
				auction_id: B256::repeat_byte(0x44),
				bid_price: 9,
			},
			Instruction::ExecuteFastOrder {
				fast_message: vec![],
			},
			Instruction::SettleSlowOrder {
				fast_message: vec![1],
				slow_message: vec![2, 2],
				attestation: vec![3, 3, 3],
			},
		];
		for instruction in instructions {
			assert_eq!(Instruction::decode(&instruction.encode()).unwrap(), instruction);
		}
	}

	#[test]
	fn test_unknown_selector() {
		assert_eq!(
			Instruction::decode(&[0]),
			Err(MalformedMessage::UnknownDiscriminator {
				context: "instruction",
				id: 0,
			})
		);
	}

	#[test]
	fn test_improve_bid_layout() {
		let encoded = Instruction::ImproveBid {
			auction_id: B256::repeat_byte(0x44),
			bid_price: 9,
		}
		.encode();
		assert_eq!(encoded.len(), 1 + 32 + 8);
		assert_eq!(encoded[0], 2);
		assert_eq!(&encoded[33..], &9u64.to_be_bytes());

		let mut trailing = encoded.clone();
		trailing.push(0);
		assert!(matches!(
			Instruction::decode(&trailing),
			Err(MalformedMessage::TrailingBytes { .. })
		));
	}
}
