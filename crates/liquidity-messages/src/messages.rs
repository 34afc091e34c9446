//! Cross-chain liquidity messages.
//!
//! | Message | id |
//! |---|---|
//! | [`Deposit`] | 1 |
//! | [`FastMarketOrder`] | 11 |
//! | [`FastFill`] | 12 |
//!
//! A deposit carries its own nested payload ([`Fill`] = 1,
//! [`SlowOrderResponse`] = 2) inside a 2-byte length-prefixed region.

use alloy_primitives::{keccak256, B256, U256};
use liquidity_types::{ChainId, Domain, UniversalAddress};
use serde::{Deserialize, Serialize};

use crate::wire::{Reader, Writer};
use crate::MalformedMessage;

/// Opaque bytes forwarded to the redeemer.
///
/// Bounded so that a [`Fill`] always fits the 2-byte deposit payload region,
/// which keeps every encoder infallible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemerMessage(Vec<u8>);

impl RedeemerMessage {
	/// `u16::MAX` minus the fixed part of an encoded fill payload.
	pub const MAX_LEN: usize = u16::MAX as usize - Fill::FIXED_LEN;

	pub fn new(bytes: Vec<u8>) -> Result<Self, MalformedMessage> {
		if bytes.len() > Self::MAX_LEN {
			return Err(MalformedMessage::Oversized {
				field: "redeemer_message",
				len: bytes.len(),
				max: Self::MAX_LEN,
			});
		}
		Ok(Self(bytes))
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn into_inner(self) -> Vec<u8> {
		self.0
	}

	fn write(&self, w: &mut Writer) {
		w.put_prefixed_u32(&self.0);
	}

	fn read(r: &mut Reader<'_>) -> Result<Self, MalformedMessage> {
		let bytes = r.read_prefixed_u32("redeemer_message")?;
		Self::new(bytes.to_vec())
	}
}

impl TryFrom<Vec<u8>> for RedeemerMessage {
	type Error = MalformedMessage;

	fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
		Self::new(bytes)
	}
}

/// A user's request to move `amount_in` to `target_chain` through an auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastMarketOrder {
	pub amount_in: u64,
	pub min_amount_out: u64,
	pub target_chain: ChainId,
	pub redeemer: UniversalAddress,
	pub sender: UniversalAddress,
	pub refund_address: UniversalAddress,
	pub max_fee: u64,
	pub init_auction_fee: u64,
	/// Unix seconds; zero means no deadline.
	pub deadline: u32,
	pub redeemer_message: RedeemerMessage,
}

impl FastMarketOrder {
	pub const ID: u8 = 11;

	/// Whether the order can no longer start an auction at `now`.
	pub fn deadline_elapsed(&self, now: u64) -> bool {
		self.deadline != 0 && now >= self.deadline as u64
	}

	fn write(&self, w: &mut Writer) {
		w.put_u64(self.amount_in);
		w.put_u64(self.min_amount_out);
		w.put_u16(self.target_chain);
		w.put_address(&self.redeemer);
		w.put_address(&self.sender);
		w.put_address(&self.refund_address);
		w.put_u64(self.max_fee);
		w.put_u64(self.init_auction_fee);
		w.put_u32(self.deadline);
		self.redeemer_message.write(w);
	}

	fn read(r: &mut Reader<'_>) -> Result<Self, MalformedMessage> {
		Ok(Self {
			amount_in: r.read_u64("amount_in")?,
			min_amount_out: r.read_u64("min_amount_out")?,
			target_chain: r.read_u16("target_chain")?,
			redeemer: r.read_address("redeemer")?,
			sender: r.read_address("sender")?,
			refund_address: r.read_address("refund_address")?,
			max_fee: r.read_u64("max_fee")?,
			init_auction_fee: r.read_u64("init_auction_fee")?,
			deadline: r.read_u32("deadline")?,
			redeemer_message: RedeemerMessage::read(r)?,
		})
	}
}

/// Funds made available to a redeemer right after an auction settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastFill {
	pub fill_amount: u64,
	pub source_chain: ChainId,
	pub order_sender: UniversalAddress,
	pub redeemer: UniversalAddress,
	pub redeemer_message: RedeemerMessage,
}

impl FastFill {
	pub const ID: u8 = 12;

	fn write(&self, w: &mut Writer) {
		w.put_u64(self.fill_amount);
		w.put_u16(self.source_chain);
		w.put_address(&self.order_sender);
		w.put_address(&self.redeemer);
		self.redeemer_message.write(w);
	}

	fn read(r: &mut Reader<'_>) -> Result<Self, MalformedMessage> {
		Ok(Self {
			fill_amount: r.read_u64("fill_amount")?,
			source_chain: r.read_u16("source_chain")?,
			order_sender: r.read_address("order_sender")?,
			redeemer: r.read_address("redeemer")?,
			redeemer_message: RedeemerMessage::read(r)?,
		})
	}
}

/// Deposit payload crediting a redeemer with the deposited funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
	pub source_chain: ChainId,
	pub order_sender: UniversalAddress,
	pub redeemer: UniversalAddress,
	pub redeemer_message: RedeemerMessage,
}

impl Fill {
	pub const ID: u8 = 1;

	/// Encoded size of a fill payload without its redeemer message bytes.
	pub const FIXED_LEN: usize = 1 + 2 + 32 + 32 + 4;

	fn write(&self, w: &mut Writer) {
		w.put_u16(self.source_chain);
		w.put_address(&self.order_sender);
		w.put_address(&self.redeemer);
		self.redeemer_message.write(w);
	}

	fn read(r: &mut Reader<'_>) -> Result<Self, MalformedMessage> {
		Ok(Self {
			source_chain: r.read_u16("source_chain")?,
			order_sender: r.read_address("order_sender")?,
			redeemer: r.read_address("redeemer")?,
			redeemer_message: RedeemerMessage::read(r)?,
		})
	}
}

/// Deposit payload answering a fast order that may never have been auctioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowOrderResponse {
	/// Flat fee charged when no auction completed.
	pub base_fee: u64,
}

impl SlowOrderResponse {
	pub const ID: u8 = 2;
}

/// Payload nested inside a [`Deposit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositPayload {
	Fill(Fill),
	SlowOrderResponse(SlowOrderResponse),
}

impl DepositPayload {
	fn encode(&self) -> Vec<u8> {
		let mut w = Writer::new();
		match self {
			DepositPayload::Fill(fill) => {
				w.put_u8(Fill::ID);
				fill.write(&mut w);
			}
			DepositPayload::SlowOrderResponse(response) => {
				w.put_u8(SlowOrderResponse::ID);
				w.put_u64(response.base_fee);
			}
		}
		w.into_vec()
	}

	fn decode(bytes: &[u8]) -> Result<Self, MalformedMessage> {
		let mut r = Reader::new(bytes);
		let payload = match r.read_u8("deposit payload id")? {
			Fill::ID => DepositPayload::Fill(Fill::read(&mut r)?),
			SlowOrderResponse::ID => DepositPayload::SlowOrderResponse(SlowOrderResponse {
				base_fee: r.read_u64("base_fee")?,
			}),
			id => {
				return Err(MalformedMessage::UnknownDiscriminator {
					context: "deposit payload",
					id,
				})
			}
		};
		r.finish("deposit payload")?;
		Ok(payload)
	}
}

/// Proof that tokens were burned on the source domain and may be minted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
	pub token_address: UniversalAddress,
	pub amount: U256,
	pub source_domain: Domain,
	pub destination_domain: Domain,
	pub nonce: u64,
	pub burn_source: UniversalAddress,
	pub mint_recipient: UniversalAddress,
	pub payload: DepositPayload,
}

impl Deposit {
	pub const ID: u8 = 1;

	/// Key under which the secondary-bridge attestor publishes this burn.
	pub fn burn_message_hash(&self) -> B256 {
		let mut w = Writer::new();
		w.put_u32(self.source_domain);
		w.put_u32(self.destination_domain);
		w.put_u64(self.nonce);
		w.put_address(&self.burn_source);
		w.put_address(&self.mint_recipient);
		w.put_address(&self.token_address);
		w.put_u256(self.amount);
		keccak256(w.into_vec())
	}

	fn write(&self, w: &mut Writer) {
		w.put_address(&self.token_address);
		w.put_u256(self.amount);
		w.put_u32(self.source_domain);
		w.put_u32(self.destination_domain);
		w.put_u64(self.nonce);
		w.put_address(&self.burn_source);
		w.put_address(&self.mint_recipient);
		w.put_prefixed_u16(&self.payload.encode());
	}

	fn read(r: &mut Reader<'_>) -> Result<Self, MalformedMessage> {
		Ok(Self {
			token_address: r.read_address("token_address")?,
			amount: r.read_u256("amount")?,
			source_domain: r.read_u32("source_domain")?,
			destination_domain: r.read_u32("destination_domain")?,
			nonce: r.read_u64("nonce")?,
			burn_source: r.read_address("burn_source")?,
			mint_recipient: r.read_address("mint_recipient")?,
			payload: DepositPayload::decode(r.read_prefixed_u16("deposit payload")?)?,
		})
	}
}

/// Any top-level liquidity message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityMessage {
	Deposit(Deposit),
	FastMarketOrder(FastMarketOrder),
	FastFill(FastFill),
}

impl LiquidityMessage {
	pub fn encode(&self) -> Vec<u8> {
		let mut w = Writer::new();
		match self {
			LiquidityMessage::Deposit(deposit) => {
				w.put_u8(Deposit::ID);
				deposit.write(&mut w);
			}
			LiquidityMessage::FastMarketOrder(order) => {
				w.put_u8(FastMarketOrder::ID);
				order.write(&mut w);
			}
			LiquidityMessage::FastFill(fill) => {
				w.put_u8(FastFill::ID);
				fill.write(&mut w);
			}
		}
		w.into_vec()
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, MalformedMessage> {
		let mut r = Reader::new(bytes);
		let message = match r.read_u8("message id")? {
			Deposit::ID => LiquidityMessage::Deposit(Deposit::read(&mut r)?),
			FastMarketOrder::ID => {
				LiquidityMessage::FastMarketOrder(FastMarketOrder::read(&mut r)?)
			}
			FastFill::ID => LiquidityMessage::FastFill(FastFill::read(&mut r)?),
			id => {
				return Err(MalformedMessage::UnknownDiscriminator {
					context: "message",
					id,
				})
			}
		};
		r.finish("message")?;
		Ok(message)
	}

	pub fn name(&self) -> &'static str {
		match self {
			LiquidityMessage::Deposit(_) => "Deposit",
			LiquidityMessage::FastMarketOrder(_) => "FastMarketOrder",
			LiquidityMessage::FastFill(_) => "FastFill",
		}
	}

	pub fn into_fast_market_order(self) -> Result<FastMarketOrder, MalformedMessage> {
		match self {
			LiquidityMessage::FastMarketOrder(order) => Ok(order),
			other => Err(MalformedMessage::UnexpectedVariant {
				expected: "FastMarketOrder",
				actual: other.name(),
			}),
		}
	}

	pub fn into_deposit(self) -> Result<Deposit, MalformedMessage> {
		match self {
			LiquidityMessage::Deposit(deposit) => Ok(deposit),
			other => Err(MalformedMessage::UnexpectedVariant {
				expected: "Deposit",
				actual: other.name(),
			}),
		}
	}
}

impl From<Deposit> for LiquidityMessage {
	fn from(deposit: Deposit) -> Self {
		LiquidityMessage::Deposit(deposit)
	}
}

impl From<FastMarketOrder> for LiquidityMessage {
	fn from(order: FastMarketOrder) -> Self {
		LiquidityMessage::FastMarketOrder(order)
	}
}

impl From<FastFill> for LiquidityMessage {
	fn from(fill: FastFill) -> Self {
		LiquidityMessage::FastFill(fill)
	}
}
