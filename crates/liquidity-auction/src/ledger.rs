//! Token balances on the host chain.
//!
//! Bidders' escrow sits in a single custody balance. Every movement of funds
//! is a [`Transfer`] and batches are applied all-or-nothing.

use std::collections::HashMap;

use liquidity_types::UniversalAddress;

use crate::AuctionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
	/// Moves funds from an account into custody.
	Escrow { from: UniversalAddress, amount: u64 },
	/// Moves funds from custody to an account.
	Release { to: UniversalAddress, amount: u64 },
	/// Slow-path mint arriving in custody.
	Mint { amount: u64 },
	/// Funds leaving custody for another chain.
	Burn { amount: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
	balances: HashMap<UniversalAddress, u64>,
	custody: u64,
}

impl Ledger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn balance_of(&self, account: &UniversalAddress) -> u64 {
		self.balances.get(account).copied().unwrap_or(0)
	}

	pub fn custody(&self) -> u64 {
		self.custody
	}

	/// Sum of all balances and custody.
	pub fn total_supply(&self) -> u128 {
		self.balances.values().map(|b| *b as u128).sum::<u128>() + self.custody as u128
	}

	/// Credits an account directly. Used to fund devnet and test accounts.
	pub fn fund(&mut self, account: UniversalAddress, amount: u64) -> Result<(), AuctionError> {
		let balance = self.balances.entry(account).or_default();
		*balance = balance
			.checked_add(amount)
			.ok_or(AuctionError::LedgerOverflow)?;
		Ok(())
	}

	/// Applies every transfer or none of them.
	pub fn apply(&mut self, transfers: &[Transfer]) -> Result<(), AuctionError> {
		let mut next = self.clone();
		for transfer in transfers {
			next.apply_one(*transfer)?;
		}
		*self = next;
		Ok(())
	}

	fn apply_one(&mut self, transfer: Transfer) -> Result<(), AuctionError> {
		match transfer {
			Transfer::Escrow { from, amount } => {
				let available = self.balance_of(&from);
				if available < amount {
					return Err(AuctionError::InsufficientBalance {
						needed: amount,
						available,
					});
				}
				self.balances.insert(from, available - amount);
				self.custody = self
					.custody
					.checked_add(amount)
					.ok_or(AuctionError::LedgerOverflow)?;
			}
			Transfer::Release { to, amount } => {
				self.take_custody(amount)?;
				self.fund(to, amount)?;
			}
			Transfer::Mint { amount } => {
				self.custody = self
					.custody
					.checked_add(amount)
					.ok_or(AuctionError::LedgerOverflow)?;
			}
			Transfer::Burn { amount } => self.take_custody(amount)?,
		}
		Ok(())
	}

	fn take_custody(&mut self, amount: u64) -> Result<(), AuctionError> {
		self.custody = self
			.custody
			.checked_sub(amount)
			.ok_or(AuctionError::CustodyShortfall {
				needed: amount,
				available: self.custody,
			})?;
		Ok(())
	}
}
