//! Late-execution penalty schedule.

use liquidity_types::{AuctionParameters, AuctionPhase, FEE_PRECISION_MAX};

/// Split of the amount withheld from a late highest bidder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PenaltyAmounts {
	/// Paid to whoever executed the order.
	pub penalty: u64,
	/// Paid to the user on top of the fill.
	pub user_reward: u64,
}

impl PenaltyAmounts {
	pub fn total(&self) -> u64 {
		self.penalty + self.user_reward
	}
}

fn mul_div(value: u64, numerator: u64, denominator: u64) -> u64 {
	(value as u128 * numerator as u128 / denominator as u128) as u64
}

/// Penalty owed for executing an auction in `phase`.
///
/// Nothing is owed before the grace period ends. Afterwards the total starts
/// at `initial_penalty_bps` of the deposit and grows linearly to the whole
/// deposit over `penalty_period` blocks, staying flat from then on.
pub fn compute_penalty(
	params: &AuctionParameters,
	security_deposit: u64,
	phase: AuctionPhase,
) -> PenaltyAmounts {
	let late_blocks = match phase {
		AuctionPhase::Open | AuctionPhase::GracePeriod => return PenaltyAmounts::default(),
		AuctionPhase::Penalty { late_blocks } => late_blocks,
	};

	let total = if late_blocks >= params.penalty_period
		|| params.initial_penalty_bps >= FEE_PRECISION_MAX
	{
		security_deposit
	} else {
		let base = mul_div(
			security_deposit,
			params.initial_penalty_bps as u64,
			FEE_PRECISION_MAX as u64,
		);
		base + mul_div(security_deposit - base, late_blocks, params.penalty_period)
	};

	let user_reward = mul_div(
		total,
		params.user_penalty_reward_bps as u64,
		FEE_PRECISION_MAX as u64,
	);
	PenaltyAmounts {
		penalty: total - user_reward,
		user_reward,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn params() -> AuctionParameters {
		AuctionParameters {
			user_penalty_reward_bps: 250_000,
			initial_penalty_bps: 100_000,
			duration: 2,
			grace_period: 4,
			penalty_period: 20,
			security_deposit_base: 0,
			security_deposit_bps: 0,
		}
	}

	#[test]
	fn test_no_penalty_before_grace_ends() {
		assert_eq!(
			compute_penalty(&params(), 1_000, AuctionPhase::Open),
			PenaltyAmounts::default()
		);
		assert_eq!(
			compute_penalty(&params(), 1_000, AuctionPhase::GracePeriod),
			PenaltyAmounts::default()
		);
	}

	#[test]
	fn test_linear_growth() {
		// base = 100, then (1000 - 100) * 10 / 20 = 450
		let half = compute_penalty(&params(), 1_000, AuctionPhase::Penalty { late_blocks: 10 });
		assert_eq!(half.total(), 550);
		assert_eq!(half.user_reward, 137);
		assert_eq!(half.penalty, 413);

		let mut previous = 0;
		for late_blocks in 1..=25 {
			let total =
				compute_penalty(&params(), 1_000, AuctionPhase::Penalty { late_blocks }).total();
			assert!(total >= previous);
			assert!(total <= 1_000);
			previous = total;
		}
	}

	#[test]
	fn test_flat_after_penalty_period() {
		let at_end = compute_penalty(&params(), 1_000, AuctionPhase::Penalty { late_blocks: 20 });
		let way_later =
			compute_penalty(&params(), 1_000, AuctionPhase::Penalty { late_blocks: 10_000 });
		assert_eq!(at_end.total(), 1_000);
		assert_eq!(at_end, way_later);
	}

	#[test]
	fn test_full_initial_penalty() {
		let mut params = params();
		params.initial_penalty_bps = FEE_PRECISION_MAX;
		let amounts = compute_penalty(&params, 1_000, AuctionPhase::Penalty { late_blocks: 1 });
		assert_eq!(amounts.total(), 1_000);
	}

	#[test]
	fn test_zero_penalty_period_is_immediately_full() {
		let mut params = params();
		params.penalty_period = 0;
		let amounts = compute_penalty(&params, 1_000, AuctionPhase::Penalty { late_blocks: 1 });
		assert_eq!(amounts.total(), 1_000);
	}
}
