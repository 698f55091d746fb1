use cosmwasm_std::Uint256;
use rust_decimal::Decimal;

use xroute_types::Estimate;

/// Decides whether a refreshed estimate needs the user's reconfirmation
pub trait PlanComparator: Send + Sync {
    fn requires_confirmation(&self, approved: &Estimate, refreshed: &Estimate, slippage: Decimal)
        -> bool;
}

/// Reconfirm when the new minimum output drops below the approved minimum
/// reduced by the slippage tolerance
#[derive(Debug, Clone, Copy, Default)]
pub struct SlippageComparator;

impl PlanComparator for SlippageComparator {
    fn requires_confirmation(
        &self,
        approved: &Estimate,
        refreshed: &Estimate,
        slippage: Decimal,
    ) -> bool {
        refreshed.to_amount_min < apply_slippage(approved.to_amount_min, slippage)
    }
}

/// `amount * (1 - slippage)`, with the slippage clamped to `[0, 1]`
pub fn apply_slippage(amount: Uint256, slippage: Decimal) -> Uint256 {
    if slippage <= Decimal::ZERO {
        return amount;
    }
    if slippage >= Decimal::ONE {
        return Uint256::zero();
    }

    let factor = Decimal::ONE - slippage;
    let numerator = factor.mantissa().unsigned_abs();
    let denominator = 10u128.pow(factor.scale());
    amount.multiply_ratio(numerator, denominator)
}
