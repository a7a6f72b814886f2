//! Mathematical Utilities for the sbr Protocol
//!
//! Checked fixed-point operations. Every value is a `u128` scaled by
//! [`PRECISION`]; products go through a 256-bit intermediate so that
//! `amount * PRECISION` never wraps.

use primitive_types::U256;

use crate::constants::{fees::BASIS_POINTS_DIVISOR, precision::PRECISION};
use crate::errors::{SbrError, SbrResult};

/// Compute `a * b / denominator`, rounding down.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> SbrResult<u128> {
    if denominator == 0 {
        return Err(SbrError::DivisionByZero);
    }
    let quotient = U256::from(a) * U256::from(b) / U256::from(denominator);
    if quotient > U256::from(u128::MAX) {
        return Err(SbrError::Overflow);
    }
    Ok(quotient.low_u128())
}

/// Take `bps` basis points of `amount`, rounding down.
pub fn bps_of(amount: u128, bps: u128) -> SbrResult<u128> {
    mul_div(amount, bps, BASIS_POINTS_DIVISOR)
}

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> SbrResult<u128> {
    a.checked_add(b).ok_or(SbrError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> SbrResult<u128> {
    a.checked_sub(b).ok_or(SbrError::Underflow)
}

/// Collateral ratio used as the liquidation-queue key.
///
/// ratio = debt * PRECISION / collateral, zero for a debt-free position.
pub fn collateral_ratio(debt: u128, collateral: u128) -> SbrResult<u128> {
    if debt == 0 {
        return Ok(0);
    }
    mul_div(debt, PRECISION, collateral)
}

/// Value of `collateral` in debt units at `price` (PRECISION-scaled).
pub fn collateral_value(collateral: u128, price: u128) -> SbrResult<u128> {
    mul_div(collateral, price, PRECISION)
}

/// A position is liquidatable when its collateral value falls below
/// `debt * mcr_bps / 10000`. Debt-free positions never are.
pub fn is_liquidatable(collateral: u128, debt: u128, price: u128, mcr_bps: u128) -> SbrResult<bool> {
    if debt == 0 {
        return Ok(false);
    }
    let value = collateral_value(collateral, price)?;
    let lhs = U256::from(value) * U256::from(BASIS_POINTS_DIVISOR);
    let rhs = U256::from(debt) * U256::from(mcr_bps);
    Ok(lhs < rhs)
}

/// Result of spreading an amount over a unit base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerUnitDistribution {
    /// Increment for the per-unit accumulator
    pub per_unit_delta: u128,
    /// Residual lost to integer division, carried into the next distribution
    pub carry_loss: u128,
}

/// Spread `amount` (plus the previous carry) over `total_units`.
///
/// `per_unit_delta = (amount + carry) * scaling_factor / total_units` and the
/// residual `total - per_unit_delta * total_units / scaling_factor` becomes the
/// new carry. Used by every reward tracker of the stability pool, the staking
/// pool and the redistribution path of liquidations (with a unit factor).
pub fn distribute_per_unit(
    amount: u128,
    total_units: u128,
    scaling_factor: u128,
    carry_loss: u128,
) -> SbrResult<PerUnitDistribution> {
    if total_units == 0 {
        return Err(SbrError::DivisionByZero);
    }
    let total = safe_add(amount, carry_loss)?;
    let per_unit_delta = mul_div(total, scaling_factor, total_units)?;
    let attributed = if scaling_factor == 0 {
        0
    } else {
        mul_div(per_unit_delta, total_units, scaling_factor)?
    };
    Ok(PerUnitDistribution {
        per_unit_delta,
        carry_loss: safe_sub(total, attributed)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::precision::ONE;
    use proptest::prelude::*;

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1e21 * 1e18 overflows u128 but the quotient fits
        let v = mul_div(1_000 * ONE, PRECISION, 10 * ONE).unwrap();
        assert_eq!(v, 100 * PRECISION);
    }

    #[test]
    fn test_mul_div_errors() {
        assert_eq!(mul_div(1, 1, 0), Err(SbrError::DivisionByZero));
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(SbrError::Overflow));
    }

    #[test]
    fn test_collateral_ratio() {
        let ratio = collateral_ratio(500 * ONE, 1_000 * ONE).unwrap();
        assert_eq!(ratio, PRECISION / 2);
        assert_eq!(collateral_ratio(0, 1_000 * ONE).unwrap(), 0);
    }

    #[test]
    fn test_liquidatable() {
        // 1000 collateral at price 1.0 backing 900 debt = 111% (healthy)
        assert!(!is_liquidatable(1_000 * ONE, 900 * ONE, PRECISION, 11_000).unwrap());
        // same position at price 0.95 = 105.5%
        assert!(is_liquidatable(1_000 * ONE, 900 * ONE, 95 * PRECISION / 100, 11_000).unwrap());
        // no debt, never liquidatable
        assert!(!is_liquidatable(0, 0, PRECISION, 11_000).unwrap());
    }

    #[test]
    fn test_distribute_exact() {
        let d = distribute_per_unit(100, 1_000, PRECISION, 0).unwrap();
        assert_eq!(d.per_unit_delta, PRECISION / 10);
        assert_eq!(d.carry_loss, 0);
    }

    #[test]
    fn test_distribute_carries_residual() {
        // 10 over 3 units with a unit factor of 1: 3 per unit, 1 lost
        let d = distribute_per_unit(10, 3, 1, 0).unwrap();
        assert_eq!(d.per_unit_delta, 3);
        assert_eq!(d.carry_loss, 1);

        // the lost unit joins the next distribution
        let d = distribute_per_unit(2, 3, 1, d.carry_loss).unwrap();
        assert_eq!(d.per_unit_delta, 1);
        assert_eq!(d.carry_loss, 0);
    }

    #[test]
    fn test_distribute_zero_units() {
        assert_eq!(distribute_per_unit(1, 0, PRECISION, 0), Err(SbrError::DivisionByZero));
    }

    proptest! {
        #[test]
        fn prop_distribution_never_over_attributes(
            amount in 0u128..1_000_000_000_000 * ONE,
            units in 1u128..1_000_000_000 * ONE,
            carry in 0u128..1_000_000,
        ) {
            let d = distribute_per_unit(amount, units, PRECISION, carry).unwrap();
            let attributed = mul_div(d.per_unit_delta, units, PRECISION).unwrap();
            prop_assert_eq!(attributed + d.carry_loss, amount + carry);
        }
    }
}
