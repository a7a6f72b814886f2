//! Oracle Module
//!
//! Prices are pulled from an external feed on demand. The protocol only needs
//! the current collateral price in debt units, PRECISION-scaled.

use crate::errors::{AmountErrorReason, SbrError, SbrResult};

/// Pull-based collateral price source
pub trait PriceFeed {
    /// Current collateral price (debt units per collateral unit, 1e18-scaled)
    fn collateral_price(&self) -> SbrResult<u128>;
}

/// Feed returning a constant price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPriceFeed {
    price: u128,
}

impl FixedPriceFeed {
    /// Create a feed quoting `price`
    pub fn new(price: u128) -> Self {
        Self { price }
    }
}

impl PriceFeed for FixedPriceFeed {
    fn collateral_price(&self) -> SbrResult<u128> {
        if self.price == 0 {
            return Err(SbrError::InvalidAmount { amount: 0, reason: AmountErrorReason::Zero });
        }
        Ok(self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::precision::PRECISION;

    #[test]
    fn test_fixed_feed() {
        let feed = FixedPriceFeed::new(PRECISION);
        assert_eq!(feed.collateral_price().unwrap(), PRECISION);
    }

    #[test]
    fn test_zero_price_rejected() {
        assert!(FixedPriceFeed::new(0).collateral_price().is_err());
    }
}
