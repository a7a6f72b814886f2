//! Protocol Constants
//!
//! All magic numbers and default configuration values for the sbr protocol.
//! Runtime parameters are carried by [`crate::config::ProtocolConfig`], whose
//! `Default` impl is built from these values.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (higher minimum debt and bootstrap threshold)
//! - Default (no feature) - Testnet values (lower minimums for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! sbr-common = { path = "...", features = ["mainnet"] }
//! ```

/// Fixed-point precision
pub mod precision {
    /// Unit precision for all monetary values and per-unit accumulators (1e18)
    pub const PRECISION: u128 = 1_000_000_000_000_000_000;

    /// One whole token in base units
    pub const ONE: u128 = PRECISION;
}

/// Fee Configuration (in basis points, 100 = 1%)
pub mod fees {
    /// Basis points denominator
    pub const BASIS_POINTS_DIVISOR: u128 = 10_000;

    /// Redemption fee charged on collateral drawn (0.5%)
    pub const REDEMPTION_FEE_BPS: u128 = 50;

    /// Share of the redemption fee attributed to the protocol owner (50%)
    pub const REDEMPTION_OWNER_SHARE_BPS: u128 = 5_000;

    /// Share of every routed fee that goes to the secondary staking pool (10%)
    pub const STAKING_POOL_SHARE_BPS: u128 = 1_000;
}

/// Debt Limits
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod limits {
    use super::precision::ONE;

    /// Minimum non-zero debt a position may carry
    /// - Mainnet: 1,800 tokens (keeps liquidations profitable)
    /// - Testnet: 10 tokens
    #[cfg(feature = "mainnet")]
    pub const MINIMUM_DEBT: u128 = 1_800 * ONE;
    #[cfg(not(feature = "mainnet"))]
    pub const MINIMUM_DEBT: u128 = 10 * ONE;
}

/// Collateralization
pub mod ratios {
    /// Minimum Collateral Ratio in basis points (110%)
    pub const MCR_BPS: u128 = 11_000;
}

/// Liquidation Configuration
pub mod liquidation {
    /// Liquidation fee taken from seized collateral (0.5%)
    pub const LIQUIDATION_FEE_BPS: u128 = 50;

    /// Estimated liquidator gas cost, in collateral, refunded out of the fee
    pub const GAS_OVERHEAD_ESTIMATE: u128 = super::precision::ONE / 1_000;

    /// Remaining collateral below which a shortfall cannot be redistributed
    pub const MIN_REDISTRIBUTION_COLLATERAL: u128 = super::precision::ONE / 1_000_000;
}

/// System mode thresholds
pub mod mode {
    use super::precision::ONE;

    /// Total debt above which the system leaves Bootstrap mode for good
    #[cfg(feature = "mainnet")]
    pub const BOOTSTRAP_DEBT_THRESHOLD: u128 = 2_000_000 * ONE;
    #[cfg(not(feature = "mainnet"))]
    pub const BOOTSTRAP_DEBT_THRESHOLD: u128 = 10_000 * ONE;
}

/// Stability Pool Configuration
pub mod stability_pool {
    use super::precision::PRECISION;

    /// Scaling factor floor - a compounded factor below this triggers a reset
    pub const MIN_SCALING_FACTOR: u128 = PRECISION / 1_000_000_000; // 1e9
}

/// sbr emission schedule
pub mod emission {
    use super::precision::ONE;

    /// Total sbr emitted to stability pool depositors over the window
    pub const TOTAL_EMISSION: u128 = 32_000_000 * ONE;

    /// Emission window length in blocks (~1 year at 10 min blocks)
    pub const WINDOW_BLOCKS: u64 = 52_560;
}

/// Queue sentinels
pub mod index {
    /// Id used for an absent head/tail/prev/next and an unset hint
    pub const NULL_ID: u64 = 0;
}
