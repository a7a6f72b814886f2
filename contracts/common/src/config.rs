//! Runtime protocol parameters.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{
    emission, fees, limits, liquidation, mode, precision::PRECISION, ratios, stability_pool,
};
use crate::errors::{SbrError, SbrResult};

/// Parameters threaded through every engine call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProtocolConfig {
    /// Minimum non-zero debt
    pub minimum_debt: u128,
    /// Minimum collateral ratio (bps)
    pub mcr_bps: u128,
    /// Total debt that ends Bootstrap mode
    pub bootstrap_debt_threshold: u128,
    /// Liquidation fee on seized collateral (bps)
    pub liquidation_fee_bps: u128,
    /// Cap on the liquidator's gas refund (collateral units)
    pub gas_overhead_estimate: u128,
    /// Redemption fee on collateral drawn (bps)
    pub redemption_fee_bps: u128,
    /// Owner share of the redemption fee (bps)
    pub redemption_owner_share_bps: u128,
    /// Staking-pool share of routed fees (bps)
    pub staking_pool_share_bps: u128,
    /// Scaling factor floor of the stability pool
    pub min_scaling_factor: u128,
    /// Total sbr emission
    pub emission_total: u128,
    /// Emission window in blocks
    pub emission_window_blocks: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            minimum_debt: limits::MINIMUM_DEBT,
            mcr_bps: ratios::MCR_BPS,
            bootstrap_debt_threshold: mode::BOOTSTRAP_DEBT_THRESHOLD,
            liquidation_fee_bps: liquidation::LIQUIDATION_FEE_BPS,
            gas_overhead_estimate: liquidation::GAS_OVERHEAD_ESTIMATE,
            redemption_fee_bps: fees::REDEMPTION_FEE_BPS,
            redemption_owner_share_bps: fees::REDEMPTION_OWNER_SHARE_BPS,
            staking_pool_share_bps: fees::STAKING_POOL_SHARE_BPS,
            min_scaling_factor: stability_pool::MIN_SCALING_FACTOR,
            emission_total: emission::TOTAL_EMISSION,
            emission_window_blocks: emission::WINDOW_BLOCKS,
        }
    }
}

impl ProtocolConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> SbrResult<()> {
        let bps_fields = [
            ("liquidation_fee_bps", self.liquidation_fee_bps),
            ("redemption_fee_bps", self.redemption_fee_bps),
            ("redemption_owner_share_bps", self.redemption_owner_share_bps),
            ("staking_pool_share_bps", self.staking_pool_share_bps),
        ];
        for (param, value) in bps_fields {
            if value > fees::BASIS_POINTS_DIVISOR {
                return Err(SbrError::InvalidConfig { param });
            }
        }
        if self.mcr_bps < fees::BASIS_POINTS_DIVISOR {
            return Err(SbrError::InvalidConfig { param: "mcr_bps" });
        }
        if self.min_scaling_factor == 0 || self.min_scaling_factor >= PRECISION {
            return Err(SbrError::InvalidConfig { param: "min_scaling_factor" });
        }
        if self.emission_window_blocks == 0 {
            return Err(SbrError::InvalidConfig { param: "emission_window_blocks" });
        }
        Ok(())
    }
}
