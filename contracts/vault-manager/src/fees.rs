//! Fee Distributor
//!
//! Splits protocol fees between the sbr staking pool and the stability pool.
//! A share whose target has no stake goes back to the payer.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use sbr_common::{
    errors::SbrResult,
    events::{PoolKind, SbrEvent},
    math::{bps_of, safe_add, safe_sub},
    types::{Address, Asset},
};

use crate::context::ProtocolContext;

/// Assets a fee can be paid in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum FeeAsset {
    DebtToken,
    Collateral,
}

impl FeeAsset {
    pub fn asset(self) -> Asset {
        match self {
            FeeAsset::DebtToken => Asset::DebtToken,
            FeeAsset::Collateral => Asset::Collateral,
        }
    }
}

/// Where a fee went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeRouting {
    pub to_staking_pool: u128,
    pub to_stability_pool: u128,
    pub refunded: u128,
}

/// Split `fee` into `(staking share, stability share)`
pub fn split_fee(fee: u128, staking_share_bps: u128) -> SbrResult<(u128, u128)> {
    let staking = bps_of(fee, staking_share_bps)?;
    Ok((staking, safe_sub(fee, staking)?))
}

impl ProtocolContext {
    /// Route `fee` to the pools. The payer must already have been charged.
    pub fn distribute_fee(&mut self, payer: Address, asset: FeeAsset, fee: u128) -> SbrResult<FeeRouting> {
        self.atomically(|ctx| ctx.route_fee(payer, asset, fee))
    }

    pub(crate) fn route_fee(&mut self, payer: Address, asset: FeeAsset, fee: u128) -> SbrResult<FeeRouting> {
        let mut routing = FeeRouting::default();
        if fee == 0 {
            return Ok(routing);
        }
        let (staking_share, stability_share) = split_fee(fee, self.config.staking_pool_share_bps)?;

        if staking_share > 0 {
            if self.staking_pool.can_accept() {
                match asset {
                    FeeAsset::DebtToken => self.staking_pool.add_reward(staking_share)?,
                    FeeAsset::Collateral => self.staking_pool.add_collateral_reward(staking_share)?,
                }
                self.emit(SbrEvent::RewardAdded {
                    pool: PoolKind::Staking,
                    asset: asset.asset(),
                    amount: staking_share,
                    block_height: self.block_height,
                });
                routing.to_staking_pool = staking_share;
            } else {
                self.refund(payer, asset, staking_share)?;
                routing.refunded = staking_share;
            }
        }

        if self.route_to_stability_pool(payer, asset, stability_share)? {
            routing.to_stability_pool = stability_share;
        } else {
            routing.refunded = safe_add(routing.refunded, stability_share)?;
        }
        Ok(routing)
    }

    /// Deliver `amount` to the stability pool, or refund it to `payer` when
    /// nothing is staked. Returns true if the pool took it.
    pub(crate) fn route_to_stability_pool(
        &mut self,
        payer: Address,
        asset: FeeAsset,
        amount: u128,
    ) -> SbrResult<bool> {
        if amount == 0 {
            return Ok(true);
        }
        if !self.stability_pool.can_accept() {
            self.refund(payer, asset, amount)?;
            return Ok(false);
        }
        match asset {
            FeeAsset::DebtToken => self.stability_pool.add_reward(amount)?,
            FeeAsset::Collateral => self.stability_pool.add_collateral_reward(amount)?,
        }
        self.emit(SbrEvent::RewardAdded {
            pool: PoolKind::Stability,
            asset: asset.asset(),
            amount,
            block_height: self.block_height,
        });
        Ok(true)
    }

    fn refund(&mut self, payer: Address, asset: FeeAsset, amount: u128) -> SbrResult<()> {
        self.balances.credit(&payer, asset.asset(), amount)?;
        self.emit(SbrEvent::FeeRefunded {
            payer,
            asset: asset.asset(),
            amount,
            block_height: self.block_height,
        });
        Ok(())
    }
}
