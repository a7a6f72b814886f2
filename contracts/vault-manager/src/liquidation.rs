//! Liquidation Engine
//!
//! Removes the riskiest position (the tail of the liquidation queue) once it
//! is below the minimum collateral ratio.
//!
//! ## Paths
//!
//! 1. **Stability pool**: if the pool holds at least the position's debt, the
//!    pool burns that debt and receives the collateral net of the fee.
//! 2. **Redistribution**: otherwise the debt and collateral are spread over the
//!    remaining positions pro rata to their collateral by bumping the global
//!    per-unit accumulators. The shares are then settled into every remaining
//!    position before the liquidation returns, so each liquidation key is the
//!    position's current ratio.
//!
//! In both paths the liquidator is refunded gas out of the liquidation fee and
//! the rest of the fee goes through the fee distributor.

use log::{info, warn};

use sbr_common::{
    constants::{index::NULL_ID, liquidation::MIN_REDISTRIBUTION_COLLATERAL, precision::PRECISION},
    errors::{SbrError, SbrResult},
    events::{LiquidationPath, SbrEvent},
    math::{bps_of, distribute_per_unit, is_liquidatable, safe_add, safe_sub},
    oracle::PriceFeed,
    types::{Address, Asset, PositionId},
};
use sbr_stability_pool::ResetSnapshot;

use crate::context::ProtocolContext;
use crate::fees::FeeAsset;

/// Result of a single liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationOutcome {
    pub id: PositionId,
    pub path: LiquidationPath,
    /// Debt removed from the position
    pub debt: u128,
    /// Collateral seized from the position
    pub collateral: u128,
    pub liquidation_fee: u128,
    /// Part of the fee paid to the liquidator
    pub gas_refund: u128,
    /// Stability pool epoch closed by this liquidation, if any
    pub reset_epoch: Option<u64>,
}

impl ProtocolContext {
    /// Liquidate the position at the designated end of the liquidation queue.
    pub fn liquidate(&mut self, liquidator: Address, feed: &dyn PriceFeed) -> SbrResult<LiquidationOutcome> {
        self.atomically(|ctx| {
            // 1. Riskiest position
            let id = ctx
                .liquidation_index
                .first_to_process()
                .ok_or(SbrError::NothingToLiquidate)?;
            ctx.accrue(id)?;

            // 2. Health at the current price
            let position = ctx.position(id)?;
            let (owner, debt, collateral) = (position.owner, position.debt, position.collateral);
            let price = feed.collateral_price()?;
            if !is_liquidatable(collateral, debt, price, ctx.config.mcr_bps)? {
                return Err(SbrError::NotLiquidatable { id });
            }

            // 3. Fee split
            let liquidation_fee = bps_of(collateral, ctx.config.liquidation_fee_bps)?;
            let gas_refund = liquidation_fee.min(ctx.config.gas_overhead_estimate);
            let seized = safe_sub(collateral, liquidation_fee)?;

            // 4. Remove from the ledger; the collateral is accounted below
            ctx.positions.remove(&id);
            ctx.accrual.total_debt = safe_sub(ctx.accrual.total_debt, debt)?;
            ctx.accrual.total_collateral = safe_sub(ctx.accrual.total_collateral, collateral)?;
            ctx.unindex(id)?;

            // 5. Settle the debt
            let (path, reset_epoch) = if ctx.stability_pool.can_accept()
                && ctx.stability_pool.total_staked >= debt
            {
                let outcome = ctx.stability_pool.absorb_loss(debt, seized)?;
                let reset_epoch = outcome.reset.map(|(epoch, snapshot)| {
                    ctx.emit_reset(epoch, snapshot);
                    epoch
                });
                (LiquidationPath::StabilityPool, reset_epoch)
            } else {
                ctx.redistribute(id, debt, seized)?;
                (LiquidationPath::Redistribution, None)
            };

            // 6. Pay the liquidator and route the fee
            ctx.balances.credit(&liquidator, Asset::Collateral, gas_refund)?;
            ctx.route_fee(liquidator, FeeAsset::Collateral, liquidation_fee - gas_refund)?;

            ctx.emit(SbrEvent::Liquidated {
                id,
                owner,
                liquidator,
                path,
                debt,
                collateral,
                liquidation_fee,
                gas_refund,
                block_height: ctx.block_height,
            });
            info!(
                "liquidated position {} via {:?}: debt {}, collateral {}",
                id, path, debt, collateral
            );

            Ok(LiquidationOutcome {
                id,
                path,
                debt,
                collateral,
                liquidation_fee,
                gas_refund,
                reset_epoch,
            })
        })
    }

    /// Socialize `debt` and `collateral` over the collateral still on the
    /// ledger.
    fn redistribute(&mut self, id: PositionId, debt: u128, collateral: u128) -> SbrResult<()> {
        let base = self.accrual.total_collateral;
        if base < MIN_REDISTRIBUTION_COLLATERAL {
            warn!("position {} cannot be redistributed: {} collateral left", id, base);
            return Err(SbrError::CannotRedistribute { id });
        }
        warn!(
            "stability pool short ({} < {}), redistributing position {}",
            self.stability_pool.total_staked, debt, id
        );

        let accrual = &mut self.accrual;

        let carry_in = accrual.debt_loss;
        let d = distribute_per_unit(debt, base, PRECISION, carry_in)
            .map_err(|err| too_concentrated(id, err))?;
        accrual.cumulative_debt_per_unit = safe_add(accrual.cumulative_debt_per_unit, d.per_unit_delta)?;
        accrual.pending_debt = safe_add(
            accrual.pending_debt,
            safe_sub(safe_add(debt, carry_in)?, d.carry_loss)?,
        )?;
        accrual.debt_loss = d.carry_loss;

        let carry_in = accrual.collateral_loss;
        let c = distribute_per_unit(collateral, base, PRECISION, carry_in)
            .map_err(|err| too_concentrated(id, err))?;
        accrual.cumulative_collateral_per_unit =
            safe_add(accrual.cumulative_collateral_per_unit, c.per_unit_delta)?;
        accrual.pending_collateral = safe_add(
            accrual.pending_collateral,
            safe_sub(safe_add(collateral, carry_in)?, c.carry_loss)?,
        )?;
        accrual.collateral_loss = c.carry_loss;

        self.settle_redistribution()
    }

    /// Accrue every position and re-key the ones whose values moved.
    ///
    /// Queued positions are walked head to tail with the previous one as the
    /// splice hint: a pro-rata share keeps their relative order, so each
    /// splice lands next to the hint. Debt-free positions that picked up debt
    /// join both queues here.
    fn settle_redistribution(&mut self) -> SbrResult<()> {
        let queued: Vec<PositionId> = self.liquidation_index.iter().map(|(id, _)| id).collect();
        let mut hint = NULL_ID;
        for id in queued {
            if !self.accrue(id)?.is_zero() {
                self.reindex(id, hint)?;
            }
            hint = id;
        }

        let debt_free: Vec<PositionId> = self
            .positions
            .values()
            .filter(|p| p.debt == 0)
            .map(|p| p.id)
            .collect();
        for id in debt_free {
            if !self.accrue(id)?.is_zero() {
                self.reindex(id, NULL_ID)?;
            }
        }
        Ok(())
    }

    fn emit_reset(&mut self, epoch: u64, snapshot: ResetSnapshot) {
        self.emit(SbrEvent::ScalingFactorReset {
            epoch,
            scaling_factor: snapshot.scaling_factor,
            reward_per_token: snapshot.per_token.reward,
            collateral_per_token: snapshot.per_token.collateral,
            sbr_per_token: snapshot.per_token.sbr,
            block_height: self.block_height,
        });
    }
}

/// A per-unit share too large for the accumulators means the collateral
/// left is too concentrated to absorb the position.
fn too_concentrated(id: PositionId, err: SbrError) -> SbrError {
    match err {
        SbrError::Overflow => {
            warn!("position {} cannot be redistributed: per-unit share overflows", id);
            SbrError::CannotRedistribute { id }
        }
        other => other,
    }
}
