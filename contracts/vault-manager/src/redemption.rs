//! Redemption Engine
//!
//! Exchanges debt tokens for collateral by walking the redemption queue from
//! the lowest fee weight. Only available once the system is in Normal mode.

use log::{debug, info};

use sbr_common::{
    constants::index::NULL_ID,
    errors::{SbrError, SbrResult},
    events::SbrEvent,
    math::{bps_of, mul_div, safe_add, safe_sub},
    types::{Address, Asset, PositionId, SystemMode},
};

use crate::context::ProtocolContext;
use crate::fees::FeeAsset;
use crate::ledger::require_positive;

/// How much of the requested amount was redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionFill {
    Full,
    /// Queue exhausted with `unfilled` debt tokens left over
    Partial { unfilled: u128 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedemptionOutcome {
    pub fill: RedemptionFill,
    /// Debt tokens burned
    pub redeemed: u128,
    /// Collateral taken out of positions, fee included
    pub collateral_drawn: u128,
    pub fee: u128,
    pub owner_fee: u128,
    pub redeemer_fee: u128,
    /// Fee returned to the redeemer because the stability pool was empty
    pub refunded: u128,
    pub positions_touched: u32,
}

impl ProtocolContext {
    /// Redeem up to `amount` debt tokens for collateral.
    ///
    /// `hint` seeds the liquidation-queue splice of the last partially
    /// redeemed position.
    pub fn redeem(&mut self, redeemer: Address, amount: u128, hint: PositionId) -> SbrResult<RedemptionOutcome> {
        self.atomically(|ctx| {
            // 1. Validate
            require_positive(amount)?;
            if ctx.accrual.mode != SystemMode::Normal {
                return Err(SbrError::RedemptionsDisabled);
            }
            let available = ctx.balances.balance_of(&redeemer, Asset::DebtToken);
            if available < amount {
                return Err(SbrError::InsufficientBalance { available, requested: amount });
            }

            // 2. Walk the queue
            let mut remaining = amount;
            let mut collateral_drawn = 0u128;
            let mut positions_touched = 0u32;
            let mut cursor = ctx.redemption_index.first_to_process();

            while let Some(id) = cursor {
                if remaining == 0 {
                    break;
                }
                cursor = ctx.redemption_index.next_to_process(id)?;

                let delta = ctx.accrue(id)?;
                let (owner, debt, collateral) = {
                    let p = ctx.position(id)?;
                    (p.owner, p.debt, p.collateral)
                };

                let take = if remaining >= debt {
                    debt
                } else {
                    remaining.min(debt.saturating_sub(ctx.config.minimum_debt))
                };
                if take == 0 {
                    debug!("redemption skips position {}: at minimum debt", id);
                    if !delta.is_zero() {
                        ctx.reindex(id, NULL_ID)?;
                    }
                    continue;
                }

                let drawn = mul_div(take, collateral, debt)?;
                let position = ctx.position_mut(id)?;
                position.debt = safe_sub(debt, take)?;
                position.collateral = safe_sub(collateral, drawn)?;
                let closed = position.debt == 0;
                let leftover = position.collateral;

                ctx.accrual.total_debt = safe_sub(ctx.accrual.total_debt, take)?;
                ctx.accrual.total_collateral = safe_sub(ctx.accrual.total_collateral, drawn)?;
                if closed {
                    ctx.remove_position(id, owner, leftover)?;
                } else {
                    ctx.reindex(id, hint)?;
                }

                ctx.emit(SbrEvent::PositionRedeemed {
                    id,
                    debt_redeemed: take,
                    collateral_drawn: drawn,
                    closed,
                    block_height: ctx.block_height,
                });
                remaining -= take;
                collateral_drawn = safe_add(collateral_drawn, drawn)?;
                positions_touched += 1;
            }

            // 3. Burn and pay out
            let redeemed = amount - remaining;
            if redeemed > 0 {
                ctx.balances.debit(&redeemer, Asset::DebtToken, redeemed)?;
            }

            let fee = bps_of(collateral_drawn, ctx.config.redemption_fee_bps)?;
            let owner_fee = bps_of(fee, ctx.config.redemption_owner_share_bps)?;
            let redeemer_fee = fee - owner_fee;
            let mut refunded = 0;
            for share in [owner_fee, redeemer_fee] {
                if !ctx.route_to_stability_pool(redeemer, FeeAsset::Collateral, share)? {
                    refunded += share;
                }
            }
            ctx.balances
                .credit(&redeemer, Asset::Collateral, safe_sub(collateral_drawn, fee)?)?;

            ctx.emit(SbrEvent::RedemptionCompleted {
                redeemer,
                requested: amount,
                redeemed,
                collateral_drawn,
                fee,
                positions_touched,
                block_height: ctx.block_height,
            });
            info!(
                "redeemed {} of {} debt for {} collateral over {} positions",
                redeemed, amount, collateral_drawn, positions_touched
            );

            let fill = if remaining == 0 {
                RedemptionFill::Full
            } else {
                RedemptionFill::Partial { unfilled: remaining }
            };
            Ok(RedemptionOutcome {
                fill,
                redeemed,
                collateral_drawn,
                fee,
                owner_fee,
                redeemer_fee,
                refunded,
                positions_touched,
            })
        })
    }
}
