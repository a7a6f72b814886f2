//! Position Ledger
//!
//! Open, borrow, repay, collateral moves, fee top-ups and close. Every entry
//! point follows the same shape: accrue pending redistribution into the
//! position, validate, mutate, re-key the queues.

use log::{debug, info};

use sbr_common::{
    constants::{fees::BASIS_POINTS_DIVISOR, index::NULL_ID, precision::PRECISION},
    errors::{AmountErrorReason, SbrError, SbrResult},
    events::SbrEvent,
    math::{bps_of, collateral_value, is_liquidatable, mul_div, safe_add, safe_sub},
    oracle::PriceFeed,
    types::{AccrualDelta, Address, Asset, Position, PositionId, SystemMode},
};

use crate::context::ProtocolContext;
use crate::fees::FeeAsset;

impl ProtocolContext {
    /// Apply pending global accrual to `id` and re-key it.
    pub fn sync_position(&mut self, id: PositionId) -> SbrResult<AccrualDelta> {
        self.atomically(|ctx| {
            let delta = ctx.accrue(id)?;
            if !delta.is_zero() {
                ctx.reindex(id, NULL_ID)?;
            }
            Ok(delta)
        })
    }

    /// Open a debt-free position holding `collateral`
    pub fn open_position(&mut self, owner: Address, collateral: u128) -> SbrResult<PositionId> {
        self.atomically(|ctx| {
            require_positive(collateral)?;

            let id = ctx.next_id;
            ctx.next_id = ctx.next_id.checked_add(1).ok_or(SbrError::Overflow)?;
            ctx.accrual.total_collateral = safe_add(ctx.accrual.total_collateral, collateral)?;
            ctx.positions.insert(id, Position::new(id, owner, collateral, &ctx.accrual));

            ctx.emit(SbrEvent::PositionOpened {
                id,
                owner,
                collateral,
                block_height: ctx.block_height,
            });
            debug!("opened position {} with {} collateral", id, collateral);
            Ok(id)
        })
    }

    /// Borrow `amount` against a position, paying `fee_rate_bps` of it as fee.
    ///
    /// The debt grows by the full amount; the borrower receives it net of the
    /// fee. Returns the fee.
    pub fn borrow(
        &mut self,
        caller: Address,
        id: PositionId,
        amount: u128,
        fee_rate_bps: u128,
        feed: &dyn PriceFeed,
    ) -> SbrResult<u128> {
        self.atomically(|ctx| {
            // 1. Validate inputs and ownership
            require_positive(amount)?;
            if fee_rate_bps > BASIS_POINTS_DIVISOR {
                return Err(SbrError::InvalidAmount {
                    amount: fee_rate_bps,
                    reason: AmountErrorReason::TooLarge,
                });
            }
            ctx.owned_position(&caller, id)?;

            // 2. Accrue
            ctx.accrue(id)?;
            let position = ctx.position(id)?;
            let new_debt = safe_add(position.debt, amount)?;
            let collateral = position.collateral;

            // 3. Minimum debt and health
            ctx.require_minimum_debt(new_debt)?;
            ctx.require_healthy(collateral, new_debt, feed)?;

            // 4. Mutate
            let fee = bps_of(amount, fee_rate_bps)?;
            let position = ctx.position_mut(id)?;
            position.debt = new_debt;
            position.total_borrowed_lifetime = safe_add(position.total_borrowed_lifetime, amount)?;
            ctx.accrual.total_debt = safe_add(ctx.accrual.total_debt, amount)?;

            // 5. Pay out and route the fee
            ctx.balances.credit(&caller, Asset::DebtToken, safe_sub(amount, fee)?)?;
            ctx.route_fee(caller, FeeAsset::DebtToken, fee)?;

            // 6. Re-key and check mode
            ctx.reindex(id, NULL_ID)?;
            ctx.update_mode();

            ctx.emit(SbrEvent::Borrowed {
                id,
                amount,
                fee,
                new_debt,
                block_height: ctx.block_height,
            });
            Ok(fee)
        })
    }

    /// Repay `amount` of debt from the caller's debt tokens
    pub fn repay(&mut self, caller: Address, id: PositionId, amount: u128) -> SbrResult<()> {
        self.atomically(|ctx| {
            require_positive(amount)?;
            ctx.owned_position(&caller, id)?;
            ctx.accrue(id)?;

            let debt = ctx.position(id)?.debt;
            if amount > debt {
                return Err(SbrError::ExceedsDebt { debt, requested: amount });
            }
            let new_debt = debt - amount;
            if new_debt > 0 {
                ctx.require_minimum_debt(new_debt)?;
            }

            ctx.balances.debit(&caller, Asset::DebtToken, amount)?;
            ctx.position_mut(id)?.debt = new_debt;
            ctx.accrual.total_debt = safe_sub(ctx.accrual.total_debt, amount)?;
            ctx.reindex(id, NULL_ID)?;

            ctx.emit(SbrEvent::Repaid {
                id,
                amount,
                new_debt,
                block_height: ctx.block_height,
            });
            Ok(())
        })
    }

    pub fn add_collateral(&mut self, caller: Address, id: PositionId, amount: u128) -> SbrResult<()> {
        self.atomically(|ctx| {
            require_positive(amount)?;
            ctx.owned_position(&caller, id)?;
            ctx.accrue(id)?;

            let position = ctx.position_mut(id)?;
            position.collateral = safe_add(position.collateral, amount)?;
            let new_collateral = position.collateral;
            ctx.accrual.total_collateral = safe_add(ctx.accrual.total_collateral, amount)?;
            ctx.reindex(id, NULL_ID)?;

            ctx.emit(SbrEvent::CollateralAdded {
                id,
                amount,
                new_collateral,
                block_height: ctx.block_height,
            });
            Ok(())
        })
    }

    pub fn withdraw_collateral(
        &mut self,
        caller: Address,
        id: PositionId,
        amount: u128,
        feed: &dyn PriceFeed,
    ) -> SbrResult<()> {
        self.atomically(|ctx| {
            require_positive(amount)?;
            ctx.owned_position(&caller, id)?;
            ctx.accrue(id)?;

            let position = ctx.position(id)?;
            if amount > position.collateral {
                return Err(SbrError::ExceedsCollateral {
                    collateral: position.collateral,
                    requested: amount,
                });
            }
            let new_collateral = position.collateral - amount;
            let debt = position.debt;
            ctx.require_healthy(new_collateral, debt, feed)?;

            ctx.position_mut(id)?.collateral = new_collateral;
            ctx.accrual.total_collateral = safe_sub(ctx.accrual.total_collateral, amount)?;
            ctx.balances.credit(&caller, Asset::Collateral, amount)?;
            ctx.reindex(id, NULL_ID)?;

            ctx.emit(SbrEvent::CollateralWithdrawn {
                id,
                amount,
                new_collateral,
                block_height: ctx.block_height,
            });
            Ok(())
        })
    }

    /// Pay `amount` debt tokens into the fee distributor to raise the
    /// position's fee weight, moving it back in the redemption queue.
    pub fn fee_topup(&mut self, caller: Address, id: PositionId, amount: u128) -> SbrResult<()> {
        self.atomically(|ctx| {
            require_positive(amount)?;
            ctx.owned_position(&caller, id)?;
            ctx.accrue(id)?;

            ctx.balances.debit(&caller, Asset::DebtToken, amount)?;
            let position = ctx.position_mut(id)?;
            position.fee_weight = safe_add(position.fee_weight, amount)?;
            let new_fee_weight = position.fee_weight;

            ctx.route_fee(caller, FeeAsset::DebtToken, amount)?;
            ctx.reindex(id, NULL_ID)?;

            ctx.emit(SbrEvent::FeeToppedUp {
                id,
                amount,
                new_fee_weight,
                block_height: ctx.block_height,
            });
            Ok(())
        })
    }

    /// Close a debt-free position and pay its collateral to the owner
    pub fn close_position(&mut self, caller: Address, id: PositionId) -> SbrResult<u128> {
        self.atomically(|ctx| {
            ctx.owned_position(&caller, id)?;
            ctx.accrue(id)?;

            let position = ctx.position(id)?;
            if position.debt > 0 {
                return Err(SbrError::CollateralNotEmpty { remaining_debt: position.debt });
            }
            let collateral = position.collateral;
            ctx.remove_position(id, caller, collateral)?;
            Ok(collateral)
        })
    }

    // ============ Internal ============

    /// Apply global redistribution to a single position.
    ///
    /// Idempotent: a second call without an intervening redistribution
    /// returns zero deltas.
    pub(crate) fn accrue(&mut self, id: PositionId) -> SbrResult<AccrualDelta> {
        let snapshot = self.accrual.snapshot();
        let block_height = self.block_height;
        let position = self.position_mut(id)?;
        if position.snapshot == snapshot {
            return Ok(AccrualDelta::default());
        }

        let debt_per_unit = safe_sub(snapshot.debt_per_unit_seen, position.snapshot.debt_per_unit_seen)?;
        let collateral_per_unit = safe_sub(
            snapshot.collateral_per_unit_seen,
            position.snapshot.collateral_per_unit_seen,
        )?;
        let delta = AccrualDelta {
            debt_increase: mul_div(position.collateral, debt_per_unit, PRECISION)?,
            collateral_increase: mul_div(position.collateral, collateral_per_unit, PRECISION)?,
        };

        position.debt = safe_add(position.debt, delta.debt_increase)?;
        position.collateral = safe_add(position.collateral, delta.collateral_increase)?;
        position.snapshot = snapshot;

        let accrual = &mut self.accrual;
        accrual.total_debt = safe_add(accrual.total_debt, delta.debt_increase)?;
        accrual.total_collateral = safe_add(accrual.total_collateral, delta.collateral_increase)?;
        // floor rounding can leave the sum of shares one unit above the pool
        accrual.pending_debt = accrual.pending_debt.saturating_sub(delta.debt_increase);
        accrual.pending_collateral = accrual.pending_collateral.saturating_sub(delta.collateral_increase);

        if !delta.is_zero() {
            debug!(
                "accrued position {}: +{} debt, +{} collateral",
                id, delta.debt_increase, delta.collateral_increase
            );
            self.emit(SbrEvent::PositionAccrued {
                id,
                debt_increase: delta.debt_increase,
                collateral_increase: delta.collateral_increase,
                block_height,
            });
        }
        Ok(delta)
    }

    /// Drop a position from the ledger and queues, paying `payout` collateral
    /// to `recipient`.
    pub(crate) fn remove_position(&mut self, id: PositionId, recipient: Address, payout: u128) -> SbrResult<()> {
        let position = self.positions.remove(&id).ok_or(SbrError::PositionNotFound { id })?;
        self.accrual.total_debt = safe_sub(self.accrual.total_debt, position.debt)?;
        self.accrual.total_collateral = safe_sub(self.accrual.total_collateral, position.collateral)?;
        self.unindex(id)?;
        self.balances.credit(&recipient, Asset::Collateral, payout)?;

        self.emit(SbrEvent::PositionClosed {
            id,
            owner: position.owner,
            collateral_returned: payout,
            block_height: self.block_height,
        });
        Ok(())
    }

    pub(crate) fn require_minimum_debt(&self, debt: u128) -> SbrResult<()> {
        if debt < self.config.minimum_debt {
            return Err(SbrError::DebtTooLow {
                debt,
                minimum: self.config.minimum_debt,
            });
        }
        Ok(())
    }

    fn require_healthy(&self, collateral: u128, debt: u128, feed: &dyn PriceFeed) -> SbrResult<()> {
        if debt == 0 {
            return Ok(());
        }
        let price = feed.collateral_price()?;
        if is_liquidatable(collateral, debt, price, self.config.mcr_bps)? {
            return Err(SbrError::Undercollateralized {
                collateral_value: collateral_value(collateral, price)?,
                debt,
                mcr_bps: self.config.mcr_bps,
            });
        }
        Ok(())
    }

    /// Leave Bootstrap for good once total debt crosses the threshold
    fn update_mode(&mut self) {
        if self.accrual.mode == SystemMode::Bootstrap
            && self.accrual.total_debt > self.config.bootstrap_debt_threshold
        {
            self.accrual.mode = SystemMode::Normal;
            info!("system mode Normal at total debt {}", self.accrual.total_debt);
            self.emit(SbrEvent::ModeChanged {
                total_debt: self.accrual.total_debt,
                block_height: self.block_height,
            });
        }
    }
}

pub(crate) fn require_positive(amount: u128) -> SbrResult<()> {
    if amount == 0 {
        return Err(SbrError::InvalidAmount { amount, reason: AmountErrorReason::Zero });
    }
    Ok(())
}
