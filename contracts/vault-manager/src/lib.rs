//! sbr Vault Manager
//!
//! Position ledger and the engines that act on it: liquidation, redemption,
//! fee routing and the pool entry points. All of them operate on one
//! [`ProtocolContext`] passed by `&mut`.
//!
//! ## Core Operations
//!
//! - **OpenPosition / ClosePosition**: create a debt-free position, or close it
//!   and take the collateral back
//! - **Borrow / Repay**: mint or burn debt against a position
//! - **AddCollateral / WithdrawCollateral**: move collateral (health-checked)
//! - **FeeTopup**: raise the fee weight to move back in the redemption queue
//! - **Liquidate**: remove the riskiest position through the stability pool
//!   or by redistribution
//! - **Redeem**: exchange debt tokens for collateral, lowest fee weight first
//! - **Stake / Unstake / Claim**: stability pool and sbr staking pool
//!
//! ## Execution Model
//!
//! Operations run one at a time. Each public entry point is atomic: it either
//! completes or leaves the context exactly as it was. [`execute_batch`] runs a
//! sequence of [`Action`]s, collecting recoverable failures and rolling back
//! the whole batch on the first fatal one.

use borsh::{BorshDeserialize, BorshSerialize};
use log::error;
use serde::{Deserialize, Serialize};

use sbr_common::{
    errors::SbrResult,
    oracle::PriceFeed,
    types::{AccrualDelta, Address, PositionId},
};
use sbr_stability_pool::Gains;

pub mod context;
pub mod fees;
pub mod ledger;
pub mod liquidation;
pub mod pool_ops;
pub mod redemption;

#[cfg(test)]
mod integration_tests;

pub use context::ProtocolContext;
pub use fees::{split_fee, FeeAsset, FeeRouting};
pub use liquidation::LiquidationOutcome;
pub use redemption::{RedemptionFill, RedemptionOutcome};

// ============ Actions ============

/// One call into the protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Action {
    OpenPosition { owner: Address, collateral: u128 },
    Borrow { caller: Address, id: PositionId, amount: u128, fee_rate_bps: u128 },
    Repay { caller: Address, id: PositionId, amount: u128 },
    AddCollateral { caller: Address, id: PositionId, amount: u128 },
    WithdrawCollateral { caller: Address, id: PositionId, amount: u128 },
    FeeTopup { caller: Address, id: PositionId, amount: u128 },
    ClosePosition { caller: Address, id: PositionId },
    SyncPosition { id: PositionId },
    Liquidate { liquidator: Address },
    Redeem { redeemer: Address, amount: u128, hint: PositionId },
    StabilityStake { depositor: Address, amount: u128 },
    StabilityUnstake { depositor: Address, amount: u128 },
    StabilityClaim { depositor: Address },
    StakingStake { staker: Address, amount: u128 },
    StakingUnstake { staker: Address, amount: u128 },
    StakingClaim { staker: Address },
    DistributeFee { payer: Address, asset: FeeAsset, fee: u128 },
    AdvanceTo { block: u64 },
}

/// What a successful [`Action`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Opened { id: PositionId },
    Borrowed { fee: u128 },
    Closed { collateral: u128 },
    Synced(AccrualDelta),
    Liquidated(LiquidationOutcome),
    Redeemed(RedemptionOutcome),
    /// Stake left after a stake or unstake
    Stake(u128),
    Claimed(Gains),
    FeeRouted(FeeRouting),
    Done,
}

/// Dispatch a single action
pub fn execute(ctx: &mut ProtocolContext, feed: &dyn PriceFeed, action: &Action) -> SbrResult<ActionOutcome> {
    match *action {
        Action::OpenPosition { owner, collateral } => {
            ctx.open_position(owner, collateral).map(|id| ActionOutcome::Opened { id })
        }
        Action::Borrow { caller, id, amount, fee_rate_bps } => ctx
            .borrow(caller, id, amount, fee_rate_bps, feed)
            .map(|fee| ActionOutcome::Borrowed { fee }),
        Action::Repay { caller, id, amount } => {
            ctx.repay(caller, id, amount).map(|_| ActionOutcome::Done)
        }
        Action::AddCollateral { caller, id, amount } => {
            ctx.add_collateral(caller, id, amount).map(|_| ActionOutcome::Done)
        }
        Action::WithdrawCollateral { caller, id, amount } => ctx
            .withdraw_collateral(caller, id, amount, feed)
            .map(|_| ActionOutcome::Done),
        Action::FeeTopup { caller, id, amount } => {
            ctx.fee_topup(caller, id, amount).map(|_| ActionOutcome::Done)
        }
        Action::ClosePosition { caller, id } => ctx
            .close_position(caller, id)
            .map(|collateral| ActionOutcome::Closed { collateral }),
        Action::SyncPosition { id } => ctx.sync_position(id).map(ActionOutcome::Synced),
        Action::Liquidate { liquidator } => {
            ctx.liquidate(liquidator, feed).map(ActionOutcome::Liquidated)
        }
        Action::Redeem { redeemer, amount, hint } => {
            ctx.redeem(redeemer, amount, hint).map(ActionOutcome::Redeemed)
        }
        Action::StabilityStake { depositor, amount } => {
            ctx.stability_stake(depositor, amount).map(ActionOutcome::Stake)
        }
        Action::StabilityUnstake { depositor, amount } => {
            ctx.stability_unstake(depositor, amount).map(ActionOutcome::Stake)
        }
        Action::StabilityClaim { depositor } => {
            ctx.stability_claim(depositor).map(ActionOutcome::Claimed)
        }
        Action::StakingStake { staker, amount } => {
            ctx.staking_stake(staker, amount).map(ActionOutcome::Stake)
        }
        Action::StakingUnstake { staker, amount } => {
            ctx.staking_unstake(staker, amount).map(ActionOutcome::Stake)
        }
        Action::StakingClaim { staker } => ctx.staking_claim(staker).map(ActionOutcome::Claimed),
        Action::DistributeFee { payer, asset, fee } => {
            ctx.distribute_fee(payer, asset, fee).map(ActionOutcome::FeeRouted)
        }
        Action::AdvanceTo { block } => ctx.advance_to(block).map(|_| ActionOutcome::Done),
    }
}

/// Run `actions` in order.
///
/// Recoverable failures are reported per action and leave that action without
/// effect. A fatal failure, or a broken queue invariant after the last action,
/// restores the context to its state before the batch and is returned as the
/// batch error.
pub fn execute_batch(
    ctx: &mut ProtocolContext,
    feed: &dyn PriceFeed,
    actions: &[Action],
) -> SbrResult<Vec<SbrResult<ActionOutcome>>> {
    let checkpoint = ctx.checkpoint();
    let mut results = Vec::with_capacity(actions.len());

    for (i, action) in actions.iter().enumerate() {
        let result = execute(ctx, feed, action);
        if let Err(err) = &result {
            if err.is_fatal() {
                error!("batch aborted at action {}: {}", i, err);
                ctx.restore(checkpoint);
                return Err(err.clone());
            }
        }
        results.push(result);
    }

    if let Err(err) = ctx.check_invariants() {
        error!("batch left the queues inconsistent: {}", err);
        ctx.restore(checkpoint);
        return Err(err);
    }
    Ok(results)
}
