//! Pool Operations
//!
//! Account-facing wrappers around the stability pool and the sbr staking
//! pool: move tokens through the balance book, pay out settled gains and
//! record events.

use log::info;

use sbr_common::{
    errors::SbrResult,
    events::{PoolKind, SbrEvent},
    types::{Address, Asset},
};
use sbr_stability_pool::{EmissionTransition, Gains};

use crate::context::ProtocolContext;

impl ProtocolContext {
    // ============ Stability Pool ============

    /// Deposit debt tokens into the stability pool. Returns the new stake.
    pub fn stability_stake(&mut self, depositor: Address, amount: u128) -> SbrResult<u128> {
        self.atomically(|ctx| {
            ctx.balances.debit(&depositor, Asset::DebtToken, amount)?;
            let update = ctx.stability_pool.stake(depositor, amount, ctx.block_height)?;

            ctx.pay_gains(PoolKind::Stability, depositor, update.gains)?;
            ctx.record_emission(update.emission);
            ctx.emit(SbrEvent::Staked {
                pool: PoolKind::Stability,
                depositor,
                amount,
                new_stake: update.stake,
                block_height: ctx.block_height,
            });
            Ok(update.stake)
        })
    }

    /// Withdraw debt tokens from the stability pool. Returns the remaining
    /// stake.
    pub fn stability_unstake(&mut self, depositor: Address, amount: u128) -> SbrResult<u128> {
        self.atomically(|ctx| {
            let update = ctx.stability_pool.unstake(depositor, amount, ctx.block_height)?;
            ctx.balances.credit(&depositor, Asset::DebtToken, amount)?;

            ctx.pay_gains(PoolKind::Stability, depositor, update.gains)?;
            ctx.record_emission(update.emission);
            ctx.emit(SbrEvent::Unstaked {
                pool: PoolKind::Stability,
                depositor,
                amount,
                remaining_stake: update.stake,
                block_height: ctx.block_height,
            });
            Ok(update.stake)
        })
    }

    /// Pay out collateral, reward and sbr gains without touching the stake.
    pub fn stability_claim(&mut self, depositor: Address) -> SbrResult<Gains> {
        self.atomically(|ctx| {
            let update = ctx.stability_pool.claim(depositor, ctx.block_height)?;
            ctx.pay_gains(PoolKind::Stability, depositor, update.gains)?;
            ctx.record_emission(update.emission);
            Ok(update.gains)
        })
    }

    // ============ Staking Pool ============

    /// Stake sbr. Returns the new stake.
    pub fn staking_stake(&mut self, staker: Address, amount: u128) -> SbrResult<u128> {
        self.atomically(|ctx| {
            ctx.balances.debit(&staker, Asset::Emission, amount)?;
            let update = ctx.staking_pool.stake(staker, amount)?;

            ctx.pay_gains(PoolKind::Staking, staker, update.gains)?;
            ctx.emit(SbrEvent::Staked {
                pool: PoolKind::Staking,
                depositor: staker,
                amount,
                new_stake: update.stake,
                block_height: ctx.block_height,
            });
            Ok(update.stake)
        })
    }

    pub fn staking_unstake(&mut self, staker: Address, amount: u128) -> SbrResult<u128> {
        self.atomically(|ctx| {
            let update = ctx.staking_pool.unstake(staker, amount)?;
            ctx.balances.credit(&staker, Asset::Emission, amount)?;

            ctx.pay_gains(PoolKind::Staking, staker, update.gains)?;
            ctx.emit(SbrEvent::Unstaked {
                pool: PoolKind::Staking,
                depositor: staker,
                amount,
                remaining_stake: update.stake,
                block_height: ctx.block_height,
            });
            Ok(update.stake)
        })
    }

    pub fn staking_claim(&mut self, staker: Address) -> SbrResult<Gains> {
        self.atomically(|ctx| {
            let update = ctx.staking_pool.claim(staker)?;
            ctx.pay_gains(PoolKind::Staking, staker, update.gains)?;
            Ok(update.gains)
        })
    }

    // ============ Internal ============

    fn pay_gains(&mut self, pool: PoolKind, depositor: Address, gains: Gains) -> SbrResult<()> {
        if gains.is_zero() {
            return Ok(());
        }
        self.balances.credit(&depositor, Asset::DebtToken, gains.reward)?;
        self.balances.credit(&depositor, Asset::Collateral, gains.collateral)?;
        self.balances.credit(&depositor, Asset::Emission, gains.sbr)?;

        self.emit(SbrEvent::Claimed {
            pool,
            depositor,
            reward: gains.reward,
            collateral: gains.collateral,
            sbr: gains.sbr,
            block_height: self.block_height,
        });
        Ok(())
    }

    fn record_emission(&mut self, transition: Option<EmissionTransition>) {
        match transition {
            Some(EmissionTransition::Started { block }) => {
                info!("sbr emission started at block {}", block);
                self.emit(SbrEvent::EmissionStarted { block_height: block });
            }
            Some(EmissionTransition::Ended { end_block, unallocated }) => {
                info!("sbr emission ended at block {}, {} unallocated", end_block, unallocated);
                self.emit(SbrEvent::EmissionEnded {
                    unallocated,
                    block_height: end_block,
                });
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbr_common::{
        constants::precision::ONE, errors::SbrError, events::EventType, ProtocolConfig,
    };
    use sbr_stability_pool::EmissionClaim;

    const ALICE: Address = [1u8; 32];
    const BOB: Address = [2u8; 32];

    fn ctx() -> ProtocolContext {
        let mut ctx = ProtocolContext::new(ProtocolConfig::default()).unwrap();
        ctx.balances.credit(&ALICE, Asset::DebtToken, 1_000 * ONE).unwrap();
        ctx.balances.credit(&BOB, Asset::Emission, 1_000 * ONE).unwrap();
        ctx
    }

    #[test]
    fn test_stake_moves_tokens() {
        let mut ctx = ctx();
        assert_eq!(ctx.stability_stake(ALICE, 400 * ONE).unwrap(), 400 * ONE);

        assert_eq!(ctx.balances.balance_of(&ALICE, Asset::DebtToken), 600 * ONE);
        assert_eq!(ctx.stability_pool.total_staked, 400 * ONE);
        assert_eq!(ctx.events.filter_by_type(EventType::EmissionStarted).len(), 1);
    }

    #[test]
    fn test_stake_without_balance_rolls_back() {
        let mut ctx = ctx();
        let before = ctx.state_digest().unwrap();

        let result = ctx.stability_stake(BOB, ONE);

        assert!(matches!(result, Err(SbrError::InsufficientBalance { .. })));
        assert_eq!(ctx.state_digest().unwrap(), before);
    }

    #[test]
    fn test_unstake_pays_rewards() {
        let mut ctx = ctx();
        ctx.stability_stake(ALICE, 1_000 * ONE).unwrap();
        ctx.distribute_fee(BOB, crate::fees::FeeAsset::DebtToken, 100 * ONE).unwrap();

        let remaining = ctx.stability_unstake(ALICE, 1_000 * ONE).unwrap();

        assert_eq!(remaining, 0);
        // 90% of the fee went to the stability pool
        assert_eq!(ctx.balances.balance_of(&ALICE, Asset::DebtToken), 1_090 * ONE);
        assert_eq!(ctx.stability_pool.depositor_count(), 0);
        assert!(!ctx.events.filter_by_type(EventType::Claimed).is_empty());
    }

    #[test]
    fn test_emission_claim_after_window() {
        let mut ctx = ctx();
        ctx.stability_stake(ALICE, 100 * ONE).unwrap();
        let window = ctx.config.emission_window_blocks;
        ctx.advance_to(window + 10).unwrap();

        let gains = ctx.stability_claim(ALICE).unwrap();

        assert!(gains.sbr > 0);
        assert!(gains.sbr <= ctx.config.emission_total);
        assert_eq!(ctx.balances.balance_of(&ALICE, Asset::Emission), gains.sbr);
        assert_eq!(ctx.events.filter_by_type(EventType::EmissionEnded).len(), 1);
        assert_eq!(
            ctx.stability_pool.depositor(&ALICE).unwrap().emission,
            EmissionClaim::Claimed
        );
    }

    #[test]
    fn test_staking_pool_collects_fees() {
        let mut ctx = ctx();
        ctx.staking_stake(BOB, 500 * ONE).unwrap();
        ctx.distribute_fee(ALICE, crate::fees::FeeAsset::Collateral, 100 * ONE).unwrap();

        let gains = ctx.staking_claim(BOB).unwrap();
        assert_eq!(gains.collateral, 10 * ONE);
        assert_eq!(ctx.balances.balance_of(&BOB, Asset::Collateral), 10 * ONE);

        assert_eq!(ctx.staking_unstake(BOB, 500 * ONE).unwrap(), 0);
        assert_eq!(ctx.balances.balance_of(&BOB, Asset::Emission), 1_000 * ONE);
        assert_eq!(
            ctx.staking_unstake(BOB, ONE),
            Err(SbrError::DepositNotFound { depositor: BOB })
        );
    }
}
