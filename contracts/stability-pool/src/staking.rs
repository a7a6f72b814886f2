//! sbr Staking Pool
//!
//! sbr holders stake sbr and earn the staking share of protocol fees, paid in
//! debt tokens and collateral. Stakes never deplete, so the scaling factor is
//! fixed at `PRECISION` and a staker's gain is
//! `stake * (per_token - snapshot) / PRECISION`.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use log::debug;
use serde::{Deserialize, Serialize};

use sbr_common::{
    constants::precision::PRECISION,
    errors::{AmountErrorReason, SbrError, SbrResult},
    math::{distribute_per_unit, mul_div, safe_add, safe_sub},
    types::Address,
};

use crate::pool::{Gains, PerToken};

/// Individual sbr stake
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Staker {
    pub stake: u128,
    /// Per-token values at the last update (the sbr stream is unused)
    pub snapshot: PerToken,
}

/// Outcome of a staker operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StakerUpdate {
    pub gains: Gains,
    pub stake: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StakingPool {
    pub total_staked: u128,
    pub per_token: PerToken,
    pub losses: PerToken,
    stakers: BTreeMap<Address, Staker>,
}

impl StakingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_accept(&self) -> bool {
        self.total_staked > 0
    }

    pub fn staker(&self, address: &Address) -> Option<&Staker> {
        self.stakers.get(address)
    }

    /// Unsettled fee rewards of `address`
    pub fn pending_gains(&self, address: &Address) -> SbrResult<Gains> {
        let Some(staker) = self.stakers.get(address) else {
            return Ok(Gains::default());
        };
        Ok(Gains {
            reward: mul_div(
                staker.stake,
                safe_sub(self.per_token.reward, staker.snapshot.reward)?,
                PRECISION,
            )?,
            collateral: mul_div(
                staker.stake,
                safe_sub(self.per_token.collateral, staker.snapshot.collateral)?,
                PRECISION,
            )?,
            sbr: 0,
        })
    }

    pub fn stake(&mut self, address: Address, amount: u128) -> SbrResult<StakerUpdate> {
        if amount == 0 {
            return Err(SbrError::InvalidAmount { amount, reason: AmountErrorReason::Zero });
        }
        let gains = self.pending_gains(&address)?;
        let current = self.stakers.get(&address).map_or(0, |s| s.stake);
        let stake = safe_add(current, amount)?;

        self.write(address, stake);
        self.total_staked = safe_add(self.total_staked, amount)?;
        debug!("staking pool stake {}, total {}", amount, self.total_staked);
        Ok(StakerUpdate { gains, stake })
    }

    pub fn unstake(&mut self, address: Address, amount: u128) -> SbrResult<StakerUpdate> {
        if amount == 0 {
            return Err(SbrError::InvalidAmount { amount, reason: AmountErrorReason::Zero });
        }
        let current = self
            .stakers
            .get(&address)
            .ok_or(SbrError::DepositNotFound { depositor: address })?
            .stake;
        if amount > current {
            return Err(SbrError::ExceedsStake { stake: current, requested: amount });
        }
        let gains = self.pending_gains(&address)?;
        let stake = current - amount;

        if stake == 0 {
            self.stakers.remove(&address);
        } else {
            self.write(address, stake);
        }
        self.total_staked = safe_sub(self.total_staked, amount)?;
        Ok(StakerUpdate { gains, stake })
    }

    pub fn claim(&mut self, address: Address) -> SbrResult<StakerUpdate> {
        let stake = self
            .stakers
            .get(&address)
            .ok_or(SbrError::DepositNotFound { depositor: address })?
            .stake;
        let gains = self.pending_gains(&address)?;
        self.write(address, stake);
        Ok(StakerUpdate { gains, stake })
    }

    /// Distribute debt-token fees over the sbr stake
    pub fn add_reward(&mut self, amount: u128) -> SbrResult<()> {
        let (delta, carry) = self.distribute(amount, self.losses.reward)?;
        self.per_token.reward = safe_add(self.per_token.reward, delta)?;
        self.losses.reward = carry;
        Ok(())
    }

    /// Distribute collateral fees over the sbr stake
    pub fn add_collateral_reward(&mut self, amount: u128) -> SbrResult<()> {
        let (delta, carry) = self.distribute(amount, self.losses.collateral)?;
        self.per_token.collateral = safe_add(self.per_token.collateral, delta)?;
        self.losses.collateral = carry;
        Ok(())
    }

    fn distribute(&self, amount: u128, carry: u128) -> SbrResult<(u128, u128)> {
        if amount == 0 {
            return Ok((0, carry));
        }
        if !self.can_accept() {
            return Err(SbrError::InsufficientPoolBalance { available: 0, required: amount });
        }
        let d = distribute_per_unit(amount, self.total_staked, PRECISION, carry)?;
        Ok((d.per_unit_delta, d.carry_loss))
    }

    fn write(&mut self, address: Address, stake: u128) {
        self.stakers.insert(
            address,
            Staker {
                stake,
                snapshot: self.per_token,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbr_common::constants::precision::ONE;

    const ALICE: Address = [1u8; 32];
    const BOB: Address = [2u8; 32];

    #[test]
    fn test_fee_share_by_stake() {
        let mut pool = StakingPool::new();
        pool.stake(ALICE, 75 * ONE).unwrap();
        pool.stake(BOB, 25 * ONE).unwrap();

        pool.add_reward(8 * ONE).unwrap();
        pool.add_collateral_reward(4 * ONE).unwrap();

        let alice = pool.pending_gains(&ALICE).unwrap();
        assert_eq!(alice.reward, 6 * ONE);
        assert_eq!(alice.collateral, 3 * ONE);
        assert_eq!(pool.pending_gains(&BOB).unwrap().reward, 2 * ONE);
    }

    #[test]
    fn test_rewards_carry_residual() {
        let mut pool = StakingPool::new();
        pool.stake(ALICE, 3).unwrap();

        pool.add_reward(10).unwrap();
        assert_eq!(pool.losses.reward, 10 - pool.per_token.reward * 3 / PRECISION);
        assert!(pool.pending_gains(&ALICE).unwrap().reward <= 10);
    }

    #[test]
    fn test_empty_pool_rejects_rewards() {
        let mut pool = StakingPool::new();
        assert!(pool.add_reward(1).is_err());
        assert!(!pool.can_accept());
    }

    #[test]
    fn test_claim_and_unstake() {
        let mut pool = StakingPool::new();
        pool.stake(ALICE, 10 * ONE).unwrap();
        pool.add_reward(ONE).unwrap();

        let update = pool.claim(ALICE).unwrap();
        assert_eq!(update.gains.reward, ONE);
        assert!(pool.pending_gains(&ALICE).unwrap().is_zero());

        assert_eq!(
            pool.unstake(ALICE, 11 * ONE),
            Err(SbrError::ExceedsStake { stake: 10 * ONE, requested: 11 * ONE })
        );
        let update = pool.unstake(ALICE, 10 * ONE).unwrap();
        assert_eq!(update.stake, 0);
        assert!(pool.staker(&ALICE).is_none());
        assert_eq!(pool.total_staked, 0);
    }
}
