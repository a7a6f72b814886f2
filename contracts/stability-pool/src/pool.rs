//! Stability Pool
//!
//! Depositors stake debt tokens that absorb liquidated debt. In return they
//! earn the liquidated collateral, a share of protocol fees and sbr emission.
//!
//! ## Accounting
//!
//! - Stakes are stored raw together with the scaling factor seen at the last
//!   update. The effective stake is `stake * scaling_factor / seen`.
//! - Every absorbed loss multiplies the scaling factor by
//!   `(total - debt) / total`.
//! - Rewards accumulate per token, pre-multiplied by the scaling factor, so a
//!   depositor's gain is `stake * (per_token - snapshot) / seen`.
//! - When the compounded factor would drop below the configured floor, the
//!   current factor and per-token values are archived as a [`ResetSnapshot`],
//!   the epoch increments and everything restarts from `PRECISION`.
//!   Depositors from older epochs chain through every archived snapshot.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use sbr_common::{
    constants::precision::PRECISION,
    errors::{AmountErrorReason, SbrError, SbrResult},
    math::{distribute_per_unit, mul_div, safe_add, safe_sub},
    types::Address,
    ProtocolConfig,
};

use crate::emission::{EmissionSchedule, EmissionTransition};

// ============ Types ============

/// Per-token accumulators of the three reward streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PerToken {
    /// Debt-token fee rewards
    pub reward: u128,
    /// Collateral from liquidations and fees
    pub collateral: u128,
    /// sbr emission
    pub sbr: u128,
}

/// Pool state archived at a scaling-factor reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ResetSnapshot {
    /// Compounded factor at the moment of the reset (zero after a wipeout)
    pub scaling_factor: u128,
    /// Per-token values at the moment of the reset
    pub per_token: PerToken,
}

/// Whether a depositor has collected their last sbr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum EmissionClaim {
    #[default]
    Accruing,
    /// Settled after the emission window ended
    Claimed,
}

/// Individual depositor record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Depositor {
    /// Raw stake, relative to `scaling_factor_seen`
    pub stake: u128,
    /// Per-token values at the last update
    pub snapshot: PerToken,
    /// Scaling factor at the last update. Zero means never staked.
    pub scaling_factor_seen: u128,
    /// Reset epoch at the last update
    pub epoch_seen: u64,
    pub emission: EmissionClaim,
}

/// Rewards owed to a depositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gains {
    /// Debt tokens
    pub reward: u128,
    pub collateral: u128,
    pub sbr: u128,
}

impl Gains {
    pub fn is_zero(&self) -> bool {
        self.reward == 0 && self.collateral == 0 && self.sbr == 0
    }

    fn add_scaled(&mut self, stake: u128, delta: PerToken, divisor: u128) -> SbrResult<()> {
        self.reward = safe_add(self.reward, mul_div(stake, delta.reward, divisor)?)?;
        self.collateral = safe_add(self.collateral, mul_div(stake, delta.collateral, divisor)?)?;
        self.sbr = safe_add(self.sbr, mul_div(stake, delta.sbr, divisor)?)?;
        Ok(())
    }
}

/// Outcome of a depositor operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepositorUpdate {
    /// Rewards settled and paid out
    pub gains: Gains,
    /// Effective stake after the operation
    pub stake: u128,
    /// Emission phase change triggered by the operation
    pub emission: Option<EmissionTransition>,
}

/// Outcome of an absorbed liquidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsorbOutcome {
    /// Scaling factor after the loss (before any reset)
    pub scaling_factor: u128,
    /// Archived snapshot and its epoch, if the factor reset
    pub reset: Option<(u64, ResetSnapshot)>,
}

// ============ Pool State ============

/// Stability pool global state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct StabilityPool {
    /// Sum of effective stakes (debt tokens held by the pool)
    pub total_staked: u128,
    /// Compounded depletion multiplier, PRECISION when untouched
    pub scaling_factor: u128,
    pub per_token: PerToken,
    /// Rounding carry per stream
    pub losses: PerToken,
    pub reset_epoch: u64,
    /// One entry per past epoch
    pub reset_snapshots: Vec<ResetSnapshot>,
    pub min_scaling_factor: u128,
    pub emission: EmissionSchedule,
    depositors: BTreeMap<Address, Depositor>,
}

impl StabilityPool {
    /// Create an empty pool from protocol parameters
    pub fn new(config: &ProtocolConfig) -> SbrResult<Self> {
        Ok(Self {
            total_staked: 0,
            scaling_factor: PRECISION,
            per_token: PerToken::default(),
            losses: PerToken::default(),
            reset_epoch: 0,
            reset_snapshots: Vec::new(),
            min_scaling_factor: config.min_scaling_factor,
            emission: EmissionSchedule::new(config.emission_total, config.emission_window_blocks)?,
            depositors: BTreeMap::new(),
        })
    }

    /// Rewards can only be attributed while something is staked
    pub fn can_accept(&self) -> bool {
        self.total_staked > 0
    }

    pub fn depositor(&self, address: &Address) -> Option<&Depositor> {
        self.depositors.get(address)
    }

    pub fn depositor_count(&self) -> usize {
        self.depositors.len()
    }

    /// Effective stake of `address`, zero if unknown
    pub fn effective_stake_of(&self, address: &Address) -> SbrResult<u128> {
        match self.depositors.get(address) {
            Some(d) => self.effective_stake(d),
            None => Ok(0),
        }
    }

    /// Unsettled rewards of `address`
    pub fn pending_gains_of(&self, address: &Address) -> SbrResult<Gains> {
        match self.depositors.get(address) {
            Some(d) => self.pending_gains(d),
            None => Ok(Gains::default()),
        }
    }

    /// Stake compounded through every loss since the depositor's last update.
    pub fn effective_stake(&self, d: &Depositor) -> SbrResult<u128> {
        if d.scaling_factor_seen == 0 {
            return Ok(d.stake);
        }
        if d.epoch_seen == self.reset_epoch {
            return mul_div(d.stake, self.scaling_factor, d.scaling_factor_seen);
        }

        let first = self.snapshot_at(d.epoch_seen)?;
        let mut stake = mul_div(d.stake, first.scaling_factor, d.scaling_factor_seen)?;
        for epoch in d.epoch_seen + 1..self.reset_epoch {
            if stake == 0 {
                return Ok(0);
            }
            stake = mul_div(stake, self.snapshot_at(epoch)?.scaling_factor, PRECISION)?;
        }
        mul_div(stake, self.scaling_factor, PRECISION)
    }

    /// Rewards accrued since the depositor's last update
    pub fn pending_gains(&self, d: &Depositor) -> SbrResult<Gains> {
        let mut gains = Gains::default();
        if d.scaling_factor_seen == 0 || d.stake == 0 {
            return Ok(gains);
        }

        if d.epoch_seen == self.reset_epoch {
            let delta = per_token_delta(self.per_token, d.snapshot)?;
            gains.add_scaled(d.stake, delta, d.scaling_factor_seen)?;
            return Ok(gains);
        }

        // remainder of the depositor's own epoch
        let first = self.snapshot_at(d.epoch_seen)?;
        gains.add_scaled(d.stake, per_token_delta(first.per_token, d.snapshot)?, d.scaling_factor_seen)?;
        let mut stake = mul_div(d.stake, first.scaling_factor, d.scaling_factor_seen)?;

        // every full epoch in between, entered at PRECISION
        for epoch in d.epoch_seen + 1..self.reset_epoch {
            if stake == 0 {
                return Ok(gains);
            }
            let snap = self.snapshot_at(epoch)?;
            gains.add_scaled(stake, snap.per_token, PRECISION)?;
            stake = mul_div(stake, snap.scaling_factor, PRECISION)?;
        }

        gains.add_scaled(stake, self.per_token, PRECISION)?;
        Ok(gains)
    }

    // ============ Depositor Operations ============

    /// Deposit `amount`, settling pending rewards first.
    pub fn stake(&mut self, depositor: Address, amount: u128, block: u64) -> SbrResult<DepositorUpdate> {
        require_positive(amount)?;
        let ended = self.release_emission(block)?;

        let (gains, effective, claim) = match self.depositors.get(&depositor) {
            Some(d) => (self.pending_gains(d)?, self.effective_stake(d)?, d.emission),
            None => (Gains::default(), 0, EmissionClaim::Accruing),
        };
        let stake = safe_add(effective, amount)?;
        self.write_depositor(depositor, stake, claim);
        self.total_staked = safe_add(self.total_staked, amount)?;

        debug!("SP stake: {} (effective {}), total {}", amount, stake, self.total_staked);
        Ok(DepositorUpdate {
            gains,
            stake,
            emission: ended.or(self.start_emission(block)),
        })
    }

    /// Withdraw `amount` of the effective stake, settling pending rewards.
    pub fn unstake(&mut self, depositor: Address, amount: u128, block: u64) -> SbrResult<DepositorUpdate> {
        require_positive(amount)?;
        if !self.depositors.contains_key(&depositor) {
            return Err(SbrError::DepositNotFound { depositor });
        }
        let ended = self.release_emission(block)?;
        let (gains, effective, claim) = self.settle(&depositor)?;
        if amount > effective {
            return Err(SbrError::ExceedsStake { stake: effective, requested: amount });
        }

        let stake = safe_sub(effective, amount)?;
        self.total_staked = safe_sub(self.total_staked, amount)?;
        if stake == 0 {
            self.remove_depositor(&depositor);
        } else {
            self.write_depositor(depositor, stake, claim);
        }

        Ok(DepositorUpdate { gains, stake, emission: ended })
    }

    /// Settle pending rewards without changing the stake.
    pub fn claim(&mut self, depositor: Address, block: u64) -> SbrResult<DepositorUpdate> {
        if !self.depositors.contains_key(&depositor) {
            return Err(SbrError::DepositNotFound { depositor });
        }
        let ended = self.release_emission(block)?;
        let (gains, stake, claim) = self.settle(&depositor)?;
        if stake == 0 {
            self.remove_depositor(&depositor);
        } else {
            self.write_depositor(depositor, stake, claim);
        }
        Ok(DepositorUpdate {
            gains,
            stake,
            emission: ended.or(self.start_emission(block)),
        })
    }

    /// Drop a fully withdrawn or wiped record. The last one out takes the
    /// pool's rounding dust with it.
    fn remove_depositor(&mut self, depositor: &Address) {
        self.depositors.remove(depositor);
        if self.depositors.is_empty() && self.total_staked > 0 {
            debug!("SP: dropping {} of rounding dust with the last depositor", self.total_staked);
            self.total_staked = 0;
        }
    }

    // ============ Reward Distribution ============

    /// Distribute debt-token rewards over the stake.
    pub fn add_reward(&mut self, amount: u128) -> SbrResult<()> {
        let per_token = self.distribute(amount, self.losses.reward)?;
        self.per_token.reward = safe_add(self.per_token.reward, per_token.0)?;
        self.losses.reward = per_token.1;
        Ok(())
    }

    /// Distribute collateral rewards over the stake.
    pub fn add_collateral_reward(&mut self, amount: u128) -> SbrResult<()> {
        let per_token = self.distribute(amount, self.losses.collateral)?;
        self.per_token.collateral = safe_add(self.per_token.collateral, per_token.0)?;
        self.losses.collateral = per_token.1;
        Ok(())
    }

    /// Absorb `debt` of a liquidated position and take its `collateral`.
    ///
    /// The collateral is attributed to the stakers that carried the loss, so
    /// it is distributed before the scaling factor and total change.
    pub fn absorb_loss(&mut self, debt: u128, collateral: u128) -> SbrResult<AbsorbOutcome> {
        if self.total_staked == 0 || self.total_staked < debt {
            return Err(SbrError::InsufficientPoolBalance {
                available: self.total_staked,
                required: debt,
            });
        }

        if collateral > 0 {
            self.add_collateral_reward(collateral)?;
        }

        let remaining = safe_sub(self.total_staked, debt)?;
        let factor = mul_div(remaining, PRECISION, self.total_staked)?;
        self.scaling_factor = mul_div(self.scaling_factor, factor, PRECISION)?;
        self.total_staked = remaining;
        let scaling_factor = self.scaling_factor;

        let reset = if self.scaling_factor < self.min_scaling_factor {
            Some(self.reset())
        } else {
            None
        };

        debug!(
            "SP absorbed debt {} collateral {}: factor {}, total {}",
            debt, collateral, scaling_factor, self.total_staked
        );
        Ok(AbsorbOutcome { scaling_factor, reset })
    }

    // ============ Internal ============

    fn snapshot_at(&self, epoch: u64) -> SbrResult<&ResetSnapshot> {
        usize::try_from(epoch)
            .ok()
            .and_then(|i| self.reset_snapshots.get(i))
            .ok_or(SbrError::SnapshotMissing { epoch })
    }

    fn reset(&mut self) -> (u64, ResetSnapshot) {
        let epoch = self.reset_epoch;
        let snapshot = ResetSnapshot {
            scaling_factor: self.scaling_factor,
            per_token: self.per_token,
        };
        self.reset_snapshots.push(snapshot);
        self.reset_epoch += 1;
        self.per_token = PerToken::default();
        self.scaling_factor = PRECISION;

        if snapshot.scaling_factor == 0 {
            warn!("SP wiped out, epoch {} closed", epoch);
        } else {
            warn!(
                "SP scaling factor {} below floor {}, epoch {} closed",
                snapshot.scaling_factor, self.min_scaling_factor, epoch
            );
        }
        (epoch, snapshot)
    }

    fn distribute(&self, amount: u128, carry: u128) -> SbrResult<(u128, u128)> {
        if amount == 0 {
            return Ok((0, carry));
        }
        if !self.can_accept() {
            return Err(SbrError::InsufficientPoolBalance { available: 0, required: amount });
        }
        let d = distribute_per_unit(amount, self.total_staked, self.scaling_factor, carry)?;
        Ok((d.per_unit_delta, d.carry_loss))
    }

    /// Pending gains and effective stake, marking the emission claimed once
    /// the window is over.
    fn settle(&self, address: &Address) -> SbrResult<(Gains, u128, EmissionClaim)> {
        let d = self
            .depositors
            .get(address)
            .ok_or(SbrError::DepositNotFound { depositor: *address })?;
        let claim = if self.emission.is_ended() {
            EmissionClaim::Claimed
        } else {
            d.emission
        };
        Ok((self.pending_gains(d)?, self.effective_stake(d)?, claim))
    }

    fn write_depositor(&mut self, address: Address, stake: u128, emission: EmissionClaim) {
        let emission = if self.emission.is_ended() { EmissionClaim::Claimed } else { emission };
        self.depositors.insert(
            address,
            Depositor {
                stake,
                snapshot: self.per_token,
                scaling_factor_seen: self.scaling_factor,
                epoch_seen: self.reset_epoch,
                emission,
            },
        );
    }

    /// Release sbr due up to `block` into the per-token accumulator.
    fn release_emission(&mut self, block: u64) -> SbrResult<Option<EmissionTransition>> {
        let release = self.emission.release(block)?;
        if release.amount > 0 {
            if self.can_accept() {
                let d = distribute_per_unit(release.amount, self.total_staked, self.scaling_factor, self.losses.sbr)?;
                self.per_token.sbr = safe_add(self.per_token.sbr, d.per_unit_delta)?;
                self.losses.sbr = d.carry_loss;
            } else {
                self.emission.mark_unallocated(release.amount)?;
            }
        }
        Ok(release.ended.map(|end_block| EmissionTransition::Ended {
            end_block,
            unallocated: self.emission.unallocated,
        }))
    }

    fn start_emission(&mut self, block: u64) -> Option<EmissionTransition> {
        if self.can_accept() && self.emission.start(block) {
            Some(EmissionTransition::Started { block })
        } else {
            None
        }
    }
}

fn per_token_delta(current: PerToken, seen: PerToken) -> SbrResult<PerToken> {
    Ok(PerToken {
        reward: safe_sub(current.reward, seen.reward)?,
        collateral: safe_sub(current.collateral, seen.collateral)?,
        sbr: safe_sub(current.sbr, seen.sbr)?,
    })
}

fn require_positive(amount: u128) -> SbrResult<()> {
    if amount == 0 {
        return Err(SbrError::InvalidAmount { amount, reason: AmountErrorReason::Zero });
    }
    Ok(())
}
