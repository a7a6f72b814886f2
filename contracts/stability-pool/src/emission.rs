//! sbr Emission Schedule
//!
//! A fixed amount of sbr is released linearly over a window of blocks to
//! stability pool depositors. The schedule is advanced lazily by pool
//! operations; releases are cumulative (`total * elapsed / window`) so no
//! rounding drift accumulates across updates.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use sbr_common::{
    errors::{SbrError, SbrResult},
    math::{mul_div, safe_add, safe_sub},
};

/// Lifecycle of the emission window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum EmissionPhase {
    NotStarted,
    Started { start_block: u64, last_update_block: u64 },
    Ended { end_block: u64 },
}

/// Phase change caused by an update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionTransition {
    Started { block: u64 },
    Ended { end_block: u64, unallocated: u128 },
}

/// Amount released by one update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Release {
    pub amount: u128,
    pub ended: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EmissionSchedule {
    /// Total sbr released over the window
    pub total: u128,
    /// Window length in blocks
    pub window_blocks: u64,
    pub phase: EmissionPhase,
    /// Cumulative amount released so far
    pub emitted: u128,
    /// Released while nobody was staked
    pub unallocated: u128,
}

impl EmissionSchedule {
    pub fn new(total: u128, window_blocks: u64) -> SbrResult<Self> {
        if window_blocks == 0 {
            return Err(SbrError::InvalidConfig { param: "emission_window_blocks" });
        }
        Ok(Self {
            total,
            window_blocks,
            phase: EmissionPhase::NotStarted,
            emitted: 0,
            unallocated: 0,
        })
    }

    pub fn is_started(&self) -> bool {
        !matches!(self.phase, EmissionPhase::NotStarted)
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, EmissionPhase::Ended { .. })
    }

    /// Start the window at `block`. Returns false if it already started.
    pub fn start(&mut self, block: u64) -> bool {
        if self.is_started() {
            return false;
        }
        self.phase = EmissionPhase::Started {
            start_block: block,
            last_update_block: block,
        };
        true
    }

    /// Release everything due up to `block`.
    pub fn release(&mut self, block: u64) -> SbrResult<Release> {
        let EmissionPhase::Started { start_block, last_update_block } = self.phase else {
            return Ok(Release::default());
        };
        if block <= last_update_block {
            return Ok(Release::default());
        }

        let elapsed = (block - start_block).min(self.window_blocks);
        let due = mul_div(self.total, elapsed as u128, self.window_blocks as u128)?;
        let amount = safe_sub(due, self.emitted)?;
        self.emitted = due;

        if elapsed == self.window_blocks {
            let end_block = start_block.saturating_add(self.window_blocks);
            self.phase = EmissionPhase::Ended { end_block };
            Ok(Release { amount, ended: Some(end_block) })
        } else {
            self.phase = EmissionPhase::Started {
                start_block,
                last_update_block: block,
            };
            Ok(Release { amount, ended: None })
        }
    }

    /// Record a release that had no depositors to go to
    pub fn mark_unallocated(&mut self, amount: u128) -> SbrResult<()> {
        self.unallocated = safe_add(self.unallocated, amount)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_started_releases_nothing() {
        let mut schedule = EmissionSchedule::new(1_000, 100).unwrap();
        assert_eq!(schedule.release(50).unwrap(), Release::default());
    }

    #[test]
    fn test_linear_release() {
        let mut schedule = EmissionSchedule::new(1_000, 100).unwrap();
        assert!(schedule.start(10));
        assert!(!schedule.start(20));

        assert_eq!(schedule.release(35).unwrap().amount, 250);
        assert_eq!(schedule.release(35).unwrap().amount, 0);
        assert_eq!(schedule.release(60).unwrap().amount, 250);
        assert_eq!(schedule.emitted, 500);
    }

    #[test]
    fn test_cumulative_release_has_no_drift() {
        let mut schedule = EmissionSchedule::new(10, 3).unwrap();
        schedule.start(0);

        let total: u128 = (1..=3).map(|b| schedule.release(b).unwrap().amount).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_window_end() {
        let mut schedule = EmissionSchedule::new(1_000, 100).unwrap();
        schedule.start(0);
        schedule.release(40).unwrap();

        let release = schedule.release(500).unwrap();
        assert_eq!(release.amount, 600);
        assert_eq!(release.ended, Some(100));
        assert!(schedule.is_ended());
        assert_eq!(schedule.release(600).unwrap(), Release::default());
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(EmissionSchedule::new(1, 0).is_err());
    }
}
