//! Core Types for the sbr Protocol
//!
//! Positions, global accrual state and asset identifiers shared by the
//! ledger, the engines and the pools.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for position identifiers. Zero is reserved as the null id.
pub type PositionId = u64;

// ============ Asset Types ============

/// Value types moved by the balance book
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum Asset {
    /// The stablecoin minted against positions
    DebtToken,
    /// Native collateral (and its receipt form)
    Collateral,
    /// Secondary emission token (sbr)
    Emission,
}

// ============ Position Types ============

/// Cumulative per-unit values a position has already absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AccrualSnapshot {
    /// `cumulative_collateral_per_unit` at the last sync
    pub collateral_per_unit_seen: u128,
    /// `cumulative_debt_per_unit` at the last sync
    pub debt_per_unit_seen: u128,
}

/// Individual collateral/debt position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Position {
    /// Unique identifier
    pub id: PositionId,
    /// Owner's address
    pub owner: Address,
    /// Collateral in base units
    pub collateral: u128,
    /// Debt in base units
    pub debt: u128,
    /// Fee weight accumulated through top-ups (redemption-queue key)
    pub fee_weight: u128,
    /// Sum of every amount ever borrowed
    pub total_borrowed_lifetime: u128,
    /// Global accrual already applied
    pub snapshot: AccrualSnapshot,
}

impl Position {
    /// Creates a new debt-free position synced to the given accrual state
    pub fn new(id: PositionId, owner: Address, collateral: u128, accrual: &GlobalAccrual) -> Self {
        Self {
            id,
            owner,
            collateral,
            debt: 0,
            fee_weight: 0,
            total_borrowed_lifetime: 0,
            snapshot: accrual.snapshot(),
        }
    }

    /// Liquidation-queue key for the current collateral/debt
    pub fn ratio(&self) -> crate::SbrResult<u128> {
        crate::math::collateral_ratio(self.debt, self.collateral)
    }
}

// ============ Protocol State Types ============

/// System mode. The transition Bootstrap -> Normal is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum SystemMode {
    /// Launch phase: redemptions are disabled
    #[default]
    Bootstrap,
    /// Regular operation
    Normal,
}

/// Global accrual state for lazily socialized liquidations
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct GlobalAccrual {
    /// Collateral redistributed per unit of collateral (monotonic)
    pub cumulative_collateral_per_unit: u128,
    /// Debt redistributed per unit of collateral (monotonic)
    pub cumulative_debt_per_unit: u128,
    /// Collateral stored on positions
    pub total_collateral: u128,
    /// Debt stored on positions
    pub total_debt: u128,
    /// Current system mode
    pub mode: SystemMode,
    /// Redistributed debt not yet accrued by any position
    pub pending_debt: u128,
    /// Redistributed collateral not yet accrued by any position
    pub pending_collateral: u128,
    /// Rounding carry of the debt redistribution
    pub debt_loss: u128,
    /// Rounding carry of the collateral redistribution
    pub collateral_loss: u128,
}

impl GlobalAccrual {
    /// Creates initial accrual state
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cumulative values, as a position snapshot
    pub fn snapshot(&self) -> AccrualSnapshot {
        AccrualSnapshot {
            collateral_per_unit_seen: self.cumulative_collateral_per_unit,
            debt_per_unit_seen: self.cumulative_debt_per_unit,
        }
    }

    /// Returns true once the bootstrap phase is over
    pub fn is_normal(&self) -> bool {
        self.mode == SystemMode::Normal
    }
}

/// Deltas applied to a position by a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccrualDelta {
    /// Debt added to the position
    pub debt_increase: u128,
    /// Collateral added to the position
    pub collateral_increase: u128,
}

impl AccrualDelta {
    /// True when the sync changed nothing
    pub fn is_zero(&self) -> bool {
        self.debt_increase == 0 && self.collateral_increase == 0
    }
}
