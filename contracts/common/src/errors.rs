//! Error Types for the sbr Protocol
//!
//! Typed errors with stable codes. Local, recoverable errors are returned to
//! the immediate caller; fatal errors (`is_fatal`) mean an invariant of the
//! ledger was broken and the whole operation batch must be abandoned.

use core::fmt;

use crate::types::{Address, PositionId};

/// Result type alias for sbr operations
pub type SbrResult<T> = Result<T, SbrError>;

/// Main error enum for all sbr protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SbrError {
    // ============ Input Errors ============
    /// Invalid amount provided
    InvalidAmount { amount: u128, reason: AmountErrorReason },

    /// Insufficient balance for operation
    InsufficientBalance { available: u128, requested: u128 },

    /// Repayment or redemption larger than the outstanding debt
    ExceedsDebt { debt: u128, requested: u128 },

    /// Withdrawal larger than the available collateral
    ExceedsCollateral { collateral: u128, requested: u128 },

    /// Unstake larger than the effective stake
    ExceedsStake { stake: u128, requested: u128 },

    /// Invalid runtime configuration
    InvalidConfig { param: &'static str },

    /// Block height may only move forward
    BlockRegression { current: u64, requested: u64 },

    // ============ Authorization Errors ============
    /// Caller is not the position owner
    Unauthorized { expected: Address, actual: Address },

    // ============ Position Errors ============
    /// Position not found with given ID
    PositionNotFound { id: PositionId },

    /// Resulting debt would be non-zero but below the minimum
    DebtTooLow { debt: u128, minimum: u128 },

    /// Close attempted while the position still carries debt
    CollateralNotEmpty { remaining_debt: u128 },

    /// Operation would leave the position liquidatable
    Undercollateralized { collateral_value: u128, debt: u128, mcr_bps: u128 },

    // ============ Liquidation Errors ============
    /// Liquidation queue is empty
    NothingToLiquidate,

    /// The riskiest position is healthy at the current price
    NotLiquidatable { id: PositionId },

    /// Pool cannot absorb and no other collateral exists to redistribute onto
    CannotRedistribute { id: PositionId },

    // ============ Pool Errors ============
    /// Insufficient stake in the pool to absorb a loss
    InsufficientPoolBalance { available: u128, required: u128 },

    /// Depositor has no record in the pool
    DepositNotFound { depositor: Address },

    // ============ Redemption Errors ============
    /// Redemptions are not allowed while the system is in Bootstrap mode
    RedemptionsDisabled,

    // ============ Invariant Errors (fatal) ============
    /// An ordered-index invariant is violated
    QueueInconsistency { reason: &'static str },

    /// A reset epoch has no stored snapshot
    SnapshotMissing { epoch: u64 },

    /// State or event could not be borsh-encoded
    Serialization { reason: String },

    // ============ Math Errors (fatal) ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

/// Reasons for amount-related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountErrorReason {
    /// Amount is zero when non-zero required
    Zero,
    /// Amount exceeds maximum
    TooLarge,
}

impl SbrError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "E010_INVALID_AMOUNT",
            Self::InsufficientBalance { .. } => "E011_INSUFFICIENT_BALANCE",
            Self::ExceedsDebt { .. } => "E012_EXCEEDS_DEBT",
            Self::ExceedsCollateral { .. } => "E013_EXCEEDS_COLLATERAL",
            Self::ExceedsStake { .. } => "E014_EXCEEDS_STAKE",
            Self::InvalidConfig { .. } => "E015_INVALID_CONFIG",
            Self::BlockRegression { .. } => "E016_BLOCK_REGRESSION",
            Self::Unauthorized { .. } => "E020_UNAUTHORIZED",
            Self::PositionNotFound { .. } => "E030_POSITION_NOT_FOUND",
            Self::DebtTooLow { .. } => "E031_DEBT_TOO_LOW",
            Self::CollateralNotEmpty { .. } => "E032_HAS_DEBT",
            Self::Undercollateralized { .. } => "E033_UNDERCOLLATERALIZED",
            Self::NothingToLiquidate => "E040_NOTHING_TO_LIQ",
            Self::NotLiquidatable { .. } => "E041_NOT_LIQUIDATABLE",
            Self::CannotRedistribute { .. } => "E042_CANNOT_REDISTRIBUTE",
            Self::InsufficientPoolBalance { .. } => "E050_POOL_INSUFFICIENT",
            Self::DepositNotFound { .. } => "E051_DEPOSIT_NOT_FOUND",
            Self::RedemptionsDisabled => "E060_REDEMPTIONS_DISABLED",
            Self::QueueInconsistency { .. } => "E090_QUEUE_INCONSISTENT",
            Self::SnapshotMissing { .. } => "E091_SNAPSHOT_MISSING",
            Self::Serialization { .. } => "E092_SERIALIZATION",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Returns true if this error signals a broken ledger invariant.
    ///
    /// Fatal errors abort the whole operation batch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::QueueInconsistency { .. }
                | Self::SnapshotMissing { .. }
                | Self::Serialization { .. }
                | Self::Overflow
                | Self::Underflow
                | Self::DivisionByZero
        )
    }
}

impl fmt::Display for SbrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAmount { amount, reason } => {
                write!(f, "{}: amount {} ({:?})", self.code(), amount, reason)
            }
            Self::InsufficientBalance { available, requested } => {
                write!(f, "{}: available {}, requested {}", self.code(), available, requested)
            }
            Self::ExceedsDebt { debt, requested } => {
                write!(f, "{}: debt {}, requested {}", self.code(), debt, requested)
            }
            Self::ExceedsCollateral { collateral, requested } => {
                write!(f, "{}: collateral {}, requested {}", self.code(), collateral, requested)
            }
            Self::ExceedsStake { stake, requested } => {
                write!(f, "{}: stake {}, requested {}", self.code(), stake, requested)
            }
            Self::InvalidConfig { param } => write!(f, "{}: {}", self.code(), param),
            Self::BlockRegression { current, requested } => {
                write!(f, "{}: at block {}, requested {}", self.code(), current, requested)
            }
            Self::PositionNotFound { id }
            | Self::NotLiquidatable { id }
            | Self::CannotRedistribute { id } => write!(f, "{}: position {}", self.code(), id),
            Self::DebtTooLow { debt, minimum } => {
                write!(f, "{}: debt {} below minimum {}", self.code(), debt, minimum)
            }
            Self::CollateralNotEmpty { remaining_debt } => {
                write!(f, "{}: remaining debt {}", self.code(), remaining_debt)
            }
            Self::InsufficientPoolBalance { available, required } => {
                write!(f, "{}: available {}, required {}", self.code(), available, required)
            }
            Self::QueueInconsistency { reason } => write!(f, "{}: {}", self.code(), reason),
            Self::SnapshotMissing { epoch } => write!(f, "{}: epoch {}", self.code(), epoch),
            Self::Serialization { reason } => write!(f, "{}: {}", self.code(), reason),
            _ => f.write_str(self.code()),
        }
    }
}

impl std::error::Error for SbrError {}
