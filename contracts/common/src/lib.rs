//! sbr Common Library
//!
//! Shared types, constants, and utilities for the sbr CDP protocol crates.
//!
//! ## Contents
//!
//! - **Fixed-point math**: `u128` amounts scaled by `PRECISION` (1e18) with
//!   256-bit intermediates and a shared carry-forward distribution helper
//! - **Positions and global accrual**: the records owned by the position ledger
//! - **Ordered index**: key-sorted linked list with hinted splicing, one
//!   instance per queue (liquidation, redemption)
//! - **Balance book**: debt token, collateral and sbr balances per holder
//! - **Price feed**: pull-based collateral price source
//! - **Events**: typed protocol event stream
//!
//! Execution is strictly sequential. Nothing in this crate holds global state;
//! everything is threaded through an explicit context by the caller.

pub mod balances;
pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod math;
pub mod oracle;
pub mod ordered_index;
pub mod types;

pub use balances::BalanceBook;
pub use config::ProtocolConfig;
pub use constants::*;
pub use errors::{AmountErrorReason, SbrError, SbrResult};
pub use events::{EventLog, EventType, LiquidationPath, PoolKind, SbrEvent};
pub use math::*;
pub use oracle::{FixedPriceFeed, PriceFeed};
pub use ordered_index::{IndexChange, OrderedIndex, QueueEnd, QueueKind, Splice};
pub use types::*;
