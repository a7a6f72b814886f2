//! sbr Stability Pool
//!
//! First line of defense for the sbr system. Depositors stake debt tokens
//! that absorb liquidated debt, and earn the seized collateral, fee rewards
//! and sbr emission.
//!
//! ## Modules
//!
//! - [`pool`]: scaling-factor accounting with reset snapshots
//! - [`emission`]: linear sbr emission over a fixed block window
//! - [`staking`]: secondary sbr staking pool earning protocol fees
//!
//! All state is plain data owned by the caller's context; every method takes
//! `&mut self` and either completes or returns an error.

pub mod emission;
pub mod pool;
pub mod staking;

pub use emission::{EmissionPhase, EmissionSchedule, EmissionTransition, Release};
pub use pool::{
    AbsorbOutcome, Depositor, DepositorUpdate, EmissionClaim, Gains, PerToken, ResetSnapshot,
    StabilityPool,
};
pub use staking::{Staker, StakerUpdate, StakingPool};
