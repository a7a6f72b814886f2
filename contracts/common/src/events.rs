//! Protocol Events for sbr
//!
//! Every mutating operation reports what it did through typed events
//! collected in an [`EventLog`]. Events are borsh-encodable so they can be
//! indexed off-chain.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{SbrError, SbrResult};
use crate::ordered_index::QueueKind;
use crate::types::{Address, Asset, PositionId};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Position Events (0x01 - 0x1F)
    PositionOpened = 0x01,
    PositionClosed = 0x02,
    PositionAccrued = 0x03,
    Borrowed = 0x04,
    Repaid = 0x05,
    CollateralAdded = 0x06,
    CollateralWithdrawn = 0x07,
    FeeToppedUp = 0x08,

    // Liquidation / Redemption Events (0x20 - 0x3F)
    Liquidated = 0x20,
    PositionRedeemed = 0x21,
    RedemptionCompleted = 0x22,

    // Pool Events (0x40 - 0x5F)
    Staked = 0x40,
    Unstaked = 0x41,
    Claimed = 0x42,
    RewardAdded = 0x43,
    FeeRefunded = 0x44,
    ScalingFactorReset = 0x45,
    EmissionStarted = 0x46,
    EmissionEnded = 0x47,

    // Queue Events (0x60 - 0x7F)
    QueueNodeInserted = 0x60,
    QueueNodeUpdated = 0x61,
    QueueNodeRemoved = 0x62,

    // Protocol Events (0x80 - 0x9F)
    ModeChanged = 0x80,
}

/// How a liquidated position's debt was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LiquidationPath {
    /// Absorbed by the stability pool
    StabilityPool,
    /// Socialized across the remaining positions
    Redistribution,
}

/// The pool an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PoolKind {
    /// Debt-token stability pool
    Stability,
    /// sbr staking pool
    Staking,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum SbrEvent {
    // ============ Position Events ============

    PositionOpened {
        id: PositionId,
        owner: Address,
        collateral: u128,
        block_height: u64,
    },

    PositionClosed {
        id: PositionId,
        owner: Address,
        collateral_returned: u128,
        block_height: u64,
    },

    /// Global redistribution applied to a position on sync
    PositionAccrued {
        id: PositionId,
        debt_increase: u128,
        collateral_increase: u128,
        block_height: u64,
    },

    Borrowed {
        id: PositionId,
        amount: u128,
        fee: u128,
        new_debt: u128,
        block_height: u64,
    },

    Repaid {
        id: PositionId,
        amount: u128,
        new_debt: u128,
        block_height: u64,
    },

    CollateralAdded {
        id: PositionId,
        amount: u128,
        new_collateral: u128,
        block_height: u64,
    },

    CollateralWithdrawn {
        id: PositionId,
        amount: u128,
        new_collateral: u128,
        block_height: u64,
    },

    FeeToppedUp {
        id: PositionId,
        amount: u128,
        new_fee_weight: u128,
        block_height: u64,
    },

    // ============ Liquidation / Redemption Events ============

    Liquidated {
        id: PositionId,
        owner: Address,
        liquidator: Address,
        path: LiquidationPath,
        debt: u128,
        collateral: u128,
        liquidation_fee: u128,
        gas_refund: u128,
        block_height: u64,
    },

    /// One position touched by a redemption
    PositionRedeemed {
        id: PositionId,
        debt_redeemed: u128,
        collateral_drawn: u128,
        closed: bool,
        block_height: u64,
    },

    /// Batch totals of a redemption
    RedemptionCompleted {
        redeemer: Address,
        requested: u128,
        redeemed: u128,
        collateral_drawn: u128,
        fee: u128,
        positions_touched: u32,
        block_height: u64,
    },

    // ============ Pool Events ============

    Staked {
        pool: PoolKind,
        depositor: Address,
        amount: u128,
        new_stake: u128,
        block_height: u64,
    },

    Unstaked {
        pool: PoolKind,
        depositor: Address,
        amount: u128,
        remaining_stake: u128,
        block_height: u64,
    },

    Claimed {
        pool: PoolKind,
        depositor: Address,
        reward: u128,
        collateral: u128,
        sbr: u128,
        block_height: u64,
    },

    RewardAdded {
        pool: PoolKind,
        asset: Asset,
        amount: u128,
        block_height: u64,
    },

    /// A fee share that no pool could accept went back to its payer
    FeeRefunded {
        payer: Address,
        asset: Asset,
        amount: u128,
        block_height: u64,
    },

    /// Stability pool scaling factor reset, with the snapshot pushed
    ScalingFactorReset {
        epoch: u64,
        scaling_factor: u128,
        reward_per_token: u128,
        collateral_per_token: u128,
        sbr_per_token: u128,
        block_height: u64,
    },

    EmissionStarted {
        block_height: u64,
    },

    EmissionEnded {
        unallocated: u128,
        block_height: u64,
    },

    // ============ Queue Events ============

    QueueNodeInserted {
        queue: QueueKind,
        id: PositionId,
        key: u128,
        block_height: u64,
    },

    QueueNodeUpdated {
        queue: QueueKind,
        id: PositionId,
        old_key: u128,
        new_key: u128,
        block_height: u64,
    },

    QueueNodeRemoved {
        queue: QueueKind,
        id: PositionId,
        block_height: u64,
    },

    // ============ Protocol Events ============

    /// Bootstrap -> Normal, emitted once
    ModeChanged {
        total_debt: u128,
        block_height: u64,
    },
}

impl SbrEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PositionOpened { .. } => EventType::PositionOpened,
            Self::PositionClosed { .. } => EventType::PositionClosed,
            Self::PositionAccrued { .. } => EventType::PositionAccrued,
            Self::Borrowed { .. } => EventType::Borrowed,
            Self::Repaid { .. } => EventType::Repaid,
            Self::CollateralAdded { .. } => EventType::CollateralAdded,
            Self::CollateralWithdrawn { .. } => EventType::CollateralWithdrawn,
            Self::FeeToppedUp { .. } => EventType::FeeToppedUp,
            Self::Liquidated { .. } => EventType::Liquidated,
            Self::PositionRedeemed { .. } => EventType::PositionRedeemed,
            Self::RedemptionCompleted { .. } => EventType::RedemptionCompleted,
            Self::Staked { .. } => EventType::Staked,
            Self::Unstaked { .. } => EventType::Unstaked,
            Self::Claimed { .. } => EventType::Claimed,
            Self::RewardAdded { .. } => EventType::RewardAdded,
            Self::FeeRefunded { .. } => EventType::FeeRefunded,
            Self::ScalingFactorReset { .. } => EventType::ScalingFactorReset,
            Self::EmissionStarted { .. } => EventType::EmissionStarted,
            Self::EmissionEnded { .. } => EventType::EmissionEnded,
            Self::QueueNodeInserted { .. } => EventType::QueueNodeInserted,
            Self::QueueNodeUpdated { .. } => EventType::QueueNodeUpdated,
            Self::QueueNodeRemoved { .. } => EventType::QueueNodeRemoved,
            Self::ModeChanged { .. } => EventType::ModeChanged,
        }
    }

    /// Get the block height when event occurred
    pub fn block_height(&self) -> u64 {
        match self {
            Self::PositionOpened { block_height, .. }
            | Self::PositionClosed { block_height, .. }
            | Self::PositionAccrued { block_height, .. }
            | Self::Borrowed { block_height, .. }
            | Self::Repaid { block_height, .. }
            | Self::CollateralAdded { block_height, .. }
            | Self::CollateralWithdrawn { block_height, .. }
            | Self::FeeToppedUp { block_height, .. }
            | Self::Liquidated { block_height, .. }
            | Self::PositionRedeemed { block_height, .. }
            | Self::RedemptionCompleted { block_height, .. }
            | Self::Staked { block_height, .. }
            | Self::Unstaked { block_height, .. }
            | Self::Claimed { block_height, .. }
            | Self::RewardAdded { block_height, .. }
            | Self::FeeRefunded { block_height, .. }
            | Self::ScalingFactorReset { block_height, .. }
            | Self::EmissionStarted { block_height }
            | Self::EmissionEnded { block_height, .. }
            | Self::QueueNodeInserted { block_height, .. }
            | Self::QueueNodeUpdated { block_height, .. }
            | Self::QueueNodeRemoved { block_height, .. }
            | Self::ModeChanged { block_height, .. } => *block_height,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> SbrResult<Vec<u8>> {
        borsh::to_vec(self).map_err(|err| SbrError::Serialization { reason: err.to_string() })
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EventLog {
    events: Vec<SbrEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: SbrEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SbrEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<SbrEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&SbrEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Drop every event past the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}
