//! Protocol Context
//!
//! The ledger, both ordered indexes, the pools and the balance book live in a
//! single exclusively owned value that every engine receives by `&mut`.
//! Public entry points run inside [`ProtocolContext::atomically`]: the state
//! is staged, and restored untouched if the operation fails.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sbr_common::{
    constants::index::NULL_ID,
    errors::{SbrError, SbrResult},
    events::{EventLog, SbrEvent},
    ordered_index::{IndexChange, OrderedIndex, QueueKind},
    types::{Address, GlobalAccrual, Position, PositionId},
    BalanceBook, ProtocolConfig,
};
use sbr_stability_pool::{StabilityPool, StakingPool};

/// Complete protocol state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ProtocolContext {
    pub config: ProtocolConfig,
    pub accrual: GlobalAccrual,
    pub(crate) positions: BTreeMap<PositionId, Position>,
    pub(crate) next_id: PositionId,
    pub(crate) liquidation_index: OrderedIndex,
    pub(crate) redemption_index: OrderedIndex,
    pub stability_pool: StabilityPool,
    pub staking_pool: StakingPool,
    /// Debt token, collateral and sbr held by accounts
    pub balances: BalanceBook,
    pub block_height: u64,
    pub events: EventLog,
}

/// Staged state taken by [`ProtocolContext::checkpoint`]
#[derive(Debug)]
pub(crate) struct Checkpoint {
    state: Box<ProtocolContext>,
    events_len: usize,
}

impl ProtocolContext {
    /// Create an empty protocol from a validated configuration
    pub fn new(config: ProtocolConfig) -> SbrResult<Self> {
        config.validate()?;
        let stability_pool = StabilityPool::new(&config)?;
        Ok(Self {
            config,
            accrual: GlobalAccrual::new(),
            positions: BTreeMap::new(),
            next_id: NULL_ID + 1,
            liquidation_index: OrderedIndex::new(QueueKind::Liquidation),
            redemption_index: OrderedIndex::new(QueueKind::Redemption),
            stability_pool,
            staking_pool: StakingPool::new(),
            balances: BalanceBook::new(),
            block_height: 0,
            events: EventLog::new(),
        })
    }

    /// Run `op` against staged state; on error the state is restored.
    pub fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> SbrResult<T>) -> SbrResult<T> {
        let checkpoint = self.checkpoint();
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_fatal() {
                    error!("fatal: {}, state restored", err);
                } else {
                    debug!("rejected: {}", err);
                }
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    /// Copy of everything but the event log, of which only the length is kept.
    pub(crate) fn checkpoint(&mut self) -> Checkpoint {
        let events = std::mem::take(&mut self.events);
        let state = Box::new(self.clone());
        let events_len = events.len();
        self.events = events;
        Checkpoint { state, events_len }
    }

    /// Return to `checkpoint`, dropping the events emitted since.
    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        let mut events = std::mem::take(&mut self.events);
        events.truncate(checkpoint.events_len);
        *self = *checkpoint.state;
        self.events = events;
    }

    /// Move the block height forward
    pub fn advance_to(&mut self, block: u64) -> SbrResult<()> {
        if block < self.block_height {
            return Err(SbrError::BlockRegression {
                current: self.block_height,
                requested: block,
            });
        }
        self.block_height = block;
        Ok(())
    }

    /// SHA-256 of the borsh-encoded state
    pub fn state_digest(&self) -> SbrResult<[u8; 32]> {
        let bytes =
            borsh::to_vec(self).map_err(|err| SbrError::Serialization { reason: err.to_string() })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Ok(digest)
    }

    // ============ Queries ============

    pub fn position(&self, id: PositionId) -> SbrResult<&Position> {
        self.positions.get(&id).ok_or(SbrError::PositionNotFound { id })
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn liquidation_index(&self) -> &OrderedIndex {
        &self.liquidation_index
    }

    pub fn redemption_index(&self) -> &OrderedIndex {
        &self.redemption_index
    }

    /// Verify both indexes and that exactly the positions with debt are queued.
    pub fn check_invariants(&self) -> SbrResult<()> {
        self.liquidation_index.check_invariants()?;
        self.redemption_index.check_invariants()?;

        let indebted = self.positions.values().filter(|p| p.debt > 0).count();
        if self.liquidation_index.len() != indebted || self.redemption_index.len() != indebted {
            error!(
                "queue membership diverged: {} indebted, {} / {} queued",
                indebted,
                self.liquidation_index.len(),
                self.redemption_index.len()
            );
            return Err(SbrError::QueueInconsistency { reason: "queue membership" });
        }
        for position in self.positions.values().filter(|p| p.debt > 0) {
            if self.liquidation_index.key_of(position.id) != Some(position.ratio()?) {
                return Err(SbrError::QueueInconsistency { reason: "stale liquidation key" });
            }
        }
        Ok(())
    }

    // ============ Internal helpers ============

    pub(crate) fn emit(&mut self, event: SbrEvent) {
        self.events.emit(event);
    }

    pub(crate) fn position_mut(&mut self, id: PositionId) -> SbrResult<&mut Position> {
        self.positions.get_mut(&id).ok_or(SbrError::PositionNotFound { id })
    }

    /// Position owned by `caller`
    pub(crate) fn owned_position(&self, caller: &Address, id: PositionId) -> SbrResult<&Position> {
        let position = self.position(id)?;
        if position.owner != *caller {
            return Err(SbrError::Unauthorized {
                expected: position.owner,
                actual: *caller,
            });
        }
        Ok(position)
    }

    /// Re-key `id` in both queues, or drop it from them once debt-free.
    pub(crate) fn reindex(&mut self, id: PositionId, hint: PositionId) -> SbrResult<()> {
        let position = self.position(id)?;
        if position.debt == 0 {
            return self.unindex(id);
        }
        let ratio = position.ratio()?;
        let fee_weight = position.fee_weight;

        let change = self.liquidation_index.upsert(id, ratio, hint)?.change;
        self.emit_index_change(QueueKind::Liquidation, id, change);
        let change = self.redemption_index.upsert(id, fee_weight, NULL_ID)?.change;
        self.emit_index_change(QueueKind::Redemption, id, change);
        Ok(())
    }

    /// Remove `id` from both queues
    pub(crate) fn unindex(&mut self, id: PositionId) -> SbrResult<()> {
        let block_height = self.block_height;
        for queue in [QueueKind::Liquidation, QueueKind::Redemption] {
            let removed = match queue {
                QueueKind::Liquidation => self.liquidation_index.remove(id)?,
                QueueKind::Redemption => self.redemption_index.remove(id)?,
            };
            if removed.is_some() {
                self.emit(SbrEvent::QueueNodeRemoved { queue, id, block_height });
            }
        }
        Ok(())
    }

    fn emit_index_change(&mut self, queue: QueueKind, id: PositionId, change: IndexChange) {
        let block_height = self.block_height;
        match change {
            IndexChange::Inserted { key } => {
                self.emit(SbrEvent::QueueNodeInserted { queue, id, key, block_height })
            }
            IndexChange::Updated { old_key, new_key } => self.emit(SbrEvent::QueueNodeUpdated {
                queue,
                id,
                old_key,
                new_key,
                block_height,
            }),
            IndexChange::Unchanged { .. } => {}
        }
    }
}
