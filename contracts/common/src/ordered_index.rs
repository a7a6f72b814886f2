//! Ordered Index
//!
//! Key-sorted doubly linked list over position ids, stored as an arena keyed
//! by id. [`NULL_ID`] marks an absent head, tail, prev, next or hint.
//!
//! Walking head -> tail always yields non-decreasing keys. Each queue has one
//! designated end, fixed at construction by its [`QueueKind`]:
//!
//! | queue | key | consumed from |
//! |---|---|---|
//! | liquidation | `debt * PRECISION / collateral` | tail (riskiest first) |
//! | redemption | fee weight | head (lowest fee weight first) |
//!
//! Engines read through [`OrderedIndex::first_to_process`] and
//! [`OrderedIndex::next_to_process`] only, so they can never walk a queue in
//! the wrong direction.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::constants::index::NULL_ID;
use crate::errors::{SbrError, SbrResult};
use crate::types::PositionId;

/// Which queue an index instance implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum QueueKind {
    /// Liquidation priority, keyed by collateral ratio
    Liquidation,
    /// Redemption priority, keyed by fee weight
    Redemption,
}

/// End of the list an engine draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEnd {
    /// Lowest key
    Head,
    /// Highest key
    Tail,
}

impl QueueKind {
    /// The end the consuming engine draws from
    pub fn designated_end(self) -> QueueEnd {
        match self {
            QueueKind::Liquidation => QueueEnd::Tail,
            QueueKind::Redemption => QueueEnd::Head,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
struct Node {
    key: u128,
    prev: PositionId,
    next: PositionId,
}

/// What an upsert did to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChange {
    /// The id was absent and has been inserted
    Inserted { key: u128 },
    /// The id was present and has been moved to a new key
    Updated { old_key: u128, new_key: u128 },
    /// The id was present with the same key; nothing moved
    Unchanged { key: u128 },
}

/// Result of an upsert: the change and the neighbors of the splice point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splice {
    pub change: IndexChange,
    /// Neighbor before the node, or [`NULL_ID`] at the head
    pub prev: PositionId,
    /// Neighbor after the node, or [`NULL_ID`] at the tail
    pub next: PositionId,
}

/// Key-ordered doubly linked list over position ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct OrderedIndex {
    kind: QueueKind,
    head: PositionId,
    tail: PositionId,
    nodes: BTreeMap<PositionId, Node>,
}

impl OrderedIndex {
    /// Create an empty index for `kind`
    pub fn new(kind: QueueKind) -> Self {
        Self {
            kind,
            head: NULL_ID,
            tail: NULL_ID,
            nodes: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: PositionId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Lowest-key id, if any
    pub fn head(&self) -> Option<PositionId> {
        (self.head != NULL_ID).then_some(self.head)
    }

    /// Highest-key id, if any
    pub fn tail(&self) -> Option<PositionId> {
        (self.tail != NULL_ID).then_some(self.tail)
    }

    /// Current key of `id`
    pub fn key_of(&self, id: PositionId) -> Option<u128> {
        self.nodes.get(&id).map(|n| n.key)
    }

    /// First id the consuming engine should visit
    pub fn first_to_process(&self) -> Option<PositionId> {
        match self.kind.designated_end() {
            QueueEnd::Head => self.head(),
            QueueEnd::Tail => self.tail(),
        }
    }

    /// Id visited after `id` when walking from the designated end
    pub fn next_to_process(&self, id: PositionId) -> SbrResult<Option<PositionId>> {
        let node = self.node(id)?;
        let next = match self.kind.designated_end() {
            QueueEnd::Head => node.next,
            QueueEnd::Tail => node.prev,
        };
        Ok((next != NULL_ID).then_some(next))
    }

    /// Insert `id` with `key`, or move it if already present.
    ///
    /// The search starts at `hint` (head when the hint is null, unknown or
    /// `id` itself), walks forward past smaller keys, then backward past
    /// keys `>= key`. The node lands before the first node whose key is
    /// `>= key`, so equal keys keep insertion order reversed.
    pub fn upsert(&mut self, id: PositionId, key: u128, hint: PositionId) -> SbrResult<Splice> {
        if id == NULL_ID {
            return Err(SbrError::QueueInconsistency { reason: "null id inserted" });
        }

        let change = match self.nodes.get(&id) {
            Some(node) if node.key == key => {
                return Ok(Splice {
                    change: IndexChange::Unchanged { key },
                    prev: node.prev,
                    next: node.next,
                });
            }
            Some(node) => {
                let old_key = node.key;
                self.unlink(id)?;
                IndexChange::Updated { old_key, new_key: key }
            }
            None => IndexChange::Inserted { key },
        };

        let (prev, next) = self.find_splice(key, hint)?;
        self.link(id, key, prev, next)?;

        debug!(
            "{:?} index: {} keyed {} between {} and {}",
            self.kind, id, key, prev, next
        );
        Ok(Splice { change, prev, next })
    }

    /// Remove `id`, returning its key if it was present
    pub fn remove(&mut self, id: PositionId) -> SbrResult<Option<u128>> {
        if !self.nodes.contains_key(&id) {
            return Ok(None);
        }
        let node = self.unlink(id)?;
        debug!("{:?} index: removed {}", self.kind, id);
        Ok(Some(node.key))
    }

    /// Iterate `(id, key)` from head to tail
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            index: self,
            cursor: self.head,
        }
    }

    /// Walk the list and verify links, ordering and size.
    pub fn check_invariants(&self) -> SbrResult<()> {
        let mut prev = NULL_ID;
        let mut prev_key = 0u128;
        let mut cursor = self.head;
        let mut seen = 0usize;

        while cursor != NULL_ID {
            let node = self.node(cursor)?;
            if node.prev != prev {
                return Err(self.fail("back link mismatch"));
            }
            if seen > 0 && node.key < prev_key {
                return Err(self.fail("keys out of order"));
            }
            seen += 1;
            if seen > self.nodes.len() {
                return Err(self.fail("cycle detected"));
            }
            prev = cursor;
            prev_key = node.key;
            cursor = node.next;
        }

        if prev != self.tail {
            return Err(self.fail("tail mismatch"));
        }
        if seen != self.nodes.len() {
            return Err(self.fail("unreachable nodes"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------

    fn fail(&self, reason: &'static str) -> SbrError {
        error!("{:?} index inconsistent: {}", self.kind, reason);
        SbrError::QueueInconsistency { reason }
    }

    fn node(&self, id: PositionId) -> SbrResult<&Node> {
        self.nodes
            .get(&id)
            .ok_or_else(|| self.fail("dangling link"))
    }

    fn node_mut(&mut self, id: PositionId) -> SbrResult<&mut Node> {
        if !self.nodes.contains_key(&id) {
            return Err(self.fail("dangling link"));
        }
        self.nodes
            .get_mut(&id)
            .ok_or(SbrError::QueueInconsistency { reason: "dangling link" })
    }

    /// Find `(prev, next)` such that `key(prev) < key <= key(next)`.
    fn find_splice(&self, key: u128, hint: PositionId) -> SbrResult<(PositionId, PositionId)> {
        let mut next = if self.nodes.contains_key(&hint) { hint } else { self.head };

        while next != NULL_ID {
            let node = self.node(next)?;
            if node.key >= key {
                break;
            }
            next = node.next;
        }

        let mut prev = if next == NULL_ID {
            self.tail
        } else {
            self.node(next)?.prev
        };

        while prev != NULL_ID {
            let node = self.node(prev)?;
            if node.key < key {
                break;
            }
            next = prev;
            prev = node.prev;
        }

        Ok((prev, next))
    }

    fn link(&mut self, id: PositionId, key: u128, prev: PositionId, next: PositionId) -> SbrResult<()> {
        if prev == NULL_ID {
            self.head = id;
        } else {
            self.node_mut(prev)?.next = id;
        }
        if next == NULL_ID {
            self.tail = id;
        } else {
            self.node_mut(next)?.prev = id;
        }
        self.nodes.insert(id, Node { key, prev, next });
        Ok(())
    }

    fn unlink(&mut self, id: PositionId) -> SbrResult<Node> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or_else(|| self.fail("unlink of absent id"))?;

        if node.prev == NULL_ID {
            if self.head != id {
                return Err(self.fail("head does not match unlinked node"));
            }
            self.head = node.next;
        } else {
            self.node_mut(node.prev)?.next = node.next;
        }

        if node.next == NULL_ID {
            if self.tail != id {
                return Err(self.fail("tail does not match unlinked node"));
            }
            self.tail = node.prev;
        } else {
            self.node_mut(node.next)?.prev = node.prev;
        }
        Ok(node)
    }
}

/// Head-to-tail iterator over `(id, key)`
pub struct Iter<'a> {
    index: &'a OrderedIndex,
    cursor: PositionId,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (PositionId, u128);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NULL_ID {
            return None;
        }
        let id = self.cursor;
        let node = self.index.nodes.get(&id)?;
        self.cursor = node.next;
        Some((id, node.key))
    }
}
