//! Candidate priority queues with lazy deletion.
//!
//! A [`CandidateQueue`] is a `BinaryHeap` plus one handle per cell slot. An
//! entry is live while the handle of its cell still carries the stamp the
//! entry was pushed with; [`purge`](CandidateQueue::purge) clears the handle,
//! so the entry is skipped the next time it reaches the top. Pops also run a
//! caller-supplied validity check (the cell may have been split or merged
//! since it was queued).
//!
//! Ties between equal keys pop in insertion order, but callers must not rely
//! on any particular tie order for correctness.

use crate::data::scratch::ScratchSlots;
use crate::topology::cell::CellId;
use crate::topology::tree::AdaptiveTree;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Clone, Copy, Debug)]
struct Entry {
    cell: CellId,
    key: f64,
    /// `key` or `-key`, whichever makes the wanted entry the maximum.
    priority: f64,
    stamp: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse on stamp so that earlier pushes win ties
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.stamp.cmp(&self.stamp))
    }
}

/// Which end of the key range pops first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueOrder {
    HighestFirst,
    LowestFirst,
}

#[derive(Debug)]
pub struct CandidateQueue {
    heap: BinaryHeap<Entry>,
    order: QueueOrder,
    handles: ScratchSlots<Option<u64>>,
    next_stamp: u64,
}

impl CandidateQueue {
    pub fn new<T: AdaptiveTree>(tree: &T, order: QueueOrder) -> Self {
        Self {
            heap: BinaryHeap::new(),
            order,
            handles: ScratchSlots::allocate(tree, None),
            next_stamp: 0,
        }
    }

    /// Queue `cell` with priority `key`, replacing any earlier entry.
    pub fn push(&mut self, cell: CellId, key: f64) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        let priority = match self.order {
            QueueOrder::HighestFirst => key,
            QueueOrder::LowestFirst => -key,
        };
        self.heap.push(Entry {
            cell,
            key,
            priority,
            stamp,
        });
        self.handles.set(cell, Some(stamp));
    }

    pub fn contains(&self, cell: CellId) -> bool {
        self.handles.get(cell).is_some()
    }

    /// Drop the entry of `cell`, if any.
    pub fn purge(&mut self, cell: CellId) {
        self.handles.reset(cell);
    }

    /// Pop the best live entry for which `valid` holds. Entries failing
    /// `valid` are discarded for good.
    pub fn pop_valid(&mut self, mut valid: impl FnMut(CellId) -> bool) -> Option<(CellId, f64)> {
        while let Some(entry) = self.heap.pop() {
            if *self.handles.get(entry.cell) != Some(entry.stamp) {
                continue;
            }
            self.handles.reset(entry.cell);
            if valid(entry.cell) {
                return Some((entry.cell, entry.key));
            }
        }
        None
    }
}
