//! Bounded, duplicate-free list of domain records.
//!
//! The same record can reach a feed twice, once pushed and once polled. The
//! list rejects an item when its id is currently in the list or was inserted
//! within the last `seen_capacity` insertions, so a late poll cannot re-add
//! something that has already been evicted.

use crate::types::Identified;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone)]
pub struct MaintainedList<T> {
    items: VecDeque<T>,
    capacity: usize,
    live_ids: HashSet<String>,
    seen: VecDeque<String>,
    seen_index: HashSet<String>,
    seen_capacity: usize,
}

impl<T: Identified> MaintainedList<T> {
    /// `seen_capacity` is raised to at least `capacity`.
    pub fn new(capacity: usize, seen_capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let seen_capacity = seen_capacity.max(capacity);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            live_ids: HashSet::with_capacity(capacity),
            seen: VecDeque::with_capacity(seen_capacity),
            seen_index: HashSet::with_capacity(seen_capacity),
            seen_capacity,
        }
    }

    /// Insert one item. Items with an ordinal go in front of the first item
    /// whose ordinal is not greater; items without one go to the front.
    /// Returns false for a duplicate.
    pub fn insert(&mut self, item: T) -> bool {
        let id = item.id();
        if self.live_ids.contains(&id) || self.seen_index.contains(&id) {
            return false;
        }
        self.remember(id.clone());

        let pos = match item.ordinal() {
            Some(ord) => self
                .items
                .iter()
                .position(|x| x.ordinal() <= Some(ord))
                .unwrap_or(self.items.len()),
            None => 0,
        };
        self.items.insert(pos, item);
        self.live_ids.insert(id);

        while self.items.len() > self.capacity {
            if let Some(evicted) = self.items.pop_back() {
                self.live_ids.remove(&evicted.id());
            }
        }
        true
    }

    /// Merge a polled snapshot (newest first). Returns how many were new.
    pub fn merge(&mut self, snapshot: Vec<T>) -> usize {
        snapshot
            .into_iter()
            .rev()
            .filter_map(|item| self.insert(item).then_some(()))
            .count()
    }

    fn remember(&mut self, id: String) {
        if self.seen_index.insert(id.clone()) {
            self.seen.push_back(id);
        }
        while self.seen.len() > self.seen_capacity {
            if let Some(old) = self.seen.pop_front() {
                self.seen_index.remove(&old);
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.live_ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Identified + Clone> MaintainedList<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
