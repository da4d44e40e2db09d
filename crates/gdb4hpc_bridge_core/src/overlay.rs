//! Per-rank value overlays.
//!
//! Each key (kind, process set, optional name) owns a list of entries whose
//! ranges are pairwise disjoint. An update carves its range out of every
//! existing entry before appending, so ranks not named by the update keep
//! their last observed value.

use std::collections::HashMap;

use serde::Serialize;

use crate::ranges::RangeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Variable,
    Thread,
    Stack,
    Source,
    Breakpoint,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OverlayKey {
    pub kind: EntryKind,
    pub process_set: String,
    pub name: Option<String>,
}

impl OverlayKey {
    pub fn new(kind: EntryKind, process_set: impl Into<String>) -> Self {
        Self {
            kind,
            process_set: process_set.into(),
            name: None,
        }
    }

    pub fn named(kind: EntryKind, process_set: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            process_set: process_set.into(),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayEntry<V> {
    pub range: RangeSet,
    pub value: V,
}

#[derive(Debug, Clone)]
pub struct OverlayStore<V> {
    entries: HashMap<OverlayKey, Vec<OverlayEntry<V>>>,
}

impl<V> Default for OverlayStore<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> OverlayStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `value` the only value for every rank in `range` under `key`.
    pub fn update(&mut self, key: OverlayKey, range: RangeSet, value: V) {
        if range.is_empty() {
            return;
        }
        let entries = self.entries.entry(key).or_default();

        entries.retain_mut(|entry| {
            let remainder = entry.range.subtract(&range);
            if remainder.is_empty() {
                return false;
            }
            entry.range = remainder;
            true
        });

        entries.push(OverlayEntry { range, value });
    }

    /// Entries under `key` restricted to `filter`; empty intersections are dropped.
    pub fn query(&self, key: &OverlayKey, filter: &RangeSet) -> Vec<(RangeSet, &V)> {
        let Some(entries) = self.entries.get(key) else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| {
                let overlap = entry.range.intersect(filter);
                (!overlap.is_empty()).then_some((overlap, &entry.value))
            })
            .collect()
    }

    pub fn query_all(&self, key: &OverlayKey) -> &[OverlayEntry<V>] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Value currently held by a single rank.
    pub fn value_at(&self, key: &OverlayKey, rank: u64) -> Option<&V> {
        self.query_all(key)
            .iter()
            .find(|entry| entry.range.contains(rank))
            .map(|entry| &entry.value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &OverlayKey> {
        self.entries.keys()
    }

    /// Keys of one kind within one process set, sorted by name.
    pub fn keys_for(&self, kind: EntryKind, process_set: &str) -> Vec<&OverlayKey> {
        let mut keys: Vec<&OverlayKey> = self
            .entries
            .keys()
            .filter(|key| key.kind == kind && key.process_set == process_set)
            .collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        keys
    }

    /// Removes every entry for which `predicate` holds and returns them.
    pub fn delete_matching<F>(&mut self, mut predicate: F) -> Vec<(OverlayKey, OverlayEntry<V>)>
    where
        F: FnMut(&OverlayKey, &V) -> bool,
    {
        let mut removed = Vec::new();

        for (key, entries) in self.entries.iter_mut() {
            let mut kept = Vec::with_capacity(entries.len());
            for entry in entries.drain(..) {
                if predicate(key, &entry.value) {
                    removed.push((key.clone(), entry));
                } else {
                    kept.push(entry);
                }
            }
            *entries = kept;
        }
        self.entries.retain(|_, entries| !entries.is_empty());

        removed
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
