use std::collections::HashMap;

use serde::Serialize;

use crate::ranges::{Rank, RangeSet};

/// Name the backend uses for the implicit set of every launched rank.
pub const ALL_PROCESS_SETS: &str = "all";

/// Which process set and which ranks the user is looking at.
///
/// Only explicit focus or filter requests change it; stop events read it
/// but never write it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Focus {
    pub process_set: String,
    /// Ranks of the focused set, per member process set. `None` while the
    /// focus is on every rank; otherwise sets without an entry are hidden.
    pub scope: Option<HashMap<String, RangeSet>>,
    /// Display filter per process set. A set with no entry shows every rank.
    pub ranges: HashMap<String, RangeSet>,
    /// Rank whose location drives the editor view, per process set.
    pub display_ranks: HashMap<String, Rank>,
}

impl Default for Focus {
    fn default() -> Self {
        Self {
            process_set: ALL_PROCESS_SETS.to_string(),
            scope: None,
            ranges: HashMap::new(),
            display_ranks: HashMap::new(),
        }
    }
}

impl Focus {
    /// Ranks of `group` inside the focused set that also survive the
    /// display filter of `process_set`.
    pub fn filter(&self, process_set: &str, group: &RangeSet) -> RangeSet {
        group.intersect(&self.range_for(process_set))
    }

    pub fn admits(&self, process_set: &str, group: &RangeSet) -> bool {
        !self.filter(process_set, group).is_empty()
    }

    /// Ranks of `process_set` that are both focused and not filtered out.
    pub fn range_for(&self, process_set: &str) -> RangeSet {
        let scoped = match &self.scope {
            Some(scope) => match scope.get(process_set) {
                Some(ranks) => ranks.clone(),
                None => return RangeSet::empty(),
            },
            None => RangeSet::all(),
        };
        match self.ranges.get(process_set) {
            Some(filter) => scoped.intersect(filter),
            None => scoped,
        }
    }

    pub fn set_filter(&mut self, process_set: impl Into<String>, ranks: RangeSet) {
        self.ranges.insert(process_set.into(), ranks);
    }

    pub fn clear_filter(&mut self, process_set: &str) -> bool {
        self.ranges.remove(process_set).is_some()
    }

    /// Switches to `process_set` made of `scopes` and drops the display
    /// filters. No scopes means every rank is in focus.
    pub fn focus_on(&mut self, process_set: impl Into<String>, scopes: Vec<(String, RangeSet)>) {
        self.process_set = process_set.into();
        self.ranges.clear();
        self.scope = if scopes.is_empty() {
            None
        } else {
            let mut scope: HashMap<String, RangeSet> = HashMap::new();
            for (name, ranks) in scopes {
                let merged = match scope.get(&name) {
                    Some(existing) => existing.union(&ranks),
                    None => ranks,
                };
                scope.insert(name, merged);
            }
            Some(scope)
        };
    }

    pub fn display_rank(&self, process_set: &str) -> Rank {
        self.display_ranks.get(process_set).copied().unwrap_or(0)
    }

    pub fn set_display_rank(&mut self, process_set: impl Into<String>, rank: Rank) {
        self.display_ranks.insert(process_set.into(), rank);
    }
}
