use crate::overlay::{EntryKind, OverlayKey, OverlayStore};
use crate::ranges::{Rank, RangeSet};
use crate::types::{Breakpoint, SourceLocation, StackFrame, Thread, Variable};

const STOP_REASON: &str = "stop_reason";

/// A variable object created on the backend for one expression.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableHandle {
    pub expression: String,
    pub reference: String,
}

/// Everything the bridge has observed about the job, one overlay per kind.
#[derive(Debug, Default)]
pub struct DataStore {
    pub variables: OverlayStore<Variable>,
    pub threads: OverlayStore<Vec<Thread>>,
    pub stacks: OverlayStore<Vec<StackFrame>>,
    pub sources: OverlayStore<SourceLocation>,
    pub breakpoints: OverlayStore<Breakpoint>,
    pub status: OverlayStore<String>,
    handles: Vec<VariableHandle>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_source(&mut self, process_set: &str, group: RangeSet, location: SourceLocation) {
        self.sources
            .update(OverlayKey::new(EntryKind::Source, process_set), group, location);
    }

    pub fn source_at(&self, process_set: &str, rank: Rank) -> Option<&SourceLocation> {
        self.sources
            .value_at(&OverlayKey::new(EntryKind::Source, process_set), rank)
    }

    pub fn record_stop(&mut self, process_set: &str, group: RangeSet, reason: &str) {
        self.status.update(
            OverlayKey::named(EntryKind::Status, process_set, STOP_REASON),
            group,
            reason.to_string(),
        );
    }

    pub fn stop_reason_at(&self, process_set: &str, rank: Rank) -> Option<&str> {
        self.status
            .value_at(
                &OverlayKey::named(EntryKind::Status, process_set, STOP_REASON),
                rank,
            )
            .map(String::as_str)
    }

    pub fn handle(&self, expression: &str) -> Option<&VariableHandle> {
        self.handles.iter().find(|h| h.expression == expression)
    }

    pub fn handle_by_reference(&self, reference: &str) -> Option<&VariableHandle> {
        self.handles.iter().find(|h| h.reference == reference)
    }

    pub fn add_handle(&mut self, expression: impl Into<String>, reference: impl Into<String>) {
        let expression = expression.into();
        let reference = reference.into();
        if let Some(existing) = self.handles.iter_mut().find(|h| h.expression == expression) {
            existing.reference = reference;
        } else {
            self.handles.push(VariableHandle {
                expression,
                reference,
            });
        }
    }

    pub fn handles(&self) -> &[VariableHandle] {
        &self.handles
    }

    /// Process sets that have any value recorded for `kind`.
    pub fn process_sets(&self, kind: EntryKind) -> Vec<String> {
        let mut sets: Vec<String> = match kind {
            EntryKind::Variable => collect_sets(&self.variables, kind),
            EntryKind::Thread => collect_sets(&self.threads, kind),
            EntryKind::Stack => collect_sets(&self.stacks, kind),
            EntryKind::Source => collect_sets(&self.sources, kind),
            EntryKind::Breakpoint => collect_sets(&self.breakpoints, kind),
            EntryKind::Status => collect_sets(&self.status, kind),
        };
        sets.sort();
        sets.dedup();
        sets
    }
}

fn collect_sets<V>(store: &OverlayStore<V>, kind: EntryKind) -> Vec<String> {
    store
        .keys()
        .filter(|k| k.kind == kind)
        .map(|k| k.process_set.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32) -> SourceLocation {
        SourceLocation {
            file: "/src/jacobi.c".into(),
            line,
        }
    }

    #[test]
    fn sources_follow_the_latest_stop_per_rank() {
        let mut store = DataStore::new();
        store.set_source("App0", RangeSet::span(0, 3), loc(10));
        store.set_source("App0", RangeSet::span(2, 3), loc(12));

        assert_eq!(store.source_at("App0", 0), Some(&loc(10)));
        assert_eq!(store.source_at("App0", 3), Some(&loc(12)));
        assert_eq!(store.source_at("App0", 4), None);
        assert_eq!(store.source_at("App1", 0), None);
    }

    #[test]
    fn stop_reasons_are_tracked_per_rank() {
        let mut store = DataStore::new();
        store.record_stop("App0", RangeSet::span(0, 1), "breakpoint-hit");
        store.record_stop("App0", RangeSet::single(1), "end-stepping-range");

        assert_eq!(store.stop_reason_at("App0", 0), Some("breakpoint-hit"));
        assert_eq!(store.stop_reason_at("App0", 1), Some("end-stepping-range"));
    }

    #[test]
    fn handles_are_unique_per_expression() {
        let mut store = DataStore::new();
        store.add_handle("u", "var1");
        store.add_handle("v", "var2");
        store.add_handle("u", "var3");

        assert_eq!(store.handles().len(), 2);
        assert_eq!(store.handle("u").map(|h| h.reference.as_str()), Some("var3"));
        assert_eq!(
            store.handle_by_reference("var2").map(|h| h.expression.as_str()),
            Some("v")
        );
    }

    #[test]
    fn process_sets_are_sorted_and_unique() {
        let mut store = DataStore::new();
        store.set_source("App1", RangeSet::single(0), loc(1));
        store.set_source("App0", RangeSet::single(0), loc(1));
        store.record_stop("App2", RangeSet::single(0), "breakpoint-hit");

        assert_eq!(store.process_sets(EntryKind::Source), vec!["App0", "App1"]);
        assert_eq!(store.process_sets(EntryKind::Status), vec!["App2"]);
    }
}
