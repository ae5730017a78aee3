//! Breakpoint registry and post-step evaluation.

use causim_types::{Breakpoint, BreakpointHit, NodeId};
use indexmap::IndexMap;

/// Ordered set of breakpoints, at most one per node.
///
/// Registration order is evaluation order. Re-adding a breakpoint for a
/// node that already has one replaces it in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreakpointSet {
    entries: IndexMap<NodeId, Breakpoint>,
}

impl BreakpointSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the breakpoint for `breakpoint.node_id`.
    pub fn insert(&mut self, breakpoint: Breakpoint) {
        self.entries.insert(breakpoint.node_id.clone(), breakpoint);
    }

    /// Remove the breakpoint on `node_id`, returning it if present.
    pub fn remove(&mut self, node_id: &str) -> Option<Breakpoint> {
        self.entries.shift_remove(node_id)
    }

    /// Replace every breakpoint with `breakpoints`.
    pub fn replace_all(&mut self, breakpoints: impl IntoIterator<Item = Breakpoint>) {
        self.entries.clear();
        for breakpoint in breakpoints {
            self.insert(breakpoint);
        }
    }

    /// Remove every breakpoint.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Breakpoints in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.values()
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Breakpoint> for BreakpointSet {
    fn from_iter<I: IntoIterator<Item = Breakpoint>>(iter: I) -> Self {
        let mut set = Self::new();
        set.replace_all(iter);
        set
    }
}

/// Return the first breakpoint in `breakpoints` satisfied by `values`.
///
/// Breakpoints on nodes missing from `values` are inert.
pub fn check_breakpoints(
    breakpoints: &BreakpointSet,
    values: &IndexMap<NodeId, f64>,
) -> Option<BreakpointHit> {
    breakpoints.iter().find_map(|bp| {
        let value = *values.get(&bp.node_id)?;
        bp.condition
            .evaluate(value, bp.threshold)
            .then(|| BreakpointHit {
                node_id: bp.node_id.clone(),
                condition: bp.condition,
                threshold: bp.threshold,
                value,
            })
    })
}
