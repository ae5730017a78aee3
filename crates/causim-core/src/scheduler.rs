//! Event scheduler: computes when each event node fires next.
//!
//! Schedules are computed eagerly at trigger time, never lazily. The
//! baseline for a reschedule is the step the event actually fired on, so
//! a late random trigger shifts every later one.

use causim_types::{EventSpec, NodeId};
use indexmap::IndexMap;
use rand::Rng;

use crate::graph::CompiledGraph;

/// Step at which an event with `spec` fires next, measured from
/// `current_step`.
///
/// Fixed events fire `interval` steps later. Random events draw a delay
/// uniformly from the inclusive range given by [`EventSpec::delay_range`].
/// The delay is always at least 1.
pub fn next_trigger(spec: &EventSpec, current_step: u64, rng: &mut impl Rng) -> u64 {
    let (lo, hi) = spec.delay_range();
    let delay = if lo == hi {
        lo
    } else {
        rng.random_range(lo..=hi)
    };
    current_step.saturating_add(delay)
}

/// Initial trigger schedule for every event node, computed from step 0.
///
/// Regular nodes have no entry.
pub fn initial_schedule(graph: &CompiledGraph, rng: &mut impl Rng) -> IndexMap<NodeId, u64> {
    graph
        .events()
        .iter()
        .map(|(id, node)| (id.clone(), next_trigger(&node.event_spec(), 0, rng)))
        .collect()
}
