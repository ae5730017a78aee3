//! Simulation stepper: one explicit-Euler step over a compiled graph.
//!
//! Each step runs through these phases:
//!
//! 1. **Advance** -- increment the step counter.
//! 2. **Pulse** -- every event whose trigger step has arrived emits its
//!    current value into the accumulators of its regular targets (or of
//!    every regular node if it has no outgoing edges), then reschedules.
//! 3. **Integrate** -- each regular node sums `weight * source * sign`
//!    over incoming edges from regular sources and computes
//!    `raw = current + dt * sum + pulse`. Pulses are not scaled by `dt`,
//!    so they still land when `dt` is 0.
//! 4. **Clamp** -- `max` is checked before `min`. Every out-of-range node
//!    is clamped; only the first one in model order is reported.
//! 5. **Carry** -- event nodes keep their value.
//!
//! Updates are simultaneous: every read comes from the state the step
//! started with, and that state is never mutated.

use causim_types::{BreachInfo, Bound, NodeId, Snapshot};
use indexmap::IndexMap;
use rand::Rng;
use tracing::trace;

use crate::graph::CompiledGraph;
use crate::scheduler;

/// Mutable run state of a session, one immutable value per step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimState {
    /// Steps taken since the initial state.
    pub step: u64,
    /// Value of every node (regular and event), in model order.
    pub values: IndexMap<NodeId, f64>,
    /// The breach reported by the most recent step, if any.
    pub breached: Option<BreachInfo>,
    /// Event node id -> step it fires on next.
    pub event_next_trigger: IndexMap<NodeId, u64>,
    /// Event nodes that fired on the most recent step.
    pub triggered_events: Vec<NodeId>,
}

impl SimState {
    /// Step-0 state: the model's values and a fresh trigger schedule.
    pub fn initial(graph: &CompiledGraph, rng: &mut impl Rng) -> Self {
        Self {
            step: 0,
            values: graph.initial_values(),
            breached: None,
            event_next_trigger: scheduler::initial_schedule(graph, rng),
            triggered_events: Vec::new(),
        }
    }

    /// Current value of `id`, if the node exists.
    pub fn value(&self, id: &str) -> Option<f64> {
        self.values.get(id).copied()
    }

    /// Externally visible view of this state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            step: self.step,
            values: self.values.clone(),
            triggered_events: self.triggered_events.clone(),
        }
    }
}

/// Advance `state` by one step of size `dt`.
///
/// Deterministic given `state`, `graph` and `dt`, apart from the delays
/// drawn for random events that fire on this step.
#[allow(clippy::suboptimal_flops)]
pub fn step(state: &SimState, graph: &CompiledGraph, dt: f64, rng: &mut impl Rng) -> SimState {
    let step = state.step.saturating_add(1);

    // --- Pulse ---
    let mut pulses: IndexMap<&NodeId, f64> = IndexMap::new();
    let mut next_trigger = state.event_next_trigger.clone();
    let mut triggered = Vec::new();

    for (id, node) in graph.events() {
        let Some(&due) = state.event_next_trigger.get(id) else {
            continue;
        };
        if due > step {
            continue;
        }

        let pulse = state.value(id.as_str()).unwrap_or(node.value);
        let targets = graph.outgoing(id.as_str());
        if targets.is_empty() {
            for target in graph.regular().keys() {
                *pulses.entry(target).or_insert(0.0) += pulse;
            }
        } else {
            for target in targets.iter().filter(|t| !graph.is_event(t.as_str())) {
                *pulses.entry(target).or_insert(0.0) += pulse;
            }
        }

        let rescheduled = scheduler::next_trigger(&node.event_spec(), step, rng);
        next_trigger.insert(id.clone(), rescheduled);
        triggered.push(id.clone());
        trace!(step, event = %id, pulse, next = rescheduled, "event fired");
    }

    // --- Integrate + Clamp ---
    let mut values = IndexMap::with_capacity(state.values.len());
    let mut breached: Option<BreachInfo> = None;

    for (id, current) in &state.values {
        let Some(node) = graph.regular().get(id) else {
            // --- Carry ---
            values.insert(id.clone(), *current);
            continue;
        };

        let edge_sum: f64 = graph
            .incoming(id.as_str())
            .iter()
            .filter(|edge| !graph.is_event(edge.source.as_str()))
            .map(|edge| edge.weight * state.value(edge.source.as_str()).unwrap_or(0.0) * edge.sign)
            .sum();
        let pulse = pulses.get(id).copied().unwrap_or(0.0);
        let raw = *current + dt * edge_sum + pulse;

        let mut next = raw;
        if let Some(max) = node.max.filter(|max| next > *max) {
            breached.get_or_insert_with(|| BreachInfo {
                node_id: id.clone(),
                constraint: Bound::Max,
                value: raw,
                limit: max,
            });
            next = max;
        } else if let Some(min) = node.min.filter(|min| next < *min) {
            breached.get_or_insert_with(|| BreachInfo {
                node_id: id.clone(),
                constraint: Bound::Min,
                value: raw,
                limit: min,
            });
            next = min;
        }

        trace!(step, node = %id, edge_sum, pulse, raw, next, "node integrated");
        values.insert(id.clone(), next);
    }

    SimState {
        step,
        values,
        breached,
        event_next_trigger: next_trigger,
        triggered_events: triggered,
    }
}
