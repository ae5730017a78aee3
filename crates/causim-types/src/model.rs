//! The declarative causal model: nodes, directed weighted edges, and the
//! event specs that turn a node into a pulse source.
//!
//! A [`Model`] is supplied by the editing surface after schema
//! validation and is immutable for the duration of a run. The core trusts
//! its invariants (unique ids, `min <= max`, edges referencing existing
//! nodes) and performs no re-validation.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{EdgeId, NodeId};

/// Whether a node integrates its inputs or acts as a periodic pulse source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum NodeKind {
    /// Value is integrated from incoming edges every step.
    #[default]
    Regular,
    /// Value is emitted as a pulse on scheduled steps and never integrated.
    Event,
}

/// Trigger schedule for an event node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "eventType", rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum EventSpec {
    /// Fire every `interval` steps.
    Fixed {
        /// Steps between triggers (at least 1).
        #[ts(type = "number")]
        interval: u64,
    },
    /// Fire after a uniformly random number of steps in
    /// `[interval_min, interval_max]`.
    Random {
        /// Lower bound of the delay; defaults to 1.
        #[serde(rename = "intervalMin", default, skip_serializing_if = "Option::is_none")]
        #[ts(type = "number | null")]
        interval_min: Option<u64>,
        /// Upper bound of the delay; defaults to `interval_min`.
        #[serde(rename = "intervalMax", default, skip_serializing_if = "Option::is_none")]
        #[ts(type = "number | null")]
        interval_max: Option<u64>,
    },
}

impl Default for EventSpec {
    fn default() -> Self {
        Self::Fixed { interval: 1 }
    }
}

impl EventSpec {
    /// Resolve the inclusive `(min, max)` delay range for this spec.
    ///
    /// Zero intervals are raised to 1 so an event can never be rescheduled
    /// onto the step it just fired on. A reversed random range is swapped.
    pub fn delay_range(&self) -> (u64, u64) {
        match *self {
            Self::Fixed { interval } => {
                let interval = interval.max(1);
                (interval, interval)
            }
            Self::Random {
                interval_min,
                interval_max,
            } => {
                let lo = interval_min.unwrap_or(1).max(1);
                let hi = interval_max.unwrap_or(lo).max(1);
                if lo <= hi { (lo, hi) } else { (hi, lo) }
            }
        }
    }
}

/// Sign carried by an edge, encoded on the wire as `"+"` or `"-"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Polarity {
    /// Reinforcing influence.
    #[default]
    #[serde(rename = "+")]
    Positive,
    /// Opposing influence.
    #[serde(rename = "-")]
    Negative,
}

impl Polarity {
    /// Numeric sign applied to the edge's contribution.
    pub const fn sign(self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// A quantity in the causal graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Node {
    /// Stable unique id.
    pub id: NodeId,
    /// Human-readable label.
    #[serde(default)]
    pub label: String,
    /// Initial value of the node.
    pub value: f64,
    /// Inclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Regular or event node.
    #[serde(default)]
    pub kind: NodeKind,
    /// Trigger schedule; only meaningful when `kind` is [`NodeKind::Event`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventSpec>,
}

impl Node {
    /// A regular, unbounded node.
    pub fn regular(id: impl Into<NodeId>, value: f64) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            value,
            min: None,
            max: None,
            kind: NodeKind::Regular,
            event: None,
        }
    }

    /// An event node with the given schedule.
    pub fn event(id: impl Into<NodeId>, value: f64, spec: EventSpec) -> Self {
        Self {
            kind: NodeKind::Event,
            event: Some(spec),
            ..Self::regular(id, value)
        }
    }

    /// Set the inclusive lower bound.
    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Set the inclusive upper bound.
    #[must_use]
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Whether this node is a pulse source.
    pub const fn is_event(&self) -> bool {
        matches!(self.kind, NodeKind::Event)
    }

    /// The effective event spec, falling back to firing every step.
    pub fn event_spec(&self) -> EventSpec {
        self.event.unwrap_or_default()
    }
}

/// A directed, weighted, signed influence from one node to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Edge {
    /// Stable unique id.
    pub id: EdgeId,
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Magnitude of the influence.
    pub weight: f64,
    /// Sign of the influence.
    #[serde(default)]
    pub polarity: Polarity,
}

impl Edge {
    /// Build an edge; mostly useful in tests and fixtures.
    pub fn new(
        id: impl Into<EdgeId>,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        weight: f64,
        polarity: Polarity,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            weight,
            polarity,
        }
    }
}

/// An ordered list of nodes and edges. Node order defines iteration order
/// everywhere in the core, including breach precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Model {
    /// Nodes in display/insertion order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges in insertion order.
    #[serde(default)]
    pub edges: Vec<Edge>,
}
