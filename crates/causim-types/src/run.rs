//! Run-time records: configuration, snapshots, breaches, and breakpoints.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::NodeId;

/// Smallest tick interval the control surface offers.
pub const MIN_INTERVAL_MS: u64 = 4;

/// Largest tick interval the control surface offers.
pub const MAX_INTERVAL_MS: u64 = 512;

/// Per-run settings carried by `init`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct RunConfig {
    /// Integration step size.
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Step budget for a run; 0 means unbounded.
    ///
    /// Every step of a run is kept in the session history until the next
    /// `run`, `reset`, or `init`, so an unbounded run grows it without
    /// limit.
    #[serde(default = "default_steps")]
    #[ts(type = "number")]
    pub steps: u64,
    /// Wall-clock milliseconds between automatic steps.
    #[serde(default = "default_interval_ms", alias = "interval_ms")]
    #[ts(type = "number")]
    pub interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            steps: default_steps(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl RunConfig {
    /// Whether `step` has used up the budget.
    pub const fn budget_reached(&self, step: u64) -> bool {
        self.steps > 0 && step >= self.steps
    }
}

const fn default_dt() -> f64 {
    0.1
}

const fn default_steps() -> u64 {
    100
}

const fn default_interval_ms() -> u64 {
    64
}

/// Externally visible view of one simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Snapshot {
    /// Step counter; 0 is the initial state.
    #[ts(type = "number")]
    pub step: u64,
    /// Value of every node, in model order.
    pub values: IndexMap<NodeId, f64>,
    /// Event nodes that fired on this step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggered_events: Vec<NodeId>,
}

/// Which bound a breach hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "bindings/")]
pub enum Bound {
    /// The inclusive lower bound.
    Min,
    /// The inclusive upper bound.
    Max,
}

/// A node whose computed value left its `[min, max]` range on a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct BreachInfo {
    /// The breaching node.
    pub node_id: NodeId,
    /// The bound that was crossed.
    pub constraint: Bound,
    /// The unclamped computed value.
    pub value: f64,
    /// The bound's value.
    pub limit: f64,
}

/// Comparison applied by a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Condition {
    /// Exact equality.
    #[serde(rename = "=")]
    Eq,
    /// Strictly greater.
    #[serde(rename = ">")]
    Gt,
    /// Strictly less.
    #[serde(rename = "<")]
    Lt,
    /// Greater or equal.
    #[serde(rename = ">=")]
    Ge,
    /// Less or equal.
    #[serde(rename = "<=")]
    Le,
}

impl Condition {
    /// Compare `value` against `threshold` with no epsilon tolerance.
    #[allow(clippy::float_cmp)]
    pub fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Eq => value == threshold,
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Ge => value >= threshold,
            Self::Le => value <= threshold,
        }
    }

    /// The wire symbol for this condition.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

impl core::fmt::Display for Condition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A user-defined condition that halts the run when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Breakpoint {
    /// The watched node.
    pub node_id: NodeId,
    /// How the value is compared.
    pub condition: Condition,
    /// What the value is compared against.
    pub threshold: f64,
}

impl Breakpoint {
    /// Build a breakpoint.
    pub fn new(node_id: impl Into<NodeId>, condition: Condition, threshold: f64) -> Self {
        Self {
            node_id: node_id.into(),
            condition,
            threshold,
        }
    }
}

/// A breakpoint that matched, with the value that satisfied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct BreakpointHit {
    /// The watched node.
    pub node_id: NodeId,
    /// The matching condition.
    pub condition: Condition,
    /// The breakpoint threshold.
    pub threshold: f64,
    /// The node's post-step value.
    pub value: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn run_config_fills_missing_fields() {
        let config: RunConfig = serde_json::from_str(r#"{"intervalMs": 16}"#).unwrap();
        assert_eq!(config.interval_ms, 16);
        assert_eq!(config.steps, 100);
        assert!((config.dt - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn default_interval_is_within_offered_range() {
        let interval = RunConfig::default().interval_ms;
        assert!((MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval));
    }

    #[test]
    fn zero_budget_is_unbounded() {
        let config = RunConfig {
            steps: 0,
            ..RunConfig::default()
        };
        assert!(!config.budget_reached(1_000_000));
        let bounded = RunConfig::default();
        assert!(!bounded.budget_reached(99));
        assert!(bounded.budget_reached(100));
    }

    #[test]
    fn conditions_compare_exactly() {
        assert!(Condition::Eq.evaluate(10.0, 10.0));
        assert!(!Condition::Eq.evaluate(10.000_000_1, 10.0));
        assert!(Condition::Ge.evaluate(10.0, 10.0));
        assert!(!Condition::Gt.evaluate(10.0, 10.0));
        assert!(Condition::Le.evaluate(-1.0, 0.0));
        assert!(Condition::Lt.evaluate(-1.0, 0.0));
    }

    #[test]
    fn breakpoint_wire_shape() {
        let bp: Breakpoint =
            serde_json::from_str(r#"{"nodeId":"b","condition":">=","threshold":10}"#).unwrap();
        assert_eq!(bp.condition, Condition::Ge);
        assert_eq!(bp.node_id.as_str(), "b");
    }

    #[test]
    fn snapshot_omits_empty_triggered_events() {
        let mut values = IndexMap::new();
        values.insert(NodeId::from("a"), 1.0);
        let snapshot = Snapshot {
            step: 3,
            values,
            triggered_events: Vec::new(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"step":3,"values":{"a":1.0}}"#);
    }

    #[test]
    fn breach_wire_shape() {
        let breach = BreachInfo {
            node_id: NodeId::from("b"),
            constraint: Bound::Max,
            value: 105.0,
            limit: 100.0,
        };
        let json = serde_json::to_value(&breach).unwrap();
        assert_eq!(json["constraint"], "max");
        assert_eq!(json["nodeId"], "b");
    }
}
