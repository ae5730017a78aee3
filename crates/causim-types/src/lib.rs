//! Shared type definitions for the Causim causal-graph simulator.
//!
//! Everything that crosses the session boundary lives here so the core,
//! the engine binary, and the TypeScript front end (via `ts-rs`) agree on
//! one shape.
//!
//! # Modules
//!
//! - [`ids`] -- String newtypes for node and edge identifiers
//! - [`model`] -- Nodes, edges, event specs, and the model container
//! - [`run`] -- Run configuration, snapshots, breaches, and breakpoints
//! - [`messages`] -- Inbound [`Command`] and outbound [`Response`] enums

pub mod ids;
pub mod messages;
pub mod model;
pub mod run;

pub use ids::{EdgeId, NodeId};
pub use messages::{Command, Response};
pub use model::{Edge, EventSpec, Model, Node, NodeKind, Polarity};
pub use run::{
    BreachInfo, Bound, Breakpoint, BreakpointHit, Condition, MAX_INTERVAL_MS, MIN_INTERVAL_MS,
    RunConfig, Snapshot,
};
