//! Graph compilation, stepping, scheduling, and session control for Causim.
//!
//! The pure pieces ([`graph`], [`stepper`], [`scheduler`], [`breakpoint`])
//! know nothing about time or channels. [`session`] composes them into a
//! sans-IO state machine, and [`runner`] drives that machine from a tokio
//! task.
//!
//! # Modules
//!
//! - [`breakpoint`] -- Breakpoint registry and post-step evaluation.
//! - [`config`] -- Configuration loading from `causim-config.yaml` into
//!   strongly-typed structs.
//! - [`graph`] -- Model compilation into an adjacency-indexed graph.
//! - [`runner`] -- Tokio actor owning a [`Session`] and its tick timer.
//! - [`scheduler`] -- Next-trigger computation for event nodes.
//! - [`session`] -- Control state machine over inbound commands.
//! - [`stepper`] -- One forward-Euler step with event pulses and clamping.
//!
//! [`Session`]: session::Session

pub mod breakpoint;
pub mod config;
pub mod graph;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod stepper;

pub use graph::CompiledGraph;
pub use runner::{RunnerError, SessionHandle, spawn_session};
pub use session::{Phase, Session};
pub use stepper::SimState;
