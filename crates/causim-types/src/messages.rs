//! The message protocol between a caller and a simulation session.
//!
//! Both directions are internally tagged JSON objects discriminated by a
//! `type` field, e.g. `{"type":"setSpeed","intervalMs":32}`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::model::Model;
use crate::run::{BreachInfo, Breakpoint, BreakpointHit, RunConfig, Snapshot};

/// Inbound control message (caller to session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum Command {
    /// Compile a model and build the initial state.
    Init {
        /// The model to simulate.
        model: Model,
        /// Step size, budget and tick interval. The session's configured
        /// defaults apply when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        #[ts(optional)]
        config: Option<RunConfig>,
    },
    /// Start automatic stepping.
    Run,
    /// Stop automatic stepping.
    Pause,
    /// Clear a latched breach and restart automatic stepping.
    Resume,
    /// Restore the initial snapshot.
    Reset,
    /// Halt and report the accumulated history.
    Stop,
    /// Perform exactly one step.
    Step,
    /// Change the tick interval.
    SetSpeed {
        /// New wall-clock milliseconds between automatic steps. Callers
        /// keep this within [`MIN_INTERVAL_MS`]..=[`MAX_INTERVAL_MS`].
        ///
        /// [`MIN_INTERVAL_MS`]: crate::run::MIN_INTERVAL_MS
        /// [`MAX_INTERVAL_MS`]: crate::run::MAX_INTERVAL_MS
        #[serde(rename = "intervalMs")]
        #[ts(type = "number")]
        interval_ms: u64,
    },
    /// Replace the active breakpoint set.
    UpdateBreakpoints {
        /// The new breakpoints, in evaluation order.
        breakpoints: Vec<Breakpoint>,
    },
}

impl Command {
    /// Wire tag of this command, for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Run => "run",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Reset => "reset",
            Self::Stop => "stop",
            Self::Step => "step",
            Self::SetSpeed { .. } => "setSpeed",
            Self::UpdateBreakpoints { .. } => "updateBreakpoints",
        }
    }
}

/// Outbound result message (session to caller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum Response {
    /// The model compiled and the session is idle.
    Ready,
    /// A snapshot produced by an automatic step or a reset.
    State {
        /// The produced snapshot.
        snapshot: Snapshot,
    },
    /// A manual step completed without breach or breakpoint.
    Stepped {
        /// The produced snapshot.
        snapshot: Snapshot,
    },
    /// Automatic stepping stopped, either on request or on a breach.
    Paused {
        /// The breach that caused the pause, if any.
        breach: Option<BreachInfo>,
    },
    /// Automatic stepping restarted.
    Resumed,
    /// The run finished.
    Done {
        /// Every snapshot produced since the run started.
        history: Vec<Snapshot>,
    },
    /// A breakpoint matched after a step.
    BreakpointHit {
        /// The matching breakpoint and value.
        hit: BreakpointHit,
    },
    /// A command was rejected.
    Error {
        /// Why the command was rejected.
        message: String,
    },
}

impl Response {
    /// Build an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
