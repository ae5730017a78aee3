//! Control state machine for one simulation session.
//!
//! [`Session`] is sans-IO: it consumes [`Command`]s and timer ticks and
//! returns the [`Response`]s to emit. It never sleeps or spawns. What it
//! wants from the recurring timer is published through [`Timer`], which
//! the runner polls after each call to arm, re-arm, or disarm its own
//! interval.
//!
//! # Phases
//!
//! ```text
//! Uninitialized --init--> Idle --run--> Running <--pause/resume--> Paused
//!                                          |                          |
//!                                          +--stop / budget--> Done <-+
//! ```
//!
//! `reset` returns to `Idle` from any initialized phase. A breach or a
//! breakpoint hit moves `Running` to `Paused`.

use std::time::Duration;

use causim_types::{Breakpoint, Command, Model, Response, RunConfig, Snapshot};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info, warn};

use crate::breakpoint::{self, BreakpointSet};
use crate::config::SessionConfig;
use crate::graph::CompiledGraph;
use crate::stepper::{self, SimState};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No model has been loaded.
    Uninitialized,
    /// A model is loaded and nothing is running.
    Idle,
    /// The timer is stepping automatically.
    Running,
    /// Automatic stepping stopped on request, breach, or breakpoint.
    Paused,
    /// The run finished by `stop` or by exhausting the step budget.
    Done,
}

/// The recurring timer the session wants the runner to drive.
///
/// Every arm or disarm bumps [`generation`](Self::generation), so the
/// runner can detect a restart even when the interval is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    interval: Option<Duration>,
    generation: u64,
}

impl Timer {
    /// Period of the armed timer, or `None` when disarmed.
    pub const fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Counter bumped on every state change.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a timer is armed.
    pub const fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    fn arm(&mut self, interval_ms: u64) {
        self.interval = Some(Duration::from_millis(interval_ms.max(1)));
        self.generation = self.generation.wrapping_add(1);
    }

    fn disarm(&mut self) {
        if self.interval.take().is_some() {
            self.generation = self.generation.wrapping_add(1);
        }
    }
}

/// Everything that exists once a model is loaded.
#[derive(Debug)]
struct LoadedRun {
    graph: CompiledGraph,
    config: RunConfig,
    state: SimState,
    history: Vec<Snapshot>,
}

/// One simulation session: model, run state, breakpoints, and timer.
#[derive(Debug)]
pub struct Session {
    phase: Phase,
    run: Option<LoadedRun>,
    breakpoints: BreakpointSet,
    timer: Timer,
    rng: SmallRng,
    run_defaults: RunConfig,
}

impl Session {
    /// Create an uninitialized session.
    pub fn new(config: &SessionConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);
        Self {
            phase: Phase::Uninitialized,
            run: None,
            breakpoints: BreakpointSet::new(),
            timer: Timer::default(),
            rng,
            run_defaults: RunConfig::default(),
        }
    }

    /// Use `defaults` for any `init` that carries no run configuration.
    #[must_use]
    pub fn with_run_defaults(mut self, defaults: RunConfig) -> Self {
        self.run_defaults = defaults;
        self
    }

    /// Create an uninitialized session with a fixed RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self::new(&SessionConfig::seeded(seed))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current lifecycle phase.
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// The timer the runner should be driving.
    pub const fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Current run state, once initialized.
    pub fn state(&self) -> Option<&SimState> {
        self.run.as_ref().map(|run| &run.state)
    }

    /// Active run configuration, once initialized.
    pub fn run_config(&self) -> Option<&RunConfig> {
        self.run.as_ref().map(|run| &run.config)
    }

    /// Snapshots produced since the last `init`, `run`, or `reset`.
    pub fn history(&self) -> &[Snapshot] {
        self.run.as_ref().map(|run| run.history.as_slice()).unwrap_or_default()
    }

    /// Active breakpoints in evaluation order.
    pub const fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Decode a JSON message and handle it.
    ///
    /// A message that does not decode to a known [`Command`] yields a
    /// single [`Response::Error`] and has no other effect.
    pub fn handle_raw(&mut self, raw: &str) -> Vec<Response> {
        match serde_json::from_str::<Command>(raw) {
            Ok(command) => self.handle(command),
            Err(e) => {
                warn!(error = %e, "malformed message rejected");
                vec![Response::error(format!("malformed message: {e}"))]
            }
        }
    }

    /// Handle one command and return the responses to emit, in order.
    pub fn handle(&mut self, command: Command) -> Vec<Response> {
        let name = command.name();
        if let Command::Init { model, config } = command {
            let config = config.unwrap_or(self.run_defaults);
            return self.init(&model, config);
        }

        let Some(run) = self.run.as_mut() else {
            warn!(command = name, "command rejected: session not initialized");
            return vec![Response::error(format!(
                "cannot {name}: session is not initialized"
            ))];
        };

        match command {
            // Handled above.
            Command::Init { .. } => Vec::new(),
            Command::Run => {
                run.history.clear();
                self.timer.arm(run.config.interval_ms);
                self.phase = Phase::Running;
                info!(
                    step = run.state.step,
                    interval_ms = run.config.interval_ms,
                    "run started"
                );
                Vec::new()
            }
            Command::Pause => {
                let was_running = self.timer.is_armed();
                self.timer.disarm();
                if was_running {
                    self.phase = Phase::Paused;
                    info!(step = run.state.step, "run paused");
                    vec![Response::Paused { breach: None }]
                } else {
                    Vec::new()
                }
            }
            Command::Resume => {
                run.state.breached = None;
                self.timer.arm(run.config.interval_ms);
                self.phase = Phase::Running;
                info!(step = run.state.step, "run resumed");
                vec![Response::Resumed]
            }
            Command::Reset => {
                self.timer.disarm();
                run.state = SimState::initial(&run.graph, &mut self.rng);
                run.history.clear();
                self.phase = Phase::Idle;
                info!("session reset");
                vec![Response::State {
                    snapshot: run.state.snapshot(),
                }]
            }
            Command::Stop => {
                self.timer.disarm();
                self.phase = Phase::Done;
                info!(
                    step = run.state.step,
                    history = run.history.len(),
                    "run stopped"
                );
                vec![Response::Done {
                    history: run.history.clone(),
                }]
            }
            Command::Step => {
                run.state.breached = None;
                self.advance(true)
            }
            Command::SetSpeed { interval_ms } => {
                run.config.interval_ms = interval_ms;
                if self.timer.is_armed() {
                    self.timer.arm(interval_ms);
                }
                debug!(interval_ms, "tick interval changed");
                Vec::new()
            }
            Command::UpdateBreakpoints { breakpoints } => {
                self.replace_breakpoints(breakpoints);
                Vec::new()
            }
        }
    }

    /// Handle one tick of the recurring timer.
    ///
    /// Ticks that arrive while no timer is armed are ignored, so a tick
    /// already queued when `pause` lands never produces a step.
    pub fn on_tick(&mut self) -> Vec<Response> {
        if !self.timer.is_armed() {
            debug!("stale tick ignored");
            return Vec::new();
        }
        self.advance(false)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    fn init(&mut self, model: &Model, config: RunConfig) -> Vec<Response> {
        self.timer.disarm();
        let graph = CompiledGraph::compile(model);
        let state = SimState::initial(&graph, &mut self.rng);
        info!(
            nodes = graph.node_count(),
            events = graph.events().len(),
            dt = config.dt,
            steps = config.steps,
            interval_ms = config.interval_ms,
            "session initialized"
        );
        self.run = Some(LoadedRun {
            graph,
            config,
            state,
            history: Vec::new(),
        });
        self.breakpoints.clear();
        self.phase = Phase::Idle;
        vec![Response::Ready]
    }

    fn replace_breakpoints(&mut self, breakpoints: Vec<Breakpoint>) {
        self.breakpoints.replace_all(breakpoints);
        debug!(count = self.breakpoints.len(), "breakpoints updated");
    }

    /// Take one step and run the post-step checks.
    ///
    /// Precedence is breach, then breakpoint, then step budget. Each of
    /// them disarms the timer.
    fn advance(&mut self, manual: bool) -> Vec<Response> {
        let Some(run) = self.run.as_mut() else {
            return vec![Response::error("cannot step: session is not initialized")];
        };

        let next = stepper::step(&run.state, &run.graph, run.config.dt, &mut self.rng);
        let snapshot = next.snapshot();
        run.state = next;
        run.history.push(snapshot.clone());
        debug!(
            step = run.state.step,
            manual,
            triggered = run.state.triggered_events.len(),
            "step completed"
        );

        let mut out = Vec::with_capacity(2);
        if !manual {
            out.push(Response::State {
                snapshot: snapshot.clone(),
            });
        }

        if let Some(breach) = run.state.breached.clone() {
            self.timer.disarm();
            self.phase = Phase::Paused;
            info!(
                step = run.state.step,
                node = %breach.node_id,
                constraint = ?breach.constraint,
                value = breach.value,
                limit = breach.limit,
                "constraint breached, pausing"
            );
            out.push(Response::Paused {
                breach: Some(breach),
            });
            return out;
        }

        if let Some(hit) = breakpoint::check_breakpoints(&self.breakpoints, &run.state.values) {
            self.timer.disarm();
            self.phase = Phase::Paused;
            info!(
                step = run.state.step,
                node = %hit.node_id,
                condition = %hit.condition,
                threshold = hit.threshold,
                value = hit.value,
                "breakpoint hit, pausing"
            );
            out.push(Response::BreakpointHit { hit });
            return out;
        }

        if manual {
            out.push(Response::Stepped { snapshot });
        }

        if run.config.budget_reached(run.state.step) {
            self.timer.disarm();
            self.phase = Phase::Done;
            info!(
                step = run.state.step,
                budget = run.config.steps,
                "step budget reached"
            );
            out.push(Response::Done {
                history: run.history.clone(),
            });
        }

        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::panic)]
mod tests {
    use causim_types::{Condition, Edge, Node, Polarity};

    use super::*;

    fn growth_model() -> Model {
        Model {
            nodes: vec![Node::regular("a", 1.0), Node::regular("b", 0.0)],
            edges: vec![Edge::new("ab", "a", "b", 1.0, Polarity::Positive)],
        }
    }

    fn init(session: &mut Session, steps: u64) -> Vec<Response> {
        session.handle(Command::Init {
            model: growth_model(),
            config: Some(RunConfig {
                dt: 1.0,
                steps,
                interval_ms: 10,
            }),
        })
    }

    #[test]
    fn commands_before_init_are_rejected() {
        let mut session = Session::with_seed(1);
        for command in [
            Command::Run,
            Command::Pause,
            Command::Resume,
            Command::Reset,
            Command::Stop,
            Command::Step,
            Command::SetSpeed { interval_ms: 8 },
            Command::UpdateBreakpoints {
                breakpoints: Vec::new(),
            },
        ] {
            let out = session.handle(command);
            assert!(matches!(out.as_slice(), [Response::Error { .. }]), "{out:?}");
        }
        assert_eq!(session.phase(), Phase::Uninitialized);
        assert!(!session.timer().is_armed());
        assert!(session.state().is_none());
    }

    #[test]
    fn malformed_message_is_an_error() {
        let mut session = Session::with_seed(1);
        let out = session.handle_raw(r#"{"type":"launch"}"#);
        assert!(matches!(out.as_slice(), [Response::Error { .. }]));
        let out = session.handle_raw("not json");
        assert!(matches!(out.as_slice(), [Response::Error { .. }]));
    }

    #[test]
    fn init_emits_ready_and_idles() {
        let mut session = Session::with_seed(1);
        assert_eq!(init(&mut session, 10), vec![Response::Ready]);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.state().map(|s| s.step), Some(0));
    }

    #[test]
    fn run_arms_timer_and_ticks_emit_state() {
        let mut session = Session::with_seed(1);
        init(&mut session, 10);
        assert!(session.handle(Command::Run).is_empty());
        assert_eq!(session.phase(), Phase::Running);
        assert_eq!(session.timer().interval(), Some(Duration::from_millis(10)));

        let out = session.on_tick();
        match out.as_slice() {
            [Response::State { snapshot }] => {
                assert_eq!(snapshot.step, 1);
                assert_eq!(snapshot.values.get("b"), Some(&1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pause_disarms_and_ignores_stale_ticks() {
        let mut session = Session::with_seed(1);
        init(&mut session, 10);
        session.handle(Command::Run);
        let out = session.handle(Command::Pause);
        assert_eq!(out, vec![Response::Paused { breach: None }]);
        assert_eq!(session.phase(), Phase::Paused);
        assert!(session.on_tick().is_empty());
        assert_eq!(session.state().map(|s| s.step), Some(0));
    }

    #[test]
    fn pause_when_idle_is_silent() {
        let mut session = Session::with_seed(1);
        init(&mut session, 10);
        assert!(session.handle(Command::Pause).is_empty());
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn set_speed_restarts_an_armed_timer() {
        let mut session = Session::with_seed(1);
        init(&mut session, 10);
        session.handle(Command::Run);
        let before = session.timer().generation();
        session.handle(Command::SetSpeed { interval_ms: 32 });
        assert_eq!(session.timer().interval(), Some(Duration::from_millis(32)));
        assert!(session.timer().generation() > before);
    }

    #[test]
    fn set_speed_while_idle_only_records_interval() {
        let mut session = Session::with_seed(1);
        init(&mut session, 10);
        session.handle(Command::SetSpeed { interval_ms: 32 });
        assert!(!session.timer().is_armed());
        session.handle(Command::Run);
        assert_eq!(session.timer().interval(), Some(Duration::from_millis(32)));
    }

    #[test]
    fn zero_interval_is_guarded() {
        let mut session = Session::with_seed(1);
        init(&mut session, 10);
        session.handle(Command::SetSpeed { interval_ms: 0 });
        session.handle(Command::Run);
        assert_eq!(session.timer().interval(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn manual_step_emits_stepped() {
        let mut session = Session::with_seed(1);
        init(&mut session, 10);
        let out = session.handle(Command::Step);
        assert!(matches!(out.as_slice(), [Response::Stepped { snapshot }] if snapshot.step == 1));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn manual_step_at_budget_emits_stepped_then_done() {
        let mut session = Session::with_seed(1);
        init(&mut session, 1);
        let out = session.handle(Command::Step);
        assert!(matches!(
            out.as_slice(),
            [Response::Stepped { .. }, Response::Done { history }] if history.len() == 1
        ));
        assert_eq!(session.phase(), Phase::Done);
    }

    #[test]
    fn budget_stops_the_run() {
        let mut session = Session::with_seed(1);
        init(&mut session, 2);
        session.handle(Command::Run);
        assert_eq!(session.on_tick().len(), 1);
        let out = session.on_tick();
        assert!(matches!(
            out.as_slice(),
            [Response::State { .. }, Response::Done { history }] if history.len() == 2
        ));
        assert_eq!(session.phase(), Phase::Done);
        assert!(!session.timer().is_armed());
    }

    #[test]
    fn breakpoint_hit_pauses_the_run() {
        let mut session = Session::with_seed(1);
        init(&mut session, 0);
        session.handle(Command::UpdateBreakpoints {
            breakpoints: vec![Breakpoint::new("b", Condition::Ge, 2.0)],
        });
        session.handle(Command::Run);
        assert_eq!(session.on_tick().len(), 1);
        let out = session.on_tick();
        match out.as_slice() {
            [Response::State { .. }, Response::BreakpointHit { hit }] => {
                assert_eq!(hit.node_id.as_str(), "b");
                assert_eq!(hit.value, 2.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.phase(), Phase::Paused);
        assert!(session.on_tick().is_empty());
    }

    #[test]
    fn breakpoint_on_manual_step_replaces_stepped() {
        let mut session = Session::with_seed(1);
        init(&mut session, 0);
        session.handle(Command::UpdateBreakpoints {
            breakpoints: vec![Breakpoint::new("b", Condition::Eq, 1.0)],
        });
        let out = session.handle(Command::Step);
        assert!(matches!(out.as_slice(), [Response::BreakpointHit { .. }]));
    }

    #[test]
    fn stop_reports_history() {
        let mut session = Session::with_seed(1);
        init(&mut session, 0);
        session.handle(Command::Run);
        session.on_tick();
        session.on_tick();
        let out = session.handle(Command::Stop);
        assert!(matches!(out.as_slice(), [Response::Done { history }] if history.len() == 2));
        assert_eq!(session.phase(), Phase::Done);
        assert!(!session.timer().is_armed());
    }

    #[test]
    fn run_clears_history() {
        let mut session = Session::with_seed(1);
        init(&mut session, 0);
        session.handle(Command::Step);
        assert_eq!(session.history().len(), 1);
        session.handle(Command::Run);
        assert!(session.history().is_empty());
        assert_eq!(session.state().map(|s| s.step), Some(1));
    }

    #[test]
    fn reset_restores_initial_snapshot() {
        let mut session = Session::with_seed(1);
        init(&mut session, 0);
        session.handle(Command::Run);
        session.on_tick();
        session.on_tick();
        let out = session.handle(Command::Reset);
        match out.as_slice() {
            [Response::State { snapshot }] => {
                assert_eq!(snapshot.step, 0);
                assert_eq!(snapshot.values.get("b"), Some(&0.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.history().is_empty());
        assert!(!session.timer().is_armed());
    }

    #[test]
    fn init_without_config_uses_session_defaults() {
        let defaults = RunConfig {
            dt: 0.5,
            steps: 3,
            interval_ms: 16,
        };
        let mut session = Session::with_seed(1).with_run_defaults(defaults);
        session.handle(Command::Init {
            model: growth_model(),
            config: None,
        });
        assert_eq!(session.run_config(), Some(&defaults));
    }

    #[test]
    fn reinit_replaces_model_and_breakpoints() {
        let mut session = Session::with_seed(1);
        init(&mut session, 0);
        session.handle(Command::UpdateBreakpoints {
            breakpoints: vec![Breakpoint::new("b", Condition::Gt, 0.0)],
        });
        session.handle(Command::Run);
        let out = session.handle(Command::Init {
            model: Model {
                nodes: vec![Node::regular("z", 5.0)],
                edges: Vec::new(),
            },
            config: None,
        });
        assert_eq!(out, vec![Response::Ready]);
        assert!(session.breakpoints().is_empty());
        assert!(!session.timer().is_armed());
        assert_eq!(session.state().and_then(|s| s.value("z")), Some(5.0));
    }
}
