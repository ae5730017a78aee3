//! Single-threaded session actor.
//!
//! [`spawn_session`] moves a [`Session`] onto its own tokio task. The task
//! is the only owner of the session. Callers reach it through a
//! [`SessionHandle`] and read results from the returned response channel.
//!
//! The task waits on exactly two sources with `tokio::select!`:
//!
//! - **Inbound messages**, polled first (`biased`), so a `pause` already
//!   queued wins over a tick that became due at the same instant.
//! - **The recurring timer**, a [`tokio::time::Interval`] that exists only
//!   while the session has its [`Timer`](crate::session::Timer) armed.
//!
//! A message and a tick are never processed concurrently, so the session
//! needs no locks.

use causim_types::{Command, Response};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::CausimConfig;
use crate::session::Session;

/// Errors returned by [`SessionHandle`].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The actor task has exited and no longer accepts messages.
    #[error("session actor has shut down")]
    Closed,
}

/// What travels on the inbound channel.
#[derive(Debug)]
enum Inbound {
    /// An already-decoded command.
    Command(Command),
    /// Raw JSON, decoded by the session so decode failures become
    /// `error` responses.
    Raw(String),
}

/// Sending half of a session actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Inbound>,
}

impl SessionHandle {
    /// Queue a command for the session.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Closed`] if the actor has exited.
    pub async fn send(&self, command: Command) -> Result<(), RunnerError> {
        self.tx
            .send(Inbound::Command(command))
            .await
            .map_err(|_closed| RunnerError::Closed)
    }

    /// Queue a raw JSON message for the session.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Closed`] if the actor has exited.
    pub async fn send_raw(&self, raw: impl Into<String>) -> Result<(), RunnerError> {
        self.tx
            .send(Inbound::Raw(raw.into()))
            .await
            .map_err(|_closed| RunnerError::Closed)
    }

    /// Whether the actor has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn a session actor on the current tokio runtime.
///
/// The session takes its seed and channel capacity from
/// `config.session` and its `init` defaults from `config.run`.
///
/// Returns the handle for sending commands, the receiver for responses,
/// and the task's join handle. The task exits once every handle is
/// dropped or the response receiver is dropped.
pub fn spawn_session(
    config: &CausimConfig,
) -> (SessionHandle, mpsc::Receiver<Response>, JoinHandle<()>) {
    let capacity = config.session.channel_capacity.max(1);
    let (in_tx, in_rx) = mpsc::channel(capacity);
    let (out_tx, out_rx) = mpsc::channel(capacity);
    let session = Session::new(&config.session).with_run_defaults(config.run);
    let task = tokio::spawn(run_actor(session, in_rx, out_tx));
    (SessionHandle { tx: in_tx }, out_rx, task)
}

/// The actor loop. Owns the session for its whole life.
async fn run_actor(
    mut session: Session,
    mut inbound: mpsc::Receiver<Inbound>,
    outbound: mpsc::Sender<Response>,
) {
    let mut timer: Option<Interval> = None;
    let mut generation = session.timer().generation();

    info!("session actor started");

    loop {
        let responses = tokio::select! {
            biased;
            message = inbound.recv() => match message {
                Some(Inbound::Command(command)) => session.handle(command),
                Some(Inbound::Raw(raw)) => session.handle_raw(&raw),
                None => {
                    info!("all session handles dropped, actor exiting");
                    return;
                }
            },
            () = next_tick(&mut timer) => session.on_tick(),
        };

        sync_timer(&session, &mut timer, &mut generation);

        for response in responses {
            if outbound.send(response).await.is_err() {
                info!("response receiver dropped, actor exiting");
                return;
            }
        }
    }
}

/// Resolve on the next tick of `timer`, or never if there is none.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Rebuild or drop the interval when the session's timer changed.
///
/// A rebuilt interval first fires one full period from now, so a speed
/// change takes effect on the next tick rather than immediately.
fn sync_timer(session: &Session, timer: &mut Option<Interval>, generation: &mut u64) {
    let wanted = session.timer();
    if wanted.generation() == *generation {
        return;
    }
    *generation = wanted.generation();
    *timer = wanted.interval().map(|period| {
        let start = Instant::now()
            .checked_add(period)
            .unwrap_or_else(Instant::now);
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    debug!(period = ?wanted.interval(), "timer synced");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use causim_types::{Edge, Model, Node, Polarity, RunConfig};

    use super::*;
    use crate::config::SessionConfig;

    fn seeded() -> CausimConfig {
        CausimConfig {
            session: SessionConfig::seeded(1),
            ..CausimConfig::default()
        }
    }

    fn init(steps: u64, interval_ms: u64) -> Command {
        Command::Init {
            model: Model {
                nodes: vec![Node::regular("a", 1.0), Node::regular("b", 0.0)],
                edges: vec![Edge::new("ab", "a", "b", 1.0, Polarity::Positive)],
            },
            config: Some(RunConfig {
                dt: 1.0,
                steps,
                interval_ms,
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_to_budget() {
        let (handle, mut rx, _task) = spawn_session(&seeded());
        handle.send(init(3, 10)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Response::Ready));

        handle.send(Command::Run).await.unwrap();
        for expected in 1..=3 {
            match rx.recv().await {
                Some(Response::State { snapshot }) => assert_eq!(snapshot.step, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
        match rx.recv().await {
            Some(Response::Done { history }) => assert_eq!(history.len(), 3),
            other => panic!("unexpected {other:?}"),
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_the_interval() {
        let (handle, mut rx, _task) = spawn_session(&seeded());
        handle.send(init(0, 100)).await.unwrap();
        rx.recv().await.unwrap();

        let started = Instant::now();
        handle.send(Command::Run).await.unwrap();
        rx.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(100));
        rx.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_ticks() {
        let (handle, mut rx, _task) = spawn_session(&seeded());
        handle.send(init(0, 10)).await.unwrap();
        rx.recv().await.unwrap();

        handle.send(Command::Run).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Response::State { .. })));
        handle.send(Command::Pause).await.unwrap();
        assert_eq!(rx.recv().await, Some(Response::Paused { breach: None }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        handle.send(Command::Resume).await.unwrap();
        assert_eq!(rx.recv().await, Some(Response::Resumed));
        match rx.recv().await {
            Some(Response::State { snapshot }) => assert_eq!(snapshot.step, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn set_speed_applies_from_next_tick() {
        let (handle, mut rx, _task) = spawn_session(&seeded());
        handle.send(init(0, 100)).await.unwrap();
        rx.recv().await.unwrap();

        handle.send(Command::Run).await.unwrap();
        rx.recv().await.unwrap();
        let changed_at = Instant::now();
        handle.send(Command::SetSpeed { interval_ms: 20 }).await.unwrap();
        rx.recv().await.unwrap();
        assert_eq!(changed_at.elapsed(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn malformed_and_uninitialized_messages_are_errors() {
        let (handle, mut rx, _task) = spawn_session(&seeded());
        handle.send_raw(r#"{"type":"warp"}"#).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Response::Error { .. })));
        handle.send_raw(r#"{"type":"run"}"#).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Response::Error { .. })));
    }

    #[tokio::test]
    async fn dropping_handles_stops_the_actor() {
        let (handle, rx, task) = spawn_session(&seeded());
        drop(handle);
        task.await.unwrap();
        drop(rx);
    }

    #[tokio::test]
    async fn closed_actor_rejects_sends() {
        let (handle, rx, task) = spawn_session(&seeded());
        drop(rx);
        // The actor only notices the dropped receiver when it has
        // something to send.
        handle.send(init(0, 10)).await.unwrap();
        task.await.unwrap();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send(Command::Run).await,
            Err(RunnerError::Closed)
        ));
    }
}
