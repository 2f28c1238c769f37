//! Generic runtime for session orchestration.
//!
//! The Runtime drives the session event loop, coordinating between:
//! - [`MatchSession`]: sync, polling and dispatch state machine
//! - [`Authority`]: request/response calls, run as background tasks
//! - [`PushTransport`]: the live push channel, at most one at a time
//! - [`SessionHandle`]: consumer commands and the published [`MatchView`]

use std::{collections::HashMap, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::{AbortHandle, JoinSet},
};
use truco_client::{
    ActionTicket, Authority, AuthorityError, ClientError, MatchSession, PushChannel,
    PushTransport, SessionAction, SessionEvent, SyncConfig, TransportError,
};
use truco_core::{
    HandView, MatchId, MatchSnapshot, connection::AttemptId, env::Environment,
};

use crate::{
    handle::{Command, SessionHandle},
    state::MatchView,
};

/// Commands buffered between handles and the runtime task.
const COMMAND_BUFFER: usize = 32;

/// Outcome of a background I/O task.
enum Completion {
    PushOpened { attempt: AttemptId, result: Result<PushChannel, TransportError> },
    Snapshot { match_id: MatchId, result: Result<MatchSnapshot, AuthorityError> },
    Hand { match_id: MatchId, player: String, result: Result<HandView, AuthorityError> },
    Submitted { ticket: ActionTicket, result: Result<String, AuthorityError> },
    Created {
        result: Result<MatchId, AuthorityError>,
        reply: oneshot::Sender<Result<MatchId, ClientError>>,
    },
}

/// A push transport open still in flight.
struct PendingOpen {
    attempt: AttemptId,
    task: AbortHandle,
}

/// The push channel the session currently considers live.
struct LivePush {
    attempt: AttemptId,
    channel: PushChannel,
}

/// Consumers waiting on session outcomes.
#[derive(Default)]
struct Waiters {
    subscribe: Vec<oneshot::Sender<Result<(), ClientError>>>,
    refresh: Vec<oneshot::Sender<Result<(), ClientError>>>,
    actions: HashMap<ActionTicket, oneshot::Sender<Result<String, ClientError>>>,
    /// Reply for the submit being dispatched right now.
    submitting: Option<oneshot::Sender<Result<String, ClientError>>>,
}

/// Event loop owning one [`MatchSession`].
///
/// # Type Parameters
///
/// - `A`: Authority the session fetches from and acts against
/// - `P`: Push transport for real-time updates
/// - `E`: Environment providing the clock
pub struct Runtime<A, P, E>
where
    A: Authority,
    P: PushTransport,
    E: Environment,
{
    session: MatchSession<E::Instant>,
    authority: A,
    transport: P,
    env: E,
    tick_interval: Duration,
    commands: mpsc::Receiver<Command>,
    view: watch::Sender<MatchView>,
    push: Option<LivePush>,
    /// Open in flight for the current attempt.
    opening: Option<PendingOpen>,
    tasks: JoinSet<Completion>,
    waiters: Waiters,
}

impl<A, P, E> Runtime<A, P, E>
where
    A: Authority,
    P: PushTransport,
    E: Environment,
{
    /// Create a runtime and the handle that controls it.
    ///
    /// Nothing happens until [`Runtime::run`] is polled.
    pub fn new(authority: A, transport: P, env: E, config: SyncConfig) -> (Self, SessionHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (view, view_rx) = watch::channel(MatchView::idle());
        let runtime = Self {
            tick_interval: config.tick_interval,
            session: MatchSession::new(config),
            authority,
            transport,
            env,
            commands,
            view,
            push: None,
            opening: None,
            tasks: JoinSet::new(),
            waiters: Waiters::default(),
        };
        (runtime, SessionHandle::new(command_tx, view_rx))
    }

    /// Spawn a runtime on the current tokio runtime and return its handle.
    pub fn spawn(authority: A, transport: P, env: E, config: SyncConfig) -> SessionHandle {
        let (runtime, handle) = Self::new(authority, transport, env, config);
        tokio::spawn(runtime.run());
        handle
    }

    /// Run the event loop until shutdown or until every handle is dropped.
    ///
    /// Each iteration services exactly one of:
    /// 1. A consumer command
    /// 2. A push frame, or the end of the push channel
    /// 3. A finished background task
    /// 4. The tick timer
    pub async fn run(mut self) {
        let env = self.env.clone();
        let ticker = env.sleep(self.tick_interval);
        tokio::pin!(ticker);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
                (attempt, frame) = next_frame(&mut self.push) => self.handle_frame(attempt, frame),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(completion) => self.handle_completion(completion),
                    Err(e) if e.is_cancelled() => tracing::trace!("session task aborted"),
                    Err(e) => tracing::warn!(error = %e, "session task failed"),
                },
                () = &mut ticker => {
                    ticker.set(env.sleep(self.tick_interval));
                    let now = env.now();
                    self.feed(SessionEvent::Tick { now });
                },
            }
        }

        self.feed(SessionEvent::Unsubscribe);
        self.tasks.abort_all();
        tracing::debug!("session runtime stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { match_id, player, reply } => {
                let now = self.env.now();
                // Dispatch first: replacing a subscription resolves the old
                // waiters before the new one is queued.
                match self.dispatch(SessionEvent::Subscribe { match_id, player, now }) {
                    Ok(()) => self.waiters.subscribe.push(reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    },
                }
            },
            Command::Unsubscribe { reply } => {
                self.feed(SessionEvent::Unsubscribe);
                let _ = reply.send(());
            },
            Command::Submit { action, reply } => {
                self.waiters.submitting = Some(reply);
                let outcome = self.dispatch(SessionEvent::Submit { action });
                if let Some(reply) = self.waiters.submitting.take() {
                    let err = outcome.err().unwrap_or_else(|| ClientError::InvalidState {
                        reason: format!("{action} was admitted but not sent"),
                    });
                    let _ = reply.send(Err(err));
                }
            },
            Command::Refresh { reply } => match self.dispatch(SessionEvent::Refresh) {
                Ok(()) => self.waiters.refresh.push(reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                },
            },
            Command::CreateMatch { request, reply } => {
                if let Err(reason) = request.validate() {
                    let _ = reply.send(Err(ClientError::InvalidRequest { reason }));
                    return;
                }
                let authority = self.authority.clone();
                self.tasks.spawn(async move {
                    Completion::Created { result: authority.create_match(request).await, reply }
                });
            },
            // Handled by the event loop.
            Command::Shutdown => {},
        }
    }

    fn handle_frame(&mut self, attempt: AttemptId, frame: Option<String>) {
        match frame {
            Some(text) => self.feed(SessionEvent::FrameReceived { attempt, text }),
            None => {
                self.push = None;
                let now = self.env.now();
                self.feed(SessionEvent::TransportClosed {
                    attempt,
                    reason: "push channel ended".to_string(),
                    now,
                });
            },
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::PushOpened { attempt, result: Ok(channel) } => {
                if self.take_opening(attempt).is_none() {
                    tracing::debug!(attempt, "dropping superseded push channel");
                    return;
                }
                self.push = Some(LivePush { attempt, channel });
                self.feed(SessionEvent::TransportReady { attempt });
            },
            Completion::PushOpened { attempt, result: Err(e) } => {
                self.take_opening(attempt);
                let now = self.env.now();
                self.feed(SessionEvent::TransportClosed { attempt, reason: e.to_string(), now });
            },
            Completion::Snapshot { match_id, result } => {
                self.feed(SessionEvent::SnapshotFetched { match_id, result });
            },
            Completion::Hand { match_id, player, result } => {
                self.feed(SessionEvent::HandFetched { match_id, player, result });
            },
            Completion::Submitted { ticket, result } => {
                self.feed(SessionEvent::SubmitCompleted { ticket, result });
            },
            Completion::Created { result, reply } => {
                if let Ok(id) = &result {
                    tracing::info!(match_id = %id, "match created");
                }
                let _ = reply.send(result.map_err(ClientError::from));
            },
        }
    }

    /// Forget the in-flight open if it belongs to `attempt`.
    fn take_opening(&mut self, attempt: AttemptId) -> Option<PendingOpen> {
        if self.opening.as_ref().is_some_and(|open| open.attempt == attempt) {
            self.opening.take()
        } else {
            None
        }
    }

    /// Dispatch an event nobody is waiting on.
    fn feed(&mut self, event: SessionEvent<E::Instant>) {
        if let Err(e) = self.dispatch(event) {
            tracing::warn!(error = %e, "session rejected event");
        }
    }

    fn dispatch(&mut self, event: SessionEvent<E::Instant>) -> Result<(), ClientError> {
        let actions = self.session.handle(event)?;
        for action in actions {
            self.execute(action);
        }

        let polling = self.session.is_polling();
        let match_id = self.session.match_id().cloned();
        self.view.send_if_modified(|view| {
            let changed = view.polling != polling || view.match_id != match_id;
            view.polling = polling;
            view.match_id = match_id;
            changed
        });
        Ok(())
    }

    fn execute(&mut self, action: SessionAction) {
        match action {
            SessionAction::OpenPush { match_id, attempt } => {
                if let Some(stale) = self.opening.take() {
                    stale.task.abort();
                }
                let transport = self.transport.clone();
                let task = self.tasks.spawn(async move {
                    Completion::PushOpened { attempt, result: transport.open(match_id).await }
                });
                self.opening = Some(PendingOpen { attempt, task });
            },
            SessionAction::ClosePush { attempt } => {
                if let Some(open) = self.take_opening(attempt) {
                    tracing::debug!(attempt, "aborting push open");
                    open.task.abort();
                }
                if self.push.as_ref().is_some_and(|live| live.attempt == attempt) {
                    self.push = None;
                    tracing::debug!(attempt, "push channel closed");
                }
            },
            SessionAction::FetchSnapshot { match_id } => {
                let authority = self.authority.clone();
                self.tasks.spawn(async move {
                    let result = authority.fetch_snapshot(match_id.clone()).await;
                    Completion::Snapshot { match_id, result }
                });
            },
            SessionAction::FetchHand { match_id, player } => {
                let authority = self.authority.clone();
                self.tasks.spawn(async move {
                    let result = authority.fetch_hand(match_id.clone(), player.clone()).await;
                    Completion::Hand { match_id, player, result }
                });
            },
            SessionAction::Submit { ticket, match_id, player, action } => {
                if let Some(reply) = self.waiters.submitting.take() {
                    self.waiters.actions.insert(ticket, reply);
                }
                let authority = self.authority.clone();
                self.tasks.spawn(async move {
                    let result = authority.submit(match_id, player, action).await;
                    Completion::Submitted { ticket, result }
                });
            },
            SessionAction::PublishSnapshot(snapshot) => {
                self.view.send_modify(|view| view.snapshot = Some(snapshot));
            },
            SessionAction::PublishHand(hand) => {
                self.view.send_modify(|view| view.hand = Some(hand));
            },
            SessionAction::ConnectionChanged(state) => {
                self.view.send_modify(|view| view.connection = state);
            },
            SessionAction::Subscribed(result) => {
                for waiter in self.waiters.subscribe.drain(..) {
                    let _ = waiter.send(result.clone());
                }
            },
            SessionAction::ActionCompleted { ticket, result } => {
                if let Some(waiter) = self.waiters.actions.remove(&ticket) {
                    let _ = waiter.send(result);
                }
            },
            SessionAction::RefreshSettled(result) => {
                for waiter in self.waiters.refresh.drain(..) {
                    let _ = waiter.send(result.clone());
                }
            },
            SessionAction::Cleared => {
                self.view.send_modify(|view| *view = MatchView::idle());
            },
            SessionAction::Report(err) => {
                tracing::debug!(error = %err, "session report");
                self.view.send_modify(|view| view.last_error = Some(err));
            },
        }
    }
}

/// Next frame from the live push channel, tagged with its attempt.
///
/// Pending forever while no channel is live.
async fn next_frame(push: &mut Option<LivePush>) -> (AttemptId, Option<String>) {
    match push {
        Some(live) => (live.attempt, live.channel.recv().await),
        None => std::future::pending().await,
    }
}
