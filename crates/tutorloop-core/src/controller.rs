//! The session controller.
//!
//! A single actor task owns the [`Session`]. Callers talk to it through a
//! cloneable [`SessionHandle`]; every command is applied in arrival order, so
//! commands are serialized per session. Evaluation and next-item fetches run
//! in their own tasks so that pause, end and time expiry can still get
//! through. A verdict is applied only if its attempt is still the pending one
//! and the session is still active; an item that arrives after the session
//! completed is dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Command, ContentUnavailable, SessionError};
use crate::model::{
    AnswerAttempt, DifficultyTier, EndReason, Item, ItemType, LogEntry, SessionStatus, Verdict,
};
use crate::pipeline::ValidationPipeline;
use crate::remediation::RemediationEvent;
use crate::report::SessionReport;
use crate::session::{Session, SessionConfig, SessionSnapshot, StartRequest};
use crate::statistics::ScoreSummary;
use crate::traits::ContentProvider;

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;

/// What happens after a verdict is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NextStep {
    /// The next item to answer.
    Item(Item),
    /// The session is over.
    Completed(EndReason),
}

/// A recorded verdict and what follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub verdict: Verdict,
    pub remediation: Option<RemediationEvent>,
    pub summary: ScoreSummary,
    pub next: NextStep,
}

/// Why an in-flight evaluation was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    Paused,
    Ended,
    TimeExpired,
}

/// Reply to `submit`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitReply {
    Judged(SubmitOutcome),
    /// The session left `Active` before the verdict arrived; nothing was
    /// recorded for this attempt.
    Discarded { reason: DiscardReason },
}

/// Notifications for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ItemIssued { item: Item },
    VerdictRecorded { index: usize, verdict: Verdict },
    RemediationTriggered(RemediationEvent),
    Tick { remaining_ms: u64 },
    Paused,
    Resumed,
    Completed { reason: EndReason, summary: ScoreSummary },
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Request {
    Start { request: StartRequest, reply: Reply<Item> },
    Submit { content: String, reply: Reply<SubmitReply> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    End { reply: Reply<ScoreSummary> },
    Snapshot { reply: Reply<SessionSnapshot> },
    Log { reply: Reply<Vec<LogEntry>> },
    Report { reply: Reply<Option<SessionReport>> },
}

/// Client side of a session controller.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Request>,
    events: broadcast::Sender<SessionEvent>,
}

/// A queued submit whose reply has not arrived yet.
#[derive(Debug)]
pub struct PendingSubmit {
    rx: oneshot::Receiver<Result<SubmitReply, SessionError>>,
}

impl PendingSubmit {
    pub async fn reply(self) -> Result<SubmitReply, SessionError> {
        self.rx.await.map_err(|_| SessionError::ControllerClosed)?
    }
}

impl SessionHandle {
    /// Spawn a controller task for one session. Must be called within a Tokio runtime.
    ///
    /// The task stops once every handle has been dropped.
    pub fn spawn(
        pipeline: ValidationPipeline,
        content: Arc<dyn ContentProvider>,
        config: SessionConfig,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (results, result_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            session: None,
            pipeline: Arc::new(pipeline),
            content,
            tick_interval: config.tick_interval(),
            config,
            events: events.clone(),
            pending: None,
            fetch: None,
            results,
        };
        tokio::spawn(actor.run(command_rx, result_rx));

        Self { commands, events }
    }

    /// Receive session events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::ControllerClosed)?;
        rx.await.map_err(|_| SessionError::ControllerClosed)?
    }

    /// `Setup -> Active`. Returns the first item.
    ///
    /// If no first item can be produced the session stays in setup.
    pub async fn start(&self, request: StartRequest) -> Result<Item, SessionError> {
        self.call(|reply| Request::Start { request, reply }).await
    }

    /// Submit an answer for the current item and wait for its verdict.
    pub async fn submit(&self, content: impl Into<String>) -> Result<SubmitReply, SessionError> {
        self.enqueue_submit(content).await?.reply().await
    }

    /// Queue an answer and return a future for its reply.
    ///
    /// The submit is ordered before any command sent after this returns, so
    /// the caller can still pause or end while the verdict is pending.
    pub async fn enqueue_submit(
        &self,
        content: impl Into<String>,
    ) -> Result<PendingSubmit, SessionError> {
        let content = content.into();
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Request::Submit { content, reply })
            .await
            .map_err(|_| SessionError::ControllerClosed)?;
        Ok(PendingSubmit { rx })
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.call(|reply| Request::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.call(|reply| Request::Resume { reply }).await
    }

    /// End the session and return the final summary.
    pub async fn end(&self) -> Result<ScoreSummary, SessionError> {
        self.call(|reply| Request::End { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.call(|reply| Request::Snapshot { reply }).await
    }

    pub async fn summary(&self) -> Result<ScoreSummary, SessionError> {
        Ok(self.snapshot().await?.summary)
    }

    pub async fn log(&self) -> Result<Vec<LogEntry>, SessionError> {
        self.call(|reply| Request::Log { reply }).await
    }

    /// The session report, or `None` before the session has started.
    pub async fn report(&self) -> Result<Option<SessionReport>, SessionError> {
        self.call(|reply| Request::Report { reply }).await
    }
}

struct Judged {
    attempt: AnswerAttempt,
    verdict: Verdict,
}

struct Fetched {
    attempt_id: Uuid,
    result: Result<Item, ContentUnavailable>,
}

/// Work finished by a task the actor spawned.
enum Completion {
    Judged(Judged),
    Fetched(Fetched),
}

struct PendingEvaluation {
    attempt_id: Uuid,
    token: CancellationToken,
    reply: Reply<SubmitReply>,
}

/// A recorded verdict whose reply waits for the next item.
struct PendingFetch {
    attempt_id: Uuid,
    token: CancellationToken,
    reply: Reply<SubmitReply>,
    verdict: Verdict,
    remediation: Option<RemediationEvent>,
}

struct SessionActor {
    session: Option<Session>,
    pipeline: Arc<ValidationPipeline>,
    content: Arc<dyn ContentProvider>,
    config: SessionConfig,
    tick_interval: Duration,
    events: broadcast::Sender<SessionEvent>,
    pending: Option<PendingEvaluation>,
    fetch: Option<PendingFetch>,
    results: mpsc::UnboundedSender<Completion>,
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Ask the content provider for an item, giving up after `limit`.
async fn fetch_item(
    content: &dyn ContentProvider,
    topic: &str,
    tier: DifficultyTier,
    item_type: ItemType,
    limit: Duration,
) -> Result<Item, ContentUnavailable> {
    match tokio::time::timeout(limit, content.get_item(topic, tier, item_type)).await {
        Ok(result) => result,
        Err(_) => Err(ContentUnavailable {
            topic: topic.to_string(),
            tier,
            item_type,
            reason: format!("no item within {}ms", limit.as_millis()),
        }),
    }
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Request>,
        mut results: mpsc::UnboundedReceiver<Completion>,
    ) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.session.as_ref().and_then(Session::deadline);
            tokio::select! {
                biased;
                _ = sleep_until(deadline) => self.settle(),
                request = commands.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                Some(completion) = results.recv() => match completion {
                    Completion::Judged(judged) => self.on_judged(judged),
                    Completion::Fetched(fetched) => self.on_fetched(fetched),
                },
                _ = ticker.tick(), if deadline.is_some() => self.on_tick(),
            }
        }

        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
        }
        if let Some(fetch) = self.fetch.take() {
            fetch.token.cancel();
        }
        debug!("session controller stopped");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Start { request, reply } => {
                let result = self.start(request).await;
                let _ = reply.send(result);
            }
            Request::Submit { content, reply } => {
                self.settle();
                self.submit(content, reply);
            }
            Request::Pause { reply } => {
                self.settle();
                let _ = reply.send(self.pause());
            }
            Request::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            Request::End { reply } => {
                self.settle();
                let _ = reply.send(self.end());
            }
            Request::Snapshot { reply } => {
                self.settle();
                let snapshot = self
                    .session
                    .as_ref()
                    .map(Session::snapshot)
                    .unwrap_or_else(SessionSnapshot::setup);
                let _ = reply.send(Ok(snapshot));
            }
            Request::Log { reply } => {
                let log = self
                    .session
                    .as_ref()
                    .map(|s| s.log().to_vec())
                    .unwrap_or_default();
                let _ = reply.send(Ok(log));
            }
            Request::Report { reply } => {
                let _ = reply.send(Ok(self.session.as_ref().map(Session::report)));
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn session_mut(&mut self, command: Command) -> Result<&mut Session, SessionError> {
        self.session
            .as_mut()
            .ok_or(SessionError::InvalidStateTransition {
                command,
                status: SessionStatus::Setup,
            })
    }

    fn emit_completed(&self) {
        if let Some(session) = &self.session {
            let snapshot = session.snapshot();
            if let Some(reason) = snapshot.end_reason {
                info!(
                    session = %session.id(),
                    %reason,
                    answered = snapshot.summary.items_answered,
                    accuracy = snapshot.summary.accuracy,
                    "session completed"
                );
                self.emit(SessionEvent::Completed {
                    reason,
                    summary: snapshot.summary,
                });
            }
        }
    }

    fn discard_pending(&mut self, reason: DiscardReason) {
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
            debug!(attempt = %pending.attempt_id, ?reason, "discarding in-flight evaluation");
            let _ = pending.reply.send(Ok(SubmitReply::Discarded { reason }));
        }
    }

    fn outcome(
        &self,
        verdict: Verdict,
        remediation: Option<RemediationEvent>,
        next: NextStep,
    ) -> SubmitReply {
        SubmitReply::Judged(SubmitOutcome {
            verdict,
            remediation,
            summary: self
                .session
                .as_ref()
                .map(Session::summary)
                .unwrap_or_default(),
            next,
        })
    }

    /// Answer a submit still waiting on its next item once the session is over.
    ///
    /// The verdict stays recorded; whatever the fetch returns later is dropped.
    fn conclude_fetch(&mut self) {
        let Some(fetch) = self.fetch.take() else {
            return;
        };
        fetch.token.cancel();
        let reason = self
            .session
            .as_ref()
            .and_then(Session::end_reason)
            .unwrap_or(EndReason::EndedByCaller);
        debug!(attempt = %fetch.attempt_id, %reason, "abandoning next-item fetch");
        let reply = self.outcome(fetch.verdict, fetch.remediation, NextStep::Completed(reason));
        let _ = fetch.reply.send(Ok(reply));
    }

    /// Charge active time and complete the session if the budget is gone.
    fn settle(&mut self) {
        let expired = match self.session.as_mut() {
            Some(session) => session.tick(Instant::now()),
            None => false,
        };
        if expired {
            self.discard_pending(DiscardReason::TimeExpired);
            self.conclude_fetch();
            self.emit_completed();
        }
    }

    fn on_tick(&mut self) {
        self.settle();
        if let Some(session) = &self.session {
            if session.status() == SessionStatus::Active {
                if let Some(remaining) = session.time_remaining() {
                    self.emit(SessionEvent::Tick {
                        remaining_ms: remaining.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// The first fetch runs inline: nothing else is valid before the session
    /// is active, and the content timeout bounds the wait.
    async fn start(&mut self, request: StartRequest) -> Result<Item, SessionError> {
        if let Some(session) = &self.session {
            return Err(SessionError::InvalidStateTransition {
                command: Command::Start,
                status: session.status(),
            });
        }

        let mut session = Session::new(request, &self.config)?;
        let item = match fetch_item(
            self.content.as_ref(),
            session.topic(),
            session.tier(),
            session.item_type(),
            self.config.content_timeout(),
        )
        .await
        {
            Ok(item) => item,
            Err(e) => {
                warn!(topic = session.topic(), tier = %session.tier(), "no first item: {e}");
                return Err(e.into());
            }
        };
        session.activate(item.clone(), Instant::now())?;
        info!(
            session = %session.id(),
            topic = session.topic(),
            tier = %session.tier(),
            "session started"
        );
        self.session = Some(session);
        self.emit(SessionEvent::ItemIssued { item: item.clone() });
        Ok(item)
    }

    fn submit(&mut self, content: String, reply: Reply<SubmitReply>) {
        let evaluating = self.pending.as_ref().map(|p| p.attempt_id);
        let fetching = self.fetch.as_ref().map(|f| f.attempt_id);
        let prepared = self.session_mut(Command::Submit).and_then(|session| {
            if let (Some(attempt_id), SessionStatus::Active) = (fetching, session.status()) {
                return Err(SessionError::EvaluationInFlight(attempt_id));
            }
            let attempt = session.prepare_attempt(content, Instant::now())?;
            if let Some(attempt_id) = evaluating {
                return Err(SessionError::EvaluationInFlight(attempt_id));
            }
            let item = session
                .current_item()
                .cloned()
                .ok_or(SessionError::InvalidStateTransition {
                    command: Command::Submit,
                    status: session.status(),
                })?;
            Ok((item, attempt, session.log().to_vec()))
        });
        let (item, attempt, prior) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        debug!(item = %item.id, attempt = %attempt.id, elapsed_ms = attempt.elapsed_ms, "evaluating attempt");
        let token = CancellationToken::new();
        self.pending = Some(PendingEvaluation {
            attempt_id: attempt.id,
            token: token.clone(),
            reply,
        });

        let pipeline = Arc::clone(&self.pipeline);
        let results = self.results.clone();
        tokio::spawn(async move {
            let evaluation = async move {
                let verdict = pipeline.evaluate(&item, &attempt, &prior).await;
                Judged { attempt, verdict }
            };
            tokio::select! {
                _ = token.cancelled() => {}
                judged = evaluation => {
                    let _ = results.send(Completion::Judged(judged));
                }
            }
        });
    }

    fn on_judged(&mut self, judged: Judged) {
        self.settle();
        let pending = match self.pending.take() {
            Some(pending)
                if pending.attempt_id == judged.attempt.id && !pending.token.is_cancelled() =>
            {
                pending
            }
            other => {
                self.pending = other;
                debug!(attempt = %judged.attempt.id, "dropping stale verdict");
                return;
            }
        };
        self.record(judged, pending.reply);
    }

    /// Append the verdict, then either finish the reply or fetch the next item
    /// in its own task so the deadline and commands keep being served.
    fn record(&mut self, judged: Judged, reply: Reply<SubmitReply>) {
        let Judged { attempt, verdict } = judged;
        let attempt_id = attempt.id;
        let recorded = self.session_mut(Command::Submit).and_then(|session| {
            let recorded = session.record(attempt, verdict.clone(), Instant::now())?;
            Ok((recorded, session.topic().to_string(), session.item_type()))
        });
        let (recorded, topic, item_type) = match recorded {
            Ok(recorded) => recorded,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        self.emit(SessionEvent::VerdictRecorded {
            index: recorded.index,
            verdict: verdict.clone(),
        });
        if let Some(event) = &recorded.remediation {
            info!(topic = %event.topic, streak = event.streak, "remediation triggered");
            self.emit(SessionEvent::RemediationTriggered(event.clone()));
        }

        if let Some(reason) = recorded.completed {
            let outcome = self.outcome(verdict, recorded.remediation, NextStep::Completed(reason));
            let _ = reply.send(Ok(outcome));
            self.emit_completed();
            return;
        }

        let tier = recorded.next_tier;
        debug!(attempt = %attempt_id, %tier, "fetching next item");
        let token = CancellationToken::new();
        self.fetch = Some(PendingFetch {
            attempt_id,
            token: token.clone(),
            reply,
            verdict,
            remediation: recorded.remediation,
        });

        let content = Arc::clone(&self.content);
        let results = self.results.clone();
        let limit = self.config.content_timeout();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = fetch_item(content.as_ref(), &topic, tier, item_type, limit) => {
                    let _ = results.send(Completion::Fetched(Fetched { attempt_id, result }));
                }
            }
        });
    }

    fn on_fetched(&mut self, fetched: Fetched) {
        self.settle();
        let fetch = match self.fetch.take() {
            Some(fetch) if fetch.attempt_id == fetched.attempt_id => fetch,
            other => {
                self.fetch = other;
                debug!(attempt = %fetched.attempt_id, "dropping late item");
                return;
            }
        };

        let issued = fetched.result.map_err(SessionError::from).and_then(|item| {
            self.session_mut(Command::Submit)?
                .issue(item.clone(), Instant::now())?;
            Ok(item)
        });
        let next = match issued {
            Ok(item) => {
                self.emit(SessionEvent::ItemIssued { item: item.clone() });
                NextStep::Item(item)
            }
            Err(e) => {
                warn!("ending session: {e}");
                if let Some(session) = self.session.as_mut() {
                    session.abort_for_content(Instant::now());
                }
                NextStep::Completed(EndReason::ContentUnavailable)
            }
        };

        let completed = matches!(next, NextStep::Completed(_));
        let reply = self.outcome(fetch.verdict, fetch.remediation, next);
        let _ = fetch.reply.send(Ok(reply));
        if completed {
            self.emit_completed();
        }
    }

    fn pause(&mut self) -> Result<(), SessionError> {
        self.session_mut(Command::Pause)?.pause(Instant::now())?;
        self.discard_pending(DiscardReason::Paused);
        self.emit(SessionEvent::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SessionError> {
        self.session_mut(Command::Resume)?.resume(Instant::now())?;
        self.emit(SessionEvent::Resumed);
        Ok(())
    }

    fn end(&mut self) -> Result<ScoreSummary, SessionError> {
        let session = self.session_mut(Command::End)?;
        session.end(Instant::now())?;
        let summary = session.summary();
        self.discard_pending(DiscardReason::Ended);
        self.conclude_fetch();
        self.emit_completed();
        Ok(summary)
    }
}
