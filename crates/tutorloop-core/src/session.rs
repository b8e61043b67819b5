//! Session state and its transition rules.
//!
//! `Session` is a synchronous state machine: it owns the append-only log,
//! the score aggregator, the difficulty adapter, the remediation monitor and
//! the countdown. It is only ever driven by the session controller, which
//! supplies the current instant and performs the async work (content
//! fetching, judgment) around it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::difficulty::{DifficultyAdapter, Thresholds};
use crate::error::{Command, SessionError};
use crate::model::{
    AnswerAttempt, DifficultyTier, EndReason, Item, ItemType, LogEntry, SessionMode,
    SessionStatus, Verdict,
};
use crate::remediation::{RemediationEvent, RemediationMonitor};
use crate::report::SessionReport;
use crate::statistics::{ScoreAggregator, ScoreSummary};
use crate::timer::{SessionTimer, Stopwatch};

/// Tunables shared by every session a controller runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Escalate when cumulative accuracy is above this.
    pub upper_threshold: f64,
    /// De-escalate when cumulative accuracy is below this.
    pub lower_threshold: f64,
    /// Consecutive trusted conceptual errors that trigger remediation.
    pub remediation_threshold: u32,
    /// Countdown tick period while active.
    pub tick_interval_ms: u64,
    /// Longest wait for the content provider before the item counts as unavailable.
    pub content_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            upper_threshold: thresholds.upper,
            lower_threshold: thresholds.lower,
            remediation_threshold: 2,
            tick_interval_ms: 1000,
            content_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            upper: self.upper_threshold,
            lower: self.lower_threshold,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms.max(1))
    }
}

/// Parameters of `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    pub mode: SessionMode,
    pub topic: String,
    /// Number of items to answer; `None` runs until ended or out of time.
    pub item_count: Option<u32>,
    /// Active-time budget; `None` is unbounded.
    pub time_budget: Option<Duration>,
    /// Tier of the first item. There is no history to derive it from.
    pub initial_tier: DifficultyTier,
    /// Item type to request; defaults from the mode.
    #[serde(default)]
    pub item_type: Option<ItemType>,
}

impl StartRequest {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.topic.trim().is_empty() {
            return Err(SessionError::InvalidRequest("topic must not be empty".into()));
        }
        if self.item_count == Some(0) {
            return Err(SessionError::InvalidRequest(
                "item count must be at least 1".into(),
            ));
        }
        if self.time_budget == Some(Duration::ZERO) {
            return Err(SessionError::InvalidRequest(
                "time budget must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
            .unwrap_or_else(|| self.mode.default_item_type())
    }
}

/// Read-only projection of a session for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Option<Uuid>,
    pub status: SessionStatus,
    pub mode: Option<SessionMode>,
    pub topic: Option<String>,
    pub current_item: Option<Item>,
    pub tier: Option<DifficultyTier>,
    /// `None` when the budget is unbounded or no session has started.
    pub time_remaining_ms: Option<u64>,
    pub summary: ScoreSummary,
    pub last_verdict: Option<Verdict>,
    pub remediation_streak: u32,
    pub item_count: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
}

impl SessionSnapshot {
    /// Snapshot of a controller that has not started a session yet.
    pub fn setup() -> Self {
        Self {
            id: None,
            status: SessionStatus::Setup,
            mode: None,
            topic: None,
            current_item: None,
            tier: None,
            time_remaining_ms: None,
            summary: ScoreSummary::default(),
            last_verdict: None,
            remediation_streak: 0,
            item_count: None,
            started_at: None,
            ended_at: None,
            end_reason: None,
        }
    }
}

/// What recording a verdict changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// Index of the new log entry.
    pub index: usize,
    pub remediation: Option<RemediationEvent>,
    /// Tier for the next item, already adapted.
    pub next_tier: DifficultyTier,
    /// Set when recording reached the item count and completed the session.
    pub completed: Option<EndReason>,
}

#[derive(Debug, Clone)]
struct IssuedItem {
    item: Item,
    stopwatch: Stopwatch,
}

/// The state of one tutoring session.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    request: StartRequest,
    status: SessionStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    end_reason: Option<EndReason>,
    timer: SessionTimer,
    current: Option<IssuedItem>,
    log: Vec<LogEntry>,
    score: ScoreAggregator,
    difficulty: DifficultyAdapter,
    remediation: RemediationMonitor,
    remediation_events: Vec<RemediationEvent>,
    last_verdict: Option<Verdict>,
}

impl Session {
    /// Create a session in `Setup`.
    pub fn new(request: StartRequest, config: &SessionConfig) -> Result<Self, SessionError> {
        request.validate()?;
        config.thresholds().validate().map_err(SessionError::InvalidRequest)?;
        Ok(Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Setup,
            started_at: None,
            ended_at: None,
            end_reason: None,
            timer: SessionTimer::new(request.time_budget),
            current: None,
            log: Vec::new(),
            score: ScoreAggregator::new(),
            difficulty: DifficultyAdapter::new(request.initial_tier, config.thresholds()),
            remediation: RemediationMonitor::new(config.remediation_threshold),
            remediation_events: Vec::new(),
            last_verdict: None,
            request,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn topic(&self) -> &str {
        &self.request.topic
    }

    pub fn item_type(&self) -> ItemType {
        self.request.item_type()
    }

    /// Tier the next item should be requested at.
    pub fn tier(&self) -> DifficultyTier {
        self.difficulty.tier()
    }

    pub fn current_item(&self) -> Option<&Item> {
        self.current.as_ref().map(|issued| &issued.item)
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn summary(&self) -> ScoreSummary {
        self.score.summary()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn time_remaining(&self) -> Option<Duration> {
        self.timer.remaining()
    }

    /// When the countdown runs out if the session stays active.
    pub fn deadline(&self) -> Option<Instant> {
        match self.status {
            SessionStatus::Active => self.timer.deadline(),
            _ => None,
        }
    }

    fn ensure(&self, command: Command, allowed: &[SessionStatus]) -> Result<(), SessionError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(SessionError::InvalidStateTransition {
                command,
                status: self.status,
            })
        }
    }

    fn ensure_scorable(item: &Item) -> Result<(), SessionError> {
        if item.marks == 0 {
            return Err(SessionError::InvalidRequest(format!(
                "item '{}' is worth 0 marks",
                item.id
            )));
        }
        Ok(())
    }

    /// `Setup -> Active` with the first item.
    pub fn activate(&mut self, first_item: Item, now: Instant) -> Result<(), SessionError> {
        self.ensure(Command::Start, &[SessionStatus::Setup])?;
        Self::ensure_scorable(&first_item)?;
        self.status = SessionStatus::Active;
        self.started_at = Some(Utc::now());
        self.timer.resume(now);
        self.current = Some(IssuedItem {
            item: first_item,
            stopwatch: Stopwatch::started(now),
        });
        Ok(())
    }

    /// Build the attempt for a submit. Does not change state.
    pub fn prepare_attempt(&self, content: String, now: Instant) -> Result<AnswerAttempt, SessionError> {
        self.ensure(Command::Submit, &[SessionStatus::Active])?;
        let issued = self.current.as_ref().ok_or(SessionError::InvalidStateTransition {
            command: Command::Submit,
            status: self.status,
        })?;
        Ok(AnswerAttempt::new(
            issued.item.id.clone(),
            content,
            issued.stopwatch.elapsed(now),
        ))
    }

    /// Append a verdict for the current item and update every collaborator.
    ///
    /// The difficulty adapter runs here, after the verdict and before any
    /// next item is issued.
    pub fn record(&mut self, attempt: AnswerAttempt, verdict: Verdict, now: Instant) -> Result<Recorded, SessionError> {
        self.ensure(Command::Submit, &[SessionStatus::Active])?;
        let issued = match self.current.take() {
            Some(issued) if issued.item.id == attempt.item_id => issued,
            other => {
                self.current = other;
                return Err(SessionError::InvalidStateTransition {
                    command: Command::Submit,
                    status: self.status,
                });
            }
        };

        let item = issued.item;
        let index = self.log.len();
        self.score
            .record(&item.topic, item.marks, attempt.elapsed_ms, &verdict);
        let remediation = self.remediation.observe(&verdict, &item.topic, index);
        if let Some(event) = &remediation {
            self.remediation_events.push(event.clone());
        }
        let next_tier = self.difficulty.adapt(self.score.accuracy());
        self.last_verdict = Some(verdict.clone());
        self.log.push(LogEntry {
            item,
            attempt,
            verdict,
        });

        let completed = match self.request.item_count {
            Some(count) if self.log.len() >= count as usize => {
                self.complete(EndReason::ItemCountReached, now);
                Some(EndReason::ItemCountReached)
            }
            _ => None,
        };

        Ok(Recorded {
            index,
            remediation,
            next_tier,
            completed,
        })
    }

    /// Issue the next item. Only valid with nothing outstanding.
    ///
    /// An item that arrives while paused is held with its stopwatch stopped.
    pub fn issue(&mut self, item: Item, now: Instant) -> Result<(), SessionError> {
        self.ensure(Command::Submit, &[SessionStatus::Active, SessionStatus::Paused])?;
        if self.current.is_some() {
            return Err(SessionError::InvalidStateTransition {
                command: Command::Submit,
                status: self.status,
            });
        }
        Self::ensure_scorable(&item)?;
        let mut stopwatch = Stopwatch::started(now);
        if self.status == SessionStatus::Paused {
            stopwatch.pause(now);
        }
        self.current = Some(IssuedItem { item, stopwatch });
        Ok(())
    }

    /// `Active -> Paused`.
    pub fn pause(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure(Command::Pause, &[SessionStatus::Active])?;
        self.timer.pause(now);
        if let Some(issued) = &mut self.current {
            issued.stopwatch.pause(now);
        }
        self.status = SessionStatus::Paused;
        Ok(())
    }

    /// `Paused -> Active`.
    pub fn resume(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure(Command::Resume, &[SessionStatus::Paused])?;
        self.timer.resume(now);
        if let Some(issued) = &mut self.current {
            issued.stopwatch.resume(now);
        }
        self.status = SessionStatus::Active;
        Ok(())
    }

    /// `Active | Paused -> Completed` on the caller's request.
    pub fn end(&mut self, now: Instant) -> Result<(), SessionError> {
        self.ensure(Command::End, &[SessionStatus::Active, SessionStatus::Paused])?;
        self.complete(EndReason::EndedByCaller, now);
        Ok(())
    }

    /// Complete after the content provider failed mid-session.
    pub fn abort_for_content(&mut self, now: Instant) {
        if matches!(self.status, SessionStatus::Active | SessionStatus::Paused) {
            self.complete(EndReason::ContentUnavailable, now);
        }
    }

    /// Charge elapsed active time; completes the session when the budget is gone.
    ///
    /// Returns `true` if this call expired the session.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        if self.timer.settle(now) {
            self.complete(EndReason::TimeExpired, now);
            return true;
        }
        false
    }

    fn complete(&mut self, reason: EndReason, now: Instant) {
        self.timer.pause(now);
        if let Some(discarded) = self.current.take() {
            tracing::debug!(item = %discarded.item.id, %reason, "discarding unanswered item");
        }
        self.status = SessionStatus::Completed;
        self.ended_at = Some(Utc::now());
        self.end_reason = Some(reason);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: Some(self.id),
            status: self.status,
            mode: Some(self.request.mode),
            topic: Some(self.request.topic.clone()),
            current_item: self.current_item().cloned(),
            tier: Some(self.difficulty.tier()),
            time_remaining_ms: self.timer.remaining().map(|d| d.as_millis() as u64),
            summary: self.score.summary(),
            last_verdict: self.last_verdict.clone(),
            remediation_streak: self.remediation.streak(),
            item_count: self.request.item_count,
            started_at: self.started_at,
            ended_at: self.ended_at,
            end_reason: self.end_reason,
        }
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            id: self.id,
            mode: self.request.mode,
            topic: self.request.topic.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            end_reason: self.end_reason,
            initial_tier: self.request.initial_tier,
            final_tier: self.difficulty.tier(),
            entries: self.log.clone(),
            summary: self.score.summary(),
            remediation_events: self.remediation_events.clone(),
        }
    }
}
