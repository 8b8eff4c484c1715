//! Conductor - Conversation View Orchestration
//!
//! The Conductor owns one open conversation view. It ties together:
//! - The turn provider (one request per assistant turn)
//! - The quota enforcer (gate before every request)
//! - The session store (token echoed with every request)
//! - Bubble delivery (paced reveal inside cancellable scopes)
//! - The transcript (what the user actually saw)
//!
//! # Design Philosophy
//!
//! The Conductor is UI-agnostic. Everything the user should see leaves through
//! an unbounded `ConductorMessage` channel; the host renders it however it
//! likes. The host talks back through [`Conductor::send_message`],
//! [`Conductor::new_conversation`] and a cloneable [`ViewHandle`].
//!
//! # Scopes
//!
//! ```text
//! view scope ──┬── delivery scope (turn 1)
//!              ├── delivery scope (turn 2)
//!              └── quota refresh / provider calls (raced against collapse)
//! ```
//!
//! Closing the view collapses everything. Cancelling a delivery collapses only
//! the active delivery scope; bubbles already shown stay shown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{TurnProvider, TurnRequest, TurnResponse};
use crate::delivery::{deliver, DeliveryOutcome, DeliverySink, RevealedBubble};
use crate::messages::{ConductorMessage, NotifyLevel, PersonaId, TurnId, UserId};
use crate::quota::{DenyReason, QuotaConfig, QuotaDecision, QuotaEnforcer};
use crate::scope::CancellationScope;
use crate::segmenter::{RawTurn, Segmenter, SegmenterConfig};
use crate::session::SessionStore;
use crate::transcript::{Transcript, TranscriptEntry};
use crate::turn::Turn;

/// Default bound on unprompted continuation rounds per send
pub const DEFAULT_MAX_CONTINUATIONS: u32 = 2;

/// Default bound on a single provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default text of the bubble shown when a provider call fails
pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Sorry, I lost my train of thought for a second. Could you say that again?";

/// Default transcript bound
pub const DEFAULT_MAX_TRANSCRIPT_ENTRIES: usize = 500;

// =============================================================================
// Configuration
// =============================================================================

/// Conductor configuration
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Bubble splitting and pacing
    pub segmenter: SegmenterConfig,
    /// Quota fetch bound and fallback
    pub quota: QuotaConfig,
    /// Bound on a single provider call
    pub provider_timeout: Duration,
    /// Maximum unprompted continuation rounds after the first reply
    pub max_continuations: u32,
    /// Text of the apology bubble shown when a provider call fails
    pub fallback_message: String,
    /// Maximum transcript entries kept (0 = unlimited)
    pub max_transcript_entries: usize,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            quota: QuotaConfig::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            max_continuations: DEFAULT_MAX_CONTINUATIONS,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            max_transcript_entries: DEFAULT_MAX_TRANSCRIPT_ENTRIES,
        }
    }
}

// =============================================================================
// Errors and Outcomes
// =============================================================================

/// Errors returned to the host
///
/// Quota denials, provider failures and cancellations are outcomes, not
/// errors; see [`SendOutcome`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConductorError {
    /// The message was empty after trimming
    #[error("Message is empty")]
    EmptyMessage,

    /// The view has been closed
    #[error("Conversation view is closed")]
    ViewClosed,
}

/// What happened to one send
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The quota gate refused; nothing was sent to the provider
    Blocked(DenyReason),
    /// The user turn was accepted
    Sent(SendReport),
}

impl SendOutcome {
    /// Report of an accepted send, if any
    #[must_use]
    pub fn report(&self) -> Option<&SendReport> {
        match self {
            Self::Sent(report) => Some(report),
            Self::Blocked(_) => None,
        }
    }
}

/// Summary of an accepted send
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Id of the user turn
    pub user_turn: TurnId,
    /// Assistant turns the provider produced, in order
    pub assistant_turns: Vec<TurnId>,
    /// A delivery was cut short or the view closed mid-send
    pub cancelled: bool,
    /// A provider call failed or timed out and the apology bubble was shown
    pub provider_failed: bool,
}

// =============================================================================
// Sink
// =============================================================================

/// Forwards delivery progress to the transcript and the host channel
struct ViewSink {
    transcript: Arc<Mutex<Transcript>>,
    tx: mpsc::UnboundedSender<ConductorMessage>,
}

impl ViewSink {
    fn emit(&self, msg: ConductorMessage) {
        if self.tx.send(msg).is_err() {
            tracing::trace!("Host channel closed, dropping message");
        }
    }
}

impl DeliverySink for ViewSink {
    fn bubble_revealed(&self, bubble: &RevealedBubble) {
        self.transcript.lock().record_bubble(bubble);
        self.emit(ConductorMessage::BubbleRevealed {
            turn_id: bubble.turn_id.clone(),
            index: bubble.index,
            text: bubble.bubble.text.clone(),
            media: bubble.media.clone(),
        });
    }

    fn composing(&self, turn_id: &TurnId, active: bool) {
        self.emit(ConductorMessage::Composing {
            turn_id: turn_id.clone(),
            active,
        });
    }

    fn all_delivered(&self, turn_id: &TurnId, bubble_count: usize) {
        self.emit(ConductorMessage::TurnDelivered {
            turn_id: turn_id.clone(),
            bubble_count,
        });
    }
}

// =============================================================================
// View Handle
// =============================================================================

/// Host-side control over an open view
///
/// Cheap to clone and usable while a send is in flight.
#[derive(Clone, Debug)]
pub struct ViewHandle {
    view: CancellationScope,
    active: Arc<Mutex<Option<CancellationScope>>>,
}

impl ViewHandle {
    /// Stop the send in progress
    ///
    /// Remaining bubbles of the current turn stay hidden, and a provider call
    /// still in flight for a continuation round is abandoned without being
    /// revealed or charged. The view stays open.
    pub fn cancel_delivery(&self) {
        if let Some(scope) = self.active.lock().as_ref() {
            tracing::debug!("Cancelling active send");
            scope.collapse();
        }
    }

    /// Tear the view down
    pub fn close(&self) {
        self.view.collapse();
    }

    /// Whether the view has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.view.is_collapsed()
    }
}

// =============================================================================
// Conductor
// =============================================================================

/// One conversation view
pub struct Conductor<P: TurnProvider> {
    config: ConductorConfig,
    provider: Arc<P>,
    quota: QuotaEnforcer,
    sessions: SessionStore,
    segmenter: Segmenter,
    transcript: Arc<Mutex<Transcript>>,
    user_id: UserId,
    view: CancellationScope,
    /// Scope of the send in progress, if any
    active: Arc<Mutex<Option<CancellationScope>>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    /// Held for a whole send so turns never interleave
    turn_gate: tokio::sync::Mutex<()>,
    tx: mpsc::UnboundedSender<ConductorMessage>,
}

impl<P: TurnProvider + 'static> Conductor<P> {
    /// Create a conductor for `user_id`
    ///
    /// The session store is injected so the host decides its lifetime; pass a
    /// fresh [`SessionStore`] for every new view.
    pub fn new(
        user_id: UserId,
        provider: Arc<P>,
        quota: QuotaEnforcer,
        sessions: SessionStore,
        config: ConductorConfig,
        tx: mpsc::UnboundedSender<ConductorMessage>,
    ) -> Self {
        Self {
            segmenter: Segmenter::new(config.segmenter.clone()),
            transcript: Arc::new(Mutex::new(Transcript::with_limit(
                config.max_transcript_entries,
            ))),
            config,
            provider,
            quota,
            sessions,
            user_id,
            view: CancellationScope::new(),
            active: Arc::new(Mutex::new(None)),
            refresh_task: Mutex::new(None),
            turn_gate: tokio::sync::Mutex::new(()),
            tx,
        }
    }

    /// Handle for cancelling deliveries or closing the view from elsewhere
    #[must_use]
    pub fn handle(&self) -> ViewHandle {
        ViewHandle {
            view: self.view.clone(),
            active: Arc::clone(&self.active),
        }
    }

    /// Quota enforcer shared with this view
    #[must_use]
    pub fn quota(&self) -> &QuotaEnforcer {
        &self.quota
    }

    /// Session store shared with this view
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Copy of the transcript entries, oldest first
    #[must_use]
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().entries().to_vec()
    }

    /// Provider in use
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Open the view: the quota gate enters `Loading` at once and a refresh
    /// starts in the background
    ///
    /// Sends made before the refresh lands are blocked with
    /// [`DenyReason::Loading`].
    pub fn open_view(&self) {
        tracing::info!(
            user = %self.user_id,
            provider = self.provider.name(),
            "Opening conversation view"
        );
        self.refresh_quota();
    }

    /// Re-fetch quota, e.g. after the user changed plan
    ///
    /// Supersedes any refresh still in flight.
    pub fn refresh_quota(&self) {
        if self.view.is_collapsed() {
            return;
        }
        self.quota.begin_refresh();

        let quota = self.quota.clone();
        let user_id = self.user_id.clone();
        let view = self.view.clone();
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = view.collapsed() => {
                    tracing::debug!(user = %user_id, "View closed during quota refresh");
                }
                state = quota.refresh(&user_id) => {
                    let _ = tx.send(ConductorMessage::QuotaUpdated { state });
                }
            }
        });

        if let Some(previous) = self.refresh_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Forget session tokens so the next turn starts a new server-side
    /// conversation: one persona, or every persona when `None`
    pub fn new_conversation(&self, persona: Option<&PersonaId>) {
        self.sessions.reset(persona);
        self.emit(ConductorMessage::Notify {
            level: NotifyLevel::Info,
            message: match persona {
                Some(p) => format!("Started a new conversation with {p}"),
                None => "Started a new conversation".to_string(),
            },
        });
    }

    /// Close the view
    ///
    /// Collapses every scope the view owns and stops the quota refresh.
    /// Revealed bubbles and recorded usage stay as they are.
    pub fn close_view(&self) {
        self.view.collapse();
        if let Some(task) = self.refresh_task.lock().take() {
            task.abort();
        }
        tracing::info!(user = %self.user_id, "Conversation view closed");
    }

    /// Send a user message to `persona` and deliver the reply
    ///
    /// Waits for any previous send to finish first. Runs the first provider
    /// round and then up to `max_continuations` more while the provider asks
    /// to keep speaking, each delivery completes and quota still allows.
    ///
    /// # Errors
    ///
    /// [`ConductorError::EmptyMessage`] for blank input and
    /// [`ConductorError::ViewClosed`] once the view is closed.
    pub async fn send_message(
        &self,
        persona: &PersonaId,
        text: &str,
    ) -> Result<SendOutcome, ConductorError> {
        let user_turn = Turn::user(text).ok_or(ConductorError::EmptyMessage)?;
        if self.view.is_collapsed() {
            return Err(ConductorError::ViewClosed);
        }

        if let Some(reason) = self.gate() {
            return Ok(SendOutcome::Blocked(reason));
        }

        let _turn = self.turn_gate.lock().await;
        if self.view.is_collapsed() {
            return Err(ConductorError::ViewClosed);
        }
        // Usage may have moved while waiting behind the previous send
        if let Some(reason) = self.gate() {
            return Ok(SendOutcome::Blocked(reason));
        }

        let user_message = user_turn.joined_text();
        self.transcript.lock().record_user_turn(&user_turn);
        self.emit(ConductorMessage::UserTurn {
            turn_id: user_turn.id.clone(),
            persona_id: persona.clone(),
            text: user_message.clone(),
        });

        let mut report = SendReport {
            user_turn: user_turn.id.clone(),
            ..SendReport::default()
        };

        let send = self.view.child();
        *self.active.lock() = Some(send.clone());

        let mut round = 0;
        loop {
            let message = if round == 0 { user_message.as_str() } else { "" };
            let step = self
                .run_round(&send, persona, message, round, &mut report)
                .await;

            if step != RoundStep::Continue {
                break;
            }
            if round >= self.config.max_continuations {
                tracing::debug!(
                    persona = %persona,
                    rounds = round + 1,
                    "Continuation limit reached"
                );
                break;
            }
            if let QuotaDecision::Denied(reason) = self.quota.check_allowed() {
                tracing::debug!(reason = reason.code(), "Quota stops continuation");
                break;
            }
            round += 1;
        }

        self.active.lock().take();
        Ok(SendOutcome::Sent(report))
    }

    fn gate(&self) -> Option<DenyReason> {
        match self.quota.check_allowed() {
            QuotaDecision::Allowed => None,
            QuotaDecision::Denied(reason) => {
                tracing::debug!(user = %self.user_id, reason = reason.code(), "Send blocked");
                self.emit(ConductorMessage::QuotaBlocked {
                    reason: reason.clone(),
                });
                Some(reason)
            }
        }
    }

    async fn run_round(
        &self,
        send: &CancellationScope,
        persona: &PersonaId,
        message: &str,
        round: u32,
        report: &mut SendReport,
    ) -> RoundStep {
        let request = TurnRequest::new(self.user_id.clone(), persona.clone(), message)
            .with_session_token(self.sessions.get_token(persona))
            .with_continuation_round(round);

        let Some(response) = self.call_provider(send, &request, report).await else {
            return RoundStep::Stop;
        };
        let response = match response {
            Ok(response) => response,
            Err(reason) => {
                tracing::warn!(
                    persona = %persona,
                    round,
                    error = %reason,
                    "Turn provider failed, showing fallback"
                );
                report.provider_failed = true;
                let raw = RawTurn::from(self.config.fallback_message.as_str());
                if let Some(apology) = Turn::assistant(self.segmenter.segment(&raw), Vec::new()) {
                    if self.deliver_turn(send, &apology).await == DeliveryOutcome::Cancelled {
                        report.cancelled = true;
                    }
                }
                return RoundStep::Stop;
            }
        };

        if let Some(ref token) = response.session_token {
            self.sessions.set_token(persona, token.clone());
        }
        let bubbles = self.segmenter.segment(&response.content);
        let Some(turn) = Turn::assistant(bubbles, response.media) else {
            tracing::debug!(persona = %persona, round, "Provider returned an empty turn");
            return if response.continue_speaking {
                RoundStep::Continue
            } else {
                RoundStep::Stop
            };
        };
        report.assistant_turns.push(turn.id.clone());

        // Charged once the turn has something to reveal, even if the host
        // cancels partway through its bubbles
        let state = self.quota.record_successful_turn();
        self.emit(ConductorMessage::QuotaUpdated { state });

        match self.deliver_turn(send, &turn).await {
            DeliveryOutcome::Cancelled => {
                report.cancelled = true;
                RoundStep::Stop
            }
            DeliveryOutcome::Completed if response.continue_speaking => RoundStep::Continue,
            DeliveryOutcome::Completed => RoundStep::Stop,
        }
    }

    /// `None` when the send was cancelled or the view closed mid-call;
    /// `Some(Err)` on failure or timeout
    async fn call_provider(
        &self,
        send: &CancellationScope,
        request: &TurnRequest,
        report: &mut SendReport,
    ) -> Option<Result<TurnResponse, String>> {
        let timeout = self.config.provider_timeout;
        tokio::select! {
            biased;
            () = send.collapsed() => {
                tracing::debug!(
                    persona = %request.persona_id,
                    view_closed = self.view.is_collapsed(),
                    "Send cancelled during provider call"
                );
                report.cancelled = true;
                None
            }
            result = tokio::time::timeout(timeout, self.provider.send_turn(request)) => {
                Some(match result {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => Err(format!("{e:#}")),
                    Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
                })
            }
        }
    }

    async fn deliver_turn(&self, send: &CancellationScope, turn: &Turn) -> DeliveryOutcome {
        let sink = Arc::new(ViewSink {
            transcript: Arc::clone(&self.transcript),
            tx: self.tx.clone(),
        });
        deliver(turn, send.child(), sink).finished().await
    }

    fn emit(&self, msg: ConductorMessage) {
        if self.tx.send(msg).is_err() {
            tracing::trace!("Host channel closed, dropping message");
        }
    }
}

impl<P: TurnProvider> Drop for Conductor<P> {
    fn drop(&mut self) {
        self.view.collapse();
        if let Some(task) = self.refresh_task.get_mut().take() {
            task.abort();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RoundStep {
    Continue,
    Stop,
}
