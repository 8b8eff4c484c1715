//! Shared test doubles for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use companion_core::quota::next_utc_midnight;
use companion_core::{
    Conductor, ConductorConfig, ConductorMessage, QuotaEnforcer, QuotaProvider,
    RemoteQuota, SessionStore, Tier, TurnProvider, TurnRequest, TurnResponse, UserId,
};

// =============================================================================
// Turn Providers
// =============================================================================

/// One scripted reply, optionally delayed
pub enum Reply {
    /// Answer with this response
    Ok(TurnResponse),
    /// Fail with this message
    Fail(&'static str),
    /// Never answer
    Hang,
    /// Answer after a delay
    After(Duration, TurnResponse),
}

/// Replays scripted replies in order and records every request
pub struct ScriptedTurns {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedTurns {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TurnProvider for ScriptedTurns {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_turn(&self, request: &TurnRequest) -> anyhow::Result<TurnResponse> {
        self.requests.lock().push(request.clone());
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Ok(response)) => Ok(response),
            Some(Reply::Fail(msg)) => Err(anyhow::anyhow!(msg)),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::After(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Ok(TurnResponse::text("Mm-hm.")),
        }
    }
}

/// Echoes back a token that encodes the persona and the token it received
///
/// Reply text is `"<persona>:<received token or none>"`.
pub struct EchoTurns;

#[async_trait]
impl TurnProvider for EchoTurns {
    fn name(&self) -> &str {
        "echo"
    }

    async fn send_turn(&self, request: &TurnRequest) -> anyhow::Result<TurnResponse> {
        let received = request
            .session_token
            .as_ref()
            .map_or("none".to_string(), |t| t.as_str().to_string());
        Ok(
            TurnResponse::text(format!("{}:{}", request.persona_id, received))
                .with_session_token(format!("{}-session", request.persona_id)),
        )
    }
}

// =============================================================================
// Quota Providers
// =============================================================================

/// Mutable quota source, so tests can "upgrade" a user between refreshes
pub struct AdjustableQuota {
    remote: Mutex<RemoteQuota>,
}

impl AdjustableQuota {
    pub fn new(tier: Tier, daily_limit: Option<u32>, daily_used: u32) -> Arc<Self> {
        Arc::new(Self {
            remote: Mutex::new(RemoteQuota {
                tier,
                daily_limit,
                daily_used,
                reset_at: next_utc_midnight(Utc::now()),
            }),
        })
    }

    pub fn set(&self, tier: Tier, daily_limit: Option<u32>) {
        let mut remote = self.remote.lock();
        remote.tier = tier;
        remote.daily_limit = daily_limit;
    }
}

#[async_trait]
impl QuotaProvider for AdjustableQuota {
    async fn fetch_quota(&self, _user_id: &UserId) -> anyhow::Result<RemoteQuota> {
        Ok(self.remote.lock().clone())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A conductor plus the host side of its channel
pub struct Harness<P: TurnProvider + 'static> {
    pub conductor: Arc<Conductor<P>>,
    pub rx: mpsc::UnboundedReceiver<ConductorMessage>,
}

impl<P: TurnProvider + 'static> Harness<P> {
    pub fn new(provider: Arc<P>, quota: Arc<dyn QuotaProvider>) -> Self {
        Self::with_config(provider, quota, ConductorConfig::default())
    }

    pub fn with_config(
        provider: Arc<P>,
        quota: Arc<dyn QuotaProvider>,
        config: ConductorConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let enforcer = QuotaEnforcer::new(quota, config.quota.clone());
        let conductor = Conductor::new(
            UserId::from("u-test"),
            provider,
            enforcer,
            SessionStore::new(),
            config,
            tx,
        );
        Self {
            conductor: Arc::new(conductor),
            rx,
        }
    }

    /// Open the view and wait until the quota refresh has landed
    pub async fn open(&mut self) {
        self.conductor.open_view();
        self.wait_for_quota().await;
    }

    /// Wait for the next `QuotaUpdated` message
    pub async fn wait_for_quota(&mut self) {
        while let Some(msg) = self.rx.recv().await {
            if matches!(msg, ConductorMessage::QuotaUpdated { .. }) {
                return;
            }
        }
    }

    /// Everything queued on the channel right now
    pub fn drain(&mut self) -> Vec<ConductorMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Texts of the revealed bubbles among `messages`
pub fn revealed_texts(messages: &[ConductorMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ConductorMessage::BubbleRevealed { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
