//! Provider Traits
//!
//! The orchestrator talks to two external collaborators: the turn provider
//! (the companion model behind whatever transport) and the quota provider
//! (the tier/usage source of truth). Both are abstracted here so the core
//! works the same against HTTP services, in-process fakes, or test scripts.
//!
//! Failure is a rejected call (`Err`), never a special payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{MediaRef, PersonaId, SessionToken, UserId};
use crate::quota::Tier;
use crate::segmenter::RawTurn;

/// One request for an assistant turn
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// Who is chatting
    pub user_id: UserId,
    /// Which persona is being addressed
    pub persona_id: PersonaId,
    /// Server-side conversation to continue (`None` starts a new one)
    pub session_token: Option<SessionToken>,
    /// What the user said
    pub user_message: String,
    /// 0 for a direct reply, `n` for the n-th unprompted continuation
    #[serde(default)]
    pub continuation_round: u32,
}

impl TurnRequest {
    /// Create a direct-reply request
    pub fn new(user_id: UserId, persona_id: PersonaId, user_message: impl Into<String>) -> Self {
        Self {
            user_id,
            persona_id,
            session_token: None,
            user_message: user_message.into(),
            continuation_round: 0,
        }
    }

    /// Attach the persona's session token
    #[must_use]
    pub fn with_session_token(mut self, token: Option<SessionToken>) -> Self {
        self.session_token = token;
        self
    }

    /// Mark this request as a continuation round
    #[must_use]
    pub fn with_continuation_round(mut self, round: u32) -> Self {
        self.continuation_round = round;
        self
    }
}

/// The provider's answer to a [`TurnRequest`]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    /// Reply text, either whole or pre-split
    pub content: RawTurn,
    /// Conversation token to use for the next turn with this persona
    #[serde(default)]
    pub session_token: Option<SessionToken>,
    /// Side-channel media for the first bubble
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// The persona wants to keep talking without waiting for the user
    #[serde(default)]
    pub continue_speaking: bool,
}

impl TurnResponse {
    /// Plain text response without token or media
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: RawTurn::Text(content.into()),
            session_token: None,
            media: Vec::new(),
            continue_speaking: false,
        }
    }

    /// Pre-split response without token or media
    #[must_use]
    pub fn split(parts: Vec<String>) -> Self {
        Self {
            content: RawTurn::Split(parts),
            session_token: None,
            media: Vec::new(),
            continue_speaking: false,
        }
    }

    /// Attach a session token
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(SessionToken::new(token));
        self
    }

    /// Attach media
    #[must_use]
    pub fn with_media(mut self, media: Vec<MediaRef>) -> Self {
        self.media = media;
        self
    }

    /// Ask for a continuation round
    #[must_use]
    pub fn with_continue_speaking(mut self, continue_speaking: bool) -> Self {
        self.continue_speaking = continue_speaking;
        self
    }
}

/// Authoritative tier and usage for a user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteQuota {
    /// Subscription tier
    pub tier: Tier,
    /// Daily turn allowance; `None` means "the tier's default"
    #[serde(default)]
    pub daily_limit: Option<u32>,
    /// Turns already used today
    pub daily_used: u32,
    /// When usage resets
    pub reset_at: DateTime<Utc>,
}

/// Turn provider trait
///
/// Implement this to connect the orchestrator to a companion model.
#[async_trait]
pub trait TurnProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Ask for the next assistant turn
    async fn send_turn(&self, request: &TurnRequest) -> anyhow::Result<TurnResponse>;
}

/// Quota provider trait
#[async_trait]
pub trait QuotaProvider: Send + Sync {
    /// Fetch authoritative tier and usage for a user
    async fn fetch_quota(&self, user_id: &UserId) -> anyhow::Result<RemoteQuota>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_request_builder() {
        let request = TurnRequest::new(UserId::from("u1"), PersonaId::from("luna"), "hi")
            .with_session_token(Some(SessionToken::from("t1")))
            .with_continuation_round(2);

        assert_eq!(request.user_message, "hi");
        assert_eq!(request.session_token, Some(SessionToken::from("t1")));
        assert_eq!(request.continuation_round, 2);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["personaId"], "luna");
        assert_eq!(json["sessionToken"], "t1");
    }

    #[test]
    fn test_turn_response_accepts_text_or_array() {
        let text: TurnResponse =
            serde_json::from_str(r#"{"content": "Hello.", "sessionToken": "abc"}"#).unwrap();
        assert_eq!(text.content, RawTurn::Text("Hello.".into()));
        assert_eq!(text.session_token, Some(SessionToken::from("abc")));
        assert!(!text.continue_speaking);

        let split: TurnResponse = serde_json::from_str(
            r#"{"content": ["a", "b"], "media": [{"kind": "image", "url": "https://x/y.png"}]}"#,
        )
        .unwrap();
        assert_eq!(split.content, RawTurn::Split(vec!["a".into(), "b".into()]));
        assert_eq!(split.media, vec![MediaRef::image("https://x/y.png")]);
    }

    #[test]
    fn test_remote_quota_wire_format() {
        let quota: RemoteQuota = serde_json::from_str(
            r#"{"tier": "premium", "dailyLimit": 200, "dailyUsed": 20, "resetAt": "2026-01-02T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(quota.tier, Tier::Premium);
        assert_eq!(quota.daily_limit, Some(200));
        assert_eq!(quota.daily_used, 20);
    }
}
