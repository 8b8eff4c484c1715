//! Conductor Messages
//!
//! Identifiers shared across the crate and the messages the Conductor sends to
//! the hosting view. The view is a pure renderer: it shows bubbles when told,
//! toggles the composing indicator when told, and renders limit prompts from
//! the structured quota denials it receives.

use serde::{Deserialize, Serialize};

use crate::quota::{DenyReason, QuotaState};

/// Messages from Conductor to the hosting view
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConductorMessage {
    // ============================================
    // Conversation Messages
    // ============================================
    /// The user's own turn was accepted and recorded
    UserTurn {
        /// Turn identifier
        turn_id: TurnId,
        /// Persona being addressed
        persona_id: PersonaId,
        /// Message text as sent
        text: String,
    },

    /// One bubble of an assistant turn became visible
    BubbleRevealed {
        /// Turn this bubble belongs to
        turn_id: TurnId,
        /// Position within the turn
        index: usize,
        /// Bubble text
        text: String,
        /// Media attached to this bubble (only ever the first of a turn)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        media: Vec<MediaRef>,
    },

    /// The persona is "typing" before the next bubble
    Composing {
        /// Turn being composed
        turn_id: TurnId,
        /// Whether the indicator should be shown
        active: bool,
    },

    /// Every bubble of a turn has been revealed
    TurnDelivered {
        /// Turn that finished
        turn_id: TurnId,
        /// Number of bubbles revealed
        bubble_count: usize,
    },

    // ============================================
    // Quota Messages
    // ============================================
    /// A send was refused by the quota enforcer
    QuotaBlocked {
        /// Why the send was refused
        reason: DenyReason,
    },

    /// Quota state changed (refresh completed or a turn was counted)
    QuotaUpdated {
        /// Current quota state
        state: QuotaState,
    },

    // ============================================
    // System Messages
    // ============================================
    /// A notification for the view to surface
    Notify {
        /// Severity
        level: NotifyLevel,
        /// Human readable text
        message: String,
    },
}

/// Notification severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Something degraded but usable
    Warning,
    /// Something failed
    Error,
}

// ============================================
// Identifiers
// ============================================

/// Unique identifier of a turn
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub String);

impl TurnId {
    /// Generate a new unique turn ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("turn_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a raw string
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw string
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of the chatting user
    UserId
);
string_id!(
    /// Identifier of the companion persona being addressed
    PersonaId
);
string_id!(
    /// Opaque server-side conversation token issued by the turn provider
    SessionToken
);

/// Who produced a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// User input
    User,
    /// Companion output
    Assistant,
}

// ============================================
// Media
// ============================================

/// Kind of side-channel media delivered with a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Audio clip
    Audio,
    /// Video clip
    Video,
}

/// Reference to media hosted elsewhere
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// What kind of media this is
    pub kind: MediaKind,
    /// Where to load it from
    pub url: String,
}

impl MediaRef {
    /// Image reference
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Image,
            url: url.into(),
        }
    }

    /// Audio reference
    pub fn audio(url: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Audio,
            url: url.into(),
        }
    }

    /// Video reference
    pub fn video(url: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Video,
            url: url.into(),
        }
    }
}
