//! Turns and Bubbles
//!
//! A turn is one exchange unit from either side of the conversation. It is
//! built once (on user send, or when the provider answers) and never mutated
//! afterwards. Assistant turns are shown as one or more bubbles.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{MediaRef, MessageRole, TurnId};

/// Where a bubble boundary came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BubbleSource {
    /// The provider returned the text already split
    ProviderSplit,
    /// The segmenter chose the boundary
    HeuristicSplit,
}

/// The atomic unit of display
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bubble {
    /// Trimmed, non-empty text
    pub text: String,
    /// How long to wait before revealing this bubble
    #[serde(with = "duration_ms")]
    pub reveal_delay: Duration,
    /// Where the boundary came from
    pub source: BubbleSource,
}

impl Bubble {
    /// Create a bubble
    pub fn new(text: impl Into<String>, reveal_delay: Duration, source: BubbleSource) -> Self {
        Self {
            text: text.into(),
            reveal_delay,
            source,
        }
    }
}

/// One exchange unit
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: TurnId,
    /// Who produced the turn
    pub role: MessageRole,
    /// Ordered bubbles, never empty
    pub bubbles: Vec<Bubble>,
    /// Side-channel media, shown with the first bubble only
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// When the turn was created
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a user turn (always a single bubble)
    ///
    /// Returns `None` when the text is blank.
    #[must_use]
    pub fn user(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            id: TurnId::new(),
            role: MessageRole::User,
            bubbles: vec![Bubble::new(text, Duration::ZERO, BubbleSource::ProviderSplit)],
            media: Vec::new(),
            created_at: Utc::now(),
        })
    }

    /// Create an assistant turn from segmented bubbles
    ///
    /// Returns `None` for an empty turn (no bubbles), which callers treat as
    /// "nothing to show" rather than an error.
    #[must_use]
    pub fn assistant(bubbles: Vec<Bubble>, media: Vec<MediaRef>) -> Option<Self> {
        if bubbles.is_empty() {
            return None;
        }
        Some(Self {
            id: TurnId::new(),
            role: MessageRole::Assistant,
            bubbles,
            media,
            created_at: Utc::now(),
        })
    }

    /// All bubble texts joined by a single space
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.bubbles
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_turn_trims_and_rejects_blank() {
        let turn = Turn::user("  hello there \n").unwrap();
        assert_eq!(turn.role, MessageRole::User);
        assert_eq!(turn.bubbles.len(), 1);
        assert_eq!(turn.bubbles[0].text, "hello there");

        assert!(Turn::user("   \t").is_none());
    }

    #[test]
    fn test_assistant_turn_requires_bubbles() {
        assert!(Turn::assistant(Vec::new(), Vec::new()).is_none());

        let turn = Turn::assistant(
            vec![
                Bubble::new("One.", Duration::ZERO, BubbleSource::HeuristicSplit),
                Bubble::new("Two.", Duration::from_millis(500), BubbleSource::HeuristicSplit),
            ],
            vec![MediaRef::image("https://cdn.example/a.png")],
        )
        .unwrap();
        assert_eq!(turn.joined_text(), "One. Two.");
    }

    #[test]
    fn test_bubble_delay_serializes_as_millis() {
        let bubble = Bubble::new("hi", Duration::from_millis(500), BubbleSource::ProviderSplit);
        let json = serde_json::to_value(&bubble).unwrap();
        assert_eq!(json["reveal_delay"], 500);
        assert_eq!(json["source"], "provider-split");
    }
}
