//! Conversation Transcript
//!
//! In-memory, append-only record of what the user actually saw during one
//! view lifetime: every user turn and every assistant bubble at the moment it
//! was revealed. Bubbles that were never revealed (because delivery was
//! cancelled) never appear here. Nothing is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delivery::RevealedBubble;
use crate::messages::{MediaRef, MessageRole, TurnId};
use crate::turn::Turn;

/// One visible line of the conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Turn this entry belongs to
    pub turn_id: TurnId,
    /// Who produced it
    pub role: MessageRole,
    /// Bubble position within the turn
    pub index: usize,
    /// Visible text
    pub text: String,
    /// Media shown alongside
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// When it became visible
    pub timestamp: DateTime<Utc>,
}

/// Bounded, append-only transcript
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    /// Maximum entries to keep (0 = unlimited)
    max_entries: usize,
}

impl Transcript {
    /// Create an unbounded transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript that keeps at most `max_entries` (0 = unlimited)
    #[must_use]
    pub fn with_limit(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    /// Record a user turn
    pub fn record_user_turn(&mut self, turn: &Turn) {
        for (index, bubble) in turn.bubbles.iter().enumerate() {
            self.entries.push(TranscriptEntry {
                turn_id: turn.id.clone(),
                role: turn.role,
                index,
                text: bubble.text.clone(),
                media: if index == 0 {
                    turn.media.clone()
                } else {
                    Vec::new()
                },
                timestamp: turn.created_at,
            });
        }
        self.prune_if_needed();
    }

    /// Record an assistant bubble at reveal time
    pub fn record_bubble(&mut self, revealed: &RevealedBubble) {
        self.entries.push(TranscriptEntry {
            turn_id: revealed.turn_id.clone(),
            role: MessageRole::Assistant,
            index: revealed.index,
            text: revealed.bubble.text.clone(),
            media: revealed.media.clone(),
            timestamp: Utc::now(),
        });
        self.prune_if_needed();
    }

    /// All retained entries, oldest first
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Entries belonging to one turn
    pub fn turn_entries<'a>(
        &'a self,
        turn_id: &'a TurnId,
    ) -> impl Iterator<Item = &'a TranscriptEntry> + 'a {
        self.entries.iter().filter(move |e| &e.turn_id == turn_id)
    }

    /// The last `count` entries
    #[must_use]
    pub fn recent(&self, count: usize) -> &[TranscriptEntry] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune_if_needed(&mut self) {
        if self.max_entries == 0 || self.entries.len() <= self.max_entries {
            return;
        }
        let to_remove = self.entries.len() - self.max_entries;
        self.entries.drain(..to_remove);

        tracing::debug!(
            removed = to_remove,
            remaining = self.entries.len(),
            "Pruned transcript entries"
        );
    }
}
