//! Turn Segmentation
//!
//! Decides how one assistant turn is broken into bubbles. Providers may split
//! the reply themselves; otherwise a short heuristic keeps short replies whole
//! and breaks longer ones into two natural halves.
//!
//! Everything here is pure: same input, same bubbles, no I/O.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::turn::{Bubble, BubbleSource};

/// Default pause before every bubble after the first
pub const DEFAULT_INTER_BUBBLE_DELAY: Duration = Duration::from_millis(500);

/// Default length (in characters) above which unpunctuated text is split
pub const DEFAULT_LONG_TEXT_THRESHOLD: usize = 120;

/// Characters that end a sentence
const TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Characters that may trail a terminator and still belong to its sentence
const CLOSERS: [char; 7] = ['"', '\'', ')', ']', '\u{201d}', '\u{2019}', '*'];

/// Raw assistant content as handed over by the turn provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTurn {
    /// The provider already split the reply into ordered parts
    Split(Vec<String>),
    /// One undivided reply
    Text(String),
}

impl From<&str> for RawTurn {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RawTurn {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for RawTurn {
    fn from(parts: Vec<String>) -> Self {
        Self::Split(parts)
    }
}

/// Segmentation tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmenterConfig {
    /// Pause before each bubble after the first
    pub inter_bubble_delay: Duration,
    /// Character count above which unpunctuated text is split once
    pub long_text_threshold: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            inter_bubble_delay: DEFAULT_INTER_BUBBLE_DELAY,
            long_text_threshold: DEFAULT_LONG_TEXT_THRESHOLD,
        }
    }
}

/// Splits assistant turns into bubbles
#[derive(Clone, Debug, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    /// Create a segmenter with the given tuning
    #[must_use]
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Current tuning
    #[must_use]
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Split a raw turn into ordered bubbles
    ///
    /// An empty result means the turn had no visible content.
    #[must_use]
    pub fn segment(&self, raw: &RawTurn) -> Vec<Bubble> {
        match raw {
            RawTurn::Split(parts) => self.bubbles(
                parts.iter().map(|p| p.trim().to_string()),
                BubbleSource::ProviderSplit,
            ),
            RawTurn::Text(text) => {
                self.bubbles(self.split_text(text).into_iter(), BubbleSource::HeuristicSplit)
            }
        }
    }

    fn bubbles(
        &self,
        texts: impl Iterator<Item = String>,
        source: BubbleSource,
    ) -> Vec<Bubble> {
        texts
            .filter(|t| !t.is_empty())
            .enumerate()
            .map(|(i, text)| {
                let delay = if i == 0 {
                    Duration::ZERO
                } else {
                    self.config.inter_bubble_delay
                };
                Bubble::new(text, delay, source)
            })
            .collect()
    }

    /// Heuristic split of a single string into at most two parts
    fn split_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let sentences = split_sentences(text);
        let terminated = sentences.iter().any(|s| s.ends_with_terminator);

        if !terminated {
            return match split_at_whitespace(text, self.config.long_text_threshold) {
                Some((head, tail)) => vec![head.to_string(), tail.to_string()],
                None => vec![text.to_string()],
            };
        }

        if sentences.len() <= 2 {
            return vec![text.to_string()];
        }

        let mid = sentences.len().div_ceil(2);
        let join = |part: &[Sentence<'_>]| {
            part.iter()
                .map(|s| s.text)
                .collect::<Vec<_>>()
                .join(" ")
        };
        vec![join(&sentences[..mid]), join(&sentences[mid..])]
    }
}

/// Split a raw turn with the default tuning
#[must_use]
pub fn segment(raw: &RawTurn) -> Vec<Bubble> {
    Segmenter::default().segment(raw)
}

#[derive(Debug)]
struct Sentence<'a> {
    text: &'a str,
    ends_with_terminator: bool,
}

/// Split trimmed text into sentences, terminators kept attached
///
/// A terminator run (`?!`, `...`) plus any closing quotes or brackets ends a
/// sentence only when followed by whitespace or the end of the text, so
/// decimals like `3.5` stay intact.
fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !TERMINATORS.contains(&c) {
            continue;
        }

        while let Some(&(_, next)) = chars.peek() {
            if TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                chars.next();
            } else {
                break;
            }
        }

        let end = chars.peek().map_or(text.len(), |&(i, _)| i);
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());
        if !at_boundary {
            continue;
        }

        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            sentences.push(Sentence {
                text: sentence,
                ends_with_terminator: true,
            });
        }
        start = end;
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(Sentence {
            text: rest,
            ends_with_terminator: false,
        });
    }

    sentences
}

/// Split once at the last whitespace at or before `threshold` characters
///
/// Returns `None` when the text is within the threshold or no usable
/// whitespace exists before it.
fn split_at_whitespace(text: &str, threshold: usize) -> Option<(&str, &str)> {
    if text.chars().count() <= threshold {
        return None;
    }

    let (byte_idx, _) = text
        .char_indices()
        .take(threshold + 1)
        .filter(|(_, c)| c.is_whitespace())
        .last()?;

    let head = text[..byte_idx].trim();
    let tail = text[byte_idx..].trim();
    if head.is_empty() || tail.is_empty() {
        return None;
    }
    Some((head, tail))
}
