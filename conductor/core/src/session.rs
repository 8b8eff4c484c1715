//! Session Continuity
//!
//! Maps each persona to the opaque conversation token the turn provider
//! issued for it, so consecutive turns land in the same server-side
//! conversation. Tokens are never inspected, only stored and echoed back.
//!
//! One store exists per conversation view and is handed to the Conductor at
//! construction time; there is no process-wide session map.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::messages::{PersonaId, SessionToken};

/// Persona → session token map
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    tokens: Arc<RwLock<HashMap<PersonaId, SessionToken>>>,
}

impl SessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to send with the next turn for `persona`
    ///
    /// `None` means the next turn starts a new server-side conversation.
    #[must_use]
    pub fn get_token(&self, persona: &PersonaId) -> Option<SessionToken> {
        self.tokens.read().get(persona).cloned()
    }

    /// Remember the token the provider issued for `persona`
    pub fn set_token(&self, persona: &PersonaId, token: SessionToken) {
        let previous = self.tokens.write().insert(persona.clone(), token);
        tracing::debug!(
            persona = %persona,
            replaced = previous.is_some(),
            "Session token updated"
        );
    }

    /// Forget tokens: one persona, or every persona when `None`
    pub fn reset(&self, persona: Option<&PersonaId>) {
        let mut tokens = self.tokens.write();
        match persona {
            Some(persona) => {
                tokens.remove(persona);
                tracing::debug!(persona = %persona, "Session reset");
            }
            None => {
                let count = tokens.len();
                tokens.clear();
                tracing::debug!(count, "All sessions reset");
            }
        }
    }

    /// Number of personas with a live token
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    /// Whether no persona has a live token
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}
