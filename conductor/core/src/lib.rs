//! Companion Core - Turn Delivery and Quota Orchestration
//!
//! This crate drives one side of a companion chat: it asks a remote persona
//! service for replies, splits them into chat bubbles, reveals them at a
//! human pace, enforces per-user daily quotas, and keeps each persona's
//! server-side conversation going between turns. It has no UI; a host renders
//! the [`ConductorMessage`] stream however it likes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Host (CLI, app)                          │
//! │        send_message / new_conversation / ViewHandle (down)        │
//! │                    ConductorMessage stream (up)                   │
//! └────────────────────────────────┬─────────────────────────────────┘
//!                                  │
//! ┌────────────────────────────────┼─────────────────────────────────┐
//! │                           COMPANION CORE                          │
//! │  ┌─────────────────────────────┴──────────────────────────────┐  │
//! │  │                         Conductor                           │  │
//! │  │  ┌───────────┐  ┌───────────┐  ┌──────────┐  ┌───────────┐  │  │
//! │  │  │   Quota   │  │  Session  │  │ Segmenter│  │ Delivery  │  │  │
//! │  │  │ Enforcer  │  │   Store   │  │          │  │ (scopes)  │  │  │
//! │  │  └─────┬─────┘  └───────────┘  └──────────┘  └───────────┘  │  │
//! │  └────────┼───────────────────────────────────────────────────┘  │
//! └───────────┼────────────────────────────┬─────────────────────────┘
//!             │                            │
//!      QuotaProvider                 TurnProvider
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: one open conversation view
//! - [`CancellationScope`]: revocation handle for timed callbacks
//! - [`Segmenter`]: reply text → ordered bubbles with reveal delays
//! - [`QuotaEnforcer`]: per-user daily allowance gate
//! - [`SessionStore`]: persona → session token map
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use companion_core::{
//!     backend::{HttpQuotaProvider, HttpTurnProvider},
//!     Conductor, ConductorConfig, QuotaEnforcer, SessionStore,
//! };
//! use tokio::sync::mpsc;
//!
//! let config = ConductorConfig::default();
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let quota = QuotaEnforcer::new(Arc::new(HttpQuotaProvider::new(url, timeout)?), config.quota.clone());
//! let conductor = Conductor::new(
//!     "u-1".into(),
//!     Arc::new(HttpTurnProvider::new(url, timeout)?),
//!     quota,
//!     SessionStore::new(),
//!     config,
//!     tx,
//! );
//!
//! conductor.open_view();
//! conductor.send_message(&"luna".into(), "hi!").await?;
//! while let Ok(msg) = rx.try_recv() {
//!     // Render message
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: turn and quota provider traits plus HTTP adapters
//! - [`conductor`]: the orchestrator and its host handle
//! - [`config`]: TOML, environment and CLI configuration
//! - [`delivery`]: paced bubble reveal
//! - [`messages`]: messages to the host and shared id types
//! - [`quota`]: tiers, quota state and the enforcer
//! - [`scope`]: cancellation scopes
//! - [`segmenter`]: bubble splitting
//! - [`session`]: session continuity
//! - [`transcript`]: what the user actually saw
//! - [`turn`]: turns and bubbles

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod delivery;
pub mod messages;
pub mod quota;
pub mod scope;
pub mod segmenter;
pub mod session;
pub mod transcript;
pub mod turn;

// Re-exports for convenience
pub use backend::{QuotaProvider, RemoteQuota, TurnProvider, TurnRequest, TurnResponse};
pub use conductor::{
    Conductor, ConductorConfig, ConductorError, SendOutcome, SendReport, ViewHandle,
};
pub use delivery::{deliver, DeliveryHandle, DeliveryOutcome, DeliverySink, RevealedBubble};
pub use messages::{
    ConductorMessage, MediaKind, MediaRef, MessageRole, NotifyLevel, PersonaId, SessionToken,
    TurnId, UserId,
};
pub use quota::{
    DailyLimit, DenyReason, FallbackPolicy, QuotaConfig, QuotaDecision, QuotaDetail,
    QuotaEnforcer, QuotaPhase, QuotaState, Tier,
};
pub use scope::{CancellationScope, TimerId};
pub use segmenter::{RawTurn, Segmenter, SegmenterConfig};
pub use session::SessionStore;
pub use transcript::{Transcript, TranscriptEntry};
pub use turn::{Bubble, BubbleSource, Turn};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, CompanionConfig, CompanionToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
