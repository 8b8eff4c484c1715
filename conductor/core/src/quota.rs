//! Daily Quota Enforcement
//!
//! Tracks how many assistant turns a user may still receive today. The
//! authoritative numbers come from a [`QuotaProvider`]; between fetches the
//! enforcer keeps optimistic local bookkeeping.
//!
//! # State Machine
//!
//! ```text
//! Uninitialized ──refresh──▶ Loading ──ok──▶ Ready
//!                              ▲    └─err──▶ ReadyDegraded
//!                              └──── next refresh (view re-opened)
//! ```
//!
//! # Always-Current Reads
//!
//! Send handlers are usually created before the first refresh resolves. The
//! enforcer is therefore a cheap `Clone` handle over one shared cell, and
//! [`QuotaEnforcer::check_allowed`] reads that cell at call time. Handlers
//! must hold the enforcer, never a [`QuotaState`] copied out of it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::backend::{QuotaProvider, RemoteQuota};
use crate::messages::UserId;

/// Default allowance granted when the quota source cannot be reached
pub const DEFAULT_FAIL_SOFT_ALLOWANCE: u32 = 5;

/// Default bound on a quota fetch
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Tiers and Limits
// =============================================================================

/// Subscription tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// No subscription
    #[default]
    Free,
    /// Entry subscription
    Basic,
    /// Full subscription
    Premium,
    /// No daily cap
    Unlimited,
}

impl Tier {
    /// Allowance used when the quota source does not state one
    #[must_use]
    pub fn default_daily_limit(self) -> DailyLimit {
        match self {
            Self::Free => DailyLimit::Limited(20),
            Self::Basic => DailyLimit::Limited(100),
            Self::Premium => DailyLimit::Limited(200),
            Self::Unlimited => DailyLimit::Unlimited,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Unlimited => "unlimited",
        };
        f.write_str(name)
    }
}

/// A daily turn allowance
///
/// Serializes as a number, or `null` for [`DailyLimit::Unlimited`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DailyLimit {
    /// At most this many turns per day
    Limited(u32),
    /// No cap
    Unlimited,
}

// =============================================================================
// Quota State
// =============================================================================

/// Per-user quota snapshot
///
/// Remaining turns are always derived from limit and usage, never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    /// Subscription tier
    pub tier: Tier,
    /// Daily allowance
    pub daily_limit: DailyLimit,
    /// Turns used since the last reset
    pub daily_used: u32,
    /// When usage resets
    pub reset_at: DateTime<Utc>,
    /// True until authoritative numbers have been applied
    pub is_provisional: bool,
}

impl QuotaState {
    /// Pessimistic placeholder used before the first fetch: nothing remaining
    #[must_use]
    pub fn provisional(now: DateTime<Utc>) -> Self {
        Self {
            tier: Tier::Free,
            daily_limit: DailyLimit::Limited(0),
            daily_used: 0,
            reset_at: next_utc_midnight(now),
            is_provisional: true,
        }
    }

    /// Authoritative state from the quota source
    #[must_use]
    pub fn from_remote(remote: &RemoteQuota) -> Self {
        let daily_limit = match (remote.tier, remote.daily_limit) {
            (Tier::Unlimited, _) => DailyLimit::Unlimited,
            (_, Some(limit)) => DailyLimit::Limited(limit),
            (tier, None) => tier.default_daily_limit(),
        };
        Self {
            tier: remote.tier,
            daily_limit,
            daily_used: remote.daily_used,
            reset_at: remote.reset_at,
            is_provisional: false,
        }
    }

    /// Turns left today; `None` when unlimited
    #[must_use]
    pub fn daily_remaining(&self) -> Option<u32> {
        match self.daily_limit {
            DailyLimit::Limited(limit) => Some(limit.saturating_sub(self.daily_used)),
            DailyLimit::Unlimited => None,
        }
    }

    /// Whether the user has an uncapped allowance
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.tier == Tier::Unlimited || self.daily_limit == DailyLimit::Unlimited
    }

    /// Whether no turns remain today
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.daily_remaining() == Some(0)
    }
}

/// Next midnight (UTC) strictly after `now`
#[must_use]
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map_or_else(|| now + chrono::Duration::days(1), |dt| dt.and_utc())
}

// =============================================================================
// Decisions
// =============================================================================

/// What a limit prompt needs to tell the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDetail {
    /// Current tier
    pub tier: Tier,
    /// Today's allowance
    pub daily_limit: u32,
    /// When the allowance resets
    pub reset_at: DateTime<Utc>,
}

/// Why a send was refused
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// Quota has not been fetched yet
    Loading,
    /// Today's allowance is used up
    QuotaExhausted {
        /// Limit-prompt details
        detail: QuotaDetail,
    },
}

impl DenyReason {
    /// Stable reason code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::QuotaExhausted { .. } => "quota_exhausted",
        }
    }
}

/// Result of a quota check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    /// The turn may proceed
    Allowed,
    /// The turn must not proceed
    Denied(DenyReason),
}

impl QuotaDecision {
    /// Whether the turn may proceed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// The denial reason, if any
    #[must_use]
    pub fn reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Allowed => None,
            Self::Denied(reason) => Some(reason),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// What to assume when the quota source fails
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Grant a small allowance on the lowest tier so a network blip does not
    /// lock the user out
    FailSoft {
        /// Turns granted while degraded
        allowance: u32,
    },
    /// Grant nothing until the source answers
    FailClosed,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::FailSoft {
            allowance: DEFAULT_FAIL_SOFT_ALLOWANCE,
        }
    }
}

impl FallbackPolicy {
    /// The degraded state this policy prescribes
    #[must_use]
    pub fn fallback_state(self, now: DateTime<Utc>) -> QuotaState {
        let allowance = match self {
            Self::FailSoft { allowance } => allowance,
            Self::FailClosed => 0,
        };
        QuotaState {
            tier: Tier::Free,
            daily_limit: DailyLimit::Limited(allowance),
            daily_used: 0,
            reset_at: next_utc_midnight(now),
            is_provisional: true,
        }
    }
}

/// Quota enforcer configuration
#[derive(Clone, Debug)]
pub struct QuotaConfig {
    /// Bound on a single fetch
    pub refresh_timeout: Duration,
    /// Behaviour on fetch failure
    pub fallback: FallbackPolicy,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            fallback: FallbackPolicy::default(),
        }
    }
}

// =============================================================================
// Enforcer
// =============================================================================

/// Load phase of the enforcer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPhase {
    /// Nothing requested yet
    Uninitialized,
    /// A fetch is in progress
    Loading,
    /// Authoritative values applied
    Ready,
    /// Fetch failed; fallback values applied
    ReadyDegraded,
}

#[derive(Debug)]
struct QuotaCell {
    phase: QuotaPhase,
    state: QuotaState,
    /// Bumped by every refresh so only the latest one applies its result
    generation: u64,
}

/// Per-user quota gate
///
/// Clones share state.
#[derive(Clone)]
pub struct QuotaEnforcer {
    cell: Arc<RwLock<QuotaCell>>,
    provider: Arc<dyn QuotaProvider>,
    config: QuotaConfig,
}

impl QuotaEnforcer {
    /// Create an enforcer in the `Uninitialized` phase
    pub fn new(provider: Arc<dyn QuotaProvider>, config: QuotaConfig) -> Self {
        Self {
            cell: Arc::new(RwLock::new(QuotaCell {
                phase: QuotaPhase::Uninitialized,
                state: QuotaState::provisional(Utc::now()),
                generation: 0,
            })),
            provider,
            config,
        }
    }

    /// Current load phase
    #[must_use]
    pub fn phase(&self) -> QuotaPhase {
        self.cell.read().phase
    }

    /// Copy of the current state
    ///
    /// For display only; gate decisions go through [`Self::check_allowed`].
    #[must_use]
    pub fn snapshot(&self) -> QuotaState {
        self.cell.read().state.clone()
    }

    /// Enter `Loading` immediately
    ///
    /// Hosts call this synchronously when a view opens, before spawning the
    /// fetch, so no send can observe the previous phase.
    pub fn begin_refresh(&self) -> u64 {
        let mut cell = self.cell.write();
        cell.phase = QuotaPhase::Loading;
        cell.generation += 1;
        cell.generation
    }

    /// Fetch authoritative tier and usage
    ///
    /// Never fails: on error or timeout the configured fallback is applied
    /// and the enforcer ends in `ReadyDegraded`. If a newer refresh started
    /// meanwhile, this one's result is discarded.
    pub async fn refresh(&self, user_id: &UserId) -> QuotaState {
        let generation = self.begin_refresh();

        let fetched = tokio::time::timeout(
            self.config.refresh_timeout,
            self.provider.fetch_quota(user_id),
        )
        .await;

        let (phase, state) = match fetched {
            Ok(Ok(remote)) => {
                tracing::debug!(
                    user = %user_id,
                    tier = %remote.tier,
                    used = remote.daily_used,
                    "Quota refreshed"
                );
                (QuotaPhase::Ready, QuotaState::from_remote(&remote))
            }
            Ok(Err(e)) => {
                tracing::warn!(user = %user_id, error = %e, "Quota fetch failed, using fallback");
                (
                    QuotaPhase::ReadyDegraded,
                    self.config.fallback.fallback_state(Utc::now()),
                )
            }
            Err(_) => {
                tracing::warn!(
                    user = %user_id,
                    timeout_ms = self.config.refresh_timeout.as_millis() as u64,
                    "Quota fetch timed out, using fallback"
                );
                (
                    QuotaPhase::ReadyDegraded,
                    self.config.fallback.fallback_state(Utc::now()),
                )
            }
        };

        let mut cell = self.cell.write();
        if cell.generation == generation {
            cell.phase = phase;
            cell.state = state;
        } else {
            tracing::debug!(
                user = %user_id,
                stale = generation,
                current = cell.generation,
                "Discarding superseded quota refresh"
            );
        }
        cell.state.clone()
    }

    /// Decide whether one more assistant turn may be requested
    pub fn check_allowed(&self) -> QuotaDecision {
        self.check_allowed_at(Utc::now())
    }

    fn check_allowed_at(&self, now: DateTime<Utc>) -> QuotaDecision {
        let mut cell = self.cell.write();

        if cell.state.is_unlimited() {
            return QuotaDecision::Allowed;
        }

        match cell.phase {
            QuotaPhase::Uninitialized | QuotaPhase::Loading => {
                return QuotaDecision::Denied(DenyReason::Loading);
            }
            QuotaPhase::Ready if now >= cell.state.reset_at => {
                tracing::debug!(reset_at = %cell.state.reset_at, "Daily quota window rolled over");
                cell.state.daily_used = 0;
                cell.state.reset_at = next_utc_midnight(now);
            }
            QuotaPhase::Ready | QuotaPhase::ReadyDegraded => {}
        }

        match cell.state.daily_limit {
            DailyLimit::Limited(limit) if cell.state.is_exhausted() => {
                QuotaDecision::Denied(DenyReason::QuotaExhausted {
                    detail: QuotaDetail {
                        tier: cell.state.tier,
                        daily_limit: limit,
                        reset_at: cell.state.reset_at,
                    },
                })
            }
            _ => QuotaDecision::Allowed,
        }
    }

    /// Count one delivered assistant turn locally
    ///
    /// Clamped: usage never passes the limit, so remaining never drops below
    /// zero. No-op for unlimited users. Does not contact the quota source.
    pub fn record_successful_turn(&self) -> QuotaState {
        let mut cell = self.cell.write();
        if !cell.state.is_unlimited() && cell.state.daily_remaining().unwrap_or(0) > 0 {
            cell.state.daily_used += 1;
        }
        cell.state.clone()
    }
}

impl std::fmt::Debug for QuotaEnforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = self.cell.read();
        f.debug_struct("QuotaEnforcer")
            .field("phase", &cell.phase)
            .field("state", &cell.state)
            .finish_non_exhaustive()
    }
}
