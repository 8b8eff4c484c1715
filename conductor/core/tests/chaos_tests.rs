//! Chaos Tests for Cancellation Under Contention
//!
//! These tests hammer cancellation scopes and deliveries from many tasks on
//! a multi-threaded runtime:
//! - Collapse racing with timers that are about to fire
//! - Parent collapse racing with child creation
//! - Many concurrent deliveries cancelled at random points
//!
//! # Running
//!
//! The long-running variants are ignored by default:
//! ```bash
//! cargo test chaos -- --ignored --nocapture
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;

use companion_core::{
    deliver, Bubble, BubbleSource, CancellationScope, DeliveryOutcome, DeliverySink,
    RevealedBubble, Turn,
};

// =============================================================================
// Chaos Test Infrastructure
// =============================================================================

/// Configuration for chaos test scenarios
#[derive(Clone, Debug)]
struct ChaosConfig {
    /// Number of concurrent scopes or deliveries
    concurrency: usize,
    /// Timers armed per scope
    timers_per_scope: usize,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            concurrency: 64,
            timers_per_scope: 16,
        }
    }
}

impl ChaosConfig {
    fn stress() -> Self {
        Self {
            concurrency: 1_000,
            timers_per_scope: 64,
        }
    }
}

/// Sink that fails the test if anything is revealed after its scope closed
struct GuardedSink {
    scope: Mutex<Option<CancellationScope>>,
    revealed: AtomicUsize,
    violation: AtomicBool,
}

impl GuardedSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            scope: Mutex::new(None),
            revealed: AtomicUsize::new(0),
            violation: AtomicBool::new(false),
        })
    }
}

impl DeliverySink for GuardedSink {
    fn bubble_revealed(&self, _bubble: &RevealedBubble) {
        if let Some(scope) = self.scope.lock().as_ref() {
            if scope.is_collapsed() {
                self.violation.store(true, Ordering::SeqCst);
            }
        }
        self.revealed.fetch_add(1, Ordering::SeqCst);
    }
}

fn long_turn(bubbles: usize) -> Turn {
    let bubbles = (0..bubbles)
        .map(|i| {
            let delay = if i == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(1)
            };
            Bubble::new(format!("bubble {i}"), delay, BubbleSource::ProviderSplit)
        })
        .collect();
    Turn::assistant(bubbles, Vec::new()).unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

async fn collapse_races_timers(config: ChaosConfig) {
    let mut set = JoinSet::new();

    for i in 0..config.concurrency {
        let timers = config.timers_per_scope;
        set.spawn(async move {
            let scope = CancellationScope::new();
            let fired_after_collapse = Arc::new(AtomicBool::new(false));

            for _ in 0..timers {
                let probe = scope.clone();
                let flag = Arc::clone(&fired_after_collapse);
                scope.schedule(
                    move || {
                        if probe.is_collapsed() {
                            flag.store(true, Ordering::SeqCst);
                        }
                    },
                    Duration::from_micros((i % 7) as u64 * 100),
                );
            }

            tokio::time::sleep(Duration::from_micros((i % 5) as u64 * 150)).await;
            scope.collapse();
            tokio::time::sleep(Duration::from_millis(5)).await;

            assert_eq!(scope.pending(), 0, "armed timers must be cleared by collapse");
            !fired_after_collapse.load(Ordering::SeqCst)
        });
    }

    while let Some(result) = set.join_next().await {
        assert!(result.unwrap(), "callback observed its own scope collapsed");
    }
}

async fn parent_collapse_races_children(config: ChaosConfig) {
    let parent = CancellationScope::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let mut set = JoinSet::new();

    for _ in 0..config.concurrency {
        let parent = parent.clone();
        let fired = Arc::clone(&fired);
        set.spawn(async move {
            let child = parent.child();
            child.schedule(
                move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                },
                Duration::from_millis(50),
            );
            child
        });
    }

    tokio::time::sleep(Duration::from_millis(1)).await;
    parent.collapse();

    let mut children = Vec::new();
    while let Some(child) = set.join_next().await {
        children.push(child.unwrap());
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(children.iter().all(CancellationScope::is_collapsed));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

async fn deliveries_cancelled_at_random_points(config: ChaosConfig) {
    let mut set = JoinSet::new();

    for i in 0..config.concurrency {
        set.spawn(async move {
            let scope = CancellationScope::new();
            let sink = GuardedSink::new();
            *sink.scope.lock() = Some(scope.clone());

            let handle = deliver(&long_turn(20), scope, sink.clone());
            tokio::time::sleep(Duration::from_micros((i % 11) as u64 * 700)).await;
            handle.cancel();

            let outcome = handle.finished().await;
            let revealed = sink.revealed.load(Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;

            assert!(!sink.violation.load(Ordering::SeqCst));
            assert_eq!(
                sink.revealed.load(Ordering::SeqCst),
                revealed,
                "no reveal may happen after cancellation is observed"
            );
            if outcome == DeliveryOutcome::Completed {
                assert_eq!(revealed, 20);
            }
        });
    }

    while let Some(result) = set.join_next().await {
        result.unwrap();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chaos_collapse_races_timers() {
    collapse_races_timers(ChaosConfig::default()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chaos_parent_collapse_races_children() {
    parent_collapse_races_children(ChaosConfig::default()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chaos_deliveries_cancelled_at_random_points() {
    deliveries_cancelled_at_random_points(ChaosConfig::default()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[ignore = "long-running stress variant"]
async fn chaos_stress_all_scenarios() {
    collapse_races_timers(ChaosConfig::stress()).await;
    parent_collapse_races_children(ChaosConfig::stress()).await;
    deliveries_cancelled_at_random_points(ChaosConfig::stress()).await;
}
