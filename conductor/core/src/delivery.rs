//! Bubble Delivery
//!
//! Reveals the bubbles of one turn over time. Each bubble is armed as a timer
//! in the turn's [`CancellationScope`]; the reveal callback reports the bubble
//! to the [`DeliverySink`] and arms the next one. Collapsing the scope stops
//! the chain wherever it is: bubbles already revealed stay revealed, which is
//! a normal terminal state rather than an error.

use std::sync::Arc;

use tokio::sync::watch;

use crate::messages::{MediaRef, TurnId};
use crate::scope::CancellationScope;
use crate::turn::{Bubble, Turn};

/// A bubble at the moment it becomes visible
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealedBubble {
    /// Turn the bubble belongs to
    pub turn_id: TurnId,
    /// Position within the turn
    pub index: usize,
    /// The bubble itself
    pub bubble: Bubble,
    /// Media shown with this bubble; always empty past index 0
    pub media: Vec<MediaRef>,
}

/// Receiver of delivery progress
///
/// Called synchronously from the reveal timer, many times per turn.
pub trait DeliverySink: Send + Sync {
    /// A bubble became visible
    fn bubble_revealed(&self, bubble: &RevealedBubble);

    /// The "persona is typing" indicator should be shown or hidden
    ///
    /// Raised only ahead of bubbles with a non-zero delay, and cleared
    /// immediately before that bubble is revealed or once the delivery is
    /// cancelled while waiting on it.
    fn composing(&self, _turn_id: &TurnId, _active: bool) {}

    /// Every bubble of the turn has been revealed
    fn all_delivered(&self, _turn_id: &TurnId, _bubble_count: usize) {}
}

/// How a delivery ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every bubble was revealed
    Completed,
    /// The scope collapsed first; earlier bubbles stay revealed
    Cancelled,
}

/// Handle to an in-progress delivery
#[derive(Debug)]
pub struct DeliveryHandle {
    turn_id: TurnId,
    scope: CancellationScope,
    completed: watch::Receiver<bool>,
}

impl DeliveryHandle {
    /// Turn being delivered
    #[must_use]
    pub fn turn_id(&self) -> &TurnId {
        &self.turn_id
    }

    /// Stop revealing further bubbles
    ///
    /// Collapses the delivery's scope. Repeating it, or calling it after the
    /// delivery completed, changes nothing.
    pub fn cancel(&self) {
        self.scope.collapse();
    }

    /// Outcome so far, without waiting
    #[must_use]
    pub fn outcome(&self) -> Option<DeliveryOutcome> {
        if *self.completed.borrow() {
            Some(DeliveryOutcome::Completed)
        } else if self.scope.is_collapsed() {
            Some(DeliveryOutcome::Cancelled)
        } else {
            None
        }
    }

    /// Wait until the delivery completes or is cancelled
    pub async fn finished(&self) -> DeliveryOutcome {
        let mut completed = self.completed.clone();
        tokio::select! {
            biased;
            done = completed.wait_for(|done| *done) => {
                // A closed channel without completion means the chain was dropped
                if done.is_ok() {
                    DeliveryOutcome::Completed
                } else {
                    DeliveryOutcome::Cancelled
                }
            }
            () = self.scope.collapsed() => {
                if *self.completed.borrow() {
                    DeliveryOutcome::Completed
                } else {
                    DeliveryOutcome::Cancelled
                }
            }
        }
    }
}

struct DeliveryRun {
    turn_id: TurnId,
    bubbles: Vec<Bubble>,
    media: Vec<MediaRef>,
    scope: CancellationScope,
    sink: Arc<dyn DeliverySink>,
    completed: watch::Sender<bool>,
}

/// Reveal `turn`'s bubbles one at a time inside `scope`
///
/// The first bubble is revealed on the next scheduler tick (its delay is
/// zero); each later one after its own `reveal_delay`. Media rides on the
/// first bubble only.
pub fn deliver(
    turn: &Turn,
    scope: CancellationScope,
    sink: Arc<dyn DeliverySink>,
) -> DeliveryHandle {
    let (completed, completed_rx) = watch::channel(false);
    let handle = DeliveryHandle {
        turn_id: turn.id.clone(),
        scope: scope.clone(),
        completed: completed_rx,
    };

    tracing::debug!(
        turn = %turn.id,
        bubbles = turn.bubbles.len(),
        media = turn.media.len(),
        "Starting delivery"
    );

    let run = Arc::new(DeliveryRun {
        turn_id: turn.id.clone(),
        bubbles: turn.bubbles.clone(),
        media: turn.media.clone(),
        scope,
        sink,
        completed,
    });
    arm_step(run, 0);

    handle
}

fn arm_step(run: Arc<DeliveryRun>, index: usize) {
    if index >= run.bubbles.len() {
        run.finish();
        return;
    }

    let delay = run.bubbles[index].reveal_delay;
    if run.scope.is_collapsed() {
        tracing::debug!(turn = %run.turn_id, revealed = index, "Delivery cancelled");
        return;
    }
    if !delay.is_zero() {
        run.sink.composing(&run.turn_id, true);
    }

    let step = PendingReveal {
        run: Arc::clone(&run),
        index,
        composing: !delay.is_zero(),
    };
    if run.scope.schedule(move || step.fire(), delay).is_none() {
        tracing::debug!(turn = %run.turn_id, revealed = index, "Delivery cancelled");
    }
}

/// A reveal waiting on its timer
///
/// Dropped without firing when the scope collapses, which lowers any
/// composing indicator it raised.
struct PendingReveal {
    run: Arc<DeliveryRun>,
    index: usize,
    composing: bool,
}

impl PendingReveal {
    fn fire(mut self) {
        let run = Arc::clone(&self.run);
        if std::mem::take(&mut self.composing) {
            run.sink.composing(&run.turn_id, false);
        }
        run.reveal(self.index);
    }
}

impl Drop for PendingReveal {
    fn drop(&mut self) {
        if self.composing {
            tracing::debug!(turn = %self.run.turn_id, revealed = self.index, "Delivery cancelled");
            self.run.sink.composing(&self.run.turn_id, false);
        }
    }
}

impl DeliveryRun {
    fn reveal(self: Arc<Self>, index: usize) {
        let bubble = self.bubbles[index].clone();
        let media = if index == 0 {
            self.media.clone()
        } else {
            Vec::new()
        };
        self.sink.bubble_revealed(&RevealedBubble {
            turn_id: self.turn_id.clone(),
            index,
            bubble,
            media,
        });

        arm_step(self, index + 1);
    }

    fn finish(&self) {
        self.completed.send_replace(true);
        self.sink.all_delivered(&self.turn_id, self.bubbles.len());
        tracing::debug!(turn = %self.turn_id, bubbles = self.bubbles.len(), "Delivery complete");
    }
}
