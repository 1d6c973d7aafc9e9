//! Hold-ready notifications emitted after a reservation is fulfilled
//!
//! Delivery is fire-and-forget: a failed or lagging subscriber never affects
//! the transaction that produced the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// A borrower at the head of a queue can now collect a copy of the title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldReady {
    pub reservation_id: i32,
    pub borrower_id: i32,
    pub title_id: i32,
    pub fulfilled_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn hold_ready(&self, event: HoldReady);
}

/// Fans events out to every current subscriber
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<HoldReady>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> BroadcastStream<HoldReady> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn hold_ready(&self, event: HoldReady) {
        tracing::debug!(
            "Hold ready for borrower {} on title {}",
            event.borrower_id,
            event.title_id
        );
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}
