//! Synchronization event bus
//!
//! Broadcasts request lifecycle events so status indicators can react.
//! Begin/finish pairing is structural: [`SyncNotifier::begin_request`]
//! returns a guard whose drop emits the matching finish, and batch events
//! fire exactly when the in-flight counter crosses zero.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

/// Buffer size for the event broadcast channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// Events emitted around remote service requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A request is about to be sent.
    BeginRequest,
    /// The first request of a batch is about to be sent; not emitted again
    /// until all in-flight requests have finished.
    BeginBatch,
    /// A request finished (successfully or not).
    FinishRequest,
    /// The last in-flight request finished.
    FinishBatch,
    /// A request succeeded.
    RequestSucceeded,
    /// A request failed.
    RequestFailed {
        /// Human-readable failure description.
        message: String,
    },
}

/// Event fan-out with an in-flight request counter.
#[derive(Clone)]
pub struct SyncNotifier {
    tx: broadcast::Sender<SyncEvent>,
    in_flight: Arc<Mutex<usize>>,
}

impl SyncNotifier {
    /// Create a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            tx,
            in_flight: Arc::new(Mutex::new(0)),
        }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Announce a request and return the guard that announces its end.
    ///
    /// Emits `BeginRequest`, and `BeginBatch` when no other request is in
    /// flight.
    pub fn begin_request(&self) -> RequestGuard {
        let mut count = self.lock_count();
        let _ = self.tx.send(SyncEvent::BeginRequest);
        if *count == 0 {
            let _ = self.tx.send(SyncEvent::BeginBatch);
        }
        *count += 1;
        drop(count);

        RequestGuard {
            notifier: self.clone(),
        }
    }

    /// Open a batch spanning several requests, e.g. one reconciliation pass.
    ///
    /// While the returned guard lives, the in-flight counter never drops to
    /// zero, so the individual requests of the pass share a single
    /// `BeginBatch`/`FinishBatch` pair.
    pub fn begin_batch(&self) -> BatchGuard {
        let mut count = self.lock_count();
        if *count == 0 {
            let _ = self.tx.send(SyncEvent::BeginBatch);
        }
        *count += 1;
        drop(count);

        BatchGuard {
            notifier: self.clone(),
        }
    }

    fn leave_batch(&self) {
        let mut count = self.lock_count();
        *count = count.saturating_sub(1);
        if *count == 0 {
            let _ = self.tx.send(SyncEvent::FinishBatch);
        }
    }

    fn finish_request(&self) {
        let mut count = self.lock_count();
        let _ = self.tx.send(SyncEvent::FinishRequest);
        *count = count.saturating_sub(1);
        if *count == 0 {
            let _ = self.tx.send(SyncEvent::FinishBatch);
        }
    }

    fn lock_count(&self) -> std::sync::MutexGuard<'_, usize> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SyncNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for one in-flight request.
///
/// Dropping the guard emits `FinishRequest` (and `FinishBatch` when it was
/// the last one). Use [`RequestGuard::succeeded`] or
/// [`RequestGuard::failed`] to also report the outcome.
pub struct RequestGuard {
    notifier: SyncNotifier,
}

impl RequestGuard {
    /// Finish the request and report success.
    pub fn succeeded(self) {
        let notifier = self.notifier.clone();
        drop(self);
        let _ = notifier.tx.send(SyncEvent::RequestSucceeded);
    }

    /// Finish the request and report failure with a message.
    pub fn failed(self, message: impl Into<String>) {
        let notifier = self.notifier.clone();
        drop(self);
        let _ = notifier.tx.send(SyncEvent::RequestFailed {
            message: message.into(),
        });
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.notifier.finish_request();
    }
}

/// Guard for a batch of requests; see [`SyncNotifier::begin_batch`].
pub struct BatchGuard {
    notifier: SyncNotifier,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.notifier.leave_batch();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn single_request_pairs_begin_and_finish() {
        let notifier = SyncNotifier::new();
        let mut rx = notifier.subscribe();

        let guard = notifier.begin_request();
        guard.succeeded();

        assert_eq!(
            drain(&mut rx),
            vec![
                SyncEvent::BeginRequest,
                SyncEvent::BeginBatch,
                SyncEvent::FinishRequest,
                SyncEvent::FinishBatch,
                SyncEvent::RequestSucceeded,
            ]
        );
    }

    #[test]
    fn overlapping_requests_emit_one_batch() {
        let notifier = SyncNotifier::new();
        let mut rx = notifier.subscribe();

        let first = notifier.begin_request();
        let second = notifier.begin_request();
        drop(first);
        drop(second);

        let events = drain(&mut rx);
        let batch_begins = events
            .iter()
            .filter(|event| **event == SyncEvent::BeginBatch)
            .count();
        let batch_finishes = events
            .iter()
            .filter(|event| **event == SyncEvent::FinishBatch)
            .count();
        assert_eq!(batch_begins, 1);
        assert_eq!(batch_finishes, 1);
        assert_eq!(events.last(), Some(&SyncEvent::FinishBatch));
    }

    #[test]
    fn sequential_batches_each_announce() {
        let notifier = SyncNotifier::new();
        let mut rx = notifier.subscribe();

        drop(notifier.begin_request());
        drop(notifier.begin_request());

        let events = drain(&mut rx);
        let batch_begins = events
            .iter()
            .filter(|event| **event == SyncEvent::BeginBatch)
            .count();
        assert_eq!(batch_begins, 2);
    }

    #[test]
    fn batch_guard_spans_several_requests() {
        let notifier = SyncNotifier::new();
        let mut rx = notifier.subscribe();

        let batch = notifier.begin_batch();
        drop(notifier.begin_request());
        drop(notifier.begin_request());
        drop(batch);

        let events = drain(&mut rx);
        let batch_begins = events
            .iter()
            .filter(|event| **event == SyncEvent::BeginBatch)
            .count();
        let batch_finishes = events
            .iter()
            .filter(|event| **event == SyncEvent::FinishBatch)
            .count();
        assert_eq!(batch_begins, 1);
        assert_eq!(batch_finishes, 1);
        assert_eq!(events.last(), Some(&SyncEvent::FinishBatch));
    }

    #[test]
    fn failure_carries_message() {
        let notifier = SyncNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.begin_request().failed("server unreachable");

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&SyncEvent::RequestFailed {
                message: "server unreachable".to_string()
            })
        );
    }
}
