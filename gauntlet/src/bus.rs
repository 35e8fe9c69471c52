//! Per-run publish/subscribe of progress events.
//!
//! One bounded mailbox per subscriber. Publishing never blocks and never
//! fails the publisher: a full mailbox drops that subscriber's copy of the
//! event, a closed one detaches the subscriber. Nothing is buffered for late
//! subscribers; they get a synthetic `run_status` echo on attach and live
//! events from then on.

use dashmap::DashMap;
use run_event::RunEvent;
use tokio::sync::mpsc;

/// Bounded mailbox size per subscriber. Prevents unbounded memory growth when
/// an SSE client cannot keep up with a fast model.
pub const SUBSCRIBER_MAILBOX_CAPACITY: usize = 128;

#[derive(Default)]
pub struct EventBus {
    topics: DashMap<String, Vec<mpsc::Sender<RunEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a subscriber to a run. The first event in the mailbox is a
    /// synthetic `run_status` echo of `current_status`.
    pub fn subscribe(&self, run_id: &str, current_status: &str) -> mpsc::Receiver<RunEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_MAILBOX_CAPACITY);
        let _ = tx.try_send(RunEvent::RunStatus {
            run_id: run_id.to_string(),
            status: current_status.to_string(),
        });
        self.topics.entry(run_id.to_string()).or_default().push(tx);
        rx
    }

    /// Best-effort fan-out to every subscriber of the event's run.
    pub fn publish(&self, event: RunEvent) {
        let Some(mut senders) = self.topics.get_mut(event.run_id()) else {
            return;
        };
        senders.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    run_id = event.run_id(),
                    "subscriber mailbox full, dropping event"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Detaches all subscribers of a run. Their receivers end once drained.
    pub fn remove_run(&self, run_id: &str) {
        self.topics.remove(run_id);
    }

    pub fn subscriber_count(&self, run_id: &str) -> usize {
        self.topics.get(run_id).map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(run_id: &str, status: &str) -> RunEvent {
        RunEvent::RunStatus {
            run_id: run_id.to_string(),
            status: status.to_string(),
        }
    }

    #[tokio::test]
    async fn subscriber_sees_echo_then_live_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("r1", "queued");
        bus.publish(status_event("r1", "running"));

        match rx.recv().await.unwrap() {
            RunEvent::RunStatus { status, .. } => assert_eq!(status, "queued"),
            other => panic!("expected echo, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            RunEvent::RunStatus { status, .. } => assert_eq!(status, "running"),
            other => panic!("expected live event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_every_subscriber_and_isolates_runs() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("r1", "running");
        let mut b = bus.subscribe("r1", "running");
        let mut other = bus.subscribe("r2", "running");

        bus.publish(status_event("r1", "completed"));

        let _ = a.recv().await; // echo
        let _ = b.recv().await;
        assert!(matches!(
            a.recv().await.unwrap(),
            RunEvent::RunStatus { status, .. } if status == "completed"
        ));
        assert!(matches!(
            b.recv().await.unwrap(),
            RunEvent::RunStatus { status, .. } if status == "completed"
        ));
        let _ = other.recv().await; // echo only
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned_and_full_mailboxes_drop() {
        let bus = EventBus::new();
        let rx = bus.subscribe("r1", "running");
        drop(rx);
        bus.publish(status_event("r1", "completed"));
        assert_eq!(bus.subscriber_count("r1"), 0);

        let mut rx = bus.subscribe("r1", "running");
        // overrun the mailbox; publishing must not block or error
        for _ in 0..(SUBSCRIBER_MAILBOX_CAPACITY * 2) {
            bus.publish(status_event("r1", "running"));
        }
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_MAILBOX_CAPACITY);
        assert_eq!(bus.subscriber_count("r1"), 1);
    }

    #[tokio::test]
    async fn remove_run_ends_subscriber_streams() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("r1", "completed");
        bus.remove_run("r1");
        let _ = rx.recv().await; // echo
        assert!(rx.recv().await.is_none());
    }
}
