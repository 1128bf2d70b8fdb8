//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the central publish/subscribe hub for job and queue
//! events. It is designed to be shared via `Arc<EventBus>` across the
//! application. Publishing never blocks job progress: when a subscriber's
//! buffer fills, its oldest un-consumed events drop and the receiver
//! observes a `Lagged` error; terminal job events reach clients because the
//! WebSocket relay drains the channel continuously.

use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// The job-status payload pushed to clients on every lifecycle change and
/// animator tick. Optional fields are only present on completion / failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobStatusPayload {
    pub status: String,
    pub progress: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_width: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_height: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduction_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Worker-pool gauge readings: `active` is the currently executing count,
/// `pending` the admitted-but-not-started count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatusPayload {
    pub concurrency: usize,
    pub active: usize,
    pub pending: usize,
}

/// An event published on the bus.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job changed status or progress.
    Job {
        job_id: String,
        data: JobStatusPayload,
    },
    /// The worker pool gauges changed.
    Queue(QueueStatusPayload),
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`Event`].
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// clients reconcile over REST after (re)connecting.
    pub fn publish(&self, event: Event) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Publish a job status change.
    pub fn publish_job(&self, job_id: impl Into<String>, data: JobStatusPayload) {
        self.publish(Event::Job {
            job_id: job_id.into(),
            data,
        });
    }

    /// Publish a queue gauge update.
    pub fn publish_queue(&self, data: QueueStatusPayload) {
        self.publish(Event::Queue(data));
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(status: &str, progress: i64) -> JobStatusPayload {
        JobStatusPayload {
            status: status.to_string(),
            progress,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn publish_and_receive_job_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish_job("job-1", payload("processing", 40));

        match rx.recv().await.expect("should receive the event") {
            Event::Job { job_id, data } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(data.status, "processing");
                assert_eq!(data.progress, 40);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish_queue(QueueStatusPayload {
            concurrency: 2,
            active: 1,
            pending: 4,
        });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.expect("subscriber should receive") {
                Event::Queue(data) => {
                    assert_eq!(data.concurrency, 2);
                    assert_eq!(data.active, 1);
                    assert_eq!(data.pending, 4);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish_job("orphan", payload("queued", 0));
    }

    #[test]
    fn job_payload_omits_absent_optional_fields() {
        let json = serde_json::to_value(payload("queued", 0)).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["progress"], 0);
        assert!(json.get("compressed_size").is_none());
        assert!(json.get("error_message").is_none());
    }

    #[test]
    fn job_payload_serializes_completion_fields() {
        let data = JobStatusPayload {
            status: "completed".to_string(),
            progress: 100,
            compressed_size: Some(500_000),
            compressed_width: Some(640),
            compressed_height: Some(480),
            reduction_percent: Some(75.0),
            error_message: None,
        };
        let json = serde_json::to_value(data).unwrap();
        assert_eq!(json["compressed_size"], 500_000);
        assert_eq!(json["reduction_percent"], 75.0);
    }
}
