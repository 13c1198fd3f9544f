// src/events.rs
//
// The ordered event stream delivered to the session's single observer.
// One producer (the orchestrator), one consumer, bounded queue: the
// producer awaits on a full queue instead of buffering or dropping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::activity::{ActivityItem, ActivityKind, ActivityStatus};
use crate::session::SessionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResearchEvent {
    /// Exactly once, always first.
    #[serde(rename = "progress-init")]
    ProgressInit { estimated_total_steps: u32 },

    /// Monotonically non-decreasing depth values.
    #[serde(rename = "depth-delta")]
    DepthDelta { depth: u32 },

    /// Pending first, then the resolving complete/error for the same step.
    #[serde(rename = "activity-delta")]
    ActivityDelta {
        kind: ActivityKind,
        status: ActivityStatus,
        message: String,
        depth: u32,
        timestamp: DateTime<Utc>,
    },

    /// At most once per unique canonical source, emitted when the source's
    /// content has been successfully extracted.
    #[serde(rename = "source-delta")]
    SourceDelta { url: String, title: String },

    /// Zero or more, only during synthesis.
    #[serde(rename = "text-delta")]
    TextDelta { fragment: String },

    /// Exactly once, always last, terminal.
    #[serde(rename = "finish")]
    Finish {
        report: String,
        status: SessionStatus,
        elapsed_ms: u64,
        iterations: u32,
        source_count: usize,
    },
}

impl From<ActivityItem> for ResearchEvent {
    fn from(item: ActivityItem) -> Self {
        ResearchEvent::ActivityDelta {
            kind: item.kind,
            status: item.status,
            message: item.message,
            depth: item.depth,
            timestamp: item.timestamp,
        }
    }
}

/// Producer half of the event stream.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ResearchEvent>,
}

impl EventSink {
    /// Deliver one event, suspending if the consumer has fallen behind.
    /// A closed receiver means the observer went away; events are then
    /// discarded silently since the session still has to run to DONE.
    pub async fn emit(&self, event: ResearchEvent) {
        let _ = self.tx.send(event).await;
    }
}

/// Build the bounded producer/consumer pair for one session.
pub fn event_channel(capacity: usize) -> (EventSink, ReceiverStream<ResearchEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx }, ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_events_preserve_emission_order() {
        let (sink, mut stream) = event_channel(8);
        sink.emit(ResearchEvent::ProgressInit { estimated_total_steps: 10 }).await;
        sink.emit(ResearchEvent::DepthDelta { depth: 1 }).await;
        drop(sink);

        assert!(matches!(
            stream.next().await,
            Some(ResearchEvent::ProgressInit { estimated_total_steps: 10 })
        ));
        assert!(matches!(stream.next().await, Some(ResearchEvent::DepthDelta { depth: 1 })));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_emit_survives_dropped_consumer() {
        let (sink, stream) = event_channel(1);
        drop(stream);
        // Must not hang or panic
        sink.emit(ResearchEvent::DepthDelta { depth: 0 }).await;
    }

    #[test]
    fn test_wire_format_tags() {
        let event = ResearchEvent::SourceDelta {
            url: "https://example.com".into(),
            title: "Example".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "source-delta");

        let event = ResearchEvent::Finish {
            report: "done".into(),
            status: SessionStatus::Completed,
            elapsed_ms: 1200,
            iterations: 2,
            source_count: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "finish");
        assert_eq!(json["iterations"], 2);
        assert_eq!(json["status"], "completed");
    }
}
