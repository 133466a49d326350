//! Event sinks for lifecycle notifications.
//!
//! The manager only knows the [`Notifier`] trait. Emission is
//! fire-and-forget: a sink must not block and cannot fail the caller.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use jobgrid_core::JobEvent;

/// Receives lifecycle events.
pub trait Notifier: Send + Sync {
    fn emit(&self, event: JobEvent);
}

/// Logs every event at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn emit(&self, event: JobEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!(event = event.name(), job_id = event.job_id().unwrap_or("-"), %payload, "job event");
    }
}

/// Fans events out to any number of in-process subscribers.
///
/// Slow subscribers lag and lose the oldest events; emitting with no
/// subscribers drops the event.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<JobEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn emit(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }
}

/// Forwards each event to every inner notifier, in order.
#[derive(Default, Clone)]
pub struct CompositeNotifier {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl CompositeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Notifier for CompositeNotifier {
    fn emit(&self, event: JobEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

/// Collects events in memory. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: std::sync::Mutex<Vec<JobEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Event names for one job, in emission order.
    pub fn names_for(&self, job_id: &str) -> Vec<&'static str> {
        self.events()
            .iter()
            .filter(|e| e.job_id() == Some(job_id))
            .map(JobEvent::name)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn emit(&self, event: JobEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(id: &str) -> JobEvent {
        JobEvent::JobQueued {
            job_id: id.to_string(),
            priority: 0,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        notifier.emit(queued("a"));
        assert_eq!(rx.recv().await.unwrap(), queued("a"));
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        BroadcastNotifier::default().emit(queued("a"));
    }

    #[test]
    fn composite_forwards_to_all() {
        let a = Arc::new(RecordingNotifier::new());
        let b = Arc::new(RecordingNotifier::new());
        let composite = CompositeNotifier::new()
            .with(a.clone())
            .with(Arc::new(TracingNotifier))
            .with(b.clone());
        composite.emit(queued("x"));
        composite.emit(queued("y"));
        assert_eq!(a.events().len(), 2);
        assert_eq!(b.names_for("y"), vec!["job_queued"]);
    }

    #[test]
    fn empty_composite_drops_events() {
        CompositeNotifier::new().emit(queued("a"));
    }
}
