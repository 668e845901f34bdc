//! Container events and the deferred event bus.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// Outcome of a create reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The server made a brand-new resource.
    Created,
    /// An existing distinct resource was returned; the requested
    /// metadata matches the server's.
    Found,
    /// An existing distinct resource was returned, but the requested
    /// metadata differs from the server's.
    FoundWithMismatch,
}

/// A notification emitted by a container or the sync engine.
///
/// Events are enqueued during a synchronous unit of work and reach
/// subscribers only when the host flushes the bus, so listeners never
/// run inside the mutation that triggered them.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerEvent {
    /// A network request was issued for the given correlation id.
    RequestStarted {
        /// Request type derived from the resource kind.
        request_type: String,
        /// Correlation id (the container id at issue time).
        correlation_id: String,
    },
    /// The paired completion for a [`ContainerEvent::RequestStarted`].
    ///
    /// Fires even when the request failed, closing out any latency
    /// tracking keyed on the correlation id.
    RequestEnded {
        /// Request type derived from the resource kind.
        request_type: String,
        /// Correlation id (the container id at issue time).
        correlation_id: String,
    },
    /// A tracked property changed value.
    PropertyChanged {
        /// Id of the container at the time the change was recorded.
        container_id: String,
        /// Scoped property name (`"id"`, `"url"`, `"metadata.colors"`, ...).
        property: String,
        /// Previous value, if any.
        old_value: Option<serde_json::Value>,
        /// New value, if any.
        new_value: Option<serde_json::Value>,
    },
    /// Creation reconciled successfully (including conflict recovery).
    Sent {
        /// Id of the container (post-remap).
        container_id: String,
        /// How the server resolved the create.
        outcome: CreateOutcome,
    },
    /// Creation failed terminally; the container has been destroyed.
    SendFailed {
        /// Id of the container at failure time.
        container_id: String,
        /// Error payload from the server result.
        error: serde_json::Value,
    },
    /// A server-pushed patch changed the metadata tree.
    MetadataChanged {
        /// Id of the container.
        container_id: String,
        /// Raw dotted paths from the push event.
        paths: Vec<String>,
        /// Metadata tree before the patch.
        old_value: serde_json::Value,
        /// Metadata tree after the patch.
        new_value: serde_json::Value,
    },
    /// The container was torn down.
    Destroyed {
        /// Id of the container at teardown.
        container_id: String,
    },
}

/// Deferred, ordered event dispatch.
///
/// Subscribers register `mpsc` receivers; emission is two-phase. Events
/// are enqueued into a pending FIFO (consecutive duplicates dropped) and
/// delivered only when the host calls [`EventBus::flush`] after the
/// current synchronous call stack unwinds. Relative FIFO order among
/// events queued by the same unit of work is preserved.
pub struct EventBus {
    /// Subscribers (senders). Disconnected ones are dropped on flush.
    subscribers: RwLock<Vec<Sender<ContainerEvent>>>,
    /// Events awaiting the next flush.
    pending: Mutex<VecDeque<ContainerEvent>>,
}

impl EventBus {
    /// Creates a new event bus.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Subscribes to the bus.
    ///
    /// The receiver gets every event flushed after this call.
    pub fn subscribe(&self) -> Receiver<ContainerEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Enqueues an event for the next flush.
    ///
    /// A duplicate of the most recently enqueued event is dropped, so
    /// idempotent echoes never reach subscribers twice in a row.
    pub fn enqueue(&self, event: ContainerEvent) {
        let mut pending = self.pending.lock();
        if pending.back() == Some(&event) {
            return;
        }
        pending.push_back(event);
    }

    /// Delivers every pending event to every subscriber, in FIFO order.
    ///
    /// Called by the host after the synchronous unit of work that
    /// enqueued the events. Returns the number of events delivered.
    pub fn flush(&self) -> usize {
        let drained: Vec<ContainerEvent> = {
            let mut pending = self.pending.lock();
            pending.drain(..).collect()
        };

        if drained.is_empty() {
            return 0;
        }

        let mut subscribers = self.subscribers.write();
        for event in &drained {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
        drained.len()
    }

    /// Returns the number of events awaiting flush.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destroyed(id: &str) -> ContainerEvent {
        ContainerEvent::Destroyed {
            container_id: id.into(),
        }
    }

    #[test]
    fn nothing_delivered_before_flush() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        bus.enqueue(destroyed("c1"));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.pending_len(), 1);

        assert_eq!(bus.flush(), 1);
        assert_eq!(rx.try_recv().unwrap(), destroyed("c1"));
    }

    #[test]
    fn flush_preserves_fifo_order() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        bus.enqueue(destroyed("a"));
        bus.enqueue(destroyed("b"));
        bus.enqueue(destroyed("c"));
        bus.flush();

        let received: Vec<ContainerEvent> = rx.try_iter().collect();
        assert_eq!(received, vec![destroyed("a"), destroyed("b"), destroyed("c")]);
    }

    #[test]
    fn consecutive_duplicates_are_dropped() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        bus.enqueue(destroyed("a"));
        bus.enqueue(destroyed("a"));
        bus.enqueue(destroyed("b"));
        bus.enqueue(destroyed("a"));
        assert_eq!(bus.flush(), 3);

        let received: Vec<ContainerEvent> = rx.try_iter().collect();
        assert_eq!(received, vec![destroyed("a"), destroyed("b"), destroyed("a")]);
    }

    #[test]
    fn multiple_subscribers_all_receive() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.enqueue(destroyed("a"));
        bus.flush();

        assert_eq!(rx1.try_recv().unwrap(), destroyed("a"));
        assert_eq!(rx2.try_recv().unwrap(), destroyed("a"));
    }

    #[test]
    fn disconnected_subscribers_are_cleaned_up() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(rx);
        bus.enqueue(destroyed("a"));
        bus.flush();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn flush_of_empty_queue_is_zero() {
        let bus = EventBus::new();
        assert_eq!(bus.flush(), 0);
    }
}
