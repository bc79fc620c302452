//! Broadcast channel for tanda domain events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The services
//! publish a [`TandaEvent`] after every state mutation; an embedding
//! layer subscribes once per consumer and filters by tanda id.

use tokio::sync::broadcast;

use super::TandaEvent;

/// Broadcast bus for [`TandaEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest events are dropped for
/// lagging receivers; publication never blocks a settlement.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TandaEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: TandaEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TandaEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
