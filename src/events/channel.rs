//! Event channel implementation using crossbeam-channel.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::Event;

/// Sends events from the organizer.
///
/// Cheap to clone and safe to share with rayon workers. A disabled sender
/// drops every event without allocating a channel.
#[derive(Clone, Default)]
pub struct EventSender {
    inner: Option<Sender<Event>>,
}

impl EventSender {
    /// Wrap a raw crossbeam sender
    pub fn new(sender: Sender<Event>) -> Self {
        Self {
            inner: Some(sender),
        }
    }

    /// A sender for callers that do not want progress reporting
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Send an event. A dropped receiver is not an error: progress
    /// reporting is always optional.
    pub fn send(&self, event: Event) {
        if let Some(sender) = &self.inner {
            let _ = sender.send(event);
        }
    }
}

/// Receives events from the organizer
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Block until the next event, `None` once every sender is gone
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Iterate until every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// Factory for connected sender/receiver pairs
pub struct EventChannel;

impl EventChannel {
    /// Create an unbounded event channel
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (EventSender::new(sender), EventReceiver { inner: receiver })
    }

    /// Create a bounded channel; senders block when a slow UI falls behind
    pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
        let (sender, receiver) = bounded(capacity);
        (EventSender::new(sender), EventReceiver { inner: receiver })
    }
}
