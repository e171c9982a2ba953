//! In-process run-event bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use tapflow_domain::event::RunEvent;

use crate::ports::RunEventSink;

/// In-process run-event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped). A subscriber that falls more than
/// `capacity` events behind loses the oldest ones.
pub struct InProcessRunEventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl InProcessRunEventBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl RunEventSink for InProcessRunEventBus {
    fn publish(&self, event: RunEvent) -> impl Future<Output = ()> + Send {
        // Fails only when there are zero receivers.
        let _ = self.sender.send(event);
        async {}
    }
}
