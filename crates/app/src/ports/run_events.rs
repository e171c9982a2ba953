//! Run-event port: where the engine reports what it is doing.

use std::future::Future;

use tapflow_domain::event::RunEvent;

/// Receives every [`RunEvent`] of a run, in order.
///
/// Publishing never fails; a sink with nobody listening drops the event.
pub trait RunEventSink: Send + Sync {
    fn publish(&self, event: RunEvent) -> impl Future<Output = ()> + Send;
}

impl<T: RunEventSink> RunEventSink for std::sync::Arc<T> {
    fn publish(&self, event: RunEvent) -> impl Future<Output = ()> + Send {
        (**self).publish(event)
    }
}
