//! Observable lifecycle events emitted by the click engine.

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use crate::error::InjectionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Started,
    Stopped,
    ClickCountChanged(u64),
    InjectionFailed(InjectionError),
}

/// Consumer of [`StatusEvent`]s.
///
/// Called from background click threads; implementations must not block.
pub trait StatusSink: Send + Sync + 'static {
    fn emit(&self, event: StatusEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn emit(&self, _event: StatusEvent) {}
}

impl StatusSink for UnboundedSender<StatusEvent> {
    fn emit(&self, event: StatusEvent) {
        // A closed receiver means nobody is listening anymore.
        if let Err(e) = self.send(event) {
            trace!(event = ?e.0, "status receiver dropped");
        }
    }
}
