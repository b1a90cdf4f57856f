use crate::error::Result;

/// Observer attached to an [`crate::events::EventBus`].
///
/// Listeners run synchronously on the emitting task and should return
/// quickly. An error is logged by the bus and never reaches the emitter.
pub trait EventListener<E>: Send + Sync {
    fn on_event(&self, event: &E) -> Result<()>;

    /// Whether the listener can no longer receive events and may be dropped.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<E, F> EventListener<E> for F
where
    F: Fn(&E) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &E) -> Result<()> {
        self(event)
    }
}
