use crate::event::{DomainEvent, Event};

/// The one capability domain code gets for announcing facts.
///
/// Recording buffers the event in the current unit of work and cannot fail;
/// nothing is durable until that unit of work commits, and nothing leaks if
/// it rolls back.
pub trait EventSink {
    fn record(&mut self, event: DomainEvent);
}

/// Scoped event buffer, one per unit of work.
///
/// Each recorded domain event is stamped into an [`Event`] envelope (id,
/// timestamp) at record time. Dropping the listener discards the buffer,
/// which is exactly the rollback behavior: an event survives if and only if
/// the state change that produced it does.
#[derive(Default)]
pub struct OutboxListener {
    buffered: Vec<Event>,
}

impl OutboxListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, in order.
    pub fn recorded(&self) -> &[Event] {
        &self.buffered
    }

    pub fn len(&self) -> usize {
        self.buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }

    pub(crate) fn into_events(self) -> Vec<Event> {
        self.buffered
    }
}

impl EventSink for OutboxListener {
    fn record(&mut self, event: DomainEvent) {
        self.buffered.push(Event::new(&event));
    }
}
