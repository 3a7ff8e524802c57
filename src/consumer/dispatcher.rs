use std::collections::HashMap;

use crate::error::HandlerError;
use crate::event::Event;
use crate::session::UnitOfWork;

/// A saga step: react to an event inside a fresh unit of work, staging state
/// writes and recording follow-up events through its sink.
pub type Handler =
    Box<dyn Fn(&Event, &mut UnitOfWork<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// Routing table from `(topic, schema)` to handler, populated once at
/// startup. Events with no entry are acknowledged without side effects.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<(String, String), Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        topic: impl Into<String>,
        schema: impl Into<String>,
        handler: Handler,
    ) {
        self.handlers.insert((topic.into(), schema.into()), handler);
    }

    pub fn get(&self, topic: &str, schema: &str) -> Option<&Handler> {
        self.handlers
            .get(&(topic.to_string(), schema.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
