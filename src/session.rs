use crate::error::StoreError;
use crate::outbox::OutboxListener;
use crate::store::{Database, Transaction};

/// One atomic scope: a transaction for state plus a scoped listener for
/// events.
///
/// Committing makes both durable in a single step; dropping the unit of work
/// discards both. Each inbound request and each consumed event runs exactly
/// one of these to completion.
pub struct UnitOfWork<'a> {
    pub db: &'a Database,
    pub storage: Transaction,
    pub events: OutboxListener,
}

impl<'a> UnitOfWork<'a> {
    pub fn begin(db: &'a Database) -> Self {
        Self {
            db,
            storage: Transaction::default(),
            events: OutboxListener::new(),
        }
    }

    /// Persist every staged write and every recorded event atomically.
    pub fn commit(self) -> Result<(), StoreError> {
        self.db.commit(self.storage, self.events.into_events())
    }
}
