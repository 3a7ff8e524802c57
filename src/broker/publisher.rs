use crate::error::BrokerError;

/// Fan-out publication to a named topic.
///
/// `Ok` means the broker acknowledged the message; the relay only marks an
/// outbox entry forwarded after that acknowledgment.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;
}
