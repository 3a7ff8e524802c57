use std::time::Duration;

use crate::error::BrokerError;

/// A message handed to a consumer group, positioned by offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub offset: u64,
    pub payload: Vec<u8>,
}

/// Pull-based consumption with durable per-(topic, group) offsets.
///
/// `poll` returns the earliest message at or past the group's committed
/// offset. Until `commit` moves the offset, the same message is delivered
/// again on the next poll — which is exactly the redelivery behavior a
/// failed handler relies on.
pub trait Subscriber: Send + Sync {
    /// Block until a message is available on one of `topics` or the timeout
    /// expires.
    fn poll(
        &self,
        topics: &[String],
        group: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, BrokerError>;

    /// Durably record that the group has handled everything below `offset`.
    fn commit(&self, topic: &str, group: &str, offset: u64) -> Result<(), BrokerError>;
}
