//! Broker abstractions and the in-memory broker.
//!
//! The relay talks to a [`Publisher`]; the consumption loop talks to a
//! [`Subscriber`] with durable per-(topic, group) offsets. Swapping in a real
//! broker (Kafka, NATS, ...) means implementing these two traits.

mod in_memory;
mod publisher;
mod subscriber;

pub use in_memory::InMemoryBroker;
pub use publisher::Publisher;
pub use subscriber::{Delivery, Subscriber};
