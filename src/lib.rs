//! Transactional event outbox and saga relay.
//!
//! Bounded contexts never call each other; a domain state change and the
//! event announcing it become durable in one atomic commit, a relay forwards
//! stored events to the broker with at-least-once delivery, and a
//! consumption loop dispatches them to handlers that run their own atomic
//! state+event writes — chaining reactions across contexts.
//!
//! ```text
//! request ─▶ UnitOfWork ─commit─▶ [state + outbox]      (atomic)
//!                                       │
//!                OutboxRelay ──────────▶│──publish──▶ broker
//!                                                       │
//!            EventConsumer ◀──poll──────────────────────┘
//!                 │ open UnitOfWork, dispatch handler,
//!                 │ commit state + new events, then commit offset
//!                 └──▶ next saga step
//! ```

mod error;
mod event;
mod session;
mod store;

pub mod broker;
pub mod consumer;
pub mod domain;
pub mod outbox;
pub mod saga;
pub mod service;

pub use broker::{Delivery, InMemoryBroker, Publisher, Subscriber};
pub use consumer::{ConsumerStats, Dispatcher, EventConsumer, Handler};
pub use error::{BrokerError, DecodeError, HandlerError, ServiceError, StoreError};
pub use event::{topics, DomainEvent, Event};
pub use outbox::{EventSink, OutboxListener, OutboxRelay, RelayStats};
pub use saga::{saga_dispatcher, saga_topics};
pub use service::Clinic;
pub use session::UnitOfWork;
pub use store::{Database, OutboxEntry, Transaction};
