use serde::{Deserialize, Serialize};

use crate::event::DomainEvent;
use crate::outbox::EventSink;

/// A client of the clinic, as the booking context sees them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Client {
    pub id: String,
}

impl Client {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Place an order, announcing it to the rest of the system.
    pub fn create_order(&self, order_id: impl Into<String>, events: &mut dyn EventSink) -> Order {
        let order = Order {
            id: order_id.into(),
            client_id: self.id.clone(),
        };
        events.record(DomainEvent::OrderCreated {
            order_id: order.id.clone(),
            client_id: order.client_id.clone(),
        });
        order
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_id: String,
}
