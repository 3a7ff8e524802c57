//! The diagnostic-testing saga: the handlers that chain the bounded contexts
//! together through events alone.
//!
//! Order placed → `OrderCreated` → a pending rapid test is scheduled.
//! Result checked → `ResultChecked` → a diagnostic report is generated for
//! the ordering client. Sample collection and result recording happen on
//! request, not in the chain, each announcing its own event.
//!
//! Both handlers rebuild their context's aggregate from event fields only
//! and guard against replays: a redelivered event that already did its work
//! is acknowledged as a no-op.

use crate::consumer::Dispatcher;
use crate::domain::{rapid_testing, reporting};
use crate::error::HandlerError;
use crate::event::{topics, DomainEvent, Event};
use crate::session::UnitOfWork;

/// Every topic the saga's consumer group subscribes to.
pub fn saga_topics() -> Vec<String> {
    vec![
        topics::BOOKING.to_string(),
        topics::RAPID_TESTING.to_string(),
        topics::REPORTING.to_string(),
    ]
}

/// Routing table for the order → test → report chain.
pub fn saga_dispatcher() -> Dispatcher {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(topics::BOOKING, "OrderCreated", Box::new(on_order_created));
    dispatcher.register(
        topics::RAPID_TESTING,
        "ResultChecked",
        Box::new(on_result_checked),
    );
    dispatcher
}

fn on_order_created(event: &Event, uow: &mut UnitOfWork<'_>) -> Result<(), HandlerError> {
    let DomainEvent::OrderCreated {
        order_id,
        client_id,
    } = DomainEvent::decode(event)?
    else {
        return Err(HandlerError::Other(format!(
            "misrouted event: {}",
            event.schema
        )));
    };

    // Replay guard: the test this event schedules may already exist.
    if uow.db.rapid_test(&order_id)?.is_some() {
        return Ok(());
    }

    let order = rapid_testing::Order {
        id: order_id,
        client_id,
    };
    let rapid_test = rapid_testing::RapidTest::schedule(order, &mut uow.events);
    uow.storage.insert_rapid_test(rapid_test);
    Ok(())
}

fn on_result_checked(event: &Event, uow: &mut UnitOfWork<'_>) -> Result<(), HandlerError> {
    let DomainEvent::ResultChecked {
        order_id,
        client_id,
    } = DomainEvent::decode(event)?
    else {
        return Err(HandlerError::Other(format!(
            "misrouted event: {}",
            event.schema
        )));
    };

    // Replay guard: one report per order, no matter how often the result
    // event arrives.
    if uow.db.report(&order_id)?.is_some() {
        return Ok(());
    }

    let client = reporting::Client::new(client_id);
    let report = reporting::DiagnosticReport::generate(&client, &mut uow.events);
    uow.storage.insert_report(order_id, report);
    Ok(())
}
