//! The whole chain, end to end, with a live relay and consumer:
//! order placed → rapid test scheduled → sample collected → result checked →
//! diagnostic report generated — every hop travelling through the outbox and
//! the broker, never by direct call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use event_outbox::domain::rapid_testing::TestResult;
use event_outbox::{
    saga_dispatcher, saga_topics, Clinic, Database, Event, EventConsumer, InMemoryBroker,
    OutboxRelay, ServiceError,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn order_to_report_saga() {
    init_logging();
    let db = Database::new();
    let broker = InMemoryBroker::new();
    let clinic = Clinic::new(db.clone());

    let relay = OutboxRelay::spawn(db.clone(), broker.clone(), Duration::from_millis(5));
    let consumer = EventConsumer::spawn(
        db.clone(),
        broker.clone(),
        Arc::new(saga_dispatcher()),
        saga_topics(),
        "monolith",
        Duration::from_millis(5),
    );

    // Place the order.
    let order = clinic.create_order("c1").unwrap();
    assert_eq!(order.client_id, "c1");
    assert!(!order.id.is_empty());
    assert_eq!(clinic.order(&order.id).unwrap(), order);

    // The saga schedules a pending test without any direct call.
    assert!(
        wait_until(Duration::from_secs(5), || {
            db.rapid_test(&order.id).unwrap().is_some()
        }),
        "saga never scheduled the rapid test"
    );
    let rapid_test = db.rapid_test(&order.id).unwrap().unwrap();
    assert_eq!(rapid_test.order.client_id, "c1");
    assert!(rapid_test.sample.is_none());
    assert!(rapid_test.result.is_none());

    // No report yet: reading it is NotFound, for the owner too.
    assert!(matches!(
        clinic.report("c1", &order.id),
        Err(ServiceError::NotFound { .. })
    ));

    // Collect the sample and check the result.
    clinic.collect_sample(&order.id, "R31337").unwrap();
    clinic.check_result(&order.id, TestResult::Positive).unwrap();

    let rapid_test = db.rapid_test(&order.id).unwrap().unwrap();
    assert_eq!(rapid_test.sample.unwrap().id, "R31337");
    assert_eq!(rapid_test.result, Some(TestResult::Positive));

    // The checked result propagates into a report.
    assert!(
        wait_until(Duration::from_secs(5), || {
            db.report(&order.id).unwrap().is_some()
        }),
        "saga never generated the report"
    );

    // Owner reads it; anyone else is rejected, never silently empty.
    let report = clinic.report("c1", &order.id).unwrap();
    assert_eq!(report.client_id, "c1");
    assert!(matches!(
        clinic.report("mallory", &order.id),
        Err(ServiceError::AccessDenied(_))
    ));

    // Let the relay drain the final DiagnosticReportGenerated entry.
    assert!(wait_until(Duration::from_secs(5), || {
        db.fetch_pending(10).unwrap().is_empty()
    }));

    consumer.stop();
    relay.stop();

    // Every event of the chain crossed the broker exactly through its topic.
    let mut schemas = BTreeSet::new();
    for topic in saga_topics() {
        for payload in broker.log(&topic).unwrap() {
            schemas.insert(Event::from_bytes(&payload).unwrap().schema);
        }
    }
    for expected in [
        "OrderCreated",
        "RapidTestScheduled",
        "SampleCollected",
        "ResultChecked",
        "DiagnosticReportGenerated",
    ] {
        assert!(schemas.contains(expected), "missing {expected} on the broker");
    }
}

#[test]
fn two_clients_get_independent_reports() {
    init_logging();
    let db = Database::new();
    let broker = InMemoryBroker::new();
    let clinic = Clinic::new(db.clone());

    let relay = OutboxRelay::spawn(db.clone(), broker.clone(), Duration::from_millis(5));
    let consumer = EventConsumer::spawn(
        db.clone(),
        broker,
        Arc::new(saga_dispatcher()),
        saga_topics(),
        "monolith",
        Duration::from_millis(5),
    );

    let order_a = clinic.create_order("alice").unwrap();
    let order_b = clinic.create_order("bob").unwrap();

    for order in [&order_a, &order_b] {
        assert!(wait_until(Duration::from_secs(5), || {
            db.rapid_test(&order.id).unwrap().is_some()
        }));
        clinic.collect_sample(&order.id, "R31337").unwrap();
        clinic.check_result(&order.id, TestResult::Negative).unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            db.report(&order.id).unwrap().is_some()
        }));
    }

    consumer.stop();
    relay.stop();

    assert!(clinic.report("alice", &order_a.id).is_ok());
    assert!(clinic.report("bob", &order_b.id).is_ok());
    assert!(matches!(
        clinic.report("alice", &order_b.id),
        Err(ServiceError::AccessDenied(_))
    ));
}
