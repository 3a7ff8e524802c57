use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::booking::Order;
use crate::domain::rapid_testing::RapidTest;
use crate::domain::reporting::DiagnosticReport;
use crate::error::StoreError;
use crate::event::Event;

/// A stored event awaiting (or past) forwarding to the broker.
///
/// `seq` is the append order; the relay forwards entries of a topic strictly
/// in `seq` order. Entries are never mutated after insertion except for the
/// `forwarded` flag.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboxEntry {
    pub seq: u64,
    pub event: Event,
    pub forwarded: bool,
}

enum Write {
    InsertOrder(Order),
    UpsertRapidTest {
        rapid_test: RapidTest,
        // None = unconditional insert; Some = compare-and-swap against the
        // row version the caller read.
        expected_version: Option<u64>,
    },
    InsertReport {
        order_id: String,
        report: DiagnosticReport,
    },
}

/// Staged writes for one unit of work. Nothing touches the tables until
/// [`Database::commit`] applies the whole batch.
#[derive(Default)]
pub struct Transaction {
    writes: Vec<Write>,
}

impl Transaction {
    pub fn insert_order(&mut self, order: Order) {
        self.writes.push(Write::InsertOrder(order));
    }

    pub fn insert_rapid_test(&mut self, rapid_test: RapidTest) {
        self.writes.push(Write::UpsertRapidTest {
            rapid_test,
            expected_version: None,
        });
    }

    /// Replace the test keyed by its order id, but only if the row still
    /// carries the version read alongside it. A stale version aborts the
    /// whole transaction at commit with [`StoreError::WriteConflict`], so
    /// two concurrent read-modify-write requests cannot silently overwrite
    /// each other.
    pub fn update_rapid_test(&mut self, rapid_test: RapidTest, expected_version: u64) {
        self.writes.push(Write::UpsertRapidTest {
            rapid_test,
            expected_version: Some(expected_version),
        });
    }

    pub fn insert_report(&mut self, order_id: impl Into<String>, report: DiagnosticReport) {
        self.writes.push(Write::InsertReport {
            order_id: order_id.into(),
            report,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Order>,
    // Rapid tests carry a row version for compare-and-swap updates.
    rapid_tests: HashMap<String, (u64, RapidTest)>,
    reports: HashMap<String, DiagnosticReport>,
    outbox: Vec<OutboxEntry>,
    next_seq: u64,
}

/// Shared in-memory store holding the three aggregate collections and the
/// outbox table. Cloning hands out another handle to the same tables.
///
/// All mutation goes through [`Database::commit`] under one write lock, so a
/// state change and the events announcing it become visible in the same
/// atomic step.
#[derive(Clone, Default)]
pub struct Database {
    tables: Arc<RwLock<Tables>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self, id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.read("order")?.orders.get(id).cloned())
    }

    pub fn rapid_test(&self, order_id: &str) -> Result<Option<RapidTest>, StoreError> {
        Ok(self
            .read("rapid_test")?
            .rapid_tests
            .get(order_id)
            .map(|(_, rapid_test)| rapid_test.clone()))
    }

    /// The test plus its row version, for read-modify-write callers that
    /// stage a [`Transaction::update_rapid_test`].
    pub fn rapid_test_for_update(
        &self,
        order_id: &str,
    ) -> Result<Option<(u64, RapidTest)>, StoreError> {
        Ok(self.read("rapid_test")?.rapid_tests.get(order_id).cloned())
    }

    pub fn report(&self, order_id: &str) -> Result<Option<DiagnosticReport>, StoreError> {
        Ok(self.read("report")?.reports.get(order_id).cloned())
    }

    /// Apply a transaction's staged writes and its recorded events in one
    /// atomic step. Either all of it becomes visible or none of it does.
    pub fn commit(&self, txn: Transaction, events: Vec<Event>) -> Result<(), StoreError> {
        let mut tables = self.write("commit")?;

        // Validate every compare-and-swap before applying anything, so a
        // conflict aborts the transaction as a whole.
        for write in &txn.writes {
            if let Write::UpsertRapidTest {
                rapid_test,
                expected_version: Some(expected),
            } = write
            {
                let current = tables
                    .rapid_tests
                    .get(&rapid_test.order.id)
                    .map(|(version, _)| *version);
                if current != Some(*expected) {
                    return Err(StoreError::WriteConflict {
                        kind: "rapid test",
                        key: rapid_test.order.id.clone(),
                    });
                }
            }
        }

        for write in txn.writes {
            match write {
                Write::InsertOrder(order) => {
                    tables.orders.insert(order.id.clone(), order);
                }
                Write::UpsertRapidTest { rapid_test, .. } => {
                    let version = tables
                        .rapid_tests
                        .get(&rapid_test.order.id)
                        .map(|(version, _)| version + 1)
                        .unwrap_or(0);
                    tables
                        .rapid_tests
                        .insert(rapid_test.order.id.clone(), (version, rapid_test));
                }
                Write::InsertReport { order_id, report } => {
                    tables.reports.insert(order_id, report);
                }
            }
        }

        for event in events {
            let seq = tables.next_seq;
            tables.next_seq += 1;
            tables.outbox.push(OutboxEntry {
                seq,
                event,
                forwarded: false,
            });
        }

        Ok(())
    }

    /// Unforwarded entries in append order.
    ///
    /// The outbox is an append-only log scanned under the same lock appends
    /// take, so an entry added concurrently is picked up by the next fetch
    /// rather than skipped forever.
    pub fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let tables = self.read("fetch_pending")?;
        Ok(tables
            .outbox
            .iter()
            .filter(|entry| !entry.forwarded)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Flip the forwarded flag on the given entries. Marking an entry that is
    /// already forwarded is a no-op, not an error.
    pub fn mark_forwarded(&self, seqs: &[u64]) -> Result<(), StoreError> {
        let mut tables = self.write("mark_forwarded")?;
        for entry in tables.outbox.iter_mut() {
            if seqs.contains(&entry.seq) {
                entry.forwarded = true;
            }
        }
        Ok(())
    }

    /// Full outbox log, forwarded entries included (inspection helper).
    pub fn outbox_entries(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        Ok(self.read("outbox_entries")?.outbox.clone())
    }

    /// Poison the table lock by panicking a thread while it holds the write
    /// guard. Every later access fails with `LockPoisoned`.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let tables = Arc::clone(&self.tables);
        let _ = std::thread::spawn(move || {
            let _guard = tables.write();
            panic!("poisoning the store lock");
        })
        .join();
    }

    fn read(&self, op: &'static str) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned(op))
    }

    fn write(&self, op: &'static str) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::LockPoisoned(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rapid_testing::{self, Sample, TestResult};
    use crate::event::DomainEvent;

    fn pending_test(order_id: &str) -> RapidTest {
        RapidTest {
            order: rapid_testing::Order {
                id: order_id.to_string(),
                client_id: "c1".to_string(),
            },
            sample: None,
            result: None,
        }
    }

    fn order(id: &str) -> Order {
        Order {
            id: id.to_string(),
            client_id: "c1".to_string(),
        }
    }

    fn envelope(domain_event: DomainEvent) -> Event {
        Event::new(&domain_event)
    }

    #[test]
    fn commit_applies_state_and_events_together() {
        let db = Database::new();

        let mut txn = Transaction::default();
        txn.insert_order(order("order-1"));
        db.commit(
            txn,
            vec![envelope(DomainEvent::OrderCreated {
                order_id: "order-1".to_string(),
                client_id: "c1".to_string(),
            })],
        )
        .unwrap();

        assert_eq!(db.order("order-1").unwrap().unwrap().client_id, "c1");
        let pending = db.fetch_pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.schema, "OrderCreated");
        assert!(!pending[0].forwarded);
    }

    #[test]
    fn fetch_pending_preserves_append_order_and_limit() {
        let db = Database::new();
        for _ in 0..3 {
            db.commit(
                Transaction::default(),
                vec![envelope(DomainEvent::RapidTestScheduled)],
            )
            .unwrap();
        }

        let pending = db.fetch_pending(2).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].seq, 0);
        assert_eq!(pending[1].seq, 1);
    }

    #[test]
    fn mark_forwarded_is_idempotent() {
        let db = Database::new();
        db.commit(
            Transaction::default(),
            vec![envelope(DomainEvent::SampleCollected)],
        )
        .unwrap();

        db.mark_forwarded(&[0]).unwrap();
        assert!(db.fetch_pending(10).unwrap().is_empty());

        // Second mark of the same entry, plus an unknown seq: both no-ops.
        db.mark_forwarded(&[0, 99]).unwrap();
        let entries = db.outbox_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].forwarded);
    }

    #[test]
    fn stale_rapid_test_updates_are_rejected() {
        let db = Database::new();

        let mut txn = Transaction::default();
        txn.insert_rapid_test(pending_test("order-1"));
        db.commit(txn, vec![]).unwrap();

        // Two writers read the same row version.
        let (version, test_a) = db.rapid_test_for_update("order-1").unwrap().unwrap();
        let (_, test_b) = db.rapid_test_for_update("order-1").unwrap().unwrap();

        let mut sampled = test_a;
        sampled.sample = Some(Sample {
            id: "R31337".to_string(),
        });
        let mut first = Transaction::default();
        first.update_rapid_test(sampled, version);
        db.commit(first, vec![]).unwrap();

        // The second writer's copy is stale: its transaction aborts whole,
        // and the first writer's sample survives.
        let mut resulted = test_b;
        resulted.result = Some(TestResult::Positive);
        let mut second = Transaction::default();
        second.update_rapid_test(resulted, version);
        assert!(matches!(
            db.commit(second, vec![]),
            Err(StoreError::WriteConflict { .. })
        ));

        let current = db.rapid_test("order-1").unwrap().unwrap();
        assert_eq!(current.sample.unwrap().id, "R31337");
        assert!(current.result.is_none());
    }

    #[test]
    fn each_committed_write_bumps_the_row_version() {
        let db = Database::new();

        let mut txn = Transaction::default();
        txn.insert_rapid_test(pending_test("order-1"));
        db.commit(txn, vec![]).unwrap();
        assert_eq!(
            db.rapid_test_for_update("order-1").unwrap().unwrap().0,
            0
        );

        let (version, test) = db.rapid_test_for_update("order-1").unwrap().unwrap();
        let mut txn = Transaction::default();
        txn.update_rapid_test(test, version);
        db.commit(txn, vec![]).unwrap();
        assert_eq!(
            db.rapid_test_for_update("order-1").unwrap().unwrap().0,
            1
        );
    }

    #[test]
    fn missing_rows_read_as_none() {
        let db = Database::new();
        assert!(db.order("nope").unwrap().is_none());
        assert!(db.rapid_test("nope").unwrap().is_none());
        assert!(db.report("nope").unwrap().is_none());
    }

    #[test]
    fn appends_during_a_drain_are_not_lost() {
        let db = Database::new();
        db.commit(
            Transaction::default(),
            vec![envelope(DomainEvent::RapidTestScheduled)],
        )
        .unwrap();

        let first = db.fetch_pending(10).unwrap();
        assert_eq!(first.len(), 1);

        // An append racing the drain lands behind the fetched batch.
        db.commit(
            Transaction::default(),
            vec![envelope(DomainEvent::SampleCollected)],
        )
        .unwrap();
        db.mark_forwarded(&[first[0].seq]).unwrap();

        let second = db.fetch_pending(10).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].event.schema, "SampleCollected");
    }
}
