use uuid::Uuid;

use crate::domain::{booking, rapid_testing, reporting};
use crate::error::ServiceError;
use crate::session::UnitOfWork;
use crate::store::Database;

/// The request surface of the clinic monolith.
///
/// Every call opens exactly one unit of work; mutating calls record their
/// events through its scoped listener, so state and events commit together
/// or not at all. The database handle is passed in explicitly — there are no
/// ambient singletons.
#[derive(Clone)]
pub struct Clinic {
    db: Database,
}

impl Clinic {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Place an order for a client. The saga takes it from here.
    pub fn create_order(&self, client_id: &str) -> Result<booking::Order, ServiceError> {
        let client = booking::Client::new(client_id);
        let mut uow = UnitOfWork::begin(&self.db);
        let order = client.create_order(Uuid::new_v4().to_string(), &mut uow.events);
        uow.storage.insert_order(order.clone());
        uow.commit()?;
        Ok(order)
    }

    pub fn order(&self, order_id: &str) -> Result<booking::Order, ServiceError> {
        self.db
            .order(order_id)?
            .ok_or_else(|| not_found("order", order_id))
    }

    /// Attach a collected sample to the order's rapid test. Fails with
    /// `NotFound` until the saga has scheduled the test, and with a write
    /// conflict if another request mutated the test in between.
    pub fn collect_sample(&self, order_id: &str, sample_id: &str) -> Result<(), ServiceError> {
        let (version, mut rapid_test) = self
            .db
            .rapid_test_for_update(order_id)?
            .ok_or_else(|| not_found("rapid test", order_id))?;

        let mut uow = UnitOfWork::begin(&self.db);
        rapid_test.collect_sample(
            rapid_testing::Sample {
                id: sample_id.to_string(),
            },
            &mut uow.events,
        );
        uow.storage.update_rapid_test(rapid_test, version);
        uow.commit()?;
        Ok(())
    }

    /// Record the test result. A checked result drives report generation
    /// through the saga.
    pub fn check_result(
        &self,
        order_id: &str,
        result: rapid_testing::TestResult,
    ) -> Result<(), ServiceError> {
        let (version, mut rapid_test) = self
            .db
            .rapid_test_for_update(order_id)?
            .ok_or_else(|| not_found("rapid test", order_id))?;

        let mut uow = UnitOfWork::begin(&self.db);
        rapid_test.check_result(result, &mut uow.events);
        uow.storage.update_rapid_test(rapid_test, version);
        uow.commit()?;
        Ok(())
    }

    /// Read the diagnostic report for an order, owner only.
    pub fn report(
        &self,
        client_id: &str,
        order_id: &str,
    ) -> Result<reporting::DiagnosticReport, ServiceError> {
        let report = self
            .db
            .report(order_id)?
            .ok_or_else(|| not_found("diagnostic report", order_id))?;
        let client = reporting::Client::new(client_id);
        client.read_diagnostic_report(&report)?;
        Ok(report)
    }
}

fn not_found(kind: &'static str, order_id: &str) -> ServiceError {
    ServiceError::NotFound {
        kind,
        order_id: order_id.to_string(),
    }
}
