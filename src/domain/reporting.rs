use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::DomainEvent;
use crate::outbox::EventSink;

/// Raised when a client reads a report that belongs to someone else.
/// A domain rule violation, signaled synchronously and never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("access denied: diagnostic report belongs to another client")]
pub struct AccessDenied;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Client {
    pub id: String,
}

impl Client {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// A client may only read their own report; anything else is an explicit
    /// rejection, never a silent empty result.
    pub fn read_diagnostic_report<'a>(
        &self,
        report: &'a DiagnosticReport,
    ) -> Result<&'a DiagnosticReport, AccessDenied> {
        if self.id != report.client_id {
            return Err(AccessDenied);
        }
        Ok(report)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub client_id: String,
}

impl DiagnosticReport {
    pub fn generate(client: &Client, events: &mut dyn EventSink) -> Self {
        let report = DiagnosticReport {
            client_id: client.id.clone(),
        };
        events.record(DomainEvent::DiagnosticReportGenerated);
        report
    }
}
