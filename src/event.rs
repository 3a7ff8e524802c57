use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DecodeError;

/// Topic names, one per producing context.
pub mod topics {
    pub const BOOKING: &str = "booking";
    pub const RAPID_TESTING: &str = "rapid_testing";
    pub const REPORTING: &str = "reporting";
}

/// Wire envelope for a single fact that occurred in one context.
///
/// `(topic, schema)` uniquely determines how to read `fields`. Envelopes are
/// immutable once created; the outbox store tracks forwarding separately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub topic: String,
    pub schema: String,
    pub fields: BTreeMap<String, String>,
    pub created_at: SystemTime,
}

impl Event {
    /// Wrap a domain event into a fresh envelope with a generated id.
    pub fn new(event: &DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: event.topic().to_string(),
            schema: event.schema().to_string(),
            fields: event.fields(),
            created_at: SystemTime::now(),
        }
    }

    /// Serialize to the wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from the wire format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// The saga's event vocabulary as a closed union.
///
/// Payloads carry only the identifiers a downstream context needs to rebuild
/// its own aggregate, never references into the producing context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainEvent {
    OrderCreated { order_id: String, client_id: String },
    RapidTestScheduled,
    SampleCollected,
    ResultChecked { order_id: String, client_id: String },
    DiagnosticReportGenerated,
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated { .. } => topics::BOOKING,
            DomainEvent::RapidTestScheduled
            | DomainEvent::SampleCollected
            | DomainEvent::ResultChecked { .. } => topics::RAPID_TESTING,
            DomainEvent::DiagnosticReportGenerated => topics::REPORTING,
        }
    }

    pub fn schema(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated { .. } => "OrderCreated",
            DomainEvent::RapidTestScheduled => "RapidTestScheduled",
            DomainEvent::SampleCollected => "SampleCollected",
            DomainEvent::ResultChecked { .. } => "ResultChecked",
            DomainEvent::DiagnosticReportGenerated => "DiagnosticReportGenerated",
        }
    }

    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        match self {
            DomainEvent::OrderCreated {
                order_id,
                client_id,
            }
            | DomainEvent::ResultChecked {
                order_id,
                client_id,
            } => {
                fields.insert("order_id".to_string(), order_id.clone());
                fields.insert("client_id".to_string(), client_id.clone());
            }
            _ => {}
        }
        fields
    }

    /// Decode an envelope back into the closed union.
    ///
    /// An unrecognized `(topic, schema)` pair comes back as
    /// [`DecodeError::UnknownSchema`] so callers can acknowledge and move on
    /// instead of failing.
    pub fn decode(envelope: &Event) -> Result<Self, DecodeError> {
        let field = |name: &'static str| -> Result<String, DecodeError> {
            envelope
                .fields
                .get(name)
                .cloned()
                .ok_or_else(|| DecodeError::MissingField {
                    schema: envelope.schema.clone(),
                    field: name,
                })
        };

        match (envelope.topic.as_str(), envelope.schema.as_str()) {
            (topics::BOOKING, "OrderCreated") => Ok(DomainEvent::OrderCreated {
                order_id: field("order_id")?,
                client_id: field("client_id")?,
            }),
            (topics::RAPID_TESTING, "RapidTestScheduled") => Ok(DomainEvent::RapidTestScheduled),
            (topics::RAPID_TESTING, "SampleCollected") => Ok(DomainEvent::SampleCollected),
            (topics::RAPID_TESTING, "ResultChecked") => Ok(DomainEvent::ResultChecked {
                order_id: field("order_id")?,
                client_id: field("client_id")?,
            }),
            (topics::REPORTING, "DiagnosticReportGenerated") => {
                Ok(DomainEvent::DiagnosticReportGenerated)
            }
            _ => Err(DecodeError::UnknownSchema {
                topic: envelope.topic.clone(),
                schema: envelope.schema.clone(),
            }),
        }
    }
}
