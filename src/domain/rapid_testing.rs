use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::DomainEvent;
use crate::outbox::EventSink;

/// The originating order, reduced to the two identifiers this context needs.
/// Rebuilt from event fields, never fetched from the booking context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Positive,
    Negative,
    Invalid,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestResult::Positive => "positive",
            TestResult::Negative => "negative",
            TestResult::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown test result: {0}")]
pub struct UnknownResult(pub String);

impl FromStr for TestResult {
    type Err = UnknownResult;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(TestResult::Positive),
            "negative" => Ok(TestResult::Negative),
            "invalid" => Ok(TestResult::Invalid),
            other => Err(UnknownResult(other.to_string())),
        }
    }
}

/// A diagnostic test: pending once scheduled, then sampled, then resulted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RapidTest {
    pub order: Order,
    pub sample: Option<Sample>,
    pub result: Option<TestResult>,
}

impl RapidTest {
    /// Schedule a test for a freshly placed order.
    pub fn schedule(order: Order, events: &mut dyn EventSink) -> Self {
        let rapid_test = RapidTest {
            order,
            sample: None,
            result: None,
        };
        events.record(DomainEvent::RapidTestScheduled);
        rapid_test
    }

    pub fn collect_sample(&mut self, sample: Sample, events: &mut dyn EventSink) {
        self.sample = Some(sample);
        events.record(DomainEvent::SampleCollected);
    }

    pub fn check_result(&mut self, result: TestResult, events: &mut dyn EventSink) {
        self.result = Some(result);
        events.record(DomainEvent::ResultChecked {
            order_id: self.order.id.clone(),
            client_id: self.order.client_id.clone(),
        });
    }
}
