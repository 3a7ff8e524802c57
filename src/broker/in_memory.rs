use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::{Delivery, Publisher, Subscriber};
use crate::error::BrokerError;

/// In-memory broker for tests and single-process deployments.
///
/// Topics are append-only logs. Consumer offsets live with the broker, so a
/// restarted consumer resumes from its last committed position rather than
/// an in-memory cursor. Thread-safe; cloning shares the same logs.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    topics: Arc<RwLock<HashMap<String, Vec<Vec<u8>>>>>,
    offsets: Arc<Mutex<HashMap<(String, String), u64>>>,
    // Rotates which topic a poll inspects first so one busy topic cannot
    // starve the others.
    cursor: Arc<Mutex<usize>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed offset for a (topic, group), zero if never committed.
    pub fn committed(&self, topic: &str, group: &str) -> Result<u64, BrokerError> {
        let offsets = self.offsets.lock().map_err(|_| BrokerError::LockPoisoned)?;
        Ok(offsets
            .get(&(topic.to_string(), group.to_string()))
            .copied()
            .unwrap_or(0))
    }

    /// Every payload ever published to a topic (test inspection).
    pub fn log(&self, topic: &str) -> Result<Vec<Vec<u8>>, BrokerError> {
        let topics = self.topics.read().map_err(|_| BrokerError::LockPoisoned)?;
        Ok(topics.get(topic).cloned().unwrap_or_default())
    }

    /// Number of messages on a topic.
    pub fn len(&self, topic: &str) -> Result<usize, BrokerError> {
        let topics = self.topics.read().map_err(|_| BrokerError::LockPoisoned)?;
        Ok(topics.get(topic).map(Vec::len).unwrap_or(0))
    }

    fn try_poll(&self, topics: &[String], group: &str) -> Result<Option<Delivery>, BrokerError> {
        if topics.is_empty() {
            return Ok(None);
        }

        let logs = self.topics.read().map_err(|_| BrokerError::LockPoisoned)?;
        let offsets = self.offsets.lock().map_err(|_| BrokerError::LockPoisoned)?;
        let mut cursor = self.cursor.lock().map_err(|_| BrokerError::LockPoisoned)?;

        for i in 0..topics.len() {
            let topic = &topics[(*cursor + i) % topics.len()];
            let committed = offsets
                .get(&(topic.clone(), group.to_string()))
                .copied()
                .unwrap_or(0);
            if let Some(log) = logs.get(topic) {
                if (committed as usize) < log.len() {
                    *cursor = (*cursor + i + 1) % topics.len();
                    return Ok(Some(Delivery {
                        topic: topic.clone(),
                        offset: committed,
                        payload: log[committed as usize].clone(),
                    }));
                }
            }
        }

        Ok(None)
    }
}

impl Publisher for InMemoryBroker {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut topics = self.topics.write().map_err(|_| BrokerError::LockPoisoned)?;
        topics
            .entry(topic.to_string())
            .or_default()
            .push(payload.to_vec());
        Ok(())
    }
}

impl Subscriber for InMemoryBroker {
    fn poll(
        &self,
        topics: &[String],
        group: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(delivery) = self.try_poll(topics, group)? {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn commit(&self, topic: &str, group: &str, offset: u64) -> Result<(), BrokerError> {
        let mut offsets = self.offsets.lock().map_err(|_| BrokerError::LockPoisoned)?;
        let entry = offsets
            .entry((topic.to_string(), group.to_string()))
            .or_insert(0);
        // Offsets only move forward.
        if offset > *entry {
            *entry = offset;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn publish_then_poll() {
        let broker = InMemoryBroker::new();
        broker.publish("booking", b"a").unwrap();

        let delivery = broker
            .poll(&topics(&["booking"]), "g1", Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_eq!(delivery.topic, "booking");
        assert_eq!(delivery.offset, 0);
        assert_eq!(delivery.payload, b"a");
    }

    #[test]
    fn uncommitted_messages_are_redelivered() {
        let broker = InMemoryBroker::new();
        broker.publish("booking", b"a").unwrap();

        let subscription = topics(&["booking"]);
        let first = broker
            .poll(&subscription, "g1", Duration::from_millis(10))
            .unwrap()
            .unwrap();
        let second = broker
            .poll(&subscription, "g1", Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_eq!(first, second);

        broker.commit("booking", "g1", 1).unwrap();
        assert!(broker
            .poll(&subscription, "g1", Duration::from_millis(5))
            .unwrap()
            .is_none());
    }

    #[test]
    fn groups_track_independent_offsets() {
        let broker = InMemoryBroker::new();
        broker.publish("booking", b"a").unwrap();
        broker.commit("booking", "g1", 1).unwrap();

        assert_eq!(broker.committed("booking", "g1").unwrap(), 1);
        assert_eq!(broker.committed("booking", "g2").unwrap(), 0);

        let delivery = broker
            .poll(&topics(&["booking"]), "g2", Duration::from_millis(10))
            .unwrap();
        assert!(delivery.is_some());
    }

    #[test]
    fn commits_never_move_backwards() {
        let broker = InMemoryBroker::new();
        broker.commit("booking", "g1", 3).unwrap();
        broker.commit("booking", "g1", 1).unwrap();
        assert_eq!(broker.committed("booking", "g1").unwrap(), 3);
    }

    #[test]
    fn poll_times_out_on_empty_topics() {
        let broker = InMemoryBroker::new();
        let delivery = broker
            .poll(&topics(&["booking"]), "g1", Duration::from_millis(5))
            .unwrap();
        assert!(delivery.is_none());
    }

    #[test]
    fn poll_rotates_across_topics() {
        let broker = InMemoryBroker::new();
        broker.publish("booking", b"a").unwrap();
        broker.publish("reporting", b"b").unwrap();

        let subscription = topics(&["booking", "reporting"]);
        let first = broker
            .poll(&subscription, "g1", Duration::from_millis(10))
            .unwrap()
            .unwrap();
        broker.commit(&first.topic, "g1", 1).unwrap();
        let second = broker
            .poll(&subscription, "g1", Duration::from_millis(10))
            .unwrap()
            .unwrap();

        assert_ne!(first.topic, second.topic);
    }
}
