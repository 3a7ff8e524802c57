use std::collections::HashSet;
use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::broker::Publisher;
use crate::store::Database;

const BATCH_SIZE: usize = 100;
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Counters from a relay's lifetime, returned by [`OutboxRelay::stop`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub polls: usize,
    pub published: usize,
    pub failures: usize,
}

/// Background forwarder from the outbox store to the broker.
///
/// Each round fetches pending entries in append order, publishes them on
/// their declared topics, and marks them forwarded only after the broker
/// acknowledges. A failed publish leaves its entry pending and holds back
/// later entries on the same topic, so per-topic order survives retries;
/// other topics keep moving. Retries continue forever with capped
/// exponential backoff — entries are never dropped.
///
/// A crash between publish and mark is harmless: the entry is republished,
/// and consumers absorb the duplicate (at-least-once delivery).
pub struct OutboxRelay {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<RelayStats>>,
}

impl OutboxRelay {
    /// Spawn the relay thread. `poll_interval` is the idle pause between
    /// drain rounds and the starting point for backoff.
    pub fn spawn<P>(db: Database, publisher: P, poll_interval: Duration) -> Self
    where
        P: Publisher + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = RelayStats::default();
            let mut backoff = poll_interval;

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                stats.polls += 1;

                let pending = match db.fetch_pending(BATCH_SIZE) {
                    Ok(pending) => pending,
                    Err(err) => {
                        warn!(error = %err, "outbox fetch failed");
                        thread::sleep(backoff);
                        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
                        continue;
                    }
                };

                let mut round_failed = false;
                let mut blocked: HashSet<String> = HashSet::new();

                for entry in pending {
                    // A failed topic stays blocked for the rest of the round
                    // so its entries go out strictly in append order.
                    if blocked.contains(&entry.event.topic) {
                        continue;
                    }

                    let payload = match entry.event.to_bytes() {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(seq = entry.seq, error = %err, "unserializable outbox entry");
                            blocked.insert(entry.event.topic.clone());
                            round_failed = true;
                            continue;
                        }
                    };

                    match publisher.publish(&entry.event.topic, &payload) {
                        Ok(()) => {
                            if let Err(err) = db.mark_forwarded(&[entry.seq]) {
                                // The entry stays pending and will be
                                // republished; blocking the topic keeps that
                                // re-publish from landing behind later
                                // entries.
                                warn!(seq = entry.seq, error = %err, "mark_forwarded failed");
                                stats.failures += 1;
                                blocked.insert(entry.event.topic.clone());
                                round_failed = true;
                            } else {
                                debug!(
                                    topic = %entry.event.topic,
                                    schema = %entry.event.schema,
                                    seq = entry.seq,
                                    "outbox entry forwarded"
                                );
                                stats.published += 1;
                            }
                        }
                        Err(err) => {
                            warn!(
                                topic = %entry.event.topic,
                                seq = entry.seq,
                                error = %err,
                                "publish failed, entry left pending"
                            );
                            stats.failures += 1;
                            blocked.insert(entry.event.topic.clone());
                            round_failed = true;
                        }
                    }
                }

                if round_failed {
                    thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
                } else {
                    backoff = poll_interval;
                    thread::sleep(poll_interval);
                }
            }

            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the relay to stop and wait for it to finish.
    pub fn stop(mut self) -> RelayStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            RelayStats::default()
        }
    }

    /// Signal the relay to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for OutboxRelay {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        // No join on drop; the thread winds down on its own.
    }
}
