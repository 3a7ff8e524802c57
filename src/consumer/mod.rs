//! The consumption loop: reads events from the broker in arrival order per
//! topic, runs the matching handler inside a fresh unit of work, and commits
//! the consumer offset only after that unit of work is durable.

mod dispatcher;

pub use dispatcher::{Dispatcher, Handler};

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::broker::Subscriber;
use crate::error::HandlerError;
use crate::event::Event;
use crate::session::UnitOfWork;
use crate::store::Database;

/// Counters from a consumer's lifetime, returned by [`EventConsumer::stop`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub polls: usize,
    pub handled: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Long-running consumption loop driving the saga.
///
/// Per delivery the state machine is `RECEIVED → HANDLING → COMMITTED`, or
/// `RECEIVED → HANDLING → FAILED`: the unit of work is dropped, the offset
/// stays put, and the broker redelivers the same event on the next poll.
/// Handlers must therefore absorb replays. Events with no registered handler
/// are logged and acknowledged — unknown types are not fatal. Payloads that
/// fail to parse or decode are acknowledged too: those failures are
/// deterministic, and retrying them would wedge the topic forever.
pub struct EventConsumer {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<ConsumerStats>>,
}

impl EventConsumer {
    pub fn spawn<S>(
        db: Database,
        subscriber: S,
        dispatcher: Arc<Dispatcher>,
        topics: Vec<String>,
        group: &str,
        poll_interval: Duration,
    ) -> Self
    where
        S: Subscriber + 'static,
    {
        let (stop_tx, stop_rx) = channel();
        let group = group.to_string();

        let handle = thread::spawn(move || {
            let mut stats = ConsumerStats::default();

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                stats.polls += 1;

                let delivery = match subscriber.poll(&topics, &group, poll_interval) {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(error = %err, "broker poll failed");
                        thread::sleep(poll_interval);
                        continue;
                    }
                };

                let envelope = match Event::from_bytes(&delivery.payload) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        // A payload that cannot even parse will never parse;
                        // acknowledge it rather than wedge the topic.
                        warn!(topic = %delivery.topic, error = %err, "dropping malformed event");
                        stats.skipped += 1;
                        commit_offset(&subscriber, &delivery.topic, &group, delivery.offset + 1);
                        continue;
                    }
                };

                let Some(handler) = dispatcher.get(&envelope.topic, &envelope.schema) else {
                    info!(
                        topic = %envelope.topic,
                        schema = %envelope.schema,
                        "no handler registered, acknowledged"
                    );
                    stats.skipped += 1;
                    commit_offset(&subscriber, &delivery.topic, &group, delivery.offset + 1);
                    continue;
                };

                let mut uow = UnitOfWork::begin(&db);
                match handler(&envelope, &mut uow) {
                    Ok(()) => match uow.commit() {
                        Ok(()) => {
                            info!(
                                topic = %envelope.topic,
                                schema = %envelope.schema,
                                id = %envelope.id,
                                "event handled"
                            );
                            stats.handled += 1;
                            commit_offset(&subscriber, &delivery.topic, &group, delivery.offset + 1);
                        }
                        Err(err) => {
                            warn!(error = %err, "unit of work commit failed, offset held");
                            stats.failed += 1;
                            thread::sleep(poll_interval);
                        }
                    },
                    Err(HandlerError::Decode(err)) => {
                        // Decoding is deterministic: this payload fails the
                        // same way on every redelivery. Acknowledge it like a
                        // malformed payload instead of wedging the topic.
                        warn!(
                            topic = %envelope.topic,
                            schema = %envelope.schema,
                            error = %err,
                            "undecodable event dropped"
                        );
                        stats.skipped += 1;
                        commit_offset(&subscriber, &delivery.topic, &group, delivery.offset + 1);
                    }
                    Err(err) => {
                        // The unit of work is dropped: staged state and
                        // events vanish, the offset stays, the broker
                        // redelivers.
                        warn!(
                            topic = %envelope.topic,
                            schema = %envelope.schema,
                            error = %err,
                            "handler failed, event will be redelivered"
                        );
                        stats.failed += 1;
                        thread::sleep(poll_interval);
                    }
                }
            }

            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the consumer to stop and wait for it to finish.
    pub fn stop(mut self) -> ConsumerStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            ConsumerStats::default()
        }
    }

    /// Signal the consumer to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for EventConsumer {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

fn commit_offset<S: Subscriber>(subscriber: &S, topic: &str, group: &str, offset: u64) {
    if let Err(err) = subscriber.commit(topic, group, offset) {
        // Harmless beyond a redelivery: the handler's write already
        // committed, and handlers are idempotent.
        warn!(topic = %topic, offset, error = %err, "offset commit failed");
    }
}
