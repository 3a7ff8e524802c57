//! Outbox side of the mechanism: the scoped listener that captures events
//! inside a unit of work, and the relay that forwards stored entries to the
//! broker.
//!
//! ```text
//! domain op ──record()──▶ OutboxListener ──commit──▶ outbox table
//!                                                        │
//!                                       OutboxRelay ─────┘──publish──▶ broker
//! ```

mod listener;
mod relay;

pub use listener::{EventSink, OutboxListener};
pub use relay::{OutboxRelay, RelayStats};
