//! The three bounded contexts of the clinic: booking, rapid testing, and
//! reporting. They never call each other; every cross-context effect travels
//! as an event through the outbox.

pub mod booking;
pub mod rapid_testing;
pub mod reporting;
