//! Domain types and pure logic for notification delivery.
//!
//! Nothing in this crate touches the database, the network or the tokio
//! runtime; everything here can be unit tested against fixed instants.

pub mod channels;
pub mod clock;
pub mod course_event;
pub mod digest;
pub mod error;
pub mod notification;
pub mod preferences;
pub mod quiet_hours;
pub mod roles;
pub mod scheduling;
pub mod triggers;
pub mod types;
