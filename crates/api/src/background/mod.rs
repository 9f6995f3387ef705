//! Background tasks owned by the server process.
//!
//! The notification loops themselves live in `coursecast_events`; this
//! module holds the server-side housekeeping. Every task accepts a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).

pub mod retention;
