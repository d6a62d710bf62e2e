//! Stateless transport client for the generation backend.
//!
//! [`HttpBackend`] wraps the backend's four HTTP operations (upload, submit,
//! status, result) as single round-trips with no internal retry; retry
//! decisions belong to the caller. [`PushListener`] maintains the optional
//! WebSocket push channel that substitutes lower-latency status events for
//! polling. Neither holds job state between calls, so both are safely
//! shared by reference across workers.

pub mod api;
pub mod messages;
pub mod push;

pub use api::{Backend, HttpBackend, JobStatus, TransportError};
pub use messages::{parse_event, PushEvent, PushState};
pub use push::PushListener;
