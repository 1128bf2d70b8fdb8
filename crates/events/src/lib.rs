//! gifpress in-process event infrastructure.
//!
//! Provides [`EventBus`], the publish/subscribe hub that fans job and queue
//! events out from the worker pool to the WebSocket layer, and the typed
//! event payloads both sides agree on.

pub mod bus;

pub use bus::{Event, EventBus, JobStatusPayload, QueueStatusPayload};
