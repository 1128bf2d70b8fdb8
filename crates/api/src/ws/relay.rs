//! Relay task bridging the event bus to WebSocket clients.
//!
//! Subscribes to the bus and broadcasts every job and queue event to every
//! connection. The broadcast channel drops the oldest events for a lagging
//! relay; per-connection delivery then rides unbounded channels drained by
//! each socket's sender task, so terminal events are not lost once relayed.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use gifpress_events::{Event, EventBus};

use crate::ws::manager::WsManager;
use crate::ws::{MSG_TYPE_JOB_STATUS_UPDATE, MSG_TYPE_QUEUE_UPDATE};

/// Spawn the relay loop. Runs until the token is cancelled or the bus
/// closes.
pub fn start_relay(
    bus: Arc<EventBus>,
    ws_manager: Arc<WsManager>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = bus.subscribe();
        tracing::info!("WebSocket event relay started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("WebSocket event relay stopping");
                    break;
                }
                result = rx.recv() => match result {
                    Ok(event) => {
                        let payload = encode(&event);
                        ws_manager.broadcast(Message::Text(payload.into())).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Intermediate ticks were dropped; clients reconcile
                        // over REST if they notice a gap.
                        tracing::warn!(missed, "Event relay lagged, dropped events");
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Event bus closed, relay stopping");
                        break;
                    }
                }
            }
        }
    })
}

/// Encode a bus event into the wire envelope.
fn encode(event: &Event) -> String {
    match event {
        Event::Job { job_id, data } => serde_json::json!({
            "type": MSG_TYPE_JOB_STATUS_UPDATE,
            "jobId": job_id,
            "data": data,
        })
        .to_string(),
        Event::Queue(data) => serde_json::json!({
            "type": MSG_TYPE_QUEUE_UPDATE,
            "data": data,
        })
        .to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
