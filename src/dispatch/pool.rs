//! # Concurrency Dispatcher
//!
//! Fixed-size worker pool used by the `multiple` strategy: N satellite
//! calls, at most C in flight, all N outcomes handed back together.
//!
//! ## Design
//!
//! - Work items are queued on a channel up front; exactly `min(C, N)`
//!   workers pull from it, so at most C calls are ever in flight.
//! - Each worker reports every item exactly once over the results channel,
//!   which serializes appends into the shared collection.
//! - The caller regains control only once all N results are collected and
//!   the workers are joined (fan-out/fan-in barrier). The escalation rules
//!   downstream need the complete picture, so there is no streaming and no
//!   early exit.
//! - No pool-level watchdog: every satellite call already carries its own
//!   hard deadline, so the worst-case wall time is one call timeout
//!   regardless of the bound.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use serde_json::Value;

use crate::common::messages::{Location, WireResponse};
use crate::transport::{Transport, TransportError};

/// Outcome of one pooled satellite call.
pub struct PoolOutcome {
    pub location: Location,
    pub outcome: Result<WireResponse, TransportError>,
}

/// Run the shared command against every location with at most `bound`
/// calls in flight, returning one outcome per location in input order.
pub async fn collect_all(
    transport: Arc<dyn Transport>,
    locations: Vec<Location>,
    command: Value,
    bound: usize,
) -> Vec<PoolOutcome> {
    let total = locations.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = bound.max(1).min(total);

    // Queue all work up front; the channel holds every item, so these
    // sends never block.
    let (work_tx, work_rx) = mpsc::channel::<(usize, Location)>(total);
    for item in locations.iter().cloned().enumerate() {
        let _ = work_tx.send(item).await;
    }
    drop(work_tx);
    let work_rx = Arc::new(Mutex::new(work_rx));

    let (result_tx, mut result_rx) = mpsc::channel::<(usize, PoolOutcome)>(total);
    let command = Arc::new(command);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let transport = Arc::clone(&transport);
        let command = Arc::clone(&command);
        let work_rx = Arc::clone(&work_rx);
        let result_tx = result_tx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                // Hold the lock only to take the next item, not across the call.
                let item = { work_rx.lock().await.recv().await };
                let Some((index, location)) = item else { break };
                let outcome = transport.call(&location, &command).await;
                let _ = result_tx
                    .send((index, PoolOutcome { location, outcome }))
                    .await;
            }
        }));
    }
    drop(result_tx);

    // Fan-in barrier: drain until every worker has dropped its sender.
    let mut slots: Vec<Option<PoolOutcome>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);
    while let Some((index, outcome)) = result_rx.recv().await {
        slots[index] = Some(outcome);
    }
    for handle in handles {
        let _ = handle.await;
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| PoolOutcome {
                location: locations[index].clone(),
                outcome: Err(TransportError::Protocol {
                    host: locations[index].hostname.clone(),
                    cause: "worker terminated before reporting a result".to_string(),
                }),
            })
        })
        .collect()
}
