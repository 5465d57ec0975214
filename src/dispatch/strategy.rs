//! # Strategy Engine
//!
//! The decision core of the dispatcher: given a strategy, a location list,
//! and an opaque check command, produce exactly one consolidated verdict.
//!
//! ## Strategies
//!
//! - **failover**: try the supplied locations in order, stop at the first
//!   OK answer.
//! - **rotate**: like failover, but over a bounded window of locations that
//!   advances round-robin across invocations, with the window position
//!   persisted between runs.
//! - **multiple**: ask every location concurrently through the worker pool
//!   and aggregate all answers, with an escalation override when enough
//!   locations report trouble.
//!
//! The ordered strategies share one evaluation core; all three share the
//! severity rule that a definite answer outranks an indefinite one
//! (OK < WARNING < CRITICAL < UNKNOWN, best is the minimum).

use clap::ValueEnum;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::common::messages::{
    CheckStatus, DebugEntry, Location, LocationResult, Verdict,
};
use crate::dispatch::pool::{self, PoolOutcome};
use crate::rotation::store::{fresh_state, RotationStore};
use crate::transport::Transport;

/// How many locations one rotate invocation evaluates.
pub const ROTATION_WINDOW: usize = 3;

/// Minimum number of WARNING+CRITICAL answers before the `multiple`
/// aggregate escalates. An absolute count, not a ratio of the location
/// set: it fires even for a set of exactly three all-WARNING answers.
const ESCALATION_THRESHOLD: usize = 3;

const NO_LOCATIONS: &str = "there are no locations configured";

/// Selection of the dispatch policy for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Strict priority order, first OK wins
    Failover,
    /// Bounded window advancing round-robin across invocations
    Rotate,
    /// Query all locations concurrently and aggregate
    Multiple,
}

/// Per-status tally of the answers one `multiple` run collected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub ok: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: CheckStatus) {
        match status {
            CheckStatus::Ok => self.ok += 1,
            CheckStatus::Warning => self.warning += 1,
            CheckStatus::Critical => self.critical += 1,
            CheckStatus::Unknown => self.unknown += 1,
        }
    }

    fn clauses(&self) -> Vec<String> {
        [
            (self.ok, CheckStatus::Ok),
            (self.warning, CheckStatus::Warning),
            (self.critical, CheckStatus::Critical),
            (self.unknown, CheckStatus::Unknown),
        ]
        .iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, status)| format!("{} {}", count, status))
        .collect()
    }
}

/// Drives one dispatcher invocation against a transport.
///
/// The transport sits behind a trait object so the whole engine runs
/// against canned transports in tests.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, concurrency: usize) -> Self {
        Self {
            transport,
            concurrency,
        }
    }

    /// Run the selected strategy to its natural completion and return the
    /// single verdict for this invocation.
    pub async fn run(
        &self,
        strategy: Strategy,
        service: &str,
        cache_file: Option<&Path>,
        locations: &[Location],
        command: &Value,
    ) -> Verdict {
        info!(
            "dispatching {:?} check for '{}' across {} location(s)",
            strategy,
            service,
            locations.len()
        );
        match strategy {
            Strategy::Failover => self.failover(locations, command).await,
            Strategy::Rotate => self.rotate(service, cache_file, locations, command).await,
            Strategy::Multiple => self.multiple(locations, command).await,
        }
    }

    /// failover: the caller-supplied order, every invocation, no state.
    pub async fn failover(&self, locations: &[Location], command: &Value) -> Verdict {
        let (verdict, _) = self.evaluate_ordered(locations, command).await;
        verdict
    }

    /// rotate: advance the persisted window and evaluate it in order.
    pub async fn rotate(
        &self,
        service: &str,
        cache_file: Option<&Path>,
        configured: &[Location],
        command: &Value,
    ) -> Verdict {
        let mut store = match cache_file {
            Some(path) => match RotationStore::open(path) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!("⚠️  {}; falling back to the configured location order", e);
                    None
                }
            },
            None => None,
        };
        let mut state = match &store {
            Some(store) => store.reconcile(service, configured),
            None => fresh_state(configured),
        };

        let window = rotation_window(&state);
        for location in &mut state {
            location.last = false;
        }

        let (verdict, last_attempted) = self.evaluate_ordered(&window, command).await;

        if let Some(hostname) = last_attempted {
            if let Some(location) = state.iter_mut().find(|l| l.hostname == hostname) {
                location.last = true;
            }
        }
        if let Some(store) = &mut store {
            if let Err(e) = store.persist(service, &state) {
                warn!("⚠️  {}; rotation restarts from scratch next run", e);
            }
        }
        verdict
    }

    /// multiple: every location at once, aggregate with escalation.
    pub async fn multiple(&self, locations: &[Location], command: &Value) -> Verdict {
        if locations.is_empty() {
            return Verdict::unknown(NO_LOCATIONS);
        }

        let outcomes = pool::collect_all(
            Arc::clone(&self.transport),
            locations.to_vec(),
            command.clone(),
            self.concurrency,
        )
        .await;

        // Aggregate starts from UNKNOWN; only answers a satellite actually
        // delivered can improve it. Synthesized failures still count.
        let mut counts = StatusCounts::default();
        let mut aggregate = CheckStatus::Unknown;
        let mut results = Vec::with_capacity(outcomes.len());
        for PoolOutcome { location, outcome } in outcomes {
            let result = match outcome {
                Ok(response) if response.is_ok() => match response.data {
                    Some(mut result) => {
                        result.stamp_defaults(&location);
                        aggregate = aggregate.min(result.status);
                        result
                    }
                    None => LocationResult::unknown(
                        &location.hostname,
                        "satellite answered without result data",
                    ),
                },
                Ok(response) => LocationResult::unknown(&location.hostname, &response.refusal()),
                Err(e) => LocationResult::unknown(&location.hostname, &e.to_string()),
            };
            counts.bump(result.status);
            results.push(result);
        }

        let mut status = aggregate;
        if counts.critical + counts.warning >= ESCALATION_THRESHOLD {
            status = if counts.critical > counts.warning || counts.warning == 0 {
                CheckStatus::Critical
            } else {
                CheckStatus::Warning
            };
        }

        let mut message = format!("{} location(s) checked", results.len());
        for clause in counts.clauses() {
            message.push_str(", ");
            message.push_str(&clause);
        }

        let mut stats_map = serde_json::Map::new();
        for result in &results {
            if let Some(stats) = &result.stats {
                stats_map.insert(result.hostname.clone(), stats.clone());
            }
        }
        let stats = if stats_map.is_empty() {
            None
        } else {
            Some(Value::Object(stats_map))
        };

        let debug = collect_debug(&results);
        let abnormal: Vec<LocationResult> = results
            .iter()
            .filter(|r| r.status != CheckStatus::Ok)
            .cloned()
            .collect();

        Verdict {
            status,
            message,
            stats,
            debug,
            results: abnormal,
        }
    }

    /// Shared ordered-evaluation core for failover and rotate.
    ///
    /// Strictly sequential: one call completes (answer, refusal, failure,
    /// or its 60s deadline) before the next location is attempted. Stops
    /// early on the first OK answer. Returns the verdict and the hostname
    /// of the last attempted location for rotation bookkeeping.
    async fn evaluate_ordered(
        &self,
        locations: &[Location],
        command: &Value,
    ) -> (Verdict, Option<String>) {
        if locations.is_empty() {
            return (Verdict::unknown(NO_LOCATIONS), None);
        }

        let mut results: Vec<LocationResult> = Vec::new();
        let mut attempted: Vec<String> = Vec::new();
        let mut best = 0usize;
        for location in locations {
            attempted.push(location.hostname.clone());
            results.push(self.check_one(location, command).await);

            let newest = results.len() - 1;
            if results[newest].status < results[best].status {
                best = newest;
            }
            if results[newest].status == CheckStatus::Ok {
                break;
            }
        }

        let best = &results[best];
        let message = format!("{} (checked from {})", best.message, attempted.join(", "));

        // The per-location detail only matters when there is something to
        // explain: several attempts, or a best that is not OK.
        let attach_results = attempted.len() > 1 || best.status != CheckStatus::Ok;
        let verdict = Verdict {
            status: best.status,
            message,
            stats: best.stats.clone(),
            debug: collect_debug(&results),
            results: if attach_results { results.clone() } else { Vec::new() },
        };
        (verdict, attempted.last().cloned())
    }

    /// One location, one result. Transport failures and envelope refusals
    /// both synthesize UNKNOWN with the hostname and cause in the message.
    async fn check_one(&self, location: &Location, command: &Value) -> LocationResult {
        match self.transport.call(location, command).await {
            Ok(response) if response.is_ok() => match response.data {
                Some(mut result) => {
                    result.stamp_defaults(location);
                    result
                }
                None => LocationResult::unknown(
                    &location.hostname,
                    "satellite answered without result data",
                ),
            },
            Ok(response) => LocationResult::unknown(&location.hostname, &response.refusal()),
            Err(e) => {
                warn!("❌ {}", e);
                LocationResult::unknown(&location.hostname, &e.to_string())
            }
        }
    }
}

/// The window of locations one rotate invocation evaluates: up to
/// [`ROTATION_WINDOW`] entries starting right after the currently flagged
/// one, wrapping around the list.
fn rotation_window(state: &[Location]) -> Vec<Location> {
    if state.is_empty() {
        return Vec::new();
    }
    let start = state
        .iter()
        .position(|l| l.last)
        .map(|i| (i + 1) % state.len())
        .unwrap_or(0);
    let take = state.len().min(ROTATION_WINDOW);
    (0..take)
        .map(|k| state[(start + k) % state.len()].clone())
        .collect()
}

fn collect_debug(results: &[LocationResult]) -> Vec<DebugEntry> {
    results
        .iter()
        .filter_map(|r| {
            r.debug.clone().map(|debug| DebugEntry {
                hostname: r.hostname.clone(),
                debug,
            })
        })
        .collect()
}
