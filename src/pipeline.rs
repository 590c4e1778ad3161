//! Event processing pipeline.
//! normalize -> resolve identity -> route -> store update, one task per envelope.

use std::io::BufRead;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::enrich::IdentityResolver;
use crate::event_router::{apply, route};
use crate::normalize::normalize;
use crate::store::AppStore;
use crate::types::Envelope;

/// Shared engine state. Built once at startup and handed out by `Arc`.
pub struct Engine {
    store: Arc<AppStore>,
    resolver: Arc<IdentityResolver>,
    started_ms: i64,
}

impl Engine {
    pub fn new(store: Arc<AppStore>, resolver: Arc<IdentityResolver>) -> Self {
        Self::with_start(store, resolver, current_time_ms())
    }

    /// Engine whose feed is considered to have started at `started_ms`.
    pub fn with_start(
        store: Arc<AppStore>,
        resolver: Arc<IdentityResolver>,
        started_ms: i64,
    ) -> Self {
        Self {
            store,
            resolver,
            started_ms,
        }
    }

    pub fn store(&self) -> &Arc<AppStore> {
        &self.store
    }

    /// Process one envelope end to end. Returns whether the store was written.
    pub async fn process(&self, envelope: Envelope) -> bool {
        let Some(mut event) = normalize(envelope) else {
            return false;
        };
        let Some(route) = route(&event) else {
            return false;
        };
        self.resolver.annotate(&mut event).await;
        apply(&self.store, &event, route, current_time_ms(), self.started_ms)
    }
}

/// Stats returned when the input stream closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub received: u64,
    pub applied: u64,
}

/// Consume envelopes until the channel closes, running up to `max_in_flight`
/// of them concurrently. Everything already admitted is drained before returning.
pub async fn run_event_loop(
    engine: Arc<Engine>,
    mut rx: mpsc::Receiver<Envelope>,
    max_in_flight: usize,
) -> LoopStats {
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut futs: FuturesUnordered<tokio::task::JoinHandle<bool>> = FuturesUnordered::new();
    let mut stats = LoopStats::default();

    loop {
        tokio::select! {
            biased;

            Some(done) = futs.next(), if !futs.is_empty() => {
                record(&mut stats, done);
            }
            msg = rx.recv() => {
                let Some(envelope) = msg else { break };
                stats.received += 1;
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(err) => {
                        warn!("event loop: semaphore closed: {err:?}");
                        break;
                    }
                };
                let engine = engine.clone();
                futs.push(tokio::spawn(async move {
                    let _permit = permit;
                    engine.process(envelope).await
                }));
            }
        }
    }

    debug!("event loop: input closed, draining {} in-flight", futs.len());
    while let Some(done) = futs.next().await {
        record(&mut stats, done);
    }
    info!(
        "event loop stopped: received={} applied={}",
        stats.received, stats.applied
    );
    stats
}

fn record(stats: &mut LoopStats, done: Result<bool, tokio::task::JoinError>) {
    match done {
        Ok(true) => stats.applied += 1,
        Ok(false) => {}
        Err(err) => warn!("event task failed: {err:?}"),
    }
}

/// Decode newline-delimited JSON envelopes from a blocking reader and send
/// them on `tx`. Blank and undecodable lines are skipped. Stops at EOF, on a
/// read error, or once the receiver is gone. Returns how many were sent.
///
/// Must run off the async runtime, e.g. on a dedicated thread.
pub fn read_envelope_lines<R: BufRead>(input: R, tx: &mpsc::Sender<Envelope>) -> u64 {
    let mut sent = 0;
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("input read failed: {err:?}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => {
                if tx.blocking_send(envelope).is_err() {
                    break;
                }
                sent += 1;
            }
            Err(err) => warn!("skipping undecodable envelope: {err}"),
        }
    }
    sent
}

pub fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
