use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::aggregate::merge;
use crate::enrich::IdentityResolver;
use crate::store::AppStore;
use crate::types::AppDetail;

#[derive(Clone)]
pub struct ReconcileContext {
    pub store: Arc<AppStore>,
    pub resolver: Arc<IdentityResolver>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub roster_size: usize,
    pub registered: usize,
    pub failed: usize,
    /// True when the pass ended early on a stop signal.
    pub stopped: bool,
}

/// Rebuild the store from the authoritative roster on every tick until `stop`
/// flips to true or its sender is dropped.
pub async fn run_reconcile_loop(
    ctx: ReconcileContext,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }
        let report = reconcile_once(&ctx, &stop).await;
        if report.stopped {
            break;
        }
    }
    info!("reconcile: loop stopped");
}

/// One full pass over the roster. A failing entry is logged and skipped; the
/// stop signal is honored between entries, each of which is written atomically.
pub async fn reconcile_once(
    ctx: &ReconcileContext,
    stop: &watch::Receiver<bool>,
) -> ReconcileReport {
    let started = Instant::now();
    let mut report = ReconcileReport::default();
    info!("reconcile: start filling app/space/org cache");

    let roster = match ctx.resolver.directory().list_apps().await {
        Ok(roster) => roster,
        Err(err) => {
            warn!("reconcile: roster fetch failed: {err:?}");
            return report;
        }
    };
    report.roster_size = roster.len();

    for info in roster {
        if *stop.borrow() {
            report.stopped = true;
            info!(
                "reconcile: stop requested, {} entries left",
                report.roster_size - report.registered - report.failed
            );
            break;
        }

        let key = info.key();
        let stub = AppDetail::stub(&info.guid, &info.name);
        ctx.resolver.prime(info);

        let fresh = match ctx.resolver.directory().annotate(stub).await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!("reconcile: annotate {} failed: {err:?}", key);
                report.failed += 1;
                continue;
            }
        };

        ctx.store.update(&key, |current| {
            *current = merge(current, fresh);
        });
        report.registered += 1;
        info!("registered [{}]", key);
    }

    info!(
        "reconcile: done filling cache, found [{}] apps registered={} failed={} elapsed_ms={}",
        report.roster_size,
        report.registered,
        report.failed,
        started.elapsed().as_millis()
    );
    report
}
