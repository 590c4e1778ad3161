use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use appmetrics::config::Config;
use appmetrics::directory::CloudControllerDirectory;
use appmetrics::enrich::IdentityResolver;
use appmetrics::pipeline::{read_envelope_lines, run_event_loop, Engine};
use appmetrics::reconcile::{run_reconcile_loop, ReconcileContext};
use appmetrics::store::AppStore;
use appmetrics::types::Envelope;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let cfg_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Config::load(cfg_path)?;
    info!(
        "starting appmetrics api={} max_in_flight={} reconcile_interval_secs={}",
        cfg.api_url, cfg.max_in_flight, cfg.reconcile_interval_secs
    );

    let directory = Arc::new(CloudControllerDirectory::new(
        &cfg.api_url,
        &cfg.api_token,
        cfg.http_timeout(),
    )?);
    let store = Arc::new(AppStore::new());
    let resolver = Arc::new(IdentityResolver::new(directory));
    let engine = Arc::new(Engine::new(store.clone(), resolver.clone()));

    let (stop_tx, stop_rx) = watch::channel(false);
    let reconcile_ctx = ReconcileContext {
        store: store.clone(),
        resolver,
    };
    let reconcile = tokio::spawn(run_reconcile_loop(
        reconcile_ctx,
        cfg.reconcile_interval(),
        stop_rx.clone(),
    ));
    let summary = tokio::spawn(log_summaries(store.clone(), cfg.clone(), stop_rx));

    let (tx, rx) = mpsc::channel::<Envelope>(cfg.event_buffer);
    let events = tokio::spawn(run_event_loop(engine, rx, cfg.max_in_flight));
    let (line_tx, line_rx) = mpsc::channel::<Envelope>(cfg.event_buffer);
    spawn_stdin_reader(line_tx)?;
    let mut reader = tokio::spawn(forward_envelopes(line_rx, tx));

    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("shutdown signal received");
            reader.abort();
        }
        _ = &mut reader => {
            info!("input stream closed");
        }
    }

    // The forwarder owned the only sender; the loop drains and returns.
    let stats = events.await?;
    info!(
        "events drained: received={} applied={}",
        stats.received, stats.applied
    );

    let _ = stop_tx.send(true);
    let _ = reconcile.await;
    let _ = summary.await;
    info!("final store size: {} apps", store.len());
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();
}

/// Read stdin on a dedicated thread. A read still blocked at exit is
/// abandoned with the process.
fn spawn_stdin_reader(tx: mpsc::Sender<Envelope>) -> Result<()> {
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let sent = read_envelope_lines(io::stdin().lock(), &tx);
            info!("stdin reader finished after {sent} envelopes");
        })
        .context("spawning stdin reader")?;
    Ok(())
}

/// Hand decoded envelopes to the event loop. Aborting this task drops the
/// loop's only sender, so shutdown does not wait on stdin.
async fn forward_envelopes(mut rx: mpsc::Receiver<Envelope>, tx: mpsc::Sender<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        if tx.send(envelope).await.is_err() {
            break;
        }
    }
}

async fn log_summaries(store: Arc<AppStore>, cfg: Config, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(cfg.summary_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        let snapshot = store.snapshot();
        let events: u64 = snapshot.iter().map(|(_, a)| a.event_count).sum();
        let errors: u64 = snapshot.iter().map(|(_, a)| a.http_error_count).sum();
        info!(
            "store summary: apps={} events={} http_errors={}",
            snapshot.len(),
            events,
            errors
        );
    }
}
