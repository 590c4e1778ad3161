//! Per-field update rules applied to an [`AppDetail`] inside a store update,
//! plus the reconciliation merge.

use tracing::debug;

use crate::types::{AppDetail, EnvironmentSummary, Identity, Instance};

/// Substring marking a garbage-collector log line.
pub const GC_MARKER: &str = "[GC";

/// Highest instance count an aggregate will grow to. Indexes at or above it
/// are ignored.
pub const MAX_INSTANCES: usize = 1024;

const MS_PER_SEC: i64 = 1000;

/// Requests per second over the whole feed. Zero until a full second has elapsed.
pub fn request_rate(event_count: u64, seconds_since_start: i64) -> f64 {
    if seconds_since_start <= 0 {
        return 0.0;
    }
    event_count as f64 / seconds_since_start as f64
}

/// A router log line was observed for this app.
pub fn record_request(
    app: &mut AppDetail,
    app_id: &str,
    identity: &Identity,
    now_ms: i64,
    started_ms: i64,
) {
    app.organization.name = identity.org_name.clone();
    app.organization.id = identity.org_id.clone();
    app.space.name = identity.space_name.clone();
    app.space.id = identity.space_id.clone();
    app.name = identity.app_name.clone();
    app.guid = app_id.to_string();

    app.event_count += 1;
    app.elapsed_since_last_event = if app.last_event_time > 0 {
        (now_ms - app.last_event_time).max(0) / MS_PER_SEC
    } else {
        0
    };
    app.last_event_time = now_ms;

    let seconds_since_start = (now_ms - started_ms) / MS_PER_SEC;
    app.requests_per_second = request_rate(app.event_count, seconds_since_start);
}

/// Attach a GC log line to an existing instance. Returns false when the
/// instance is not known yet; the sequence is never grown here.
pub fn record_gc_log(app: &mut AppDetail, index: usize, message: &str) -> bool {
    match app.instances.get_mut(index) {
        Some(instance) => {
            instance.gc_stats = message.to_string();
            true
        }
        None => false,
    }
}

/// Write one instance's latest resource readings and refresh the totals.
/// A negative index, or one at or above [`MAX_INSTANCES`], leaves instances
/// untouched.
pub fn record_container_metrics(
    app: &mut AppDetail,
    index: i32,
    cell_ip: &str,
    cpu_percentage: f64,
    memory_bytes: u64,
    disk_bytes: u64,
) {
    match usize::try_from(index) {
        Ok(index) if index < MAX_INSTANCES => {
            ensure_instance(app, index);
            let instance = &mut app.instances[index];
            instance.cell_ip = cell_ip.to_string();
            instance.cpu_usage = cpu_percentage;
            instance.memory_usage = memory_bytes;
            instance.disk_usage = disk_bytes;
        }
        _ => debug!("container metric for {}: instance index {index} ignored", app.guid),
    }
    app.environment_summary = summarize(&app.instances);
}

/// 5xx and 400 count as errors; everything else is a good response.
pub fn is_http_error(status_code: i32) -> bool {
    status_code / 100 == 5 || status_code == 400
}

pub fn record_http(app: &mut AppDetail, status_code: i32) {
    if is_http_error(status_code) {
        app.http_error_count += 1;
    } else {
        app.http_good_count += 1;
    }
}

/// Sum of every instance's latest stored readings.
pub fn summarize(instances: &[Instance]) -> EnvironmentSummary {
    instances
        .iter()
        .fold(EnvironmentSummary::default(), |mut acc, i| {
            acc.total_cpu += i.cpu_usage;
            acc.total_memory_usage = acc.total_memory_usage.saturating_add(i.memory_usage);
            acc.total_disk_usage = acc.total_disk_usage.saturating_add(i.disk_usage);
            acc
        })
}

fn ensure_instance(app: &mut AppDetail, index: usize) {
    while app.instances.len() <= index {
        let next = app.instances.len() as u32;
        app.instances.push(Instance {
            index: next,
            ..Instance::default()
        });
    }
}

/// Combine the stored aggregate with a freshly annotated one from the directory.
///
/// Precedence:
/// - identity, state, buildpack and instance topology come from `fresh`;
/// - for each fresh instance, a non-empty `cell_ip` of the old instance with
///   the same index wins, every other instance field comes from `fresh`;
///   old instances missing from the fresh topology are dropped together with
///   their `cell_ip`, so a stopped app (empty topology) forgets every host
///   until its next container metric;
/// - event and HTTP counters, rate and event timing come from `old`;
/// - the environment summary is recomputed from the merged instances.
pub fn merge(old: &AppDetail, fresh: AppDetail) -> AppDetail {
    let mut merged = fresh;

    for instance in merged.instances.iter_mut() {
        let previous = old
            .instances
            .get(instance.index as usize)
            .filter(|prev| prev.index == instance.index);
        if let Some(prev) = previous {
            if !prev.cell_ip.is_empty() {
                instance.cell_ip = prev.cell_ip.clone();
            }
        }
    }

    merged.event_count = old.event_count;
    merged.http_good_count = old.http_good_count;
    merged.http_error_count = old.http_error_count;
    merged.requests_per_second = old.requests_per_second;
    merged.last_event_time = old.last_event_time;
    merged.elapsed_since_last_event = old.elapsed_since_last_event;
    merged.environment_summary = summarize(&merged.instances);
    merged
}
