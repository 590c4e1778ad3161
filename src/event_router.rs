//! Event routing.
//! Decides which aggregate update an enriched event triggers, then applies it
//! to the store under the event's application key.

use tracing::debug;

use crate::aggregate::{self, GC_MARKER};
use crate::store::AppStore;
use crate::types::{Event, EventPayload};

/// Gorouter access log lines.
pub const SOURCE_ROUTER: &str = "RTR";
/// Application stdout/stderr; newer platforms suffix the process type (`APP/PROC/WEB`).
pub const SOURCE_APP: &str = "APP";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Request,
    GcLog { index: usize },
    ContainerMetrics,
    Http,
}

pub fn is_app_source(source_type: &str) -> bool {
    source_type == SOURCE_APP
        || source_type
            .strip_prefix(SOURCE_APP)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Route an event. `None` means the event does not touch the store.
pub fn route(event: &Event) -> Option<Route> {
    match &event.payload {
        EventPayload::Log {
            message,
            source_type,
            source_instance,
            ..
        } => {
            if source_type == SOURCE_ROUTER {
                Some(Route::Request)
            } else if is_app_source(source_type) && message.contains(GC_MARKER) {
                source_instance
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .map(|index| Route::GcLog { index })
            } else {
                None
            }
        }
        EventPayload::ContainerMetric { .. } => Some(Route::ContainerMetrics),
        EventPayload::Http { .. } => Some(Route::Http),
    }
}

/// Apply a routed event to the store. Returns whether any field was written.
pub fn apply(store: &AppStore, event: &Event, route: Route, now_ms: i64, started_ms: i64) -> bool {
    let key = event.key();
    match (route, &event.payload) {
        (Route::Request, _) => {
            store.update(&key, |app| {
                aggregate::record_request(app, &event.app_id, &event.identity, now_ms, started_ms)
            });
            true
        }
        (Route::GcLog { index }, EventPayload::Log { message, .. }) => {
            let written = store.update(&key, |app| aggregate::record_gc_log(app, index, message));
            if written {
                debug!("gc stats set for {} instance {}", key, index);
            }
            written
        }
        (
            Route::ContainerMetrics,
            EventPayload::ContainerMetric {
                cell_ip,
                instance_index,
                cpu_percentage,
                memory_bytes,
                disk_bytes,
            },
        ) => {
            store.update(&key, |app| {
                aggregate::record_container_metrics(
                    app,
                    *instance_index,
                    cell_ip,
                    *cpu_percentage,
                    *memory_bytes,
                    *disk_bytes,
                )
            });
            true
        }
        (Route::Http, EventPayload::Http { status_code }) => {
            store.update(&key, |app| aggregate::record_http(app, *status_code));
            true
        }
        _ => false,
    }
}
