use std::fmt;

use serde::{Deserialize, Serialize};

/// A decoded telemetry envelope as delivered by the platform's event stream.
///
/// Exactly one payload field matching `event_type` is expected to be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub origin: String,
    pub event_type: EventType,
    /// Address of the host that emitted the envelope.
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub log_message: Option<LogMessage>,
    #[serde(default)]
    pub container_metric: Option<ContainerMetric>,
    #[serde(default)]
    pub http_start_stop: Option<HttpStartStop>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    LogMessage,
    ContainerMetric,
    HttpStartStop,
    /// Value metrics, counters, errors and anything newer than this crate.
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub source_instance: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    #[default]
    Out,
    Err,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Out => f.write_str("OUT"),
            MessageType::Err => f.write_str("ERR"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMetric {
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub instance_index: i32,
    #[serde(default)]
    pub cpu_percentage: f64,
    #[serde(default)]
    pub memory_bytes: u64,
    #[serde(default)]
    pub disk_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpStartStop {
    #[serde(default)]
    pub start_timestamp: i64,
    #[serde(default)]
    pub stop_timestamp: i64,
    #[serde(default)]
    pub status_code: i32,
    #[serde(default)]
    pub application_id: Option<WireUuid>,
}

/// UUID split into two little-endian 64-bit halves, as carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireUuid {
    pub low: u64,
    pub high: u64,
}

/// Normalized telemetry record, annotated with the owning application's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub origin: String,
    pub app_id: String,
    pub timestamp: i64,
    pub identity: Identity,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Log {
        message: String,
        message_type: MessageType,
        source_type: String,
        source_instance: String,
    },
    ContainerMetric {
        cell_ip: String,
        instance_index: i32,
        cpu_percentage: f64,
        memory_bytes: u64,
        disk_bytes: u64,
    },
    Http {
        status_code: i32,
    },
}

impl Event {
    pub fn key(&self) -> AppKey {
        AppKey::new(
            &self.identity.org_name,
            &self.identity.space_name,
            &self.identity.app_name,
        )
    }
}

/// Organization/space/application names resolved from a GUID. Empty fields are unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub app_name: String,
    pub org_name: String,
    pub org_id: String,
    pub space_name: String,
    pub space_id: String,
}

/// Directory record for one application, as held in the identity cache and the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub guid: String,
    pub name: String,
    pub space_guid: String,
    pub space_name: String,
    pub org_guid: String,
    pub org_name: String,
}

impl AppInfo {
    pub fn identity(&self) -> Identity {
        Identity {
            app_name: self.name.clone(),
            org_name: self.org_name.clone(),
            org_id: self.org_guid.clone(),
            space_name: self.space_name.clone(),
            space_id: self.space_guid.clone(),
        }
    }

    pub fn key(&self) -> AppKey {
        AppKey::new(&self.org_name, &self.space_name, &self.name)
    }
}

/// Store key `"{org}/{space}/{app}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppKey(String);

impl AppKey {
    pub fn new(org: &str, space: &str, app: &str) -> Self {
        Self(format!("{org}/{space}/{app}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Named {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub index: u32,
    pub cell_ip: String,
    pub state: String,
    pub uptime: u64,
    pub cpu_usage: f64,
    pub memory_usage: u64,
    pub disk_usage: u64,
    pub gc_stats: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub total_cpu: f64,
    pub total_memory_usage: u64,
    pub total_disk_usage: u64,
}

/// Accumulated runtime state of one application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppDetail {
    pub guid: String,
    pub name: String,
    pub organization: Named,
    pub space: Named,
    pub state: String,
    pub buildpack: String,
    pub desired_instances: u32,
    pub instances: Vec<Instance>,
    pub event_count: u64,
    pub http_good_count: u64,
    pub http_error_count: u64,
    pub requests_per_second: f64,
    /// Milliseconds since the Unix epoch.
    pub last_event_time: i64,
    pub elapsed_since_last_event: i64,
    pub environment_summary: EnvironmentSummary,
}

impl AppDetail {
    pub fn stub(guid: &str, name: &str) -> Self {
        Self {
            guid: guid.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }
}
