//! Envelope normalization.
//! Turns one decoded envelope into a uniform [`Event`]; unrecognized kinds are dropped.

use uuid::Uuid;

use crate::types::{Envelope, Event, EventPayload, EventType, Identity, WireUuid};

/// Normalize an envelope. Returns `None` for kinds the engine does not aggregate,
/// for envelopes missing the payload their kind announces, and for HTTP
/// completions that carry no application id.
pub fn normalize(envelope: Envelope) -> Option<Event> {
    match envelope.event_type {
        EventType::LogMessage => {
            let log = envelope.log_message?;
            Some(Event {
                origin: envelope.origin,
                app_id: log.app_id,
                timestamp: log.timestamp,
                identity: Identity::default(),
                payload: EventPayload::Log {
                    message: log.message,
                    message_type: log.message_type,
                    source_type: log.source_type,
                    source_instance: log.source_instance,
                },
            })
        }
        EventType::ContainerMetric => {
            let metric = envelope.container_metric?;
            Some(Event {
                origin: envelope.origin,
                app_id: metric.application_id,
                timestamp: envelope.timestamp,
                identity: Identity::default(),
                payload: EventPayload::ContainerMetric {
                    cell_ip: envelope.ip.unwrap_or_default(),
                    instance_index: metric.instance_index,
                    cpu_percentage: metric.cpu_percentage,
                    memory_bytes: metric.memory_bytes,
                    disk_bytes: metric.disk_bytes,
                },
            })
        }
        EventType::HttpStartStop => {
            let http = envelope.http_start_stop?;
            let app_id = http.application_id?;
            Some(Event {
                origin: envelope.origin,
                app_id: uuid_string(app_id),
                timestamp: http.stop_timestamp,
                identity: Identity::default(),
                payload: EventPayload::Http {
                    status_code: http.status_code,
                },
            })
        }
        EventType::Unknown => None,
    }
}

/// Render a wire UUID in canonical lowercase 8-4-4-4-12 form.
/// Both halves are laid out little-endian, `low` first.
pub fn uuid_string(id: WireUuid) -> String {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&id.low.to_le_bytes());
    bytes[8..].copy_from_slice(&id.high.to_le_bytes());
    Uuid::from_bytes(bytes).hyphenated().to_string()
}
