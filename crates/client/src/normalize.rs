//! Turns raw transport frames into validated event units and routes them
//! to the producer table and the event log.
//!
//! Decoding is all-or-nothing per frame: a snapshot is fully validated
//! before any of its sub-messages is applied.

use chrono::{DateTime, Utc};
use hubview_shared::{ClientError, InboundMessage, SNAPSHOT_TYPE, UNKNOWN_BUCKET};
use serde_json::Value;

use crate::aggregator::ProducerTable;
use crate::event_log::{EventLog, LogEntry, LogKind};

/// A frame as delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// One validated message, ready for the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUnit {
    pub event_type: String,
    pub producer_id: String,
    pub display_name: Option<String>,
    /// Producer-side timestamp, if the producer sent one.
    pub timestamp: Option<f64>,
    /// The full message this unit was decoded from.
    pub raw: Value,
}

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Single(EventUnit),
    Snapshot {
        producer_id: Option<String>,
        units: Vec<EventUnit>,
    },
}

/// What a successfully handled frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleOutcome {
    pub units_applied: usize,
    pub snapshot: bool,
}

/// Decode, apply and log one frame.
///
/// Errors are appended to `log` before being returned; they never leave
/// partial state behind in `producers`.
pub fn handle(
    frame: Frame,
    received_at: DateTime<Utc>,
    producers: &mut ProducerTable,
    log: &mut EventLog,
) -> Result<HandleOutcome, ClientError> {
    let decoded = match decode(frame) {
        Ok(decoded) => decoded,
        Err(err) => {
            let mut entry = LogEntry::new(LogKind::Error, received_at, err.to_string());
            if let ClientError::MalformedPayload { raw, .. } = &err {
                entry = entry.with_raw(raw.clone());
            }
            log.append(entry);
            return Err(err);
        }
    };

    match decoded {
        Decoded::Single(unit) => {
            apply_unit(&unit, received_at, producers, log);
            Ok(HandleOutcome {
                units_applied: 1,
                snapshot: false,
            })
        }
        Decoded::Snapshot { producer_id, units } => {
            for unit in &units {
                apply_unit(unit, received_at, producers, log);
            }
            let types: Vec<&str> = units.iter().map(|u| u.event_type.as_str()).collect();
            let mut entry = LogEntry::new(
                LogKind::Info,
                received_at,
                format!("snapshot with {} types: {}", units.len(), types.join(", ")),
            );
            if let Some(producer_id) = producer_id {
                entry = entry.with_producer(producer_id);
            }
            log.append(entry);
            Ok(HandleOutcome {
                units_applied: units.len(),
                snapshot: true,
            })
        }
    }
}

fn apply_unit(
    unit: &EventUnit,
    received_at: DateTime<Utc>,
    producers: &mut ProducerTable,
    log: &mut EventLog,
) {
    let record = producers.apply(unit, received_at);
    let summary = format!("{} from {}", unit.event_type, record.label());
    log.append(
        LogEntry::new(LogKind::Event, received_at, summary)
            .with_raw(unit.raw.to_string())
            .with_producer(unit.producer_id.clone()),
    );
}

/// Validate a frame into a closed set of shapes.
pub fn decode(frame: Frame) -> Result<Decoded, ClientError> {
    let text = match frame {
        Frame::Text(text) => text,
        Frame::Binary(bytes) => {
            return Err(ClientError::UnsupportedFrame(format!(
                "binary frame of {} bytes",
                bytes.len()
            )))
        }
    };

    let malformed = |reason: String| ClientError::MalformedPayload {
        reason,
        raw: text.clone(),
    };

    let value: Value = serde_json::from_str(&text).map_err(|e| malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(malformed("expected a JSON object".to_string()));
    }
    let message: InboundMessage =
        serde_json::from_value(value.clone()).map_err(|e| malformed(e.to_string()))?;

    if !message.is_snapshot() {
        return Ok(Decoded::Single(unit_from(message, value, None)));
    }

    let Some(Value::Object(entries)) = &message.data else {
        return Err(malformed(format!(
            "{SNAPSHOT_TYPE} data must be an object of messages"
        )));
    };

    let mut units = Vec::with_capacity(entries.len());
    for (key, sub_value) in entries {
        if !sub_value.is_object() {
            return Err(malformed(format!("{SNAPSHOT_TYPE} entry '{key}' is not an object")));
        }
        let mut sub: InboundMessage = serde_json::from_value(sub_value.clone())
            .map_err(|e| malformed(format!("{SNAPSHOT_TYPE} entry '{key}': {e}")))?;
        if sub.kind.is_none() {
            sub.kind = Some(key.clone());
        }
        if sub.publisher_id.is_none() {
            sub.publisher_id = message.publisher_id.clone();
        }
        if sub.player_name.is_none() {
            sub.player_name = message.player_name.clone();
        }
        units.push(unit_from(sub, sub_value.clone(), Some(key)));
    }

    Ok(Decoded::Snapshot {
        producer_id: message.publisher_id,
        units,
    })
}

fn unit_from(message: InboundMessage, mut raw: Value, snapshot_key: Option<&str>) -> EventUnit {
    let event_type = non_empty(message.kind).unwrap_or_else(|| UNKNOWN_BUCKET.to_string());
    let producer_id = non_empty(message.publisher_id).unwrap_or_else(|| UNKNOWN_BUCKET.to_string());

    // Sub-messages are stored as full messages, so fill in what they inherited.
    if snapshot_key.is_some() {
        if let Value::Object(map) = &mut raw {
            map.entry("type")
                .or_insert_with(|| Value::String(event_type.clone()));
            if producer_id != UNKNOWN_BUCKET {
                map.entry("publisherId")
                    .or_insert_with(|| Value::String(producer_id.clone()));
            }
            if let Some(name) = &message.player_name {
                map.entry("playerName")
                    .or_insert_with(|| Value::String(name.clone()));
            }
        }
    }

    EventUnit {
        event_type,
        producer_id,
        display_name: message.player_name,
        timestamp: message.timestamp,
        raw,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
