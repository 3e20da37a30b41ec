// ── Push event merging ──
//
// Translates push channel events into `MeterUpdate` merges. The store
// is the only consumer; this file owns the topic grammar and the payload
// leniency rules.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use meterdeck_api::PushEvent;
use meterdeck_api::models::value_as_f64;

use super::data_store::{MergeOutcome, MeterStore};
use crate::convert::{clean_name, discovery_update, parse_timestamp};
use crate::model::{MacAddress, MeterStatus, MeterUpdate, PowerState};

/// Which kind of MQTT topic a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Status,
    Data,
}

/// Split `[prefix/]<mac>/status` or `[prefix/]<mac>/data` into identity and
/// kind. Anything else is not a meter topic.
pub fn parse_topic(topic: &str) -> Option<(MacAddress, TopicKind)> {
    let mut segments = topic.trim_matches('/').rsplit('/');
    let kind = match segments.next()? {
        "status" => TopicKind::Status,
        "data" => TopicKind::Data,
        _ => return None,
    };
    let mac = segments.next().filter(|s| !s.trim().is_empty())?;
    Some((MacAddress::new(mac), kind))
}

/// `{status}` object or a bare status string. Missing means unknown.
fn status_from_payload(payload: &Value) -> MeterStatus {
    match payload {
        Value::Object(map) => map
            .get("status")
            .and_then(Value::as_str)
            .map_or(MeterStatus::Unknown, MeterStatus::from_wire),
        Value::String(s) => MeterStatus::from_wire(s),
        _ => MeterStatus::Unknown,
    }
}

/// `{value}` object, a bare number, or a numeric string.
fn value_from_payload(payload: &Value) -> Option<f64> {
    match payload {
        Value::Object(map) => map.get("value").and_then(value_as_f64),
        other => value_as_f64(other),
    }
}

/// What applying one push event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The push connectivity flag flipped to this value.
    Connectivity(bool),
    /// One meter merge.
    Merged {
        mac: MacAddress,
        outcome: MergeOutcome,
    },
    /// A batch of discovered meters.
    Discovered { created: usize, updated: usize },
    /// Nothing in the store changed.
    Ignored(&'static str),
}

impl MeterStore {
    /// Fold one push event into the store. `now` stamps status and data
    /// messages, which carry no time of their own.
    pub fn apply_push_event(&self, event: &PushEvent, now: DateTime<Utc>) -> PushOutcome {
        self.last_push_event.send_replace(Some(now));

        let outcome = match event {
            PushEvent::Connected => {
                self.set_push_connected(true);
                PushOutcome::Connectivity(true)
            }
            PushEvent::Disconnected => {
                self.set_push_connected(false);
                PushOutcome::Connectivity(false)
            }
            PushEvent::MqttMessage { topic, payload } => self.apply_mqtt(topic, payload, now),
            PushEvent::PowerStatus {
                mac,
                status,
                timestamp,
            } => match PowerState::from_wire(status) {
                Some(state) => {
                    let mac = MacAddress::new(mac);
                    let update = MeterUpdate::Power {
                        state,
                        at: timestamp.as_deref().and_then(parse_timestamp),
                    };
                    let outcome = self.merge(&mac, &update);
                    PushOutcome::Merged { mac, outcome }
                }
                None => PushOutcome::Ignored("unrecognized power status"),
            },
            PushEvent::MeterUpdated { mac, name, number } => {
                let name = clean_name(name.as_deref());
                let number = number.as_ref().and_then(|n| n.as_u32());
                if name.is_none() && number.is_none() {
                    PushOutcome::Ignored("meter update without name or number")
                } else {
                    let mac = MacAddress::new(mac);
                    let outcome = self.merge(&mac, &MeterUpdate::Info { name, number });
                    PushOutcome::Merged { mac, outcome }
                }
            }
            PushEvent::UnnamedMeters { meters, .. } => {
                let (mut created, mut updated) = (0, 0);
                for raw in meters {
                    match self.merge(&MacAddress::new(&raw.mac), &discovery_update(raw)) {
                        MergeOutcome::Created => created += 1,
                        MergeOutcome::Updated => updated += 1,
                        MergeOutcome::Unchanged | MergeOutcome::Dropped => {}
                    }
                }
                PushOutcome::Discovered { created, updated }
            }
            PushEvent::Other { name, .. } => {
                trace!(event = %name, "unhandled push event");
                PushOutcome::Ignored("unhandled event")
            }
        };

        debug!(?outcome, "push event applied");
        outcome
    }

    fn apply_mqtt(&self, topic: &str, payload: &Value, now: DateTime<Utc>) -> PushOutcome {
        let Some((mac, kind)) = parse_topic(topic) else {
            return PushOutcome::Ignored("not a meter topic");
        };

        let update = match kind {
            TopicKind::Status => MeterUpdate::Status {
                status: status_from_payload(payload),
                seen_at: now,
            },
            TopicKind::Data => match value_from_payload(payload) {
                Some(value) => MeterUpdate::Reading { value, at: now },
                None => return PushOutcome::Ignored("data without numeric value"),
            },
        };

        let outcome = self.merge(&mac, &update);
        PushOutcome::Merged { mac, outcome }
    }
}
