// ── Per-field meter updates ──
//
// Every incremental change to a meter goes through one of these variants.
// Each variant names exactly the fields it may touch; fields it does not
// name are left alone. Applying the same update twice is a no-op.

use chrono::{DateTime, Utc};

use super::{Meter, MeterStatus, PowerState};

/// A partial change to one meter.
#[derive(Debug, Clone, PartialEq)]
pub enum MeterUpdate {
    /// Connectivity report from the device.
    Status {
        status: MeterStatus,
        seen_at: DateTime<Utc>,
    },
    /// New cumulative reading.
    Reading { value: f64, at: DateTime<Utc> },
    /// Relay switched.
    Power {
        state: PowerState,
        at: Option<DateTime<Utc>>,
    },
    /// Display name and/or number changed. `None` leaves the field as is.
    Info {
        name: Option<String>,
        number: Option<u32>,
    },
    /// Seen by a discovery scan. The only variant allowed to create a
    /// meter the store does not know yet.
    Discovered {
        status: MeterStatus,
        last_seen: Option<DateTime<Utc>>,
        last_reading: Option<f64>,
        days_with_data: Option<u32>,
    },
}

impl MeterUpdate {
    /// Whether merging this update may insert a previously unknown meter.
    pub fn creates_entry(&self) -> bool {
        matches!(self, Self::Discovered { .. })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Reading { .. } => "reading",
            Self::Power { .. } => "power",
            Self::Info { .. } => "info",
            Self::Discovered { .. } => "discovered",
        }
    }
}

impl Meter {
    /// Shallow-merge `update` into this meter. Returns `true` if any field
    /// changed.
    pub fn apply(&mut self, update: &MeterUpdate) -> bool {
        let before = self.clone();

        match update {
            MeterUpdate::Status { status, seen_at } => {
                self.status = *status;
                self.last_seen = Some(*seen_at);
            }
            MeterUpdate::Reading { value, at } => {
                self.last_reading = Some(*value);
                self.last_reading_at = Some(*at);
            }
            MeterUpdate::Power { state, at } => {
                self.power = Some(*state);
                if at.is_some() {
                    self.power_changed_at = *at;
                }
            }
            MeterUpdate::Info { name, number } => {
                if let Some(name) = name {
                    self.name = Some(name.clone());
                }
                if number.is_some() {
                    self.number = *number;
                }
            }
            MeterUpdate::Discovered {
                status,
                last_seen,
                last_reading,
                days_with_data,
            } => {
                if *status != MeterStatus::Unknown {
                    self.status = *status;
                }
                if last_seen.is_some() {
                    self.last_seen = *last_seen;
                }
                if last_reading.is_some() {
                    self.last_reading = *last_reading;
                }
                if days_with_data.is_some() {
                    self.days_with_data = *days_with_data;
                }
            }
        }

        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MacAddress;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    fn meter() -> Meter {
        let mut m = Meter::new(MacAddress::new("aa:bb:cc:00:11:22"));
        m.name = Some("Kontor".into());
        m.number = Some(1);
        m.status = MeterStatus::Online;
        m
    }

    #[test]
    fn status_update_leaves_other_fields() {
        let mut m = meter();
        let changed = m.apply(&MeterUpdate::Status {
            status: MeterStatus::Offline,
            seen_at: at(100),
        });
        assert!(changed);
        assert_eq!(m.status, MeterStatus::Offline);
        assert_eq!(m.last_seen, Some(at(100)));
        assert_eq!(m.name.as_deref(), Some("Kontor"));
        assert_eq!(m.number, Some(1));
    }

    #[test]
    fn applying_twice_is_a_noop() {
        let update = MeterUpdate::Reading {
            value: 12.5,
            at: at(200),
        };
        let mut m = meter();
        assert!(m.apply(&update));
        let once = m.clone();
        assert!(!m.apply(&update));
        assert_eq!(m, once);
    }

    #[test]
    fn merges_fold_in_arrival_order() {
        let updates = [
            MeterUpdate::Reading {
                value: 1.0,
                at: at(1),
            },
            MeterUpdate::Info {
                name: Some("Værksted".into()),
                number: None,
            },
            MeterUpdate::Reading {
                value: 2.0,
                at: at(2),
            },
            MeterUpdate::Power {
                state: PowerState::Off,
                at: None,
            },
        ];
        let mut m = meter();
        for u in &updates {
            m.apply(u);
        }
        assert_eq!(m.last_reading, Some(2.0));
        assert_eq!(m.last_reading_at, Some(at(2)));
        assert_eq!(m.name.as_deref(), Some("Værksted"));
        assert_eq!(m.number, Some(1));
        assert_eq!(m.power, Some(PowerState::Off));
    }

    #[test]
    fn discovery_only_fills_known_values() {
        let mut m = meter();
        m.last_reading = Some(50.0);
        m.apply(&MeterUpdate::Discovered {
            status: MeterStatus::Unknown,
            last_seen: Some(at(5)),
            last_reading: None,
            days_with_data: Some(3),
        });
        assert_eq!(m.status, MeterStatus::Online);
        assert_eq!(m.last_reading, Some(50.0));
        assert_eq!(m.last_seen, Some(at(5)));
        assert_eq!(m.days_with_data, Some(3));
    }

    #[test]
    fn only_discovery_creates() {
        assert!(
            MeterUpdate::Discovered {
                status: MeterStatus::Online,
                last_seen: None,
                last_reading: None,
                days_with_data: None,
            }
            .creates_entry()
        );
        assert!(
            !MeterUpdate::Status {
                status: MeterStatus::Online,
                seen_at: at(0),
            }
            .creates_entry()
        );
    }
}
