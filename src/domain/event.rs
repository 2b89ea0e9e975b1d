use super::{ForwarderError, Sample, SampleKind, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Unit used when neither `plugin.type` nor `plugin` has a configured unit.
pub const UNKNOWN_UNIT: &str = "None";

/// Fields identifying where an event came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventIdentity {
    pub host: String,
    pub plugin: String,
    #[serde(default)]
    pub plugin_instance: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default)]
    pub type_instance: String,
}

impl EventIdentity {
    /// `plugin.type`, skipping empty parts.
    pub fn meter_name(&self) -> String {
        [self.plugin.as_str(), self.type_name.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `host-plugin_instance-type_instance`, skipping empty parts.
    pub fn resource_id(&self) -> String {
        [
            self.host.as_str(),
            self.plugin_instance.as_str(),
            self.type_instance.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("-")
    }

    pub fn unit(&self, units: &HashMap<String, String>) -> String {
        if !self.type_name.is_empty()
            && let Some(unit) = units.get(&format!("{}.{}", self.plugin, self.type_name))
        {
            return unit.clone();
        }
        units
            .get(&self.plugin)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_UNIT.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuesEvent {
    #[serde(flatten)]
    pub identity: EventIdentity,
    /// Unix time in seconds.
    pub time: f64,
    #[serde(default)]
    pub values: Vec<f64>,
    /// collectd data source type (`gauge`, `derive`, `counter`, `absolute`)
    #[serde(default)]
    pub dstype: Option<String>,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Failure,
    Warning,
    Okay,
}

impl From<NotificationSeverity> for Severity {
    fn from(severity: NotificationSeverity) -> Self {
        match severity {
            NotificationSeverity::Failure => Severity::Critical,
            NotificationSeverity::Warning => Severity::Moderate,
            NotificationSeverity::Okay => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(flatten)]
    pub identity: EventIdentity,
    pub time: f64,
    #[serde(default)]
    pub severity: Option<NotificationSeverity>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
}

/// An event handed over by the collector adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Event {
    Values(ValuesEvent),
    Notification(NotificationEvent),
}

impl Event {
    /// Converts the event into samples: one per value for measurements,
    /// exactly one for a notification.
    pub fn to_samples(&self, units: &HashMap<String, String>) -> Result<Vec<Sample>, ForwarderError> {
        match self {
            Event::Values(event) => {
                let timestamp = unix_time(event.time)?;
                let meter_name = event.identity.meter_name();
                let resource_id = event.identity.resource_id();
                let unit = event.identity.unit(units);
                let kind = event
                    .dstype
                    .as_deref()
                    .map(SampleKind::from_data_source)
                    .unwrap_or_default();

                event
                    .values
                    .iter()
                    .map(|value| {
                        Sample::measurement(
                            meter_name.clone(),
                            resource_id.clone(),
                            *value,
                            timestamp,
                            unit.clone(),
                            kind,
                        )
                        .map(|sample| sample.with_metadata(event.meta.clone()))
                    })
                    .collect()
            }
            Event::Notification(event) => {
                let timestamp = unix_time(event.time)?;
                let severity = event.severity.map(Severity::from).unwrap_or_default();
                let sample = Sample::notification(
                    event.identity.meter_name(),
                    event.identity.resource_id(),
                    timestamp,
                    severity,
                    event.message.clone(),
                )?
                .with_metadata(event.meta.clone());
                Ok(vec![sample])
            }
        }
    }
}

fn unix_time(seconds: f64) -> Result<DateTime<Utc>, ForwarderError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ForwarderError::InvalidEvent(format!(
            "invalid timestamp {seconds}"
        )));
    }
    let secs = seconds.trunc() as i64;
    let nanos = (seconds.fract() * 1e9).round() as u32;
    DateTime::from_timestamp(secs, nanos.min(999_999_999))
        .ok_or_else(|| ForwarderError::InvalidEvent(format!("timestamp out of range: {seconds}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> EventIdentity {
        EventIdentity {
            host: "host-a".to_string(),
            plugin: "cpu".to_string(),
            plugin_instance: "0".to_string(),
            type_name: "freq".to_string(),
            type_instance: String::new(),
        }
    }

    #[test]
    fn test_meter_and_resource_naming() {
        let id = identity();
        assert_eq!(id.meter_name(), "cpu.freq");
        assert_eq!(id.resource_id(), "host-a-0");

        let bare = EventIdentity {
            host: "host-b".to_string(),
            plugin: "load".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.meter_name(), "load");
        assert_eq!(bare.resource_id(), "host-b");
    }

    #[test]
    fn test_unit_lookup_prefers_plugin_type() {
        let mut units = HashMap::new();
        units.insert("cpu".to_string(), "jiffies".to_string());
        units.insert("cpu.freq".to_string(), "MHz".to_string());

        assert_eq!(identity().unit(&units), "MHz");
        units.remove("cpu.freq");
        assert_eq!(identity().unit(&units), "jiffies");
        assert_eq!(identity().unit(&HashMap::new()), UNKNOWN_UNIT);
    }

    #[test]
    fn test_values_event_yields_one_sample_per_value() {
        let raw = r#"{"kind":"values","host":"host-a","plugin":"cpu","plugin_instance":"0",
                      "type":"freq","time":1443092594.5,"values":[1.0,2.0,3.0],"dstype":"derive"}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        let samples = event.to_samples(&HashMap::new()).unwrap();

        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.meter_name() == "cpu.freq"));
        assert!(samples.iter().all(|s| s.kind() == SampleKind::Delta));
        assert_eq!(samples[2].value(), Some(3.0));
        assert_eq!(samples[0].timestamp().timestamp(), 1443092594);
    }

    #[test]
    fn test_notification_event_yields_single_sample() {
        let raw = r#"{"kind":"notification","host":"host-a","plugin":"link","type":"status",
                      "time":1443092594,"severity":"failure","message":"value is above 1"}"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        let samples = event.to_samples(&HashMap::new()).unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].meter_name(), "link.status");
        assert_eq!(samples[0].resource_id(), "host-a");
        assert_eq!(samples[0].severity(), Severity::Critical);
    }

    #[test]
    fn test_negative_time_is_rejected() {
        let event = Event::Values(ValuesEvent {
            identity: identity(),
            time: -1.0,
            values: vec![1.0],
            dstype: None,
            meta: None,
        });
        assert!(matches!(
            event.to_samples(&HashMap::new()),
            Err(ForwarderError::InvalidEvent(_))
        ));
    }
}
