use super::ForwarderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the metering service should interpret a sample's volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    #[default]
    Gauge,
    Delta,
    Cumulative,
}

impl SampleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Gauge => "gauge",
            SampleKind::Delta => "delta",
            SampleKind::Cumulative => "cumulative",
        }
    }

    /// Maps a collectd data source type onto a sample kind.
    /// Unknown types fall back to `Gauge`.
    pub fn from_data_source(dstype: &str) -> Self {
        match dstype.to_ascii_lowercase().as_str() {
            "derive" => SampleKind::Delta,
            "absolute" | "counter" => SampleKind::Cumulative,
            _ => SampleKind::Gauge,
        }
    }
}

/// Alarm severity understood by the alarm service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    Critical,
    #[default]
    Unset,
}

impl Severity {
    /// Severity written into a new alarm definition. `Unset` becomes `moderate`.
    pub fn alarm_severity(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate | Severity::Unset => "moderate",
            Severity::Critical => "critical",
        }
    }
}

/// Remote alarm state derived from a notification message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    #[serde(rename = "alarm")]
    Alarm,
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "insufficient data")]
    InsufficientData,
}

impl AlarmState {
    /// A message mentioning a value `above` a threshold raises the alarm,
    /// one `within` the thresholds clears it; anything else is undecided.
    pub fn from_message(message: &str) -> Self {
        let words: Vec<&str> = message.split_whitespace().collect();
        if words.contains(&"above") {
            AlarmState::Alarm
        } else if words.contains(&"within") {
            AlarmState::Ok
        } else {
            AlarmState::InsufficientData
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Alarm => "alarm",
            AlarmState::Ok => "ok",
            AlarmState::InsufficientData => "insufficient data",
        }
    }
}

/// One measurement or notification unit.
///
/// Fields are private so a sample cannot change after construction; both
/// `meter_name` and `resource_id` are guaranteed non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    resource_id: String,
    meter_name: String,
    value: Option<f64>,
    timestamp: DateTime<Utc>,
    unit: String,
    kind: SampleKind,
    severity: Severity,
    message: String,
    metadata: Option<Map<String, Value>>,
}

impl Sample {
    /// Builds a numeric measurement for the metering and metric backends.
    pub fn measurement(
        meter_name: impl Into<String>,
        resource_id: impl Into<String>,
        value: f64,
        timestamp: DateTime<Utc>,
        unit: impl Into<String>,
        kind: SampleKind,
    ) -> Result<Self, ForwarderError> {
        Self::build(
            meter_name.into(),
            resource_id.into(),
            Some(value),
            timestamp,
            unit.into(),
            kind,
            Severity::Unset,
            String::new(),
        )
    }

    /// Builds a notification for the alarm backend.
    pub fn notification(
        meter_name: impl Into<String>,
        resource_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Result<Self, ForwarderError> {
        Self::build(
            meter_name.into(),
            resource_id.into(),
            None,
            timestamp,
            String::new(),
            SampleKind::Gauge,
            severity,
            message.into(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        meter_name: String,
        resource_id: String,
        value: Option<f64>,
        timestamp: DateTime<Utc>,
        unit: String,
        kind: SampleKind,
        severity: Severity,
        message: String,
    ) -> Result<Self, ForwarderError> {
        if meter_name.is_empty() {
            return Err(ForwarderError::InvalidSample(
                "meter name must not be empty".to_string(),
            ));
        }
        if resource_id.is_empty() {
            return Err(ForwarderError::InvalidSample(format!(
                "resource id must not be empty (meter {meter_name})"
            )));
        }

        Ok(Self {
            resource_id,
            meter_name,
            value,
            timestamp,
            unit,
            kind,
            severity,
            message,
            metadata: None,
        })
    }

    /// Attaches opaque metadata. Consumes the sample so it stays immutable once shared.
    pub fn with_metadata(mut self, metadata: Option<Map<String, Value>>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn meter_name(&self) -> &str {
        &self.meter_name
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    /// Alarm state implied by this sample's message.
    pub fn alarm_state(&self) -> AlarmState {
        AlarmState::from_message(&self.message)
    }
}
