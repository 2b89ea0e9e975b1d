use super::asctime;
use crate::domain::{ForwarderError, Sample};
use crate::forwarder::{BatchEncoder, OutboundRequest};
use crate::sender::{Backend, PreparedRequest, RequestContext, SendError, SendOptions, SendOutcome};
use serde::Serialize;
use serde_json::{Map, Value};

const SOURCE: &str = "collectd";

/// Posts samples to the metering service, one request per meter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeteringBackend;

impl MeteringBackend {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Serialize)]
struct MeteringSample<'a> {
    counter_name: &'a str,
    counter_type: &'static str,
    counter_unit: &'a str,
    counter_volume: Option<f64>,
    timestamp: String,
    resource_metadata: Option<&'a Map<String, Value>>,
    source: &'static str,
    resource_id: &'a str,
}

impl<'a> From<&'a Sample> for MeteringSample<'a> {
    fn from(sample: &'a Sample) -> Self {
        Self {
            counter_name: sample.meter_name(),
            counter_type: sample.kind().as_str(),
            counter_unit: sample.unit(),
            counter_volume: sample.value(),
            timestamp: asctime(sample.timestamp()),
            resource_metadata: sample.metadata(),
            source: SOURCE,
            resource_id: sample.resource_id(),
        }
    }
}

impl Backend for MeteringBackend {
    const SERVICE: &'static str = "ceilometer";

    fn derive_resource_name(&self, _meter_name: &str, _options: &SendOptions) -> Option<String> {
        None
    }

    async fn build_request_url(
        &self,
        ctx: &RequestContext<'_>,
        meter_name: &str,
        payload: &str,
        _options: &SendOptions,
    ) -> Result<Option<PreparedRequest>, SendError> {
        Ok(Some(PreparedRequest::post(
            format!("{}/v2/meters/{}", ctx.endpoint, meter_name),
            payload,
        )))
    }

    async fn handle_not_found(
        &self,
        _ctx: &RequestContext<'_>,
        error: SendError,
        _meter_name: &str,
        _payload: &str,
        _options: &SendOptions,
    ) -> Result<SendOutcome, SendError> {
        Err(error)
    }
}

impl BatchEncoder for MeteringBackend {
    fn batch_key(&self, sample: &Sample) -> String {
        sample.meter_name().to_string()
    }

    fn encode(&self, samples: &[Sample]) -> Result<Vec<OutboundRequest>, ForwarderError> {
        let Some(first) = samples.first() else {
            return Ok(Vec::new());
        };
        let body: Vec<MeteringSample<'_>> = samples.iter().map(MeteringSample::from).collect();

        Ok(vec![OutboundRequest {
            meter_name: first.meter_name().to_string(),
            payload: serde_json::to_string(&body)?,
            options: SendOptions::default(),
        }])
    }
}
