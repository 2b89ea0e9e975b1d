use super::iso_timestamp;
use crate::domain::{ForwarderError, Sample, event::UNKNOWN_UNIT};
use crate::forwarder::{BatchEncoder, OutboundRequest};
use crate::resolver::{MetricResolver, metric_name};
use crate::sender::{Backend, PreparedRequest, RequestContext, SendError, SendOptions, SendOutcome};
use serde::Serialize;
use tracing::info;

/// Pushes measures to the metric service, creating metrics on first use.
#[derive(Debug, Default)]
pub struct MetricBackend {
    resolver: MetricResolver,
}

#[derive(Debug, Serialize)]
struct Measure {
    value: Option<f64>,
    timestamp: String,
}

impl MetricBackend {
    pub fn new(archive_policy: Option<String>) -> Self {
        Self {
            resolver: MetricResolver::new(archive_policy),
        }
    }

    pub fn resolver(&self) -> &MetricResolver {
        &self.resolver
    }

    fn metric_for(meter_name: &str, options: &SendOptions) -> Result<String, SendError> {
        options
            .resource_id
            .as_deref()
            .map(|resource_id| metric_name(resource_id, meter_name))
            .ok_or_else(|| {
                SendError::InvalidRequest(format!("no resource id for metric {meter_name}"))
            })
    }
}

impl Backend for MetricBackend {
    const SERVICE: &'static str = "gnocchi";

    fn derive_resource_name(&self, meter_name: &str, options: &SendOptions) -> Option<String> {
        Self::metric_for(meter_name, options).ok()
    }

    async fn build_request_url(
        &self,
        ctx: &RequestContext<'_>,
        meter_name: &str,
        payload: &str,
        options: &SendOptions,
    ) -> Result<Option<PreparedRequest>, SendError> {
        let name = Self::metric_for(meter_name, options)?;
        let unit = options.unit.as_deref().unwrap_or(UNKNOWN_UNIT);
        let resolved = self.resolver.get_or_create_id(ctx, &name, unit).await?;

        Ok(Some(PreparedRequest::post(
            format!("{}/v1/metric/{}/measures", ctx.endpoint, resolved.id),
            payload,
        )))
    }

    async fn handle_not_found(
        &self,
        ctx: &RequestContext<'_>,
        error: SendError,
        meter_name: &str,
        payload: &str,
        options: &SendOptions,
    ) -> Result<SendOutcome, SendError> {
        let Some(name) = self.derive_resource_name(meter_name, options) else {
            return Err(error);
        };
        info!(metric = %name, "Metric not found, creating it again");
        self.resolver.invalidate(&name);

        let Some(request) = self.build_request_url(ctx, meter_name, payload, options).await? else {
            return Ok(SendOutcome::Skipped);
        };
        let response = ctx.perform(&request).await?;
        Ok(SendOutcome::Delivered {
            status: response.status,
        })
    }
}

impl BatchEncoder for MetricBackend {
    fn batch_key(&self, sample: &Sample) -> String {
        metric_name(sample.resource_id(), sample.meter_name())
    }

    fn encode(&self, samples: &[Sample]) -> Result<Vec<OutboundRequest>, ForwarderError> {
        let Some(first) = samples.first() else {
            return Ok(Vec::new());
        };
        let measures: Vec<Measure> = samples
            .iter()
            .map(|sample| Measure {
                value: sample.value(),
                timestamp: iso_timestamp(sample.timestamp()),
            })
            .collect();

        Ok(vec![OutboundRequest {
            meter_name: first.meter_name().to_string(),
            payload: serde_json::to_string(&measures)?,
            options: SendOptions {
                resource_id: Some(first.resource_id().to_string()),
                unit: Some(first.unit().to_string()),
                ..Default::default()
            },
        }])
    }
}
