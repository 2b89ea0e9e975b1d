use crate::domain::{AlarmState, ForwarderError, Sample};
use crate::forwarder::{BatchEncoder, OutboundRequest};
use crate::resolver::{AlarmDefinition, AlarmResolver, alarm_name};
use crate::sender::{Backend, PreparedRequest, RequestContext, SendError, SendOptions, SendOutcome};
use tracing::{debug, info};

/// Updates alarm states on the alarm service, creating alarms on first use.
#[derive(Debug, Default)]
pub struct AlarmBackend {
    resolver: AlarmResolver,
}

impl AlarmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolver(&self) -> &AlarmResolver {
        &self.resolver
    }

    fn alarm_for(meter_name: &str, options: &SendOptions) -> Result<String, SendError> {
        options
            .resource_id
            .as_deref()
            .map(|resource_id| alarm_name(meter_name, resource_id))
            .ok_or_else(|| {
                SendError::InvalidRequest(format!("no resource id for alarm on {meter_name}"))
            })
    }
}

impl Backend for AlarmBackend {
    const SERVICE: &'static str = "aodh";

    fn derive_resource_name(&self, meter_name: &str, options: &SendOptions) -> Option<String> {
        Self::alarm_for(meter_name, options).ok()
    }

    async fn build_request_url(
        &self,
        ctx: &RequestContext<'_>,
        meter_name: &str,
        _payload: &str,
        options: &SendOptions,
    ) -> Result<Option<PreparedRequest>, SendError> {
        let name = Self::alarm_for(meter_name, options)?;
        let definition = AlarmDefinition {
            meter_name,
            severity: options.severity,
            state: options.alarm_state.unwrap_or(AlarmState::InsufficientData),
        };

        let resolved = self.resolver.get_or_create_id(ctx, &name, definition).await?;
        if resolved.created {
            // The creation request already carried the state.
            debug!(alarm = %name, "Alarm created with its state, no update needed");
            return Ok(None);
        }

        let state = serde_json::to_string(&definition.state)
            .map_err(|e| SendError::InvalidRequest(format!("alarm state: {e}")))?;
        Ok(Some(PreparedRequest::put(
            format!("{}/v2/alarms/{}/state", ctx.endpoint, resolved.id),
            state,
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
        info!(alarm = %name, "Alarm not found, resolving it again");
        self.resolver.invalidate(&name);

        match self.build_request_url(ctx, meter_name, payload, options).await? {
            Some(request) => {
                let response = ctx.perform(&request).await?;
                Ok(SendOutcome::Delivered {
                    status: response.status,
                })
            }
            None => Ok(SendOutcome::Skipped),
        }
    }
}

impl BatchEncoder for AlarmBackend {
    fn batch_key(&self, sample: &Sample) -> String {
        alarm_name(sample.meter_name(), sample.resource_id())
    }

    /// One state update per notification, in arrival order.
    fn encode(&self, samples: &[Sample]) -> Result<Vec<OutboundRequest>, ForwarderError> {
        samples
            .iter()
            .map(|sample| {
                let state = sample.alarm_state();
                Ok(OutboundRequest {
                    meter_name: sample.meter_name().to_string(),
                    payload: serde_json::to_string(&state)?,
                    options: SendOptions {
                        resource_id: Some(sample.resource_id().to_string()),
                        unit: None,
                        severity: sample.severity(),
                        alarm_state: Some(state),
                    },
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Severity;
    use chrono::Utc;

    #[test]
    fn test_encode_one_request_per_notification() {
        let now = Utc::now();
        let samples = vec![
            Sample::notification("link.status", "host-a", now, Severity::Critical, "value is above 1")
                .unwrap(),
            Sample::notification("link.status", "host-a", now, Severity::Low, "value is within range")
                .unwrap(),
        ];

        let backend = AlarmBackend::new();
        assert_eq!(backend.batch_key(&samples[0]), "link.status(host-a)");

        let requests = backend.encode(&samples).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].payload, "\"alarm\"");
        assert_eq!(requests[0].options.severity, Severity::Critical);
        assert_eq!(requests[1].payload, "\"ok\"");
        assert_eq!(requests[1].options.alarm_state, Some(AlarmState::Ok));
        assert_eq!(requests[1].options.resource_id.as_deref(), Some("host-a"));
    }

    #[test]
    fn test_resource_name_needs_resource_id() {
        let backend = AlarmBackend::new();
        assert!(backend.derive_resource_name("link.status", &SendOptions::default()).is_none());

        let options = SendOptions {
            resource_id: Some("host-a".to_string()),
            ..Default::default()
        };
        assert_eq!(
            backend.derive_resource_name("link.status", &options).as_deref(),
            Some("link.status(host-a)")
        );
    }
}
