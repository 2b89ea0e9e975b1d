use super::{ResourceIdCache, Resolved};
use crate::domain::{AlarmState, Severity};
use crate::sender::{PreparedRequest, RequestContext, SendError};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// What a newly created alarm is made of.
#[derive(Debug, Clone, Copy)]
pub struct AlarmDefinition<'a> {
    pub meter_name: &'a str,
    pub severity: Severity,
    pub state: AlarmState,
}

#[derive(Debug, Deserialize)]
struct AlarmSummary {
    alarm_id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedAlarm {
    alarm_id: Option<String>,
}

/// Resolves alarm names through the cache, then the alarm service's
/// query-by-name, then remote creation.
#[derive(Debug, Default)]
pub struct AlarmResolver {
    cache: ResourceIdCache,
}

impl AlarmResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &ResourceIdCache {
        &self.cache
    }

    pub fn invalidate(&self, name: &str) {
        if let Some(stale) = self.cache.invalidate(name) {
            debug!(alarm = name, alarm_id = %stale, "Dropped cached alarm id");
        }
    }

    pub async fn get_or_create_id(
        &self,
        ctx: &RequestContext<'_>,
        name: &str,
        definition: AlarmDefinition<'_>,
    ) -> Result<Resolved, SendError> {
        if let Some(id) = self.cache.get(name) {
            return Ok(Resolved { id, created: false });
        }

        if let Some(id) = self.lookup(ctx, name).await? {
            debug!(alarm = name, alarm_id = %id, "Found existing alarm");
            self.cache.insert(name, id.clone());
            return Ok(Resolved { id, created: false });
        }

        warn!(alarm = name, "No known alarm id, creating alarm");
        let id = self.create(ctx, name, definition).await?;
        self.cache.insert(name, id.clone());
        Ok(Resolved { id, created: true })
    }

    async fn lookup(&self, ctx: &RequestContext<'_>, name: &str) -> Result<Option<String>, SendError> {
        // The alarm service expects field, op, value in exactly this order.
        let query = vec![
            ("q.field".to_string(), "name".to_string()),
            ("q.op".to_string(), "eq".to_string()),
            ("q.value".to_string(), name.to_string()),
        ];
        let request = PreparedRequest::get(format!("{}/v2/alarms", ctx.endpoint), query);

        let response = match ctx.perform(&request).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let alarms: Vec<AlarmSummary> = serde_json::from_str(&response.body)
            .map_err(|e| SendError::MalformedResponse(format!("alarm query response: {e}")))?;

        Ok(alarms
            .into_iter()
            .find(|alarm| alarm.name.as_deref().is_none_or(|n| n == name))
            .map(|alarm| alarm.alarm_id))
    }

    async fn create(
        &self,
        ctx: &RequestContext<'_>,
        name: &str,
        definition: AlarmDefinition<'_>,
    ) -> Result<String, SendError> {
        let payload = json!({
            "state": definition.state,
            "name": name,
            "severity": definition.severity.alarm_severity(),
            "type": "event",
            "event_rule": { "event_type": definition.meter_name },
        });
        let request = PreparedRequest::post(format!("{}/v2/alarms", ctx.endpoint), payload.to_string());

        let response = ctx.perform(&request).await?;
        let created: CreatedAlarm = serde_json::from_str(&response.body)
            .map_err(|e| SendError::MalformedResponse(format!("alarm creation response: {e}")))?;

        let id = created.alarm_id.ok_or_else(|| {
            SendError::MalformedResponse(format!("alarm creation response has no alarm_id: {}", response.body))
        })?;
        debug!(alarm = name, alarm_id = %id, "Created alarm");
        Ok(id)
    }
}
