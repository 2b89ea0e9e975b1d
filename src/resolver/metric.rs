use super::{ResourceIdCache, Resolved};
use crate::sender::{PreparedRequest, RequestContext, SendError};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CreatedMetric {
    id: Option<String>,
}

/// Resolves metric names through the cache, creating the metric on a miss.
/// The metric service has no query-by-name step here.
#[derive(Debug, Default)]
pub struct MetricResolver {
    cache: ResourceIdCache,
    archive_policy: Option<String>,
}

impl MetricResolver {
    pub fn new(archive_policy: Option<String>) -> Self {
        Self {
            cache: ResourceIdCache::new(),
            archive_policy,
        }
    }

    pub fn cache(&self) -> &ResourceIdCache {
        &self.cache
    }

    pub fn invalidate(&self, name: &str) {
        if let Some(stale) = self.cache.invalidate(name) {
            debug!(metric = name, metric_id = %stale, "Dropped cached metric id");
        }
    }

    pub async fn get_or_create_id(
        &self,
        ctx: &RequestContext<'_>,
        name: &str,
        unit: &str,
    ) -> Result<Resolved, SendError> {
        if let Some(id) = self.cache.get(name) {
            return Ok(Resolved { id, created: false });
        }

        warn!(metric = name, "No known metric id, creating metric");
        let id = self.create(ctx, name, unit).await?;
        self.cache.insert(name, id.clone());
        Ok(Resolved { id, created: true })
    }

    async fn create(&self, ctx: &RequestContext<'_>, name: &str, unit: &str) -> Result<String, SendError> {
        let mut payload = json!({ "name": name, "unit": unit });
        if let Some(policy) = &self.archive_policy {
            payload["archive_policy_name"] = json!(policy);
        }
        let request = PreparedRequest::post(format!("{}/v1/metric", ctx.endpoint), payload.to_string());

        let response = ctx.perform(&request).await?;
        let created: CreatedMetric = serde_json::from_str(&response.body)
            .map_err(|e| SendError::MalformedResponse(format!("metric creation response: {e}")))?;

        let id = created.id.ok_or_else(|| {
            SendError::MalformedResponse(format!("metric creation response has no id: {}", response.body))
        })?;
        debug!(metric = name, metric_id = %id, "Created metric");
        Ok(id)
    }
}
