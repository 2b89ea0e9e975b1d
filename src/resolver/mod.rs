//! Local-name to remote-id resolution for backends that address remote
//! resources (alarms, metrics) by a backend-assigned id.

pub mod alarm;
pub mod metric;

pub use alarm::{AlarmDefinition, AlarmResolver};
pub use metric::MetricResolver;

use parking_lot::RwLock;
use std::collections::HashMap;

/// Name of the alarm tracking `meter_name` on `resource_id`.
pub fn alarm_name(meter_name: &str, resource_id: &str) -> String {
    format!("{meter_name}({resource_id})")
}

/// Name of the metric holding `meter_name` measures of `resource_id`.
pub fn metric_name(resource_id: &str, meter_name: &str) -> String {
    format!("{resource_id}@{meter_name}")
}

/// Result of a resolution: the remote id, and whether it had to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: String,
    pub created: bool,
}

/// Name → remote id map owned by one resolver.
///
/// No lock is held across network calls, so two tasks resolving the same
/// new name may both create it remotely; the last write wins the cache.
#[derive(Debug, Default)]
pub struct ResourceIdCache {
    ids: RwLock<HashMap<String, String>>,
}

impl ResourceIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.ids.read().get(name).cloned()
    }

    pub fn insert(&self, name: &str, id: String) {
        self.ids.write().insert(name.to_string(), id);
    }

    pub fn invalidate(&self, name: &str) -> Option<String> {
        self.ids.write().remove(name)
    }

}
