use crate::domain::Sample;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;
use uuid::Uuid;

/// Samples sharing one batch key, handed to the sender as a unit.
/// Never mutated after it leaves the batcher.
#[derive(Debug, Clone)]
pub struct Batch {
    id: String,
    key: String,
    samples: Vec<Sample>,
}

impl Batch {
    pub fn new(key: impl Into<String>, samples: Vec<Sample>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key: key.into(),
            samples,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Accumulates samples per batch key and releases a key's samples once
/// the configured threshold is reached.
///
/// A single lock guards the whole mapping: `drain_all` needs a consistent
/// snapshot of every key, and the append-check-reset in `add` must be one
/// critical section so no sample is lost or delivered twice.
#[derive(Debug, Default)]
pub struct SampleBatcher {
    pending: Mutex<HashMap<String, Vec<Sample>>>,
}

impl SampleBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `samples` under `key`. When the stored list reaches `limit`
    /// the whole list (not truncated to `limit`) is returned and the key is
    /// reset to empty.
    pub fn add(&self, key: &str, samples: Vec<Sample>, limit: usize) -> Option<Batch> {
        let mut pending = self.pending.lock();
        let current = pending.entry(key.to_string()).or_default();
        current.extend(samples);

        if current.len() >= limit {
            let full = mem::take(current);
            tracing::trace!(key, size = full.len(), limit, "Batch threshold reached");
            return Some(Batch::new(key, full));
        }
        None
    }

    /// Swaps the whole mapping for an empty one and returns the old one.
    /// Keys may map to empty lists; callers skip those.
    pub fn drain_all(&self) -> HashMap<String, Vec<Sample>> {
        let mut pending = self.pending.lock();
        mem::take(&mut *pending)
    }

    /// Number of samples waiting under `key`.
    pub fn pending_len(&self, key: &str) -> usize {
        self.pending.lock().get(key).map_or(0, Vec::len)
    }

    pub fn total_pending(&self) -> usize {
        self.pending.lock().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SampleKind;
    use chrono::Utc;

    fn sample(value: f64) -> Sample {
        Sample::measurement("cpu.freq", "host-a", value, Utc::now(), "MHz", SampleKind::Gauge)
            .unwrap()
    }

    #[test]
    fn test_threshold_scenario() {
        let batcher = SampleBatcher::new();

        assert!(batcher.add("cpu.freq", vec![sample(1.0)], 2).is_none());
        assert_eq!(batcher.pending_len("cpu.freq"), 1);

        let batch = batcher.add("cpu.freq", vec![sample(2.0)], 2).unwrap();
        let values: Vec<_> = batch.samples().iter().map(|s| s.value()).collect();
        assert_eq!(values, vec![Some(1.0), Some(2.0)]);
        assert_eq!(batch.key(), "cpu.freq");
        assert_eq!(batcher.pending_len("cpu.freq"), 0);

        assert!(batcher.add("cpu.freq", vec![sample(3.0)], 2).is_none());
        let drained = batcher.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained["cpu.freq"].len(), 1);
        assert_eq!(drained["cpu.freq"][0].value(), Some(3.0));
        assert_eq!(batcher.total_pending(), 0);
    }

    #[test]
    fn test_batch_is_not_truncated_to_limit() {
        let batcher = SampleBatcher::new();
        assert!(batcher.add("k", vec![sample(1.0)], 3).is_none());

        let batch = batcher
            .add("k", vec![sample(2.0), sample(3.0), sample(4.0)], 3)
            .unwrap();
        assert_eq!(batch.size(), 4);
        assert_eq!(batcher.pending_len("k"), 0);
    }

    #[test]
    fn test_keys_are_independent() {
        let batcher = SampleBatcher::new();
        assert!(batcher.add("a", vec![sample(1.0)], 2).is_none());
        assert!(batcher.add("b", vec![sample(2.0)], 2).is_none());
        assert!(batcher.add("a", vec![sample(3.0)], 2).is_some());
        assert_eq!(batcher.pending_len("b"), 1);
    }

    #[test]
    fn test_drain_all_is_idempotent() {
        let batcher = SampleBatcher::new();
        batcher.add("a", vec![sample(1.0)], 10);
        batcher.add("b", vec![sample(2.0)], 10);

        assert_eq!(batcher.drain_all().len(), 2);
        assert!(batcher.drain_all().is_empty());
    }
}
