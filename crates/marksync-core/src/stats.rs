use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::events::{ApplyOutcome, EventSource};

/// Counts of applied events by source and outcome.
#[derive(Debug, Default, Clone)]
pub struct SyncStats {
    pub by_source_outcome: HashMap<(EventSource, ApplyOutcome), u64>,
    pub total: u64,
    /// Feed or relay subscriptions that failed
    pub channel_errors: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: EventSource, outcome: ApplyOutcome) {
        self.total += 1;
        *self.by_source_outcome.entry((source, outcome)).or_insert(0) += 1;
    }

    pub fn count(&self, source: EventSource, outcome: ApplyOutcome) -> u64 {
        self.by_source_outcome
            .get(&(source, outcome))
            .copied()
            .unwrap_or(0)
    }

    /// Events that were absorbed without changing the store
    pub fn deduplicated(&self) -> u64 {
        self.by_source_outcome
            .iter()
            .filter(|((_, outcome), _)| !outcome.changed())
            .map(|(_, count)| count)
            .sum()
    }

    pub fn summary(&self) -> StatsSummary {
        let mut by_source: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for ((source, outcome), count) in &self.by_source_outcome {
            by_source
                .entry(source.as_str().to_string())
                .or_default()
                .insert(outcome.as_str().to_string(), *count);
        }
        StatsSummary {
            total: self.total,
            deduplicated: self.deduplicated(),
            channel_errors: self.channel_errors,
            by_source,
        }
    }
}

/// Serializable view of `SyncStats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub total: u64,
    pub deduplicated: u64,
    pub channel_errors: u64,
    pub by_source: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Thread-safe wrapper for sync stats
#[derive(Debug, Clone)]
pub struct SharedSyncStats {
    inner: Arc<RwLock<SyncStats>>,
}

impl Default for SharedSyncStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSyncStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SyncStats::new())),
        }
    }

    pub fn record(&self, source: EventSource, outcome: ApplyOutcome) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record(source, outcome);
        }
    }

    pub fn record_channel_error(&self) {
        if let Ok(mut stats) = self.inner.write() {
            stats.channel_errors += 1;
        }
    }

    pub fn snapshot(&self) -> SyncStats {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_summary() {
        let stats = SharedSyncStats::new();
        stats.record(EventSource::Local, ApplyOutcome::Inserted);
        stats.record(EventSource::Relay, ApplyOutcome::Unchanged);
        stats.record(EventSource::Stream, ApplyOutcome::Unchanged);
        stats.record_channel_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.deduplicated(), 2);
        assert_eq!(snapshot.count(EventSource::Local, ApplyOutcome::Inserted), 1);

        let summary = snapshot.summary();
        assert_eq!(summary.channel_errors, 1);
        assert_eq!(summary.by_source["relay"]["unchanged"], 1);
    }
}
