use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::adapter::{AdapterError, SourceAdapter};
use crate::records::SampleRecord;

/// Timestamp to sample lookup for one segment.
#[derive(Debug, Clone)]
pub struct SegmentIndex {
    segment_id: String,
    samples: BTreeMap<i64, SampleRecord>,
}

impl SegmentIndex {
    /// Index the samples of `segment_id`.
    pub fn build(adapter: &dyn SourceAdapter, segment_id: &str) -> Result<Self, AdapterError> {
        let samples = adapter
            .samples(segment_id)?
            .into_iter()
            .map(|s| (s.timestamp, s))
            .collect();
        Ok(Self {
            segment_id: segment_id.to_string(),
            samples,
        })
    }

    /// The indexed segment.
    pub fn segment_id(&self) -> &str {
        &self.segment_id
    }

    /// The sample captured at `timestamp`.
    pub fn sample_at(&self, timestamp: i64) -> Option<&SampleRecord> {
        self.samples.get(&timestamp)
    }

    /// All samples in timestamp order.
    pub fn samples(&self) -> impl Iterator<Item = &SampleRecord> {
        self.samples.values()
    }

    /// Number of indexed samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the segment has no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

type Slot = Arc<Mutex<Option<Arc<SegmentIndex>>>>;

/// Builds segment indexes on first use and hands out shared, read-only
/// copies afterwards.
///
/// Each segment is built at most once: concurrent callers asking for the
/// same segment wait on that segment's slot, callers for other segments do
/// not. A failed build is not cached.
#[derive(Debug, Default)]
pub struct SegmentResolver {
    slots: Mutex<HashMap<String, Slot>>,
    builds: AtomicUsize,
}

impl SegmentResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// The index of `segment_id`, building it with `adapter` if needed.
    pub fn resolve(
        &self,
        adapter: &dyn SourceAdapter,
        segment_id: &str,
    ) -> Result<Arc<SegmentIndex>, AdapterError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(segment_id.to_string()).or_default().clone()
        };

        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = guard.as_ref() {
            return Ok(index.clone());
        }

        let index = match SegmentIndex::build(adapter, segment_id) {
            Ok(index) => Arc::new(index),
            Err(err) => {
                // unknown segments must not accumulate empty slots
                let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                if slots
                    .get(segment_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot))
                {
                    slots.remove(segment_id);
                }
                return Err(err);
            }
        };
        self.builds.fetch_add(1, Ordering::Relaxed);
        log::debug!("Indexed {} samples of segment {}", index.len(), segment_id);
        *guard = Some(index.clone());
        Ok(index)
    }

    /// Number of segments with a slot, built or being built.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no segment has been requested yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of indexes built so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use rayon::prelude::*;

    #[test]
    fn test_index_lookup() -> Result<(), AdapterError> {
        let adapter = InMemoryAdapter::new("synthetic")
            .with_sample("scene-0", SampleRecord::new("s1", 20))
            .with_sample("scene-0", SampleRecord::new("s0", 10));
        let index = SegmentIndex::build(&adapter, "scene-0")?;
        assert_eq!(index.len(), 2);
        assert_eq!(index.sample_at(10).map(|s| s.token.as_str()), Some("s0"));
        assert!(index.sample_at(15).is_none());
        let order: Vec<i64> = index.samples().map(|s| s.timestamp).collect();
        assert_eq!(order, vec![10, 20]);
        Ok(())
    }

    #[test]
    fn test_failed_builds_leave_no_slot() {
        let adapter = InMemoryAdapter::new("synthetic");
        let resolver = SegmentResolver::new();
        assert!(resolver.is_empty());
        for i in 0..16 {
            assert!(resolver.resolve(&adapter, &format!("unknown-{i}")).is_err());
        }
        assert!(resolver.is_empty());
        assert_eq!(resolver.builds(), 0);
    }

    #[test]
    fn test_resolver_builds_once() -> Result<(), AdapterError> {
        let adapter = InMemoryAdapter::new("synthetic")
            .with_sample("scene-0", SampleRecord::new("s0", 10))
            .with_sample("scene-1", SampleRecord::new("s1", 10));
        let resolver = SegmentResolver::new();

        let results: Vec<_> = (0..64)
            .into_par_iter()
            .map(|i| resolver.resolve(&adapter, if i % 2 == 0 { "scene-0" } else { "scene-1" }))
            .collect();
        for result in results {
            assert_eq!(result?.len(), 1);
        }
        assert_eq!(resolver.builds(), 2);

        assert!(resolver.resolve(&adapter, "missing").is_err());
        assert!(resolver.resolve(&adapter, "missing").is_err());
        assert_eq!(resolver.builds(), 2);
        assert_eq!(resolver.len(), 2);
        Ok(())
    }
}
