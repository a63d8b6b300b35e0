// ── Delta detector ──
//
// The store offers no change feed, so the adapter polls: every tick one
// batched read covers all actively subscribed vote options, and only
// values that differ from the last pushed one are emitted. The detector
// itself is pure bookkeeping; the event loop does the I/O.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use pollcast_api::CounterRow;

use crate::item::Item;
use crate::registry::Registry;

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Options covered by one batched read, with the subscription generation
/// each one had when the read was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    generations: BTreeMap<String, u64>,
}

impl ScanPlan {
    /// Entity ids to read, sorted and distinct.
    pub fn ids(&self) -> Vec<String> {
        self.generations.keys().cloned().collect()
    }
}

/// Last pushed value per entity id.
#[derive(Debug, Default)]
pub struct DeltaDetector {
    cache: HashMap<String, i64>,
}

impl DeltaDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// What to read this tick, or `None` when nothing is subscribed and the
    /// tick needs no store I/O.
    pub fn plan(&self, registry: &Registry) -> Option<ScanPlan> {
        let generations = registry.active_vote_options();
        if generations.is_empty() {
            return None;
        }
        Some(ScanPlan { generations })
    }

    /// Diff a batched read against the cache.
    ///
    /// Returns `(entity_id, value)` for every row whose value differs from
    /// the last pushed one. The cache is left alone; call [`record`] once
    /// the value actually went out. Rows are dropped when their option is
    /// no longer active or was resubscribed after `plan` was taken. Ids
    /// absent from `rows` keep their cached value.
    ///
    /// [`record`]: DeltaDetector::record
    pub fn apply(
        &self,
        registry: &Registry,
        plan: &ScanPlan,
        rows: impl IntoIterator<Item = CounterRow>,
    ) -> Vec<(String, i64)> {
        let mut changed = Vec::new();
        for CounterRow { id, vote_count } in rows {
            let Some(&planned) = plan.generations.get(&id) else {
                continue;
            };
            let current = registry
                .get(&Item::option_name(&id))
                .filter(|sub| sub.active)
                .map(|sub| sub.generation);
            if current != Some(planned) {
                continue;
            }
            if self.cache.get(&id) == Some(&vote_count) {
                continue;
            }
            changed.push((id, vote_count));
        }
        changed
    }

    /// Record a value that was pushed to the broker.
    pub fn record(&mut self, entity_id: &str, value: i64) {
        self.cache.insert(entity_id.to_owned(), value);
    }

    /// Drop the cache entry of an entity nobody subscribes to anymore.
    pub fn forget(&mut self, entity_id: &str) {
        self.cache.remove(entity_id);
    }
}
