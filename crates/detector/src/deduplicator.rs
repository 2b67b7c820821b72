use crate::finder::Loop;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppresses loops whose route was already handed on within `ttl`.
pub struct LoopDeduplicator {
    seen: HashMap<[u8; 32], Instant>,
    ttl: Duration,
}

impl LoopDeduplicator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            ttl,
        }
    }

    /// Checks if a loop is a duplicate. If not, its route is remembered.
    pub fn is_duplicate(&mut self, candidate: &Loop) -> bool {
        self.is_duplicate_at(candidate, Instant::now())
    }

    fn is_duplicate_at(&mut self, candidate: &Loop, now: Instant) -> bool {
        let ttl = self.ttl;
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) < ttl);

        let fingerprint = candidate.fingerprint();
        if self.seen.contains_key(&fingerprint) {
            true
        } else {
            self.seen.insert(fingerprint, now);
            false
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::{FinderConfig, LoopFinder};
    use crate::graph::{FeeSchedule, PairGraph};
    use common::test_utils::{at, book, pair};
    use common::Currency;
    use rust_decimal_macros::dec;

    fn candidate() -> Loop {
        let mut graph = PairGraph::new(FeeSchedule::new(dec!(0)), dec!(0));
        graph.upsert_snapshot(&book(&pair("a", "BTC/USD"), (dec!(110), dec!(1)), (dec!(111), dec!(1)), at(1)));
        graph.upsert_snapshot(&book(&pair("b", "BTC/USD"), (dec!(90), dec!(1)), (dec!(100), dec!(1)), at(1)));
        LoopFinder::new(FinderConfig {
            max_depth: 2,
            margin: 0.0,
        })
        .best_loop(&graph, &Currency::from("BTC"))
        .unwrap()
    }

    #[test]
    fn test_repeat_within_ttl_is_duplicate() {
        let mut dedup = LoopDeduplicator::new(Duration::from_secs(10));
        let found = candidate();
        let start = Instant::now();
        assert!(!dedup.is_duplicate_at(&found, start));
        assert!(dedup.is_duplicate_at(&found, start + Duration::from_secs(5)));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut dedup = LoopDeduplicator::new(Duration::from_secs(10));
        let found = candidate();
        let start = Instant::now();
        assert!(!dedup.is_duplicate_at(&found, start));
        assert!(!dedup.is_duplicate_at(&found, start + Duration::from_secs(11)));
    }
}
