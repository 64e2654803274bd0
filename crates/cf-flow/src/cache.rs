//! Per-frame memoization of detector outcomes

use std::collections::BTreeMap;

use log::debug;

use cf_core::{DetectedData, DetectionItem, Error, Outcome, Result};

/// Caches each plugin's outcome for the frame under evaluation, so a plugin
/// appearing in several pipelines runs once. Cleared between frames.
pub struct OutcomeCache {
    storage: BTreeMap<String, Outcome>,
    detected: DetectedData,
    result_uid: String,
    default_outcome: Outcome,
}

impl Default for OutcomeCache {
    fn default() -> Self {
        Self {
            storage: BTreeMap::new(),
            detected: DetectedData::new(),
            result_uid: String::new(),
            default_outcome: Outcome::pass(),
        }
    }
}

impl OutcomeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self, uid: &str) -> bool {
        self.storage.contains_key(uid)
    }

    /// Insert-or-replace; the written uid becomes the current result.
    pub fn write(&mut self, uid: &str, outcome: Outcome) {
        log_outcome(uid, &outcome);
        self.storage.insert(uid.to_string(), outcome);
        self.set_result_uid(uid);
    }

    pub fn set_result_uid(&mut self, uid: &str) {
        self.result_uid = uid.to_string();
    }

    /// Outcome of the current result uid; the pass-through default while the
    /// cache is empty.
    pub fn result(&self) -> &Outcome {
        if self.empty() {
            return &self.default_outcome;
        }
        self.storage
            .get(&self.result_uid)
            .unwrap_or(&self.default_outcome)
    }

    /// Record the current result's items against an effect uid, carrying the
    /// declaration forward to the accumulator.
    pub fn set_detected(&mut self, uid: &str) {
        let items = self.result().items.clone();
        self.detected.insert(uid.to_string(), items);
    }

    pub fn detected(&self) -> &DetectedData {
        &self.detected
    }

    /// Whether any cached outcome is a multi-frame result (items lead with a
    /// flag).
    pub fn find_multi_frame(&self) -> bool {
        self.storage
            .values()
            .any(|o| matches!(o.items.first(), Some(DetectionItem::Flag(_))))
    }

    /// Items of the multi-frame result: the retroactive inclusion column.
    pub fn multi_frame_items(&self) -> Result<&[DetectionItem]> {
        self.storage
            .values()
            .find(|o| matches!(o.items.first(), Some(DetectionItem::Flag(_))))
            .map(|o| o.items.as_slice())
            .ok_or_else(|| Error::InvalidOperation("no multi-frame items".into()))
    }

    pub fn clear(&mut self) {
        self.storage.clear();
        self.detected.clear();
        self.result_uid.clear();
    }

    fn empty(&self) -> bool {
        self.storage.is_empty() || self.result_uid.is_empty()
    }
}

fn log_outcome(uid: &str, outcome: &Outcome) {
    debug!("[{uid}] detect: {}", outcome.detect);
    for item in &outcome.items {
        match item {
            DetectionItem::Rect(r) => {
                debug!("[{uid}] rect: {}, {}, {}, {}", r.x, r.y, r.width, r.height)
            }
            DetectionItem::RectTag { rect, tag } => debug!(
                "[{uid}] rectTag: {}, {}, {}, {}, {tag}",
                rect.x, rect.y, rect.width, rect.height
            ),
            DetectionItem::Scalar(v) => debug!("[{uid}] double: {v}"),
            DetectionItem::Flag(b) => debug!("[{uid}] bool: {b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes() -> Vec<(String, Outcome)> {
        vec![
            ("test.1".into(), Outcome::new(true, vec![])),
            ("test.2".into(), Outcome::new(false, vec![])),
            ("test.3".into(), Outcome::new(true, vec![])),
            ("test.4".into(), Outcome::new(false, vec![])),
            ("test.5".into(), Outcome::new(true, vec![])),
        ]
    }

    #[test]
    fn test_hit() {
        let mut cache = OutcomeCache::new();
        for (uid, outcome) in outcomes() {
            cache.write(&uid, outcome);
        }
        for (uid, _) in outcomes() {
            assert!(cache.hit(&uid));
        }
        assert!(!cache.hit("test.100"));
    }

    #[test]
    fn test_write_updates_result() {
        let mut cache = OutcomeCache::new();
        for (uid, outcome) in outcomes() {
            let expected = outcome.detect;
            cache.write(&uid, outcome);
            assert_eq!(cache.result().detect, expected);
        }
    }

    #[test]
    fn test_empty_cache_result_passes() {
        let cache = OutcomeCache::new();
        assert!(cache.result().detect);
        assert!(cache.result().items.is_empty());
    }

    #[test]
    fn test_result_follows_result_uid() {
        let mut cache = OutcomeCache::new();
        for (uid, outcome) in outcomes() {
            cache.write(&uid, outcome);
        }
        for (uid, outcome) in outcomes() {
            cache.set_result_uid(&uid);
            assert_eq!(cache.result().detect, outcome.detect);
        }
    }

    #[test]
    fn test_set_detected_copies_result_items() {
        let mut cache = OutcomeCache::new();
        let items = vec![DetectionItem::Scalar(0.9)];
        cache.write("det.1", Outcome::new(true, items.clone()));
        cache.set_detected("fx.1");

        assert_eq!(cache.detected().get("fx.1"), Some(&items));
    }

    #[test]
    fn test_multi_frame_lookup() {
        let mut cache = OutcomeCache::new();
        cache.write("det.1", Outcome::new(true, vec![DetectionItem::Scalar(1.0)]));
        assert!(!cache.find_multi_frame());

        cache.write(
            "multi.1",
            Outcome::new(
                true,
                vec![DetectionItem::Flag(false), DetectionItem::Flag(true)],
            ),
        );
        assert!(cache.find_multi_frame());
        assert_eq!(cache.multi_frame_items().unwrap().len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut cache = OutcomeCache::new();
        cache.write("det.1", Outcome::new(false, vec![]));
        cache.set_detected("fx.1");
        cache.clear();

        assert!(!cache.hit("det.1"));
        assert!(cache.detected().is_empty());
        assert!(cache.result().detect);
    }
}
