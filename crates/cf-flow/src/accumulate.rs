//! Per-frame verdict log and its collapse into time ranges

use log::info;

use cf_core::{
    DetectedData, DetectionItem, Error, FrameDetections, RawData, Result, SortedCollection,
    TimeRange, TimeRangeWithMetadata,
};

/// Append-only log of per-frame inclusion verdicts, written by the analysis
/// worker and read back when the render stage starts.
#[derive(Debug, Default)]
pub struct Accumulator {
    raw: Vec<RawData>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, frame_number: f64, include: bool, detected: DetectedData) {
        self.raw.push(RawData {
            frame_number,
            include,
            detected,
        });
    }

    /// Overwrite every entry's `include` with a multi-frame detector's
    /// retroactive column. The column length must match the log.
    pub fn update(&mut self, items: &[DetectionItem]) -> Result<()> {
        if items.len() != self.raw.len() {
            return Err(Error::InvalidOperation(format!(
                "multi-frame column length {} does not match accumulated {}",
                items.len(),
                self.raw.len()
            )));
        }

        for (entry, item) in self.raw.iter_mut().zip(items) {
            let include = item.as_flag().ok_or_else(|| {
                Error::InvalidOperation("multi-frame column contains a non-flag item".into())
            })?;
            info!(
                "[{}] : {} -> {}",
                entry.frame_number, entry.include, include
            );
            entry.include = include;
        }
        Ok(())
    }

    pub fn accumulated(&self) -> &[RawData] {
        &self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Collapses the verdict log into contiguous time ranges, tolerating short
/// false gaps inside a true run.
pub struct RangeAnalyzer {
    /// Correction window in frames: up to ~1s of false verdicts inside a run
    /// are absorbed.
    window: usize,
}

impl RangeAnalyzer {
    pub fn new(framerate: f64) -> Self {
        Self {
            window: framerate.ceil() as usize,
        }
    }

    /// Offset of the next included frame within the correction window, if
    /// the gap at `i` can be bridged.
    fn can_skip(&self, input: &[RawData], i: usize) -> Option<usize> {
        let mut len = self.window;
        if i + len >= input.len() {
            len = input.len() - i;
        }
        (1..len).find(|&j| input[i + j].include)
    }

    pub fn analyze(&self, input: &[RawData]) -> Vec<TimeRangeWithMetadata> {
        let mut ranges = Vec::new();
        let mut in_run = false;
        let mut start = -1.0;
        let mut duration = 1.0;
        let mut collected: Vec<RawData> = Vec::new();

        let mut i = 0;
        while i < input.len() {
            let entry = &input[i];
            if !in_run && entry.include {
                start = entry.frame_number;
                in_run = true;
                if !entry.detected.is_empty() {
                    collected.push(entry.clone());
                }
            } else if in_run && entry.include {
                duration += 1.0;
                if !entry.detected.is_empty() {
                    collected.push(entry.clone());
                }
            } else if in_run && !entry.include {
                if let Some(skip) = self.can_skip(input, i) {
                    // The gap sits inside the run: count it and the frame
                    // that closes it.
                    duration += (skip + 1) as f64;
                    i += skip;
                } else {
                    ranges.push(TimeRangeWithMetadata {
                        range: TimeRange {
                            start_frame: start,
                            duration,
                        },
                        collection: sort(&collected),
                    });
                    start = -1.0;
                    duration = 1.0;
                    in_run = false;
                    collected.clear();
                }
            }
            i += 1;
        }

        if start >= 0.0 {
            ranges.push(TimeRangeWithMetadata {
                range: TimeRange {
                    start_frame: start,
                    duration,
                },
                collection: sort(&collected),
            });
        }

        ranges
    }
}

/// Group collected entries by plugin uid, keeping frame order per uid.
fn sort(input: &[RawData]) -> SortedCollection {
    let mut collection = SortedCollection::new();
    for data in input {
        for (uid, items) in &data.detected {
            collection.entry(uid.clone()).or_default().push(FrameDetections {
                frame_number: data.frame_number,
                items: items.clone(),
            });
        }
    }
    collection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(frame: f64, include: bool) -> RawData {
        RawData {
            frame_number: frame,
            include,
            detected: DetectedData::new(),
        }
    }

    fn pattern(spans: &[(usize, bool)]) -> Vec<RawData> {
        let mut data = Vec::new();
        let mut frame = 0.0;
        for &(count, include) in spans {
            for _ in 0..count {
                data.push(raw(frame, include));
                frame += 1.0;
            }
        }
        data
    }

    fn total_duration(ranges: &[TimeRangeWithMetadata]) -> f64 {
        ranges.iter().map(|r| r.range.duration).sum()
    }

    #[test]
    fn test_all_true_is_one_range() {
        let input = pattern(&[(10, true)]);
        let ranges = RangeAnalyzer::new(30.0).analyze(&input);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].range.start_frame, 0.0);
        assert_eq!(ranges[0].range.duration, 10.0);
        assert!(ranges[0].collection.is_empty());
    }

    #[test]
    fn test_all_false_is_no_range() {
        let input = pattern(&[(10, false)]);
        let ranges = RangeAnalyzer::new(30.0).analyze(&input);
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_short_gap_absorbed_long_gap_splits() {
        // 20 true, 10 false, 20 true, 100 false, 20 true at 30 fps.
        let input = pattern(&[(20, true), (10, false), (20, true), (100, false), (20, true)]);
        let ranges = RangeAnalyzer::new(30.0).analyze(&input);

        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].range.start_frame, 0.0);
        assert_eq!(ranges[0].range.duration, 50.0);
        assert_eq!(ranges[1].range.start_frame, 150.0);
        assert_eq!(ranges[1].range.duration, 20.0);
    }

    #[test]
    fn test_trailing_run_is_emitted() {
        let input = pattern(&[(5, false), (5, true)]);
        let ranges = RangeAnalyzer::new(2.0).analyze(&input);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].range.start_frame, 5.0);
        assert_eq!(ranges[0].range.duration, 5.0);
    }

    #[test]
    fn test_more_includes_never_shrink_coverage() {
        let base = pattern(&[(5, true), (8, false), (5, true), (8, false), (4, true)]);
        let analyzer = RangeAnalyzer::new(4.0);
        let base_total = total_duration(&analyzer.analyze(&base));

        // Flipping any single false to true never decreases total coverage.
        for flip in 0..base.len() {
            if base[flip].include {
                continue;
            }
            let mut flipped = base.clone();
            flipped[flip].include = true;
            let total = total_duration(&analyzer.analyze(&flipped));
            assert!(
                total >= base_total,
                "flipping frame {flip} shrank coverage: {total} < {base_total}"
            );
        }
    }

    #[test]
    fn test_collected_detections_grouped_by_uid() {
        let mut input = pattern(&[(4, true)]);
        let mut detected = DetectedData::new();
        detected.insert("fx.1".into(), vec![DetectionItem::Scalar(0.5)]);
        input[1].detected = detected.clone();
        input[3].detected = detected;

        let ranges = RangeAnalyzer::new(30.0).analyze(&input);
        assert_eq!(ranges.len(), 1);
        let frames: Vec<f64> = ranges[0].collection["fx.1"]
            .iter()
            .map(|d| d.frame_number)
            .collect();
        assert_eq!(frames, vec![1.0, 3.0]);
    }

    #[test]
    fn test_update_overwrites_include_column() {
        let mut acc = Accumulator::new();
        for i in 0..4 {
            acc.append(i as f64, true, DetectedData::new());
        }

        let column = vec![
            DetectionItem::Flag(false),
            DetectionItem::Flag(true),
            DetectionItem::Flag(true),
            DetectionItem::Flag(false),
        ];
        acc.update(&column).unwrap();

        let includes: Vec<bool> = acc.accumulated().iter().map(|r| r.include).collect();
        assert_eq!(includes, vec![false, true, true, false]);
    }

    #[test]
    fn test_update_length_mismatch_fails() {
        let mut acc = Accumulator::new();
        acc.append(0.0, true, DetectedData::new());
        let err = acc.update(&[DetectionItem::Flag(true), DetectionItem::Flag(false)]);
        assert!(err.is_err());
    }
}
