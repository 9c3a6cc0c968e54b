//! Segment timings: where each segment sits on the merged timeline.
//!
//! Timings are contiguous, ascending, and start at zero:
//! `start[0] == 0`, `end[i] == start[i + 1]`, `end[last] == duration`.
//! Every downstream consumer (scheduler, export) resolves the active
//! segment through [`TimingTable::active_index`].

use std::sync::Arc;

use crate::segment::{MediaBlob, Segment};

/// Timing invariant violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("first segment starts at {start} instead of 0")]
    NonZeroStart { start: f64 },

    #[error("segment {index} ends before it starts ({start} > {end})")]
    Inverted { index: usize, start: f64, end: f64 },

    #[error("segment {index} does not start where the previous segment ends")]
    Gap { index: usize },

    #[error("timings end at {timings_secs}s but the master audio lasts {master_secs}s")]
    DurationMismatch { timings_secs: f64, master_secs: f64 },
}

/// The time window of one segment on the merged timeline.
#[derive(Debug, Clone)]
pub struct SegmentTiming {
    /// Position of the segment in the source order.
    pub index: usize,
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds (exclusive).
    pub end: f64,
    /// The segment shown during this window.
    pub segment: Arc<Segment>,
}

impl SegmentTiming {
    /// Length of the window in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Image displayed during this window.
    pub fn image(&self) -> &MediaBlob {
        &self.segment.image
    }

    /// Whether `t` falls inside `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Time elapsed inside this window at absolute time `t`.
    pub fn local_time(&self, t: f64) -> f64 {
        (t - self.start).max(0.0)
    }
}

/// Ordered, read-only list of segment timings.
#[derive(Debug, Clone, Default)]
pub struct TimingTable {
    timings: Vec<SegmentTiming>,
}

impl TimingTable {
    /// Wrap timings, checking the contiguity invariant.
    pub fn new(timings: Vec<SegmentTiming>) -> Result<Self, TimelineError> {
        let table = Self { timings };
        table.validate()?;
        Ok(table)
    }

    /// Lay segments out back to back from their durations in seconds.
    pub fn from_durations(
        segments: impl IntoIterator<Item = (Arc<Segment>, f64)>,
    ) -> Self {
        let mut offset = 0.0;
        let timings = segments
            .into_iter()
            .enumerate()
            .map(|(index, (segment, duration))| {
                let start = offset;
                offset += duration.max(0.0);
                SegmentTiming {
                    index,
                    start,
                    end: offset,
                    segment,
                }
            })
            .collect();
        Self { timings }
    }

    /// Check `start[0] == 0`, `start <= end`, and `end[i] == start[i + 1]`.
    pub fn validate(&self) -> Result<(), TimelineError> {
        if let Some(first) = self.timings.first() {
            if first.start != 0.0 {
                return Err(TimelineError::NonZeroStart { start: first.start });
            }
        }
        for (index, timing) in self.timings.iter().enumerate() {
            if timing.start > timing.end {
                return Err(TimelineError::Inverted {
                    index,
                    start: timing.start,
                    end: timing.end,
                });
            }
            if index > 0 && self.timings[index - 1].end != timing.start {
                return Err(TimelineError::Gap { index });
            }
        }
        Ok(())
    }

    pub fn timings(&self) -> &[SegmentTiming] {
        &self.timings
    }

    pub fn len(&self) -> usize {
        self.timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SegmentTiming> {
        self.timings.get(index)
    }

    /// Total timeline duration in seconds.
    pub fn duration(&self) -> f64 {
        self.timings.last().map(|t| t.end).unwrap_or(0.0)
    }

    /// Index of the segment active at `t`.
    ///
    /// Binary search over the sorted start times: the active segment is the
    /// one with `start <= t < end`. Times at or past the end resolve to the
    /// last segment; negative times resolve to the first. Returns `None`
    /// only for an empty table.
    pub fn active_index(&self, t: f64) -> Option<usize> {
        if self.timings.is_empty() {
            return None;
        }
        let started = self.timings.partition_point(|timing| timing.start <= t);
        Some(started.saturating_sub(1).min(self.timings.len() - 1))
    }

    /// The timing active at `t`. See [`TimingTable::active_index`].
    pub fn active_at(&self, t: f64) -> Option<&SegmentTiming> {
        self.active_index(t).map(|index| &self.timings[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentTiming> {
        self.timings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn segment(label: &str) -> Arc<Segment> {
        Arc::new(Segment::new(
            label,
            MediaBlob::from_bytes(vec![0u8, 0]),
            MediaBlob::from_bytes(label.as_bytes().to_vec()),
        ))
    }

    fn table(durations: &[f64]) -> TimingTable {
        TimingTable::from_durations(
            durations
                .iter()
                .enumerate()
                .map(|(i, d)| (segment(&format!("s{i}")), *d)),
        )
    }

    #[test]
    fn test_three_segment_scenario() {
        let table = table(&[2.0, 3.5, 1.0]);
        let windows: Vec<(f64, f64)> = table.iter().map(|t| (t.start, t.end)).collect();
        assert_eq!(windows, vec![(0.0, 2.0), (2.0, 5.5), (5.5, 6.5)]);
        assert_eq!(table.duration(), 6.5);

        assert_eq!(table.active_index(4.0), Some(1));
        assert_eq!(table.active_index(6.5), Some(2));
        assert_eq!(table.active_index(2.0), Some(1));
        assert_eq!(table.active_index(0.0), Some(0));
    }

    #[test]
    fn test_out_of_range_lookups() {
        let table = table(&[1.0, 1.0]);
        assert_eq!(table.active_index(-0.5), Some(0));
        assert_eq!(table.active_index(99.0), Some(1));
        assert_eq!(TimingTable::default().active_index(0.0), None);
    }

    #[test]
    fn test_zero_length_segment_is_never_active_inside_timeline() {
        let table = table(&[1.0, 0.0, 1.0]);
        assert_eq!(table.active_index(1.0), Some(2));
        assert_eq!(table.active_index(0.999), Some(0));
    }

    #[test]
    fn test_validate_rejects_gaps() {
        let mut timings = table(&[1.0, 1.0]).timings().to_vec();
        timings[1].start = 1.25;
        assert_eq!(
            TimingTable::new(timings).unwrap_err(),
            TimelineError::Gap { index: 1 }
        );
    }

    #[test]
    fn test_validate_rejects_nonzero_start() {
        let mut timings = table(&[1.0]).timings().to_vec();
        timings[0].start = 0.1;
        assert!(matches!(
            TimingTable::new(timings),
            Err(TimelineError::NonZeroStart { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_lookup_returns_containing_segment(
            durations in prop::collection::vec(0.01f64..30.0, 1..24),
            fraction in 0.0f64..1.0,
        ) {
            let table = table(&durations);
            prop_assert!(table.validate().is_ok());

            let t = table.duration() * fraction;
            let index = table.active_index(t).unwrap();
            let timing = table.get(index).unwrap();
            prop_assert!(timing.contains(t));
            prop_assert_eq!(
                table.iter().filter(|timing| timing.contains(t)).count(),
                1
            );
        }

        #[test]
        fn prop_upper_boundary_resolves_to_last(
            durations in prop::collection::vec(0.01f64..30.0, 1..24),
        ) {
            let table = table(&durations);
            prop_assert_eq!(table.active_index(table.duration()), Some(durations.len() - 1));
        }

        #[test]
        fn prop_windows_sum_to_duration(
            durations in prop::collection::vec(0.0f64..30.0, 1..24),
        ) {
            let table = table(&durations);
            let total: f64 = table.iter().map(SegmentTiming::duration).sum();
            prop_assert!((total - table.duration()).abs() < 1e-9);
        }
    }
}
