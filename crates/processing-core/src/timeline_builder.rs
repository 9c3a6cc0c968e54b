//! Timeline building: decode every segment and merge the speech into one
//! master track.
//!
//! # Algorithm
//!
//! 1. **Decode** each segment's audio (concurrently on the blocking pool for
//!    the async entry point).
//! 2. **Allocate** the master buffer once, sized to the sum of all lengths.
//! 3. **Copy** each decoded buffer at its running sample offset.
//! 4. **Record** `start = offset / rate` and `end = (offset + len) / rate`.
//!
//! Timings are derived from integer sample offsets, so consecutive windows
//! meet exactly (`end[i] == start[i + 1]` with no float accumulation).

use std::sync::Arc;

use mawsooah_audio::decoder::{decode_pcm16, PcmBuffer, SPEECH_SAMPLE_RATE};
use mawsooah_common::error::{MawsooahError, MawsooahResult};
use mawsooah_project_model::segment::Segment;
use mawsooah_project_model::timeline::{SegmentTiming, TimelineError, TimingTable};

/// The merged, read-only result of building a timeline.
///
/// Cloning is cheap; the master buffer and timings are shared.
#[derive(Debug, Clone)]
pub struct Timeline {
    master: Arc<PcmBuffer>,
    timings: Arc<TimingTable>,
}

impl Timeline {
    /// Assemble a timeline from an existing master buffer and timings.
    ///
    /// The last timing must end within one sample of the end of `master`.
    pub fn from_parts(master: Arc<PcmBuffer>, timings: TimingTable) -> MawsooahResult<Self> {
        if timings.is_empty() {
            return Err(MawsooahError::EmptyTimeline);
        }
        timings.validate().map_err(timeline_error)?;

        let master_secs = master.duration_secs();
        let one_sample = 1.0 / master.sample_rate().max(1) as f64;
        if (timings.duration() - master_secs).abs() > one_sample {
            return Err(timeline_error(TimelineError::DurationMismatch {
                timings_secs: timings.duration(),
                master_secs,
            }));
        }
        Ok(Self {
            master,
            timings: Arc::new(timings),
        })
    }

    /// The concatenated speech of every segment.
    pub fn master(&self) -> &Arc<PcmBuffer> {
        &self.master
    }

    pub fn timings(&self) -> &TimingTable {
        &self.timings
    }

    pub fn segment_count(&self) -> usize {
        self.timings.len()
    }

    /// Total duration in seconds (end of the last segment).
    pub fn duration(&self) -> f64 {
        self.timings.duration()
    }

    pub fn active_index(&self, t: f64) -> Option<usize> {
        self.timings.active_index(t)
    }

    pub fn active_at(&self, t: f64) -> Option<&SegmentTiming> {
        self.timings.active_at(t)
    }

    /// Re-check the contiguity invariant.
    pub fn validate(&self) -> MawsooahResult<()> {
        self.timings.validate().map_err(timeline_error)
    }
}

fn timeline_error(err: TimelineError) -> MawsooahError {
    MawsooahError::Other(err.into())
}

fn decode_segment(index: usize, segment: &Segment) -> MawsooahResult<PcmBuffer> {
    decode_pcm16(&segment.audio).map_err(|e| match e {
        MawsooahError::Decode { message } => {
            MawsooahError::decode(format!("segment {index}: {message}"))
        }
        other => other,
    })
}

fn assemble(segments: Vec<Arc<Segment>>, decoded: Vec<PcmBuffer>) -> MawsooahResult<Timeline> {
    let total: usize = decoded.iter().map(PcmBuffer::len).sum();
    let mut master = Vec::with_capacity(total);
    let mut timings = Vec::with_capacity(segments.len());
    let rate = SPEECH_SAMPLE_RATE as f64;

    for (index, (segment, pcm)) in segments.into_iter().zip(decoded).enumerate() {
        let offset = master.len();
        master.extend_from_slice(pcm.samples());
        timings.push(SegmentTiming {
            index,
            start: offset as f64 / rate,
            end: master.len() as f64 / rate,
            segment,
        });
    }

    let timings = TimingTable::new(timings).map_err(timeline_error)?;
    let timeline = Timeline {
        master: Arc::new(PcmBuffer::new(master, SPEECH_SAMPLE_RATE)),
        timings: Arc::new(timings),
    };

    tracing::info!(
        segments = timeline.segment_count(),
        samples = total,
        duration_secs = timeline.duration(),
        "Timeline built"
    );

    Ok(timeline)
}

/// Build a timeline on the current thread.
pub fn build_timeline_blocking(segments: Vec<Segment>) -> MawsooahResult<Timeline> {
    if segments.is_empty() {
        return Err(MawsooahError::EmptyTimeline);
    }

    let segments: Vec<Arc<Segment>> = segments.into_iter().map(Arc::new).collect();
    let decoded = segments
        .iter()
        .enumerate()
        .map(|(index, segment)| decode_segment(index, segment))
        .collect::<MawsooahResult<Vec<_>>>()?;

    assemble(segments, decoded)
}

/// Build a timeline, decoding segments concurrently on the blocking pool.
///
/// The first failing segment (in source order) is reported.
pub async fn build_timeline(segments: Vec<Segment>) -> MawsooahResult<Timeline> {
    if segments.is_empty() {
        return Err(MawsooahError::EmptyTimeline);
    }

    let segments: Vec<Arc<Segment>> = segments.into_iter().map(Arc::new).collect();
    let handles: Vec<_> = segments
        .iter()
        .cloned()
        .enumerate()
        .map(|(index, segment)| {
            tokio::task::spawn_blocking(move || decode_segment(index, &segment))
        })
        .collect();

    let mut decoded = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let pcm = handle.await.map_err(|e| {
            MawsooahError::decode(format!("segment {index}: decode task failed: {e}"))
        })??;
        decoded.push(pcm);
    }

    assemble(segments, decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mawsooah_project_model::segment::MediaBlob;
    use proptest::prelude::*;

    fn segment_with_samples(samples: usize) -> Segment {
        Segment::new(
            format!("{samples} samples"),
            MediaBlob::from_bytes(vec![0x10u8; samples * 2]),
            MediaBlob::from_bytes(vec![1u8, 2, 3]),
        )
    }

    fn segment_with_secs(secs: f64) -> Segment {
        segment_with_samples((secs * SPEECH_SAMPLE_RATE as f64) as usize)
    }

    #[test]
    fn test_three_segment_scenario() {
        let timeline = build_timeline_blocking(vec![
            segment_with_secs(2.0),
            segment_with_secs(3.5),
            segment_with_secs(1.0),
        ])
        .unwrap();

        let windows: Vec<(f64, f64)> = timeline
            .timings()
            .iter()
            .map(|t| (t.start, t.end))
            .collect();
        assert_eq!(windows, vec![(0.0, 2.0), (2.0, 5.5), (5.5, 6.5)]);
        assert_eq!(timeline.duration(), 6.5);
        assert_eq!(timeline.master().len(), 156_000);
        assert_eq!(timeline.active_index(4.0), Some(1));
        assert_eq!(timeline.active_index(6.5), Some(2));
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(
            build_timeline_blocking(Vec::new()),
            Err(MawsooahError::EmptyTimeline)
        ));
    }

    #[test]
    fn test_decode_error_names_segment() {
        let mut bad = segment_with_secs(1.0);
        bad.audio = MediaBlob::from_base64("***");
        let err = build_timeline_blocking(vec![segment_with_secs(1.0), bad]).unwrap_err();
        match err {
            MawsooahError::Decode { message } => assert!(message.starts_with("segment 1:")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_master_preserves_segment_order() {
        let mut first = segment_with_samples(2);
        first.audio = MediaBlob::from_bytes(vec![0x00, 0x40, 0x00, 0x40]); // 0.5, 0.5
        let mut second = segment_with_samples(1);
        second.audio = MediaBlob::from_bytes(vec![0x00, 0xc0]); // -0.5

        let timeline = build_timeline_blocking(vec![first, second]).unwrap();
        assert_eq!(timeline.master().samples(), &[0.5, 0.5, -0.5]);
    }

    fn timings_for(secs: &[f64]) -> TimingTable {
        TimingTable::from_durations(
            secs.iter()
                .map(|d| (Arc::new(segment_with_samples(1)), *d)),
        )
    }

    #[test]
    fn test_from_parts_rejects_timings_longer_than_master() {
        let master = Arc::new(PcmBuffer::silence(12_000, SPEECH_SAMPLE_RATE));
        let err = Timeline::from_parts(master, timings_for(&[1.0])).unwrap_err();
        assert!(err.to_string().contains("master audio lasts"));
    }

    #[test]
    fn test_from_parts_accepts_matching_durations() {
        let master = Arc::new(PcmBuffer::silence(36_000, SPEECH_SAMPLE_RATE));
        let timeline = Timeline::from_parts(master, timings_for(&[0.5, 1.0])).unwrap();
        assert_eq!(timeline.segment_count(), 2);
        assert!(matches!(
            Timeline::from_parts(
                Arc::new(PcmBuffer::silence(24_000, SPEECH_SAMPLE_RATE)),
                TimingTable::default()
            ),
            Err(MawsooahError::EmptyTimeline)
        ));
    }

    #[tokio::test]
    async fn test_async_build_matches_blocking() {
        let segments = vec![
            segment_with_secs(0.25),
            segment_with_samples(777),
            segment_with_secs(1.0),
        ];
        let blocking = build_timeline_blocking(segments.clone()).unwrap();
        let concurrent = build_timeline(segments).await.unwrap();

        assert_eq!(blocking.master(), concurrent.master());
        for (a, b) in blocking.timings().iter().zip(concurrent.timings().iter()) {
            assert_eq!((a.start, a.end), (b.start, b.end));
        }
    }

    #[tokio::test]
    async fn test_async_build_reports_first_failure() {
        let mut bad = segment_with_secs(0.5);
        bad.audio = MediaBlob::from_bytes(Vec::new());
        let err = build_timeline(vec![segment_with_secs(0.5), segment_with_secs(0.5), bad])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("segment 2"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_timings_are_contiguous(lengths in prop::collection::vec(1usize..5000, 1..12)) {
            let segments = lengths.iter().map(|&n| segment_with_samples(n)).collect();
            let timeline = build_timeline_blocking(segments).unwrap();
            let timings = timeline.timings().timings();

            prop_assert_eq!(timings[0].start, 0.0);
            for pair in timings.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
            prop_assert_eq!(timeline.master().len(), lengths.iter().sum::<usize>());
            prop_assert!(
                (timeline.duration() - timeline.master().duration_secs()).abs() < 1e-9
            );
        }
    }
}
