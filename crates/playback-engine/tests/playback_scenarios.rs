use std::io::Cursor;
use std::sync::{Arc, Mutex};

use image::{ImageFormat, Rgba, RgbaImage};

use mawsooah_audio::decoder::SPEECH_SAMPLE_RATE;
use mawsooah_audio::session::{AudioOutput, SilentAudioOutput};
use mawsooah_common::clock::ManualClock;
use mawsooah_playback_engine::{PlaybackSession, PlaybackState, SegmentChange};
use mawsooah_processing_core::ken_burns::{KenBurnsAnimation, SeededEffectSelector};
use mawsooah_processing_core::timeline_builder::{build_timeline_blocking, Timeline};
use mawsooah_project_model::segment::{MediaBlob, Segment, SubtitleMode};
use mawsooah_render_engine::compositor::{FrameCompositor, SubtitleStyle};
use mawsooah_render_engine::export::{ExportEngine, ExportSettings};
use mawsooah_render_engine::recorder::{MemoryRecorderBackend, RecorderBackend};

fn png(color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(6, 4, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn timeline(durations: &[f64]) -> Timeline {
    let segments = durations
        .iter()
        .enumerate()
        .map(|(i, secs)| {
            let samples = (secs * SPEECH_SAMPLE_RATE as f64).round() as usize;
            let audio: Vec<u8> = (0..samples)
                .flat_map(|n| ((n % 100) as i16 * 80).to_le_bytes())
                .collect();
            let shade = 60 + (i as u8) * 60;
            Segment::new(
                format!("line {i}"),
                MediaBlob::from_bytes(audio),
                MediaBlob::from_bytes(png([shade, 0, 0, 255])),
            )
        })
        .collect();
    build_timeline_blocking(segments).unwrap()
}

fn silent_output(clock: &ManualClock) -> Arc<SilentAudioOutput> {
    Arc::new(SilentAudioOutput::new(Arc::new(clock.clone())))
}

fn engine(output: &SilentAudioOutput) -> (Arc<MemoryRecorderBackend>, ExportEngine) {
    let backend = Arc::new(MemoryRecorderBackend::new());
    let engine = ExportEngine::new(
        backend.clone() as Arc<dyn RecorderBackend>,
        Arc::new(FrameCompositor::new(SubtitleStyle::default())),
    )
    .with_tracker(output.tracker().clone());
    (backend, engine)
}

#[test]
fn export_while_playing_pauses_first() {
    let clock = ManualClock::new();
    let output = silent_output(&clock);
    let mut session = PlaybackSession::new(timeline(&[2.0, 3.5, 1.0]), output.clone());
    let (backend, engine) = engine(&output);

    session.play(0.0).unwrap();
    clock.advance(2.5);
    session.tick();

    let settings = ExportSettings::default().with_size(32, 18, 10).with_topic("Nile");
    let video = session.export_video(&engine, settings, None).unwrap();

    assert_eq!(session.state(), PlaybackState::Paused);
    assert!((session.paused_offset() - 2.5).abs() < 1e-9);
    assert_eq!(video.file_name, "mawsooah-Nile.mp4");

    let tracker = output.tracker();
    assert_eq!(tracker.peak(), 1);
    assert_eq!(tracker.active(), 0);

    let recordings = backend.recordings();
    assert_eq!(recordings.len(), 1);
    assert!(recordings[0].finished);
    assert_eq!(
        recordings[0].audio_samples.len(),
        session.timeline().master().len()
    );
}

#[tokio::test]
async fn async_export_keeps_session_usable() {
    let clock = ManualClock::new();
    let output = silent_output(&clock);
    let mut session = PlaybackSession::new(timeline(&[0.5, 0.5]), output.clone());
    let (_, engine) = engine(&output);

    session.play(0.2).unwrap();
    let settings = ExportSettings::default().with_size(16, 16, 8);
    let video = session
        .export_video_async(Arc::new(engine), settings, None)
        .await
        .unwrap();
    assert!(!video.is_empty());

    session.resume().unwrap();
    assert_eq!(session.state(), PlaybackState::Playing);
    assert!((session.position() - 0.2).abs() < 1e-9);
    assert_eq!(output.tracker().peak(), 1);
}

#[test]
fn seeded_live_selection_matches_export_effects() {
    let clock = ManualClock::new();
    let mut session = PlaybackSession::new(timeline(&[2.0, 3.5, 1.0]), silent_output(&clock))
        .with_selector(SeededEffectSelector);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.add_observer(move |change: &SegmentChange| sink.lock().unwrap().push(change.clone()));

    session.play(0.0).unwrap();
    clock.advance(3.0);
    session.tick();

    let expected = KenBurnsAnimation::for_timing(
        SeededEffectSelector::effect_for_start(2.0),
        &session.timeline().timings().timings()[1],
    )
    .transform_at(1.0);
    assert_eq!(session.current_transform(), expected);
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn live_frame_shows_active_segment_image() {
    let clock = ManualClock::new();
    let mut session = PlaybackSession::new(timeline(&[1.0, 1.0]), silent_output(&clock))
        .with_subtitle_mode(SubtitleMode::Off);
    let mut surface = RgbaImage::new(12, 8);

    session.render_frame(&mut surface);
    assert_eq!(surface.get_pixel(6, 4).0, [60, 0, 0, 255]);

    session.seek(1.5).unwrap();
    session.render_frame(&mut surface);
    assert_eq!(surface.get_pixel(6, 4).0, [120, 0, 0, 255]);
}

#[test]
fn stopped_session_can_replay_after_end() {
    let clock = ManualClock::new();
    let output = silent_output(&clock);
    let mut session = PlaybackSession::new(timeline(&[0.5]), output.clone());

    session.play(0.0).unwrap();
    clock.advance(5.0);
    assert_eq!(session.tick(), PlaybackState::Stopped);
    assert!((session.position() - 0.5).abs() < 1e-9);

    session.resume().unwrap();
    clock.advance(0.25);
    session.tick();
    assert!((session.position() - 0.25).abs() < 1e-9);
    assert_eq!(output.tracker().opened(), 2);
    assert_eq!(output.tracker().peak(), 1);
}
