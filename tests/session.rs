// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::*;
use yolo_soundscape::detection::Overlay;
use yolo_soundscape::error::SessionError;
use yolo_soundscape::input::SourceHandle;
use yolo_soundscape::pipeline::{PipelineTopology, StopSignal};
use yolo_soundscape::session::{Collaborators, MemorySession, SessionOptions};
use yolo_soundscape::sound::SoundId;

struct Harness {
    sink: Arc<RecordingSink>,
    opener: Arc<ScriptedOpener>,
    player: Arc<RecordingPlayer>,
    session: MemorySession,
}

fn options() -> SessionOptions {
    SessionOptions {
        enable_palette: true,
        enable_video_generation: false,
        enable_detection: false,
        stop_sounds_on_exit: false,
        cameras: vec![cam(0), cam(1)],
        video: None,
    }
}

fn harness(
    options: SessionOptions,
    palette: Result<&str, ()>,
    video: Option<PathBuf>,
    opener: ScriptedOpener,
) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let opener = Arc::new(opener);
    let player = Arc::new(RecordingPlayer::default());
    let parts = Collaborators {
        palette: Arc::new(FixedPalette(palette.map(str::to_string))),
        video: Arc::new(FixedVideo(video)),
        playback: player.clone(),
        opener: opener.clone(),
        detectors: Arc::new(ScriptedFactory::detecting(&["car"])),
        overlay: Arc::new(Overlay::boxes_only()),
        display: Arc::new(RecordingDisplay::new()),
    };
    let session = MemorySession::new(
        options,
        dispatcher(sink.clone(), &["rain", "city", "forest"]),
        parts,
        StopSignal::new(),
    );
    Harness {
        sink,
        opener,
        player,
        session,
    }
}

fn msg(path: &str, id: &str) -> (String, String) {
    (path.to_string(), id.to_string())
}

#[test]
fn test_palette_is_filtered_and_triggered() {
    let h = harness(
        options(),
        Ok("Rain, thunder, CITY, rain"),
        None,
        ScriptedOpener::empty(),
    );
    let outcome = h.session.run("a rainy city at night").unwrap();
    assert_eq!(
        outcome.palette,
        vec![SoundId::new("rain"), SoundId::new("city")]
    );
    assert!(outcome.report.is_none());
    assert_eq!(
        h.sink.messages(),
        vec![msg("/class", "rain"), msg("/class", "city")]
    );
}

#[test]
fn test_palette_failure_degrades_to_detection() {
    let h = harness(
        SessionOptions {
            enable_detection: true,
            cameras: vec![cam(0)],
            ..options()
        },
        Err(()),
        None,
        ScriptedOpener::new([(cam(0), frames(3, 32, 24))]),
    );
    let outcome = h.session.run("street").unwrap();
    assert!(outcome.palette.is_empty());
    let report = outcome.report.unwrap();
    assert_eq!(report.topology, PipelineTopology::Single(cam(0)));
    assert_eq!(report.iterations, 3);
    assert_eq!(h.sink.messages(), vec![msg("/class", "city")]);
}

#[test]
fn test_video_generation_failure_ends_session() {
    let h = harness(
        SessionOptions {
            enable_video_generation: true,
            enable_detection: true,
            ..options()
        },
        Ok("rain"),
        None,
        ScriptedOpener::new([(cam(0), frames(3, 32, 24))]),
    );
    let outcome = h.session.run("harbour").unwrap();
    assert!(outcome.ended_early);
    assert!(outcome.report.is_none());
    assert_eq!(h.opener.log.reads(&cam(0)), 0);
    assert_eq!(h.sink.messages(), vec![msg("/class", "rain")]);
}

#[test]
fn test_generated_video_is_played_without_detection() {
    let video = PathBuf::from("memory_test.mp4");
    let h = harness(
        SessionOptions {
            enable_video_generation: true,
            ..options()
        },
        Ok(""),
        Some(video.clone()),
        ScriptedOpener::empty(),
    );
    let outcome = h.session.run("forest").unwrap();
    assert!(outcome.played);
    assert_eq!(outcome.video, Some(video.clone()));
    assert_eq!(*h.player.played.lock().unwrap(), vec![video]);
}

#[test]
fn test_existing_video_is_detected_as_single_source() {
    let video = PathBuf::from("clip.mp4");
    let handle = SourceHandle::File(video.clone());
    let h = harness(
        SessionOptions {
            enable_detection: true,
            video: Some(video),
            ..options()
        },
        Ok(""),
        None,
        ScriptedOpener::new([(handle.clone(), frames(2, 32, 24))]),
    );
    let outcome = h.session.run("traffic").unwrap();
    let report = outcome.report.unwrap();
    assert_eq!(report.topology, PipelineTopology::Single(handle));
    assert_eq!(report.dispatched, 1);
    assert!(h.player.played.lock().unwrap().is_empty());
}

#[test]
fn test_stop_sounds_on_exit() {
    let h = harness(
        SessionOptions {
            stop_sounds_on_exit: true,
            ..options()
        },
        Ok("rain"),
        None,
        ScriptedOpener::empty(),
    );
    h.session.run("drizzle").unwrap();
    assert_eq!(
        h.sink.messages(),
        vec![msg("/class", "rain"), msg("/stop", "rain")]
    );
}

#[test]
fn test_no_camera_is_fatal() {
    let h = harness(
        SessionOptions {
            enable_detection: true,
            ..options()
        },
        Ok(""),
        None,
        ScriptedOpener::empty(),
    );
    assert!(matches!(
        h.session.run("empty room"),
        Err(SessionError::NoSourceAvailable { .. })
    ));
}
