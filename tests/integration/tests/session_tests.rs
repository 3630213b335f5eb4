//! End-to-end tests for a playback session
//!
//! Each test runs the real decode thread against scripted collaborators and
//! drives ticks from the test thread the way a host would.

use tickplay::decoder::SeekDirection;
use tickplay::pipeline::QueueKind;
use tickplay::utils::Config;
use tickplay::{Button, PlaybackState, PlayerError, PlayerSession, SessionBuilder, SessionEvent};
use tickplay_integration_tests::{
    run_to_end, track_sample, MediaScript, Presented, SharedJournal, TestHost, SAMPLE_RATE, VIDEO_STREAM,
};

fn open(script: &MediaScript) -> (PlayerSession, SharedJournal) {
    let (sources, journal) = script.build();
    let session = PlayerSession::open(sources).expect("open failed");
    (session, journal)
}

#[test]
fn test_plays_to_end_and_requests_shutdown() {
    let (mut session, _journal) = open(&MediaScript::new(2.0));
    let mut host = TestHost::new();

    run_to_end(&mut session, &mut host, 2_000);

    // Every decoded audio frame reaches the host exactly once
    assert_eq!(host.samples.len(), 2 * SAMPLE_RATE as usize * 2);
    assert!(host.samples.iter().all(|&s| s == track_sample(0)));

    // Presentation timestamps never go backwards
    let indices = host.frame_indices();
    assert!(!indices.is_empty());
    assert!(indices.windows(2).all(|w| w[0] <= w[1]), "{:?}", indices);
    assert_eq!(indices.last(), Some(&59));

    let stats = session.stats();
    assert_eq!(stats.audio_frames_delivered, 2 * SAMPLE_RATE as u64);
    assert_eq!(stats.seeks, 0);
    assert_eq!(session.state(), PlaybackState::Ended);

    let events: Vec<_> = session.events().try_iter().collect();
    assert!(events.contains(&SessionEvent::EndOfStream));
}

#[test]
fn test_first_tick_without_frame_is_dupe() {
    let (mut session, _journal) = open(&MediaScript::new(1.0));
    let mut host = TestHost::new();

    session.run(&mut host).unwrap();
    assert_eq!(host.frames, vec![Presented::Dupe { width: 4, height: 2 }]);
}

#[test]
fn test_seek_forward_lands_on_target() {
    let (mut session, journal) = open(&MediaScript::new(20.0));
    let mut host = TestHost::new();

    // 10 s at 60 ticks per second from tick zero
    let target = session.seek(10);
    assert_eq!(target, Some(10.0));
    assert_eq!(session.position(), 10.0);
    assert_eq!(session.stats().seeks, 1);

    {
        let journal = journal.lock();
        assert_eq!(journal.seeks.len(), 1);
        let (hint, seconds, direction) = journal.seeks[0];
        assert_eq!(hint, Some(VIDEO_STREAM));
        assert_eq!(seconds, 10.0);
        assert_eq!(direction, SeekDirection::Forward);
        assert_eq!(journal.video_flushes, 1);
        assert_eq!(journal.audio_flushes, vec![0]);
    }

    for _ in 0..30 {
        session.run(&mut host).unwrap();
    }

    // Nothing decoded before the seek leaks into presentation
    let indices = host.frame_indices();
    assert!(!indices.is_empty());
    assert!(indices.iter().all(|&i| i >= 300), "{:?}", indices);
    assert!(session.position() >= 10.0);

    let events: Vec<_> = session.events().try_iter().collect();
    assert!(events.contains(&SessionEvent::SeekCompleted { position: 10.0 }));
}

#[test]
fn test_seek_button_moves_by_short_step() {
    let (mut session, journal) = open(&MediaScript::new(20.0));
    let mut host = TestHost::new();

    host.press(Button::Right);
    session.run(&mut host).unwrap();
    host.release_all();
    session.run(&mut host).unwrap();

    assert_eq!(journal.lock().seeks.len(), 1);
    assert_eq!(journal.lock().seeks[0].1, 10.0);
    assert_eq!(session.stats().seeks, 1);
}

#[test]
fn test_seek_before_start_clamps_to_zero() {
    let (mut session, journal) = open(&MediaScript::new(5.0));

    assert_eq!(session.seek(-60), Some(0.0));
    assert_eq!(journal.lock().seeks[0].1, 0.0);
    assert_eq!(session.position(), 0.0);
}

#[test]
fn test_failed_seek_still_completes() {
    let (mut session, journal) = open(&MediaScript::new(5.0).failing_seeks());
    let mut host = TestHost::new();

    assert_eq!(session.seek(2), Some(2.0));
    assert_eq!(journal.lock().seeks.len(), 1);
    // Decoders are left alone when the demuxer could not move
    assert_eq!(journal.lock().video_flushes, 0);

    for _ in 0..10 {
        session.run(&mut host).unwrap();
    }
}

#[test]
fn test_audio_track_switch() {
    let (mut session, journal) = open(&MediaScript::new(4.0).audio_tracks(2));
    let mut host = TestHost::new();

    for _ in 0..10 {
        session.run(&mut host).unwrap();
    }
    assert!(host.samples.iter().all(|&s| s == track_sample(0)));

    host.press(Button::L);
    session.run(&mut host).unwrap();
    host.release_all();

    assert_eq!(host.messages, vec!["Audio Track #1".to_string()]);
    assert_eq!(session.selection().audio.active(), Some(1));

    run_to_end(&mut session, &mut host, 2_000);

    // Already queued audio of the old track plays out before the new one
    let first_new = host.samples.iter().position(|&s| s == track_sample(1)).expect("new track never played");
    assert!(host.samples[..first_new].iter().all(|&s| s == track_sample(0)));
    assert!(host.samples[first_new..].iter().all(|&s| s == track_sample(1)));
    assert!(journal.lock().audio_flushes.contains(&1));

    let events: Vec<_> = session.events().try_iter().collect();
    assert!(events.contains(&SessionEvent::AudioTrackChanged { track: 1 }));
}

#[test]
fn test_subtitle_tracks_all_decoded_active_one_rendered() {
    let (mut session, journal) = open(&MediaScript::new(3.0).subtitle_tracks(2));
    let mut host = TestHost::new();

    for _ in 0..20 {
        session.run(&mut host).unwrap();
    }

    host.press(Button::R);
    session.run(&mut host).unwrap();
    host.release_all();
    assert_eq!(host.messages, vec!["Subtitle Track #1".to_string()]);

    run_to_end(&mut session, &mut host, 2_000);

    let journal = journal.lock();
    let tracks: Vec<usize> = journal.processed.iter().map(|(track, _)| *track).collect();
    assert!(tracks.contains(&0) && tracks.contains(&1));
    assert_eq!(journal.rendered_tracks.first(), Some(&0));
    assert_eq!(journal.rendered_tracks.last(), Some(&1));

    // The overlay pixel is composited before the frame is queued
    let overlaid = host.frames.iter().find_map(|f| match f {
        Presented::Pixels(pixels) => Some(pixels[0]),
        _ => None,
    });
    assert_eq!(overlaid.map(|p| p & 0x00ff_ffff), Some(0x00ff_ffff));
}

#[test]
fn test_cycle_without_subtitles_does_nothing() {
    let (mut session, _journal) = open(&MediaScript::new(1.0));
    let mut host = TestHost::new();

    host.press(Button::R);
    session.run(&mut host).unwrap();

    assert!(host.messages.is_empty());
    assert_eq!(session.selection().subtitle.active(), None);
}

#[test]
fn test_congestion_clears_video_queue() {
    // All video sits ahead of the audio, so the decode thread can only reach
    // audio the consumer is waiting for by dropping queued video.
    let (mut session, _journal) = open(&MediaScript::new(3.0).video_first());
    let mut host = TestHost::new();

    run_to_end(&mut session, &mut host, 2_000);

    let stats = session.stats();
    assert!(stats.congestion_drops >= 1);
    assert_eq!(host.samples.len(), 3 * SAMPLE_RATE as usize * 2);

    let events: Vec<_> = session.events().try_iter().collect();
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::CongestionDrop { queue: QueueKind::Video, .. })));
}

#[test]
fn test_audio_only_reports_fallback_geometry() {
    let (mut session, _journal) = open(&MediaScript::new(1.0).without_video());
    let mut host = TestHost::new();

    let info = session.av_info();
    assert_eq!((info.width, info.height), (320, 240));
    assert_eq!(info.sample_rate, SAMPLE_RATE);

    run_to_end(&mut session, &mut host, 1_000);
    assert!(host.frames.iter().all(|f| *f == Presented::Dupe { width: 320, height: 240 }));
    assert_eq!(host.samples.len(), SAMPLE_RATE as usize * 2);
}

#[test]
fn test_video_only_runs_on_tick_clock() {
    let (mut session, _journal) = open(&MediaScript::new(1.0).audio_tracks(0));
    let mut host = TestHost::new();

    assert_eq!(session.av_info().sample_rate, 32_000);
    let ticks = run_to_end(&mut session, &mut host, 1_000);

    // 30 frames at 30 fps take about 60 ticks at 60 ticks per second
    assert!((55..=70).contains(&ticks), "{} ticks", ticks);
    assert!(host.samples.is_empty());
    assert_eq!(host.frame_indices().last(), Some(&29));
}

fn first_ticks(interp: &str) -> Vec<Presented> {
    // Frames 64 apart in blue so a cross-fade cannot round back to a frame
    let (mut session, _journal) = open(&MediaScript::new(2.0).audio_tracks(0).pixel_step(64));
    let mut host = TestHost::new();
    host.set_option(tickplay::host::OPTION_TEMPORAL_INTERP, interp);

    for _ in 0..3 {
        session.run(&mut host).unwrap();
    }
    host.frames
}

#[test]
fn test_interpolation_blends_between_frames() {
    // Tick 1 sits halfway between frame 0 (0x00) and frame 1 (0x40)
    let frames = first_ticks("enabled");
    assert_eq!(frames[1].frame_index(), Some(0x20));

    // Tick 2 lands exactly on frame 1
    assert_eq!(frames[2].frame_index(), Some(0x40));
}

#[test]
fn test_interpolation_disabled_presents_next_frame() {
    let frames = first_ticks("disabled");
    assert_eq!(frames[1].frame_index(), Some(0x40));
    assert_eq!(frames[2].frame_index(), Some(0x40));
}

#[test]
fn test_drop_mid_playback_stops_decode_thread() {
    let (mut session, _journal) = open(&MediaScript::new(30.0));
    let mut host = TestHost::new();

    for _ in 0..5 {
        session.run(&mut host).unwrap();
    }
    drop(session);
}

#[test]
fn test_open_rejects_media_without_audio_or_video() {
    let (sources, _journal) = MediaScript::new(1.0).audio_tracks(0).without_video().subtitle_tracks(1).build();
    match PlayerSession::open(sources) {
        Err(PlayerError::UnsupportedFormat(_)) => {}
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("open should fail"),
    }
}

#[test]
fn test_open_rejects_invalid_config() {
    let (sources, _journal) = MediaScript::new(1.0).build();
    let mut config = Config::default();
    config.pipeline.video_buffer_frames = 0;

    assert!(matches!(
        SessionBuilder::new().with_config(config).open(sources),
        Err(PlayerError::Config(_))
    ));
}

#[test]
fn test_session_from_config_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tickplay.toml");
    std::fs::write(&path, "[pipeline]\ninterpolate_fps = 30.0\n\n[input]\nseek_step_secs = 5\n")?;

    let config = Config::from_file(&path)?;
    let (sources, journal) = MediaScript::new(20.0).build();
    let mut session = SessionBuilder::new().with_config(config).open(sources)?;
    let mut host = TestHost::new();

    assert_eq!(session.av_info().fps, 30.0);

    host.press(Button::Right);
    session.run(&mut host)?;

    assert_eq!(journal.lock().seeks[0].1, 5.0);
    Ok(())
}
