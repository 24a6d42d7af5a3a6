//! Playback engine: framing, stop requests, exclusivity and error recovery.
//!
//! Run with: cargo test -p vs1053 --test playback
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]

mod common;

use common::{guarded, poll_ready, ready_codec, until};
use embassy_futures::join::{join, join3};
use embassy_futures::select::{select, Either};
use embassy_futures::yield_now;
use platform::mocks::{BusEvent, MemorySink, SimulatedCodec};
use vs1053::{CodecError, PatchImage, PlaybackState, FRAME_LEN};

fn audio(len: usize) -> Vec<u8> {
    (0..len).map(|i| i as u8).collect()
}

#[tokio::test]
async fn test_buffer_is_sent_in_whole_frames() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;
    let data = audio(100);

    let report = codec.play(&data).await.unwrap();

    assert_eq!(report.frames_sent, 3);
    assert_eq!(report.bytes_sent, 96);
    assert_eq!(report.bytes_dropped, 4);
    assert!(!report.stopped);

    let frames = sim.data_frames();
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.as_slice(), &data[i * FRAME_LEN..(i + 1) * FRAME_LEN]);
    }
}

#[tokio::test]
async fn test_each_frame_waits_for_dreq() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;
    let polls_before = sim.ready_polls();

    codec.play(&audio(FRAME_LEN * 5)).await.unwrap();

    // 5 frames + reset sequence (MODE write, wait, CLOCKF write)
    assert_eq!(sim.ready_polls() - polls_before, 5 + 3);
}

#[tokio::test]
async fn test_session_ends_with_reset_and_idle() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    codec.play(&audio(FRAME_LEN * 2)).await.unwrap();

    assert_eq!(sim.resets(), 2, "init + end of playback");
    let writes = sim.writes();
    assert_eq!(writes, vec![(0x00, 0x0804), (0x03, 0xA000)]);
    assert!(matches!(sim.events().last(), Some(BusEvent::Write { register: 0x03, .. })));
    assert_eq!(codec.playback_state(), PlaybackState::Idle);
    assert!(!codec.is_busy());
}

#[tokio::test]
async fn test_short_buffer_sends_nothing() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    let report = codec.play(&audio(FRAME_LEN - 1)).await.unwrap();

    assert_eq!(report.frames_sent, 0);
    assert_eq!(report.bytes_dropped, FRAME_LEN - 1);
    assert!(sim.data_frames().is_empty());

    let empty = codec.play(&[]).await.unwrap();
    assert_eq!(empty.frames_sent, 0);
    assert_eq!(empty.bytes_dropped, 0);
}

#[tokio::test]
async fn test_stop_mid_stream() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;
    let data = audio(FRAME_LEN * 100);

    let (played, (), finished) = guarded(join3(
        codec.play(&data),
        async {
            until(|| sim.data_frames().len() >= 2).await;
            codec.stop_playing();
        },
        codec.wait_playback_finished(),
    ))
    .await;

    let report = played.unwrap();
    assert!(report.stopped);
    assert!(report.frames_sent >= 2 && report.frames_sent < 100);
    assert_eq!(sim.data_frames().len(), report.frames_sent);
    assert_eq!(finished, report);

    // Exactly one notification per session
    assert!(poll_ready(codec.wait_playback_finished()).await.is_none());
    assert!(!codec.is_busy());
}

#[tokio::test]
async fn test_stop_while_idle_is_ignored() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    codec.stop_playing();
    let report = codec.play(&audio(FRAME_LEN * 2)).await.unwrap();

    assert!(!report.stopped);
    assert_eq!(report.frames_sent, 2);
}

#[tokio::test]
async fn test_unobserved_report_does_not_leak_into_next_session() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    codec.play(&audio(FRAME_LEN)).await.unwrap();
    let (second, finished) = join(
        codec.play(&audio(FRAME_LEN * 3)),
        codec.wait_playback_finished(),
    )
    .await;

    assert_eq!(second.unwrap().frames_sent, 3);
    assert_eq!(finished.frames_sent, 3);
}

#[tokio::test]
async fn test_second_session_is_rejected() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;
    let data = audio(FRAME_LEN * 4);

    let (first, (second, recording, sine)) = join(codec.play(&data), async {
        yield_now().await;
        assert!(codec.is_playing());
        (
            codec.play(&data).await,
            codec.record(MemorySink::new(), &PatchImage::EMPTY).await,
            codec.sine_test(0x44, 10).await,
        )
    })
    .await;

    assert_eq!(first.unwrap().frames_sent, 4);
    assert_eq!(second.unwrap_err(), CodecError::AlreadyBusy);
    assert_eq!(recording.unwrap_err(), CodecError::AlreadyBusy);
    assert_eq!(sine.unwrap_err(), CodecError::AlreadyBusy);
    assert_eq!(sim.data_frames().len(), 4);
}

#[tokio::test]
async fn test_volume_changes_interleave_with_frames() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    let (played, volume) = join(codec.play(&audio(FRAME_LEN * 4)), async {
        yield_now().await;
        codec.set_volume(10, 10).await
    })
    .await;
    played.unwrap();
    volume.unwrap();

    let events = sim.events();
    let vol = events
        .iter()
        .position(|e| matches!(e, BusEvent::Write { register: 0x0B, .. }))
        .unwrap();
    let last_frame = events
        .iter()
        .rposition(|e| matches!(e, BusEvent::Data(_)))
        .unwrap();
    assert!(vol < last_frame, "volume write landed mid-stream");
    assert_eq!(codec.left_volume(), 10);
}

#[tokio::test]
async fn test_bus_error_sets_error_state_and_still_resets() {
    let sim = SimulatedCodec::new().failing_data_after(2);
    let codec = ready_codec(&sim).await;

    let (played, finished) = join(
        codec.play(&audio(FRAME_LEN * 6)),
        codec.wait_playback_finished(),
    )
    .await;

    assert_eq!(played.unwrap_err(), CodecError::Transport);
    assert_eq!(finished.frames_sent, 2);
    assert!(!finished.stopped);
    assert_eq!(codec.playback_state(), PlaybackState::Error);
    assert!(!codec.is_busy());
    assert_eq!(sim.resets(), 2);
}

#[tokio::test]
async fn test_dropped_play_future_releases_device() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;
    let data = audio(FRAME_LEN * 50);

    let outcome = select(codec.play(&data), async {
        until(|| sim.data_frames().len() >= 3).await;
    })
    .await;
    assert!(matches!(outcome, Either::Second(())));

    assert!(!codec.is_busy());
    let report = poll_ready(codec.wait_playback_finished())
        .await
        .expect("abandoned session still notifies");
    assert!(report.stopped);

    // Device is usable again
    assert_eq!(codec.play(&data[..FRAME_LEN]).await.unwrap().frames_sent, 1);
}
