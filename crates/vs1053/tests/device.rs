//! Device bring-up, reset, volume and raw register access.
//!
//! Run with: cargo test -p vs1053 --test device
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::arithmetic_side_effects
)]

mod common;

use common::{codec, codec_with, ready_codec, YieldDelay};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal_mock::eh1::delay::NoopDelay;
use platform::mocks::SimulatedCodec;
use proptest::prelude::*;
use vs1053::{CodecConfig, CodecError, Register, Vs1053};

const MODE: u8 = 0x00;
const CLOCKF: u8 = 0x03;
const VOL: u8 = 0x0B;

#[tokio::test]
async fn test_init_sequence() {
    let sim = SimulatedCodec::new();
    let codec = codec(&sim);

    codec.init().await.unwrap();

    assert_eq!(
        sim.writes(),
        vec![
            (MODE, 0x0804), // SDINEW | RESET
            (CLOCKF, 0xA000),
            (MODE, 0x0800), // SDINEW
            (CLOCKF, 0xA000),
            (VOL, 0x0101), // probe
            (VOL, 0x3737), // initial volume 200/200
        ]
    );
    assert_eq!(sim.reads_of(VOL), 1);
    assert_eq!(sim.resets(), 1);
    assert_eq!(codec.left_volume(), 200);
    assert_eq!(codec.right_volume(), 200);
    assert!(!codec.is_busy());
}

#[tokio::test]
async fn test_new_runs_init() {
    let sim = SimulatedCodec::new();
    let codec: common::TestCodec =
        Vs1053::new(sim.clone(), sim.clone(), NoopDelay, CodecConfig::default())
            .await
            .unwrap();

    assert_eq!(sim.resets(), 1);
    assert_eq!(sim.register(VOL), 0x3737);
    assert_eq!(codec.volume().left, 200);
}

#[tokio::test]
async fn test_probe_mismatch_fails_init() {
    let sim = SimulatedCodec::new().with_volume_readback(0x0000);
    let codec = codec(&sim);

    let err = codec.init().await.unwrap_err();
    assert_eq!(
        err,
        CodecError::DeviceInit {
            expected: 0x0101,
            actual: 0x0000
        }
    );
    // Initial volume is never applied
    assert_eq!(sim.writes_to(VOL), vec![0x0101]);
}

#[tokio::test]
async fn test_command_failure_is_transport_error() {
    let sim = SimulatedCodec::new().failing_commands();
    let codec = codec(&sim);

    assert_eq!(codec.init().await.unwrap_err(), CodecError::Transport);
}

#[tokio::test]
async fn test_ready_pin_failure() {
    let sim = SimulatedCodec::new().failing_ready_pin();
    let codec = codec(&sim);

    assert_eq!(codec.init().await.unwrap_err(), CodecError::ReadySignal);
    assert!(sim.writes().is_empty(), "nothing sent without DREQ");
}

#[tokio::test]
async fn test_ready_timeout() {
    let sim = SimulatedCodec::new().never_ready();
    let codec = codec_with(&sim, CodecConfig::with_ready_timeout(5));

    assert_eq!(codec.init().await.unwrap_err(), CodecError::DeviceNotReady);
    assert_eq!(sim.ready_polls(), 5);
    assert!(sim.writes().is_empty());
}

#[tokio::test]
async fn test_slow_ready_is_waited_out() {
    let sim = SimulatedCodec::new().with_not_ready_polls(3);
    let codec = codec_with(&sim, CodecConfig::with_ready_timeout(5));

    codec.init().await.unwrap();
    assert_eq!(sim.register(VOL), 0x3737);
}

#[tokio::test]
async fn test_reset_restores_clock() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    codec.reset().await.unwrap();
    assert_eq!(sim.resets(), 2);
    assert_eq!(sim.writes(), vec![(MODE, 0x0804), (CLOCKF, 0xA000)]);
}

#[tokio::test]
async fn test_custom_clock_multiplier() {
    let sim = SimulatedCodec::new();
    let config = CodecConfig {
        clock_multiplier: 0x8800,
        ..CodecConfig::default()
    };
    let codec = codec_with(&sim, config);

    codec.init().await.unwrap();
    assert_eq!(sim.writes_to(CLOCKF), vec![0x8800, 0x8800]);
}

// ── Volume ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_set_volume_per_channel() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    codec.set_volume(255, 0).await.unwrap();
    assert_eq!(sim.writes(), vec![(VOL, 0x00FF)]);
    assert_eq!(codec.left_volume(), 255);
    assert_eq!(codec.right_volume(), 0);
}

#[tokio::test]
async fn test_set_volume_both_matches_set_volume() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    codec.set_volume_both(100).await.unwrap();
    codec.set_volume(100, 100).await.unwrap();
    assert_eq!(sim.writes_to(VOL), vec![0x9B9B, 0x9B9B]);
}

#[tokio::test]
async fn test_set_volume_percent() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    codec.set_volume_percent(100).await.unwrap();
    codec.set_volume_percent(0).await.unwrap();
    assert_eq!(sim.writes_to(VOL), vec![0x0000, 0xFFFF]);
}

#[tokio::test]
async fn test_set_volume_percent_rejects_over_100() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    let err = codec.set_volume_percent(101).await.unwrap_err();
    assert_eq!(
        err,
        CodecError::InvalidParameter {
            value: 101,
            min: 0,
            max: 100
        }
    );
    assert!(sim.writes().is_empty());
    assert_eq!(codec.left_volume(), 200, "stored volume unchanged");
}

proptest! {
    #[test]
    fn prop_volume_register_encoding(left in any::<u8>(), right in any::<u8>()) {
        let sim = SimulatedCodec::new();
        let codec = common::codec(&sim);

        embassy_futures::block_on(codec.set_volume(left, right)).unwrap();

        let expected = (u16::from(255 - left) << 8) | u16::from(255 - right);
        prop_assert_eq!(sim.writes_to(VOL), vec![expected]);
        prop_assert_eq!(codec.left_volume(), left);
        prop_assert_eq!(codec.right_volume(), right);
    }
}

// ── Raw registers ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_write_then_read_register() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;

    codec.write_register(Register::Bass, 0x7A00).await.unwrap();
    assert_eq!(codec.read_register(Register::Bass).await.unwrap(), 0x7A00);
}

#[tokio::test]
async fn test_reset_rejected_while_busy() {
    let sim = SimulatedCodec::new();
    let codec = ready_codec(&sim).await;
    let data = [0u8; 32 * 4];

    let (played, reset, init) = embassy_futures::join::join3(
        codec.play(&data),
        async {
            embassy_futures::yield_now().await;
            codec.reset().await
        },
        async {
            embassy_futures::yield_now().await;
            codec.init().await
        },
    )
    .await;

    assert_eq!(played.unwrap().frames_sent, 4);
    assert_eq!(reset.unwrap_err(), CodecError::AlreadyBusy);
    assert_eq!(init.unwrap_err(), CodecError::AlreadyBusy);
}

#[tokio::test]
async fn test_init_holds_the_device() {
    let sim = SimulatedCodec::new();
    let codec: Vs1053<NoopRawMutex, _, _, _> =
        Vs1053::new_uninit(sim.clone(), sim.clone(), YieldDelay, CodecConfig::default());

    // Init parks in its reset settle delay when the second branch first runs
    let (init, (busy, played)) = embassy_futures::join::join(codec.init(), async {
        (codec.is_busy(), codec.play(&[0u8; 32]).await)
    })
    .await;

    init.unwrap();
    assert!(busy);
    assert_eq!(played.unwrap_err(), CodecError::AlreadyBusy);
    assert!(sim.data_frames().is_empty());
    assert!(!codec.is_busy());
}
