//! Shared fixtures for the driver integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use core::future::Future;

use embassy_futures::select::{select, Either};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_time::{with_timeout, Duration};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_mock::eh1::delay::NoopDelay;
use platform::mocks::SimulatedCodec;
use vs1053::{CodecConfig, Vs1053};

pub type TestCodec = Vs1053<NoopRawMutex, SimulatedCodec, SimulatedCodec, NoopDelay>;

/// Delay that hands control back to the executor instead of sleeping, so
/// concurrent tasks get to run while the driver waits.
pub struct YieldDelay;

impl DelayNs for YieldDelay {
    async fn delay_ns(&mut self, _ns: u32) {
        yield_now().await;
    }
}

/// Driver over `sim`, not initialised.
pub fn codec(sim: &SimulatedCodec) -> TestCodec {
    codec_with(sim, CodecConfig::default())
}

pub fn codec_with(sim: &SimulatedCodec, config: CodecConfig) -> TestCodec {
    Vs1053::new_uninit(sim.clone(), sim.clone(), NoopDelay, config)
}

/// Driver over `sim`, initialised, with the init traffic cleared.
pub async fn ready_codec(sim: &SimulatedCodec) -> TestCodec {
    let codec = codec(sim);
    codec.init().await.unwrap();
    sim.clear_events();
    codec
}

/// Fail the test instead of hanging when a session never ends.
pub async fn guarded<F: Future>(fut: F) -> F::Output {
    with_timeout(Duration::from_secs(5), fut)
        .await
        .expect("operation did not complete")
}

/// `Some(output)` if `fut` completes without waiting on anything.
pub async fn poll_ready<F: Future>(fut: F) -> Option<F::Output> {
    match select(fut, yield_now()).await {
        Either::First(output) => Some(output),
        Either::Second(()) => None,
    }
}

/// Yield until `done` holds.
pub async fn until(mut done: impl FnMut() -> bool) {
    while !done() {
        yield_now().await;
    }
}
