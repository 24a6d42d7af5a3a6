//! Device state manager.
//!
//! [`Vs1053`] owns the bus and the shared device state (volume, which session
//! is running). Every method takes `&self`: put the driver in a `StaticCell`
//! and hand `&'static Vs1053<..>` to as many tasks as need it.
//!
//! # Bus ownership
//!
//! The [`CodecBus`] sits behind an `embassy_sync` async mutex. A foreground
//! call (`set_volume`, `read_register`, ...) takes the lock for one
//! transaction. Streaming sessions take it per frame or per poll and yield in
//! between, so foreground calls interleave with a running session.
//!
//! # Sessions
//!
//! Playback, recording and the sine test are mutually exclusive. Starting a
//! second one while any is active fails with [`CodecError::AlreadyBusy`].
//! `init` and `reset` claim the device the same way for their duration.
//!
//! A session future dropped before it completes leaves the chip in whatever
//! mode it was in. The driver remembers that and resets the chip before the
//! next session touches it.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Read;
use platform::{CodecTransport, ReadySignal, StereoVolume, VolumePercent};

use crate::bus::CodecBus;
use crate::config::CodecConfig;
use crate::error::{CodecError, Result};
use crate::patch::{self, PatchImage, SliceWords, StreamWords};
use crate::playback::{PlaybackReport, PlaybackState};
use crate::recording::{RecordingReport, RecordingState};
use crate::registers::{
    sine_test_start, Register, SINE_TEST_EXIT, SM_RESET, SM_SDINEW, SM_TESTS, VOL_PROBE,
};

/// Which streaming session a [`SessionGuard`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionKind {
    Playback,
    Recording,
    SineTest,
    /// `init` or `reset` in progress.
    Reset,
}

#[derive(Debug, Clone, Copy)]
struct DeviceState {
    volume: StereoVolume,
    playback: PlaybackState,
    recording: RecordingState,
    sine_test: bool,
    resetting: bool,
    /// A session was abandoned without its closing reset.
    needs_reset: bool,
}

impl DeviceState {
    fn is_busy(&self) -> bool {
        self.playback == PlaybackState::Streaming
            || self.recording != RecordingState::Idle
            || self.sine_test
            || self.resetting
    }
}

/// VS1053 codec driver.
///
/// Generic over the raw mutex guarding shared state (`CriticalSectionRawMutex`
/// when tasks run at different priorities, `NoopRawMutex` for a single
/// executor), the transport, the DREQ input and the delay source.
pub struct Vs1053<M: RawMutex, T, R, D> {
    pub(crate) bus: Mutex<M, CodecBus<T, R, D>>,
    config: CodecConfig,
    state: BlockingMutex<M, Cell<DeviceState>>,
    pub(crate) playback_stop: Signal<M, ()>,
    pub(crate) playback_finished: Signal<M, PlaybackReport>,
    pub(crate) recording_stop: Signal<M, ()>,
    pub(crate) recording_finished: Signal<M, RecordingReport>,
}

// ── State (no bus access) ────────────────────────────────────────────────────

impl<M: RawMutex, T, R, D> Vs1053<M, T, R, D> {
    fn state(&self) -> DeviceState {
        self.state.lock(Cell::get)
    }

    fn update_state(&self, f: impl FnOnce(&mut DeviceState)) {
        self.state.lock(|cell| {
            let mut state = cell.get();
            f(&mut state);
            cell.set(state);
        });
    }

    /// Active configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Current left channel level (255 = loudest).
    pub fn left_volume(&self) -> u8 {
        self.state().volume.left
    }

    /// Current right channel level (255 = loudest).
    pub fn right_volume(&self) -> u8 {
        self.state().volume.right
    }

    /// Both channel levels.
    pub fn volume(&self) -> StereoVolume {
        self.state().volume
    }

    /// `true` while any session, `init` or `reset` holds the device.
    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    /// `true` while a playback session streams frames.
    pub fn is_playing(&self) -> bool {
        self.state().playback == PlaybackState::Streaming
    }

    /// `true` from the start of a recording session until it has drained.
    pub fn is_recording(&self) -> bool {
        self.state().recording != RecordingState::Idle
    }

    /// Playback state machine position.
    pub fn playback_state(&self) -> PlaybackState {
        self.state().playback
    }

    /// Recording state machine position.
    pub fn recording_state(&self) -> RecordingState {
        self.state().recording
    }

    pub(crate) fn set_recording_state(&self, recording: RecordingState) {
        self.update_state(|s| s.recording = recording);
    }

    /// Claim the device for one session.
    pub(crate) fn begin_session(
        &self,
        kind: SessionKind,
    ) -> Result<SessionGuard<'_, M, T, R, D>> {
        let claimed = self.state.lock(|cell| {
            let mut state = cell.get();
            if state.is_busy() {
                return false;
            }
            match kind {
                SessionKind::Playback => state.playback = PlaybackState::Streaming,
                SessionKind::Recording => state.recording = RecordingState::Recording,
                SessionKind::SineTest => state.sine_test = true,
                SessionKind::Reset => state.resetting = true,
            }
            cell.set(state);
            true
        });
        if !claimed {
            return Err(CodecError::AlreadyBusy);
        }
        Ok(SessionGuard {
            codec: self,
            kind,
            finished: false,
        })
    }

    fn end_session(&self, kind: SessionKind, failed: bool) {
        self.update_state(|s| match kind {
            SessionKind::Playback => {
                s.playback = if failed {
                    PlaybackState::Error
                } else {
                    PlaybackState::Idle
                };
            }
            SessionKind::Recording => s.recording = RecordingState::Idle,
            SessionKind::SineTest => s.sine_test = false,
            SessionKind::Reset => s.resetting = false,
        });
    }

    /// `true` if the chip has not been reset since a session was abandoned.
    pub fn needs_reset(&self) -> bool {
        self.state().needs_reset
    }
}

/// Marks a session active for as long as it lives.
///
/// Dropped without [`finish`](Self::finish) (the session future was
/// cancelled): the busy flag is cleared, waiters get an abandoned report and
/// the device is marked for a reset before its next session.
pub(crate) struct SessionGuard<'a, M: RawMutex, T, R, D> {
    codec: &'a Vs1053<M, T, R, D>,
    kind: SessionKind,
    finished: bool,
}

impl<M: RawMutex, T, R, D> SessionGuard<'_, M, T, R, D> {
    /// Normal end of the session, after the device has been reset.
    pub(crate) fn finish(mut self, failed: bool) {
        self.finished = true;
        self.codec.end_session(self.kind, failed);
    }
}

impl<M: RawMutex, T, R, D> Drop for SessionGuard<'_, M, T, R, D> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("session dropped before completion; reset deferred");
        self.codec.update_state(|s| s.needs_reset = true);
        self.codec.end_session(self.kind, false);
        match self.kind {
            SessionKind::Playback => self
                .codec
                .playback_finished
                .signal(PlaybackReport::abandoned()),
            SessionKind::Recording => self
                .codec
                .recording_finished
                .signal(RecordingReport::abandoned()),
            SessionKind::SineTest | SessionKind::Reset => {}
        }
    }
}

// ── Device operations ────────────────────────────────────────────────────────

impl<M, T, R, D> Vs1053<M, T, R, D>
where
    M: RawMutex,
    T: CodecTransport,
    R: ReadySignal,
    D: DelayNs,
{
    /// Build the driver without touching the device. Call [`init`](Self::init)
    /// before anything else.
    pub fn new_uninit(transport: T, ready: R, delay: D, config: CodecConfig) -> Self {
        Self {
            bus: Mutex::new(CodecBus::new(transport, ready, delay, &config)),
            config,
            state: BlockingMutex::new(Cell::new(DeviceState {
                volume: config.initial_volume,
                playback: PlaybackState::Idle,
                recording: RecordingState::Idle,
                sine_test: false,
                resetting: false,
                needs_reset: false,
            })),
            playback_stop: Signal::new(),
            playback_finished: Signal::new(),
            recording_stop: Signal::new(),
            recording_finished: Signal::new(),
        }
    }

    /// Build the driver and bring the device up.
    ///
    /// # Errors
    ///
    /// See [`init`](Self::init).
    pub async fn new(transport: T, ready: R, delay: D, config: CodecConfig) -> Result<Self> {
        let codec = Self::new_uninit(transport, ready, delay, config);
        codec.init().await?;
        Ok(codec)
    }

    /// Reset the chip, select native SPI mode, program the clock and confirm
    /// the chip answers by writing and reading back a volume probe. Ends with
    /// the configured initial volume applied.
    ///
    /// # Errors
    ///
    /// [`CodecError::DeviceInit`] if the probe does not read back,
    /// [`CodecError::AlreadyBusy`] while a session runs, or any bus error.
    pub async fn init(&self) -> Result<()> {
        info!("Initialising VS1053");
        let claim = self.begin_session(SessionKind::Reset)?;
        let result = self.run_init().await;
        claim.finish(result.is_err());
        if result.is_ok() {
            info!("VS1053 initialisation complete");
        }
        result
    }

    async fn run_init(&self) -> Result<()> {
        self.soft_reset().await?;
        {
            let mut bus = self.bus.lock().await;
            bus.write_register(Register::Mode, SM_SDINEW).await?;
            bus.write_register(Register::ClockF, self.config.clock_multiplier)
                .await?;
            bus.write_register(Register::Vol, VOL_PROBE).await?;
            let actual = bus.read_register(Register::Vol).await?;
            if actual != VOL_PROBE {
                warn!("VS1053 volume probe mismatch: read {:#x}", actual);
                return Err(CodecError::DeviceInit {
                    expected: VOL_PROBE,
                    actual,
                });
            }
        }

        let volume = self.config.initial_volume;
        self.set_volume(volume.left, volume.right).await
    }

    /// Soft-reset the chip and restore the clock setting.
    ///
    /// # Errors
    ///
    /// [`CodecError::AlreadyBusy`] while a session runs, or any bus error.
    pub async fn reset(&self) -> Result<()> {
        let claim = self.begin_session(SessionKind::Reset)?;
        let result = self.soft_reset().await;
        claim.finish(result.is_err());
        result
    }

    /// Run the reset an abandoned session skipped, if any.
    pub(crate) async fn reset_if_abandoned(&self) -> Result<()> {
        if !self.needs_reset() {
            return Ok(());
        }
        info!("resetting after an abandoned session");
        self.soft_reset().await
    }

    /// Reset sequence shared by init and every session entry and exit.
    pub(crate) async fn soft_reset(&self) -> Result<()> {
        let mut bus = self.bus.lock().await;
        bus.write_register(Register::Mode, SM_SDINEW | SM_RESET)
            .await?;
        bus.wait_ready().await?;
        bus.settle_ms(1).await;
        bus.write_register(Register::ClockF, self.config.clock_multiplier)
            .await?;
        drop(bus);
        self.update_state(|s| s.needs_reset = false);
        debug!("VS1053 soft reset");
        Ok(())
    }

    /// Set per-channel output level, 0 = silent, 255 = loudest.
    pub async fn set_volume(&self, left: u8, right: u8) -> Result<()> {
        let volume = StereoVolume::new(left, right);
        self.update_state(|s| s.volume = volume);
        self.write_register(Register::Vol, volume.register().get())
            .await
    }

    /// Same level on both channels.
    pub async fn set_volume_both(&self, level: u8) -> Result<()> {
        self.set_volume(level, level).await
    }

    /// Both channels from a 0–100 % value.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidParameter`] above 100.
    pub async fn set_volume_percent(&self, percent: u8) -> Result<()> {
        let percent = VolumePercent::try_new(percent)?;
        self.set_volume_both(percent.to_level()).await
    }

    /// Read any SCI register.
    pub async fn read_register(&self, register: Register) -> Result<u16> {
        self.bus.lock().await.read_register(register).await
    }

    /// Write any SCI register.
    pub async fn write_register(&self, register: Register, value: u16) -> Result<()> {
        self.bus.lock().await.write_register(register, value).await
    }

    /// Replay a patch table; returns the number of register writes.
    ///
    /// The table is validated before anything is written.
    ///
    /// # Errors
    ///
    /// [`CodecError::Patch`] for a malformed table, or any bus error.
    pub async fn load_patch(&self, image: &PatchImage<'_>) -> Result<usize> {
        let mut bus = self.bus.lock().await;
        let writes = Self::load_patch_locked(&mut *bus, image).await?;
        info!("patch loaded: {} register writes", writes);
        Ok(writes)
    }

    /// Replay a patch from a little-endian byte stream; returns the number of
    /// register writes. Stops at a clean end of stream.
    ///
    /// # Errors
    ///
    /// [`CodecError::Patch`] if the stream ends inside a record, names an
    /// invalid register, or fails to read. Writes already issued stay issued.
    pub async fn load_patch_from_stream<S: Read>(&self, source: S) -> Result<usize> {
        let mut bus = self.bus.lock().await;
        let writes = patch::replay(&mut *bus, &mut StreamWords::new(source)).await?;
        info!("patch streamed: {} register writes", writes);
        Ok(writes)
    }

    /// Replay a patch on a bus the caller already holds.
    pub(crate) async fn load_patch_locked(
        bus: &mut CodecBus<T, R, D>,
        image: &PatchImage<'_>,
    ) -> Result<usize> {
        image.validate()?;
        patch::replay(bus, &mut SliceWords::new(image)).await
    }

    /// Built-in sine test: play a tone selected by `pattern` for
    /// `duration_ms`, then reset.
    ///
    /// The bus stays locked for the whole tone.
    ///
    /// # Errors
    ///
    /// [`CodecError::AlreadyBusy`] while a session runs, or any bus error.
    pub async fn sine_test(&self, pattern: u8, duration_ms: u32) -> Result<()> {
        let session = self.begin_session(SessionKind::SineTest)?;
        info!("sine test: pattern {:#x}, {} ms", pattern, duration_ms);

        let result = self.run_sine_test(pattern, duration_ms).await;
        let cleanup = self.soft_reset().await;
        session.finish(result.is_err() || cleanup.is_err());
        result.and(cleanup)
    }

    async fn run_sine_test(&self, pattern: u8, duration_ms: u32) -> Result<()> {
        self.reset_if_abandoned().await?;
        let mut bus = self.bus.lock().await;
        bus.write_register(Register::Mode, SM_SDINEW | SM_TESTS | SM_RESET)
            .await?;
        bus.wait_ready().await?;
        for byte in sine_test_start(pattern) {
            bus.write_data(&[byte]).await?;
        }
        bus.settle_ms(duration_ms).await;
        for byte in SINE_TEST_EXIT {
            bus.write_data(&[byte]).await?;
        }
        Ok(())
    }
}
