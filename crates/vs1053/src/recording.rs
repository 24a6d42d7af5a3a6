//! Recording engine (IMA ADPCM via the VLSI encoder plugin).
//!
//! # Setup
//!
//! 1. soft reset, volume to maximum, `SCI_CLOCKF` to the recording clock,
//!    bass/treble off, no running application, ADC interrupts masked
//!    (`0x0002` to X-memory `0xC01A`);
//! 2. encoder patch loaded;
//! 3. `SCI_MODE |= SM_ADPCM | SM_LINE1`;
//! 4. `AICTRL1` gain, `AICTRL2` AGC ceiling, `AICTRL0` channel layout,
//!    `AICTRL3` cleared, `AIADDR` set to the plugin entry point.
//!
//! # Data path
//!
//! `SCI_HDAT1` reports how many 16-bit samples wait in the encoder FIFO;
//! `SCI_HDAT0` hands them out one per read. Samples go to the sink in the
//! order they are read, in chunks of [`RECORD_CHUNK_SAMPLES`].
//!
//! # Stopping
//!
//! ```text
//! Idle ──record()──▶ Recording ──stop──▶ Stopping ──AICTRL3 bit 1──▶ drain ──▶ Idle
//! ```
//!
//! A stop request sets `AICTRL3` bit 0. The plugin finishes the current
//! block and raises bit 1. The loop then empties the FIFO until `HDAT1`
//! reads 0, flushes and releases the sink, and resets the chip.

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use platform::{CodecTransport, ReadySignal};

use crate::bus::SAMPLE_BYTES;
use crate::driver::{SessionKind, Vs1053};
use crate::error::{CodecError, Result};
use crate::patch::PatchImage;
use crate::registers::{
    Register, AICTRL3_STOPPED, AICTRL3_STOP_REQUEST, SM_ADPCM, SM_LINE1, WRAM_ADDR_INT_ENABLE,
    WRAM_INT_SCI_ONLY,
};

/// Samples moved per `HDAT0` burst.
pub const RECORD_CHUNK_SAMPLES: usize = 256;

const RECORD_CHUNK_BYTES: usize = RECORD_CHUNK_SAMPLES * SAMPLE_BYTES;

/// Recording state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordingState {
    /// No recording session.
    #[default]
    Idle,
    /// Encoder running, samples being collected.
    Recording,
    /// Stop requested; waiting for the encoder to finish.
    Stopping,
}

/// Outcome of one recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordingReport {
    /// Samples read from the encoder FIFO.
    pub samples: usize,
    /// Bytes written to the sink (`samples * 2`).
    pub bytes_written: usize,
    /// `true` if the session ended on a stop request (or was abandoned).
    pub stopped: bool,
}

impl RecordingReport {
    /// Report for a session whose future was dropped. Counts are not tracked
    /// in that case.
    pub(crate) fn abandoned() -> Self {
        Self {
            stopped: true,
            ..Self::default()
        }
    }
}

fn sink_error<E: embedded_io::Error>(e: E) -> CodecError {
    CodecError::Sink(e.kind())
}

impl<M, T, R, D> Vs1053<M, T, R, D>
where
    M: RawMutex,
    T: CodecTransport,
    R: ReadySignal,
    D: DelayNs,
{
    /// Record from the line input into `sink` until [`stop_recording`]
    /// is called.
    ///
    /// `patch` is the VLSI ADPCM encoder plugin. The sink is flushed and
    /// dropped before the chip is reset and the finish notification raised.
    ///
    /// # Errors
    ///
    /// [`CodecError::AlreadyBusy`] if any session is active,
    /// [`CodecError::Patch`] for a malformed patch, [`CodecError::Sink`] if
    /// the sink fails, or any bus error. The first error wins; later cleanup
    /// failures are not reported over it.
    ///
    /// [`stop_recording`]: Self::stop_recording
    pub async fn record<W: Write>(
        &self,
        mut sink: W,
        patch: &PatchImage<'_>,
    ) -> Result<RecordingReport> {
        let session = self.begin_session(SessionKind::Recording)?;
        let _ = self.recording_stop.try_take();
        let _ = self.recording_finished.try_take();
        info!("recording started");

        let mut report = RecordingReport::default();
        let result = self.run_recording(&mut sink, patch, &mut report).await;
        let closed = sink.flush().await.map_err(sink_error);
        drop(sink);
        let cleanup = self.soft_reset().await;
        session.finish(false);
        self.recording_finished.signal(report);

        info!(
            "recording finished: {} samples, {} bytes",
            report.samples,
            report.bytes_written
        );
        result.and(closed).and(cleanup).map(|()| report)
    }

    async fn run_recording<W: Write>(
        &self,
        sink: &mut W,
        patch: &PatchImage<'_>,
        report: &mut RecordingReport,
    ) -> Result<()> {
        self.soft_reset().await?;
        self.set_volume_both(u8::MAX).await?;
        self.start_encoder(patch).await?;

        let mut chunk = [0u8; RECORD_CHUNK_BYTES];
        loop {
            let mut encoder_done = false;
            if self.recording_state() == RecordingState::Recording
                && self.recording_stop.try_take().is_some()
            {
                self.write_register(Register::AiCtrl3, AICTRL3_STOP_REQUEST)
                    .await?;
                self.set_recording_state(RecordingState::Stopping);
                report.stopped = true;
                info!("recording: stop requested");
            }
            if self.recording_state() == RecordingState::Stopping {
                let ctrl = self.read_register(Register::AiCtrl3).await?;
                encoder_done = ctrl & AICTRL3_STOPPED != 0;
            }

            self.transfer_available(sink, &mut chunk, report).await?;
            if encoder_done {
                break;
            }
            yield_now().await;
        }

        // Empty whatever the encoder produced while stopping
        let mut drained = 0usize;
        loop {
            let moved = self.transfer_available(sink, &mut chunk, report).await?;
            if moved == 0 {
                break;
            }
            drained = drained.saturating_add(moved);
        }
        debug!("recording: drained {} samples after stop", drained);
        Ok(())
    }

    /// Program the chip for ADPCM capture and start the encoder plugin.
    async fn start_encoder(&self, patch: &PatchImage<'_>) -> Result<()> {
        let settings = self.config().recorder;
        let mut bus = self.bus.lock().await;

        bus.write_register(Register::ClockF, self.config().recording_clock)
            .await?;
        bus.write_register(Register::Bass, 0).await?;
        bus.write_register(Register::AiAddr, 0).await?;
        bus.write_register(Register::WramAddr, WRAM_ADDR_INT_ENABLE)
            .await?;
        bus.write_register(Register::Wram, WRAM_INT_SCI_ONLY).await?;

        let writes = Self::load_patch_locked(&mut *bus, patch).await?;
        debug!("recording: encoder patch loaded ({} writes)", writes);

        let mode = bus.read_register(Register::Mode).await?;
        bus.write_register(Register::Mode, mode | SM_ADPCM | SM_LINE1)
            .await?;

        bus.write_register(Register::AiCtrl1, settings.gain).await?;
        bus.write_register(Register::AiCtrl2, settings.max_autogain)
            .await?;
        bus.write_register(Register::AiCtrl0, settings.channel_mode.register_value())
            .await?;
        bus.write_register(Register::AiCtrl3, 0).await?;
        bus.write_register(Register::AiAddr, settings.start_address)
            .await?;
        bus.wait_ready().await
    }

    /// Move everything `HDAT1` reports into the sink; returns the sample count.
    async fn transfer_available<W: Write>(
        &self,
        sink: &mut W,
        chunk: &mut [u8; RECORD_CHUNK_BYTES],
        report: &mut RecordingReport,
    ) -> Result<usize> {
        let available = usize::from(self.read_register(Register::HDat1).await?);
        let mut remaining = available;
        while remaining > 0 {
            let samples = remaining.min(RECORD_CHUNK_SAMPLES);
            let bytes = samples.saturating_mul(SAMPLE_BYTES);
            let Some(buf) = chunk.get_mut(..bytes) else {
                break;
            };
            self.bus.lock().await.read_samples(buf).await?;
            sink.write_all(buf).await.map_err(sink_error)?;

            remaining = remaining.saturating_sub(samples);
            report.samples = report.samples.saturating_add(samples);
            report.bytes_written = report.bytes_written.saturating_add(bytes);
        }
        Ok(available)
    }

    /// Ask a running recording to stop. Idempotent; no effect when idle.
    pub fn stop_recording(&self) {
        if self.recording_state() == RecordingState::Recording {
            self.recording_stop.signal(());
        }
    }

    /// Wait for the current (or next) recording session to finish.
    pub async fn wait_recording_finished(&self) -> RecordingReport {
        self.recording_finished.wait().await
    }
}
