//! Playback engine.
//!
//! Streams a caller-owned buffer to the decoder in 32-byte frames, one DREQ
//! wait per frame. A trailing partial frame is not sent; the report says how
//! many bytes were left out.
//!
//! ```text
//! Idle ──play()──▶ Streaming ──last frame / stop──▶ Idle
//!                      │
//!                      └──bus error──▶ Error ──play()──▶ Streaming
//! ```

use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use platform::{CodecTransport, ReadySignal};

use crate::driver::{SessionKind, Vs1053};
use crate::error::Result;

/// Bytes per SDI frame. DREQ high guarantees FIFO room for at least this many.
pub const FRAME_LEN: usize = 32;

/// Playback state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlaybackState {
    /// No playback session.
    #[default]
    Idle,
    /// Frames are being sent.
    Streaming,
    /// The last session ended with a bus error.
    Error,
}

/// Outcome of one playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PlaybackReport {
    /// Frames written to the data channel.
    pub frames_sent: usize,
    /// Bytes written to the data channel (`frames_sent * FRAME_LEN`).
    pub bytes_sent: usize,
    /// Trailing bytes that did not fill a frame and were never sent.
    pub bytes_dropped: usize,
    /// `true` if the session ended on a stop request (or was abandoned).
    pub stopped: bool,
}

impl PlaybackReport {
    /// Report for a session whose future was dropped mid-stream. Counts are
    /// not tracked in that case.
    pub(crate) fn abandoned() -> Self {
        Self {
            stopped: true,
            ..Self::default()
        }
    }
}

impl<M, T, R, D> Vs1053<M, T, R, D>
where
    M: RawMutex,
    T: CodecTransport,
    R: ReadySignal,
    D: DelayNs,
{
    /// Stream `data` to the decoder and return once it has been sent or a
    /// stop was requested.
    ///
    /// Always ends with a soft reset; the finish notification is raised after
    /// the busy flag clears, on success and on error alike.
    ///
    /// # Errors
    ///
    /// [`CodecError::AlreadyBusy`](crate::CodecError::AlreadyBusy) if any
    /// session is active, or the first bus error. A streaming error takes
    /// precedence over a failing reset.
    pub async fn play(&self, data: &[u8]) -> Result<PlaybackReport> {
        let session = self.begin_session(SessionKind::Playback)?;
        // Requests and reports left over from an earlier session
        let _ = self.playback_stop.try_take();
        let _ = self.playback_finished.try_take();
        info!("playback: {} bytes", data.len());

        let mut report = PlaybackReport::default();
        let result = match self.reset_if_abandoned().await {
            Ok(()) => self.stream_frames(data, &mut report).await,
            Err(e) => Err(e),
        };
        let cleanup = self.soft_reset().await;
        session.finish(result.is_err() || cleanup.is_err());
        self.playback_finished.signal(report);

        info!(
            "playback finished: {} frames, stopped={}",
            report.frames_sent,
            report.stopped
        );
        result.and(cleanup).map(|()| report)
    }

    async fn stream_frames(&self, data: &[u8], report: &mut PlaybackReport) -> Result<()> {
        let frames = data.chunks_exact(FRAME_LEN);
        report.bytes_dropped = frames.remainder().len();
        if report.bytes_dropped > 0 {
            warn!(
                "playback: {} trailing bytes do not fill a frame and are skipped",
                report.bytes_dropped
            );
        }

        for frame in frames {
            if self.playback_stop.try_take().is_some() {
                report.stopped = true;
                info!("playback: stop requested");
                break;
            }
            self.bus.lock().await.write_data(frame).await?;
            report.frames_sent = report.frames_sent.saturating_add(1);
            report.bytes_sent = report.bytes_sent.saturating_add(FRAME_LEN);
            yield_now().await;
        }
        Ok(())
    }

    /// Ask a running playback to stop before its next frame. No effect when
    /// nothing is playing.
    pub fn stop_playing(&self) {
        if self.is_playing() {
            self.playback_stop.signal(());
        }
    }

    /// Wait for the current (or next) playback session to finish.
    ///
    /// Each session raises exactly one notification; a report nobody waited
    /// for is discarded when the next session starts.
    pub async fn wait_playback_finished(&self) -> PlaybackReport {
        self.playback_finished.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abandoned_report_is_stopped() {
        let report = PlaybackReport::abandoned();
        assert!(report.stopped);
        assert_eq!(report.frames_sent, 0);
    }

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
    }
}
