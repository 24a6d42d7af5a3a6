//! Driver configuration.
//!
//! # Timing
//!
//! DREQ is polled, not interrupt driven. The poll interval trades latency
//! for bus traffic on the ready line:
//!
//! | Interval | Worst-case added latency per transfer |
//! |----------|---------------------------------------|
//! | 1000 µs  | 1 ms (default)                        |
//! | 100 µs   | 0.1 ms                                |
//!
//! With `ready_timeout_ms = None` a dead chip blocks the caller forever;
//! set a bound on boards where the codec may be unpowered.

use platform::StereoVolume;

use crate::registers::{
    AICTRL0_DEFAULT, AICTRL0_MONO, AICTRL0_STEREO, CLOCKF_PLAYBACK, CLOCKF_RECORDING,
    RECORDER_START_ADDR,
};

/// Input channel layout for ADPCM recording (`SCI_AICTRL0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelMode {
    /// Whatever the loaded plugin defaults to
    #[default]
    PluginDefault,
    /// Single channel
    Mono,
    /// Left + right
    Stereo,
}

impl ChannelMode {
    /// `SCI_AICTRL0` value.
    #[must_use]
    pub const fn register_value(self) -> u16 {
        match self {
            Self::PluginDefault => AICTRL0_DEFAULT,
            Self::Mono => AICTRL0_MONO,
            Self::Stereo => AICTRL0_STEREO,
        }
    }
}

/// Recording plugin parameters, written to `SCI_AICTRL0..2` and `SCI_AIADDR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecorderSettings {
    /// Channel layout (`AICTRL0`)
    pub channel_mode: ChannelMode,
    /// Fixed input gain, 1024 = 1x; `0` enables automatic gain control (`AICTRL1`)
    pub gain: u16,
    /// AGC ceiling, 1024 = 1x (`AICTRL2`)
    pub max_autogain: u16,
    /// Plugin entry point (`AIADDR`)
    pub start_address: u16,
}

impl Default for RecorderSettings {
    /// AGC on, 4x ceiling, plugin default layout.
    fn default() -> Self {
        Self {
            channel_mode: ChannelMode::PluginDefault,
            gain: 0,
            max_autogain: 4096,
            start_address: RECORDER_START_ADDR,
        }
    }
}

/// Codec driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecConfig {
    /// DREQ poll interval in microseconds.
    pub ready_poll_interval_us: u32,
    /// Give up waiting for DREQ after this many milliseconds; `None` waits forever.
    pub ready_timeout_ms: Option<u32>,
    /// `SCI_CLOCKF` for normal operation.
    pub clock_multiplier: u16,
    /// `SCI_CLOCKF` while recording.
    pub recording_clock: u16,
    /// Volume applied at the end of init.
    pub initial_volume: StereoVolume,
    /// Recording plugin parameters.
    pub recorder: RecorderSettings,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            ready_poll_interval_us: 1_000,
            ready_timeout_ms: None,
            clock_multiplier: CLOCKF_PLAYBACK,
            recording_clock: CLOCKF_RECORDING,
            initial_volume: StereoVolume::both(200),
            recorder: RecorderSettings::default(),
        }
    }
}

impl CodecConfig {
    /// Defaults with a bounded ready wait.
    #[must_use]
    pub fn with_ready_timeout(ms: u32) -> Self {
        Self {
            ready_timeout_ms: Some(ms),
            ..Self::default()
        }
    }

    /// Maximum number of DREQ polls before giving up, `None` for unbounded.
    ///
    /// `timeout_ms * 1000 / poll_interval_us`, at least one poll.
    #[must_use]
    pub fn max_ready_polls(&self) -> Option<u32> {
        let timeout_ms = self.ready_timeout_ms?;
        let interval = self.ready_poll_interval_us.max(1);
        let polls = timeout_ms.saturating_mul(1_000).checked_div(interval).unwrap_or(0);
        Some(polls.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.clock_multiplier, 0xA000);
        assert_eq!(config.recording_clock, 0xC000);
        assert_eq!(config.initial_volume, StereoVolume::both(200));
        assert_eq!(config.max_ready_polls(), None);
        assert_eq!(config.recorder.max_autogain, 4096);
        assert_eq!(config.recorder.start_address, 0x0034);
    }

    #[test]
    fn test_ready_poll_budget() {
        let config = CodecConfig::with_ready_timeout(5);
        assert_eq!(config.max_ready_polls(), Some(5));

        let coarse = CodecConfig {
            ready_poll_interval_us: 10_000,
            ..CodecConfig::with_ready_timeout(1)
        };
        assert_eq!(coarse.max_ready_polls(), Some(1), "always at least one poll");
    }

    #[test]
    fn test_channel_mode_values() {
        assert_eq!(ChannelMode::Mono.register_value(), 0x8000);
        assert_eq!(ChannelMode::Stereo.register_value(), 0x8080);
        assert_eq!(ChannelMode::default().register_value(), 0x0000);
    }
}
