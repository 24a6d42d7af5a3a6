//! Driver error types

use embedded_io::ErrorKind;
use platform::OutOfRangeError;

/// Errors returned by the codec driver.
#[derive(thiserror_no_std::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// The volume probe written during init did not read back.
    #[error("device did not answer: wrote {expected:#06x} to SCI_VOL, read {actual:#06x}")]
    DeviceInit {
        /// Value written
        expected: u16,
        /// Value read back
        actual: u16,
    },

    /// Argument outside its valid range.
    #[error("value {value} outside {min}..={max}")]
    InvalidParameter {
        /// Offending value
        value: u32,
        /// Inclusive minimum
        min: u32,
        /// Inclusive maximum
        max: u32,
    },

    /// A playback or recording session is already running.
    #[error("a playback or recording session is already active")]
    AlreadyBusy,

    /// DREQ stayed low past the configured ready timeout.
    #[error("device not ready before timeout")]
    DeviceNotReady,

    /// Command or data channel transfer failed.
    #[error("bus transfer failed")]
    Transport,

    /// The DREQ input could not be read.
    #[error("ready signal read failed")]
    ReadySignal,

    /// The recording sink rejected a write or flush.
    #[error("recording sink failed ({0:?})")]
    Sink(ErrorKind),

    /// A patch image could not be replayed.
    #[error("patch load failed: {0}")]
    Patch(PatchError),
}

/// Errors while decoding a patch image.
#[derive(thiserror_no_std::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PatchError {
    /// The image ended in the middle of a record.
    #[error("patch image ends inside a record")]
    Truncated,

    /// A record addresses a register outside the SCI map.
    #[error("patch record addresses invalid register {0:#04x}")]
    InvalidRegister(u8),

    /// The byte source failed.
    #[error("patch source read failed ({0:?})")]
    Source(ErrorKind),
}

impl From<PatchError> for CodecError {
    fn from(err: PatchError) -> Self {
        Self::Patch(err)
    }
}

impl From<OutOfRangeError> for CodecError {
    fn from(err: OutOfRangeError) -> Self {
        Self::InvalidParameter {
            value: err.value,
            min: err.min,
            max: err.max,
        }
    }
}

/// Result alias for driver operations.
pub type Result<T> = core::result::Result<T, CodecError>;
